//! Imagen image generation over the Gemini API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::gemini::GeminiApi;
use super::types::LLMError;
use crate::tools::image::{GeneratedImage, ImageGenerator};

pub struct ImagenClient {
    api: GeminiApi,
    model: String,
    aspect_ratio: String,
    mime_type: String,
}

impl ImagenClient {
    pub fn new(api: GeminiApi, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            aspect_ratio: "1:1".to_string(),
            mime_type: "image/jpeg".to_string(),
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": self.aspect_ratio,
                "outputOptions": { "mimeType": self.mime_type }
            }
        })
    }
}

#[async_trait]
impl ImageGenerator for ImagenClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, LLMError> {
        let body = self.build_request_body(prompt);
        let resp: ImagenResponse = self.api.post_json(&self.model, "predict", &body).await?;
        into_image(resp, &self.mime_type)
    }
}

fn into_image(resp: ImagenResponse, fallback_mime: &str) -> Result<GeneratedImage, LLMError> {
    resp.predictions
        .into_iter()
        .find_map(|p| {
            p.bytes_base64_encoded.map(|data| GeneratedImage {
                mime_type: p.mime_type.unwrap_or_else(|| fallback_mime.to_string()),
                base64_data: data,
            })
        })
        .ok_or_else(|| LLMError::EmptyResponse {
            message: "No image was generated".to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct ImagenResponse {
    #[serde(default)]
    predictions: Vec<ImagenPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagenPrediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}
