//! Text-to-speech over the Gemini API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::gemini::GeminiApi;
use super::types::LLMError;
use crate::playback::SpeechSynthesizer;

pub struct GeminiSpeech {
    api: GeminiApi,
    model: String,
    voice: String,
}

impl GeminiSpeech {
    pub fn new(api: GeminiApi, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn build_request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str) -> Result<String, LLMError> {
        let body = self.build_request_body(text);
        let resp: SpeechResponse = self
            .api
            .post_json(&self.model, "generateContent", &body)
            .await?;
        extract_audio(resp)
    }
}

fn extract_audio(resp: SpeechResponse) -> Result<String, LLMError> {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.inline_data)
        .map(|d| d.data)
        .ok_or_else(|| LLMError::EmptyResponse {
            message: "No audio data received from API".to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(default)]
    candidates: Vec<SpeechCandidate>,
}

#[derive(Debug, Deserialize)]
struct SpeechCandidate {
    content: Option<SpeechContent>,
}

#[derive(Debug, Deserialize)]
struct SpeechContent {
    #[serde(default)]
    parts: Vec<SpeechPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}
