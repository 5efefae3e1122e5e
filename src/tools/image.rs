//! create_image executor

use async_trait::async_trait;
use serde_json::json;

use super::ToolError;
use crate::llm::LLMError;
use crate::view::{unique_id, ChatMessage, MessageRole, ViewState};

pub const IMAGE_FAILURE_TEXT: &str = "Sorry, I couldn't create that image. Please try again.";

/// Encoded output of one image generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub base64_data: String,
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, LLMError>;
}

pub(crate) fn placeholder_text(prompt: &str) -> String {
    format!("🎨 Generating image for: \"{}\"", prompt)
}

/// Show a loading placeholder, generate, then settle the placeholder in place.
///
/// The placeholder always reaches a terminal (non-loading) form, whatever the
/// generator returns. Nothing is generated once the transcript of `epoch`
/// has been reset.
pub async fn create_image(
    generator: &dyn ImageGenerator,
    view: &ViewState,
    epoch: u64,
    prompt: &str,
) -> Result<serde_json::Value, ToolError> {
    let placeholder_id = unique_id("image");
    let placeholder =
        ChatMessage::new(placeholder_id.clone(), MessageRole::Model, placeholder_text(prompt))
            .loading();
    if !view.append_at(epoch, placeholder) {
        return Err(ToolError::Superseded);
    }

    match generator.generate(prompt).await {
        Ok(image) => {
            let data_url = image.data_url();
            view.update(&placeholder_id, |m| {
                m.content.clear();
                m.image = Some(data_url.clone());
                m.is_loading = false;
            });
            tracing::info!(mime_type = %image.mime_type, "Image generated");
            Ok(json!({
                "mimeType": image.mime_type,
                "image": data_url,
            }))
        }
        Err(e) => {
            view.update(&placeholder_id, |m| {
                m.content = IMAGE_FAILURE_TEXT.to_string();
                m.is_loading = false;
            });
            Err(ToolError::ImageGeneration(e.to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Returns a fixed image or error and records prompts
    pub(crate) struct FakeImageGenerator {
        pub result: Result<GeneratedImage, LLMError>,
        pub prompts: Mutex<Vec<String>>,
        pub entered: Notify,
        /// When set, `generate` waits here before returning
        pub release: Option<Notify>,
    }

    impl FakeImageGenerator {
        pub fn ok() -> Self {
            Self {
                result: Ok(GeneratedImage {
                    mime_type: "image/jpeg".to_string(),
                    base64_data: "QUJD".to_string(),
                }),
                prompts: Mutex::new(Vec::new()),
                entered: Notify::new(),
                release: None,
            }
        }

        pub fn gated() -> Self {
            Self {
                release: Some(Notify::new()),
                ..Self::ok()
            }
        }

        pub fn failing() -> Self {
            Self {
                result: Err(LLMError::EmptyResponse {
                    message: "No image was generated".to_string(),
                }),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for FakeImageGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedImage, LLMError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.entered.notify_one();
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_success_mutates_placeholder_in_place() {
        let view = ViewState::new();
        let generator = FakeImageGenerator::ok();

        let content = create_image(&generator, &view, 0, "a cat").await.unwrap();
        assert_eq!(content["mimeType"], "image/jpeg");
        assert_eq!(content["image"], "data:image/jpeg;base64,QUJD");

        let messages = view.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].id().starts_with("image-"));
        assert_eq!(messages[0].content, "");
        assert!(!messages[0].is_loading);
        assert_eq!(
            messages[0].image.as_deref(),
            Some("data:image/jpeg;base64,QUJD")
        );
        assert_eq!(*generator.prompts.lock().unwrap(), vec!["a cat".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_settles_placeholder_with_apology() {
        let view = ViewState::new();
        let generator = FakeImageGenerator::failing();

        let err = create_image(&generator, &view, 0, "a dog").await.unwrap_err();
        assert!(matches!(err, ToolError::ImageGeneration(_)));

        let messages = view.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, IMAGE_FAILURE_TEXT);
        assert!(!messages[0].is_loading);
        assert_eq!(messages[0].image, None);
    }

    #[tokio::test]
    async fn test_reset_transcript_skips_generation() {
        let view = ViewState::new();
        let generator = FakeImageGenerator::ok();
        let stale = view.epoch();
        view.reset(ChatMessage::new("init-normal", MessageRole::Model, "Hi!"));

        let err = create_image(&generator, &view, stale, "a bird").await.unwrap_err();
        assert!(matches!(err, ToolError::Superseded));
        assert!(generator.prompts.lock().unwrap().is_empty());
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_during_generation_drops_placeholder() {
        let view = std::sync::Arc::new(ViewState::new());
        let generator = std::sync::Arc::new(FakeImageGenerator::gated());

        let (v, g) = (view.clone(), generator.clone());
        let running = tokio::spawn(async move { create_image(g.as_ref(), &v, 0, "a ship").await });
        generator.entered.notified().await;
        assert_eq!(view.len(), 1);
        assert!(view.messages()[0].is_loading);

        view.reset(ChatMessage::new("init-normal", MessageRole::Model, "Hi!"));
        if let Some(release) = &generator.release {
            release.notify_one();
        }
        assert!(running.await.unwrap().is_ok());

        let messages = view.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), "init-normal");
    }

    #[test]
    fn test_placeholder_text_quotes_prompt() {
        assert_eq!(placeholder_text("sunset"), "🎨 Generating image for: \"sunset\"");
    }
}
