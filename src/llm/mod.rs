pub mod types;
pub mod provider;
pub mod gemini;
pub mod imagen;
pub mod speech;

pub use types::*;
pub use provider::Provider;
pub use gemini::{GeminiApi, GeminiProvider, GEMINI_API_URL};
pub use imagen::ImagenClient;
pub use speech::GeminiSpeech;
