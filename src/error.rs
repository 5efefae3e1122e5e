use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GustoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Missing API key: pass --api-key or set GOOGLE_API_KEY")]
    MissingApiKey,
}

pub type Result<T> = std::result::Result<T, GustoError>;
