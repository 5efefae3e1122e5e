//! Application configuration (`config.toml`)

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{GustoError, Result};
use crate::modes::Mode;
use crate::playback::{ProcessSink, DEFAULT_PLAYER_COMMAND};
use crate::session::DEFAULT_THINKING_BUDGET;
use crate::tools::repository::{
    DEFAULT_API_BASE, DEFAULT_RAW_BASE, DEFAULT_USER_AGENT, MAX_FILE_CONTENT_CHARS,
};

const CONFIG_DIR: &str = "chatgusto";
const MAIN_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub models: ModelsConfig,
    pub repository: RepositoryConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Log to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub chat_model: String,
    pub image_model: String,
    pub speech_model: String,
    pub voice: String,
    pub thinking_budget: u32,
    pub image_aspect_ratio: String,
    pub image_mime_type: String,
    /// Override for the model API endpoint
    pub api_base: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-4.0-generate-001".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Puck".to_string(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            image_aspect_ratio: "1:1".to_string(),
            image_mime_type: "image/jpeg".to_string(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub api_base: String,
    pub raw_base: String,
    pub max_file_chars: usize,
    pub user_agent: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            max_file_chars: MAX_FILE_CONTENT_CHARS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub player_command: String,
    pub player_args: Vec<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player_command: DEFAULT_PLAYER_COMMAND.to_string(),
            player_args: ProcessSink::default_args(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub initial_mode: Mode,
    pub thinking: bool,
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| GustoError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| GustoError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GustoError::Config(format!("Failed to create config dir: {}", e)))?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GustoError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| GustoError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join(CONFIG_DIR).join(MAIN_CONFIG_FILE))
            .ok_or_else(|| GustoError::Config("Could not determine config directory".to_string()))
    }

    /// An explicitly requested file must exist; the default location may not
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(GustoError::ConfigNotFound {
                        path: path.to_path_buf(),
                    });
                }
                Ok((Self::load(path)?, path.to_path_buf()))
            }
            None => {
                let path = Self::default_path()?;
                let config = Self::load(&path)?;
                tracing::debug!(path = %path.display(), "Loaded configuration");
                Ok((config, path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.models.chat_model, "gemini-2.5-flash");
        assert_eq!(config.models.thinking_budget, 8192);
        assert_eq!(config.repository.max_file_chars, 8000);
        assert_eq!(config.audio.player_command, "aplay");
        assert_eq!(config.session.initial_mode, Mode::Normal);
        assert!(!config.session.thinking);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[models]
voice = "Kore"

[session]
initial_mode = "repository"
thinking = true
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.models.voice, "Kore");
        assert_eq!(config.models.chat_model, "gemini-2.5-flash");
        assert_eq!(config.session.initial_mode, Mode::RepositoryAnalysis);
        assert!(config.session.thinking);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.general.log_file = Some(PathBuf::from("/tmp/chatgusto.log"));
        config.repository.max_file_chars = 2000;

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[models\nvoice = ").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(GustoError::Config(_))));
    }

    #[test]
    fn test_resolve_explicit_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            AppConfig::resolve(Some(&missing)),
            Err(GustoError::ConfigNotFound { .. })
        ));
    }
}
