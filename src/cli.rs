use std::path::PathBuf;

use clap::Parser;

use chatgusto::modes::Mode;

/// ChatGusto: multi-mode Gemini chat in the terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "chatgusto")]
#[command(author = "KidVenture")]
#[command(version)]
#[command(about = "Chat, draw, search and inspect repositories with Gemini", long_about = None)]
pub struct Cli {
    /// API key for Google Gemini
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Starting mode (normal, image, search, developer, repository)
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Start with extended reasoning enabled
    #[arg(long, default_value_t = false)]
    pub thinking: bool,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
