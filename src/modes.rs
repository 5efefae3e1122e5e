//! Conversation modes and their static profiles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::llm::ToolDefinition;
use crate::tools::ToolKind;
use crate::view::{ChatMessage, MessageRole};

const BASE_INSTRUCTION: &str = "You are ChatGusto, a virtual assistant created by KidVenture. \
KidVenture is not just for kids, it is for everyone. Always add emojis to your answers.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Image,
    Search,
    Developer,
    #[serde(rename = "repository")]
    RepositoryAnalysis,
}

/// Everything a session and the view need to know about a mode
#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    pub mode: Mode,
    pub system_instruction: String,
    pub tools: Vec<ToolKind>,
    /// Built-in web search grounding instead of function tools
    pub web_search: bool,
    pub greeting: ChatMessage,
}

impl ModeProfile {
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolKind::definition).collect()
    }
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Normal,
        Mode::Image,
        Mode::Search,
        Mode::Developer,
        Mode::RepositoryAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Image => "image",
            Mode::Search => "search",
            Mode::Developer => "developer",
            Mode::RepositoryAnalysis => "repository",
        }
    }

    pub fn profile(&self) -> ModeProfile {
        let (instruction, greeting_id, greeting) = match self {
            Mode::Normal => (
                "You can chat and write code snippets. To create an image or search the web, \
                 please switch to the matching mode.",
                "init-normal",
                "Hi! I'm ChatGusto. I can chat or help with code. What are we doing today? 😊",
            ),
            Mode::Image => (
                "Your job is to create fantastic images! Use the available tool to generate an \
                 image based on what the user asks for.",
                "init-image",
                "I'm ready to create! 🖼️ What do you want me to draw?",
            ),
            Mode::Search => (
                "Your job is to find the most up-to-date information on the web. Use the search \
                 tool to answer the user's questions and always cite your sources. 🕵️‍♂️",
                "init-search",
                "Research time! 🕵️ What would you like to know? I can look up the latest \
                 information for you.",
            ),
            Mode::Developer => (
                "You are an expert programming assistant. Help with code, explain complex \
                 concepts and solve development problems. 💻",
                "init-developer",
                "Hi, dev! 💻 I'm ready to help with code, algorithms and whatever else you need.",
            ),
            Mode::RepositoryAnalysis => (
                "You are an expert at analyzing GitHub repositories. Your job is to extract key \
                 information. Use the 'list_repository_files' tool to see the repository \
                 structure. Then look for files such as README.md, Cargo.toml, package.json and \
                 LICENSE. Use 'get_file_content' to read them and extract the project name, the \
                 description, the author, the license, and the dependencies or a few example \
                 code snippets. Present a summary of these points. 🐙",
                "init-repository",
                "Hi! Give me a link to a GitHub repository and I'll do my best to analyze it for \
                 you. 🐙",
            ),
        };

        let tools = match self {
            Mode::Image => vec![ToolKind::CreateImage],
            Mode::RepositoryAnalysis => {
                vec![ToolKind::ListRepositoryFiles, ToolKind::GetFileContent]
            }
            Mode::Normal | Mode::Search | Mode::Developer => Vec::new(),
        };

        ModeProfile {
            mode: *self,
            system_instruction: format!("{} {}", BASE_INSTRUCTION, instruction),
            tools,
            web_search: matches!(self, Mode::Search),
            greeting: ChatMessage::new(greeting_id, MessageRole::Model, greeting),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown mode '{0}' (expected normal, image, search, developer or repository)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "chat" => Ok(Mode::Normal),
            "image" => Ok(Mode::Image),
            "search" => Ok(Mode::Search),
            "developer" | "dev" => Ok(Mode::Developer),
            "repository" | "repo" | "github" => Ok(Mode::RepositoryAnalysis),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}
