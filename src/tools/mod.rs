//! Tool catalog and dispatch
//!
//! Every executor error is turned into a failure `ToolResult` here, so the
//! orchestration loop only ever sees results.

pub mod image;
pub mod repository;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::llm::{ToolDefinition, ToolResult, ToolUse};
use crate::modes::ModeProfile;
use crate::view::ViewState;

pub use image::{GeneratedImage, ImageGenerator};
pub use repository::{
    HttpFetch, HttpReply, ReqwestFetch, RepositoryClient, MAX_FILE_CONTENT_CHARS,
    TRUNCATION_MARKER,
};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown function: {0}")]
    UnknownTool(String),

    #[error("Function {0} is not available in this mode")]
    NotEnabled(String),

    #[error("Missing '{0}' parameter")]
    MissingArgument(&'static str),

    #[error("Invalid GitHub repository URL: {0}")]
    InvalidRepositoryUrl(String),

    #[error("{0}")]
    Upstream(String),

    #[error("The response was not a list of files. The path may point to a single file instead of a directory.")]
    NotADirectory,

    #[error("Could not determine the repository's default branch. It may be empty.")]
    NoDefaultBranch,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("The conversation was reset before the tool could run")]
    Superseded,
}

/// The fixed tool catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    CreateImage,
    ListRepositoryFiles,
    GetFileContent,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::CreateImage => "create_image",
            ToolKind::ListRepositoryFiles => "list_repository_files",
            ToolKind::GetFileContent => "get_file_content",
        }
    }

    /// Function declaration advertised to the model
    pub fn definition(&self) -> ToolDefinition {
        match self {
            ToolKind::CreateImage => ToolDefinition {
                name: self.name().to_string(),
                description: "Creates a high-quality image from a text description provided by \
                              the user. Use it whenever the user asks to create, generate or draw \
                              an image."
                    .to_string(),
                input_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "prompt": {
                            "type": "STRING",
                            "description": "A detailed description of the image to generate."
                        }
                    },
                    "required": ["prompt"]
                }),
            },
            ToolKind::ListRepositoryFiles => ToolDefinition {
                name: self.name().to_string(),
                description: "Lists the files and directories at a given path of a GitHub \
                              repository. Use it to explore the repository structure."
                    .to_string(),
                input_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "repoUrl": {
                            "type": "STRING",
                            "description": "Full URL of the GitHub repository (e.g. \"https://github.com/owner/repo\")."
                        },
                        "path": {
                            "type": "STRING",
                            "description": "Directory path inside the repository. Omit for the root."
                        }
                    },
                    "required": ["repoUrl"]
                }),
            },
            ToolKind::GetFileContent => ToolDefinition {
                name: self.name().to_string(),
                description: "Reads the content of a specific file from a GitHub repository."
                    .to_string(),
                input_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "repoUrl": {
                            "type": "STRING",
                            "description": "Full URL of the GitHub repository."
                        },
                        "filePath": {
                            "type": "STRING",
                            "description": "Full path of the file inside the repository (e.g. \"src/main.rs\")."
                        }
                    },
                    "required": ["repoUrl", "filePath"]
                }),
            },
        }
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_image" => Ok(ToolKind::CreateImage),
            "list_repository_files" => Ok(ToolKind::ListRepositoryFiles),
            "get_file_content" => Ok(ToolKind::GetFileContent),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Routes model tool calls to their executors
pub struct ToolDispatcher {
    images: Arc<dyn ImageGenerator>,
    repository: RepositoryClient,
    view: Arc<ViewState>,
}

impl ToolDispatcher {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        repository: RepositoryClient,
        view: Arc<ViewState>,
    ) -> Self {
        Self {
            images,
            repository,
            view,
        }
    }

    /// Run one call; never fails, errors become failure results.
    ///
    /// Anything the tool shows is written into the transcript of `epoch` only.
    pub async fn execute(&self, call: &ToolUse, profile: &ModeProfile, epoch: u64) -> ToolResult {
        tracing::info!(tool = %call.name, mode = %profile.mode, "Executing tool");
        match self.run(call, profile, epoch).await {
            Ok(content) => ToolResult::success(call, content),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(call, e.to_string())
            }
        }
    }

    async fn run(
        &self,
        call: &ToolUse,
        profile: &ModeProfile,
        epoch: u64,
    ) -> Result<serde_json::Value, ToolError> {
        let kind: ToolKind = call.name.parse()?;
        if !profile.tools.contains(&kind) {
            return Err(ToolError::NotEnabled(kind.to_string()));
        }

        match kind {
            ToolKind::CreateImage => {
                let prompt = call
                    .str_arg("prompt")
                    .ok_or(ToolError::MissingArgument("prompt"))?;
                image::create_image(self.images.as_ref(), &self.view, epoch, prompt).await
            }
            ToolKind::ListRepositoryFiles => {
                let repo_url = call
                    .str_arg("repoUrl")
                    .ok_or(ToolError::MissingArgument("repoUrl"))?;
                self.repository
                    .list_files(repo_url, call.str_arg("path"))
                    .await
            }
            ToolKind::GetFileContent => {
                let repo_url = call
                    .str_arg("repoUrl")
                    .ok_or(ToolError::MissingArgument("repoUrl"))?;
                let file_path = call
                    .str_arg("filePath")
                    .ok_or(ToolError::MissingArgument("filePath"))?;
                let content = self.repository.file_content(repo_url, file_path).await?;
                Ok(json!(content))
            }
        }
    }
}
