//! Read-only repository inspection: directory listings and file contents

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::ToolError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_USER_AGENT: &str = concat!("chatgusto/", env!("CARGO_PKG_VERSION"));

/// Upper bound on characters of file content handed back to the model
pub const MAX_FILE_CONTENT_CHARS: usize = 8000;
pub const TRUNCATION_MARKER: &str = "\n\n... (content truncated)";

static REPO_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/([^/\s]+)/([^/\s?#]+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Extract `(owner, repo)` from anything containing `github.com/<owner>/<repo>`
pub fn parse_repo_url(url: &str) -> Result<RepoRef, ToolError> {
    let caps = REPO_URL_REGEX
        .captures(url)
        .ok_or_else(|| ToolError::InvalidRepositoryUrl(url.to_string()))?;
    let owner = caps[1].to_string();
    let repo = caps[2].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return Err(ToolError::InvalidRepositoryUrl(url.to_string()));
    }
    Ok(RepoRef { owner, repo })
}

/// Raw HTTP reply, decoupled from the client library
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Upstream `message` field if the body is a JSON error, else the status text
    fn upstream_message(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| self.status_text.clone())
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply, ToolError>;
}

/// reqwest-backed fetcher; the repository API rejects requests without a User-Agent
pub struct ReqwestFetch {
    client: Client,
    user_agent: String,
}

impl ReqwestFetch {
    pub fn new(user_agent: impl Into<String>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ToolError::Network(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<HttpReply, ToolError> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

pub struct RepositoryClient {
    fetch: Arc<dyn HttpFetch>,
    api_base: String,
    raw_base: String,
    max_file_chars: usize,
}

impl RepositoryClient {
    pub fn new(fetch: Arc<dyn HttpFetch>) -> Self {
        Self {
            fetch,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            max_file_chars: MAX_FILE_CONTENT_CHARS,
        }
    }

    pub fn with_bases(mut self, api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.raw_base = raw_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_file_chars(mut self, max_file_chars: usize) -> Self {
        self.max_file_chars = max_file_chars;
        self
    }

    /// `{files: [...], directories: [...]}` for `path` (root when absent)
    pub async fn list_files(
        &self,
        repo_url: &str,
        path: Option<&str>,
    ) -> Result<serde_json::Value, ToolError> {
        let RepoRef { owner, repo } = parse_repo_url(repo_url)?;
        let path = path.unwrap_or("").trim_start_matches('/');
        let url = format!("{}/repos/{}/{}/contents/{}", self.api_base, owner, repo, path);

        let reply = self.fetch.get(&url).await?;
        if !reply.is_success() {
            return Err(ToolError::Upstream(format!(
                "Repository API request failed: {}",
                reply.upstream_message()
            )));
        }

        let entries: Vec<ContentEntry> =
            serde_json::from_str(&reply.body).map_err(|_| ToolError::NotADirectory)?;

        let mut files = Vec::new();
        let mut directories = Vec::new();
        for entry in entries {
            match entry.kind.as_str() {
                "file" => files.push(entry.path),
                "dir" => directories.push(entry.path),
                _ => {}
            }
        }

        Ok(json!({ "files": files, "directories": directories }))
    }

    /// Raw file text from the default branch, capped at `max_file_chars`
    pub async fn file_content(&self, repo_url: &str, file_path: &str) -> Result<String, ToolError> {
        let RepoRef { owner, repo } = parse_repo_url(repo_url)?;

        let info_url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let reply = self.fetch.get(&info_url).await?;
        if !reply.is_success() {
            return Err(ToolError::Upstream(format!(
                "Failed to fetch repository information: {}",
                reply.upstream_message()
            )));
        }

        let info: RepoInfo = serde_json::from_str(&reply.body)
            .map_err(|e| ToolError::Upstream(format!("Malformed repository information: {}", e)))?;
        let branch = match info.default_branch {
            Some(b) if !b.is_empty() => b,
            _ => return Err(ToolError::NoDefaultBranch),
        };

        let raw_url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            owner,
            repo,
            branch,
            file_path.trim_start_matches('/')
        );
        let reply = self.fetch.get(&raw_url).await?;
        if !reply.is_success() {
            return Err(ToolError::Upstream(format!(
                "Failed to fetch file content: {}",
                reply.status_text
            )));
        }

        Ok(truncate_content(reply.body, self.max_file_chars))
    }
}

/// Cut to `max_chars` characters (not bytes) and append the marker
pub fn truncate_content(content: String, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut truncated = content[..byte_idx].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => content,
    }
}
