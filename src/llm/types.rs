use serde::{Deserialize, Serialize};

/// Unified LLM request - provider-agnostic
#[derive(Debug, Clone, Default)]
pub struct LLMRequest {
    /// Model identifier (e.g., "gemini-2.5-flash")
    pub model: String,

    /// System instruction for the session
    pub system: Option<String>,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Function declarations available for this request
    pub tools: Vec<ToolDefinition>,

    /// Enable the provider's built-in web search grounding
    pub web_search: bool,

    /// Extended reasoning budget, applied to this call only
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingConfig {
    pub budget_tokens: u32,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }

    /// All tool results of one round travel together in a single user message
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block within a message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain text
    Text(String),

    /// Tool use request (model → client)
    ToolUse(ToolUse),

    /// Tool result (client → model)
    ToolResult(ToolResult),
}

/// Tool definition for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Parameter schema in the provider's OBJECT/STRING notation
    pub input_schema: serde_json::Value,
}

/// Tool use request from the LLM
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    /// Locally assigned id for this invocation
    pub id: String,
    /// Tool name
    pub name: String,
    /// Input arguments (JSON object)
    pub input: serde_json::Value,
    /// Opaque reasoning signature that must be echoed back in history
    pub thought_signature: Option<String>,
}

impl ToolUse {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            input,
            thought_signature: None,
        }
    }

    /// String argument lookup; non-string values are treated as absent
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(|v| v.as_str())
    }
}

/// Tool result to send back
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// ID of the tool use this responds to
    pub tool_use_id: String,
    /// Name of the tool, which is how the model correlates responses
    pub name: String,
    pub outcome: ToolOutcome,
}

/// Exactly one of content or error is ever populated
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(String),
}

impl ToolResult {
    pub fn success(tool_use: &ToolUse, content: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            outcome: ToolOutcome::Success(content),
        }
    }

    pub fn failure(tool_use: &ToolUse, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use.id.clone(),
            name: tool_use.name.clone(),
            outcome: ToolOutcome::Failure(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Wire shape: `{success: true, content}` or `{success: false, error}`
    pub fn to_payload(&self) -> serde_json::Value {
        match &self.outcome {
            ToolOutcome::Success(content) => serde_json::json!({
                "success": true,
                "content": content,
            }),
            ToolOutcome::Failure(error) => serde_json::json!({
                "success": false,
                "error": error,
            }),
        }
    }
}

/// Source reference attached to a search-grounded response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of response
    EndTurn,
    /// Max tokens reached
    MaxTokens,
    /// Tool use requested
    ToolUse,
    /// Content filtered
    ContentFilter,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub thinking_tokens: Option<u32>,
}

/// Complete (non-streaming) LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub citations: Vec<Citation>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl LLMResponse {
    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_uses(&self) -> Vec<ToolUse> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tu) => Some(tu.clone()),
                _ => None,
            })
            .collect()
    }
}

/// LLM-specific errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u32 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Provider error: {status} - {message}")]
    ProviderError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Empty response: {message}")]
    EmptyResponse { message: String },
}
