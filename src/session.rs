//! Conversation sessions bound to one mode's instruction and tool set

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{
    Citation, ContentBlock, LLMError, LLMRequest, Message, Provider, Role, ThinkingConfig,
    ToolDefinition, ToolResult, ToolUse,
};
use crate::modes::ModeProfile;

pub const DEFAULT_THINKING_BUDGET: u32 = 8192;

#[derive(Debug, Clone)]
pub enum SessionInput {
    Text(String),
    /// All results of one tool round, sent together
    ToolResults(Vec<ToolResult>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub thinking: Option<ThinkingConfig>,
}

impl SendOptions {
    pub fn new(thinking: bool, budget_tokens: u32) -> Self {
        Self {
            thinking: thinking.then_some(ThinkingConfig { budget_tokens }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionResponse {
    pub text: String,
    pub tool_calls: Vec<ToolUse>,
    pub citations: Vec<Citation>,
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send(
        &self,
        input: SessionInput,
        options: SendOptions,
    ) -> Result<SessionResponse, LLMError>;
}

/// Builds a fresh session each time a mode is activated
pub trait SessionFactory: Send + Sync {
    fn create(&self, profile: &ModeProfile) -> Arc<dyn ChatSession>;
}

/// Session that keeps the model-side history and calls a `Provider`
pub struct ProviderSession {
    provider: Arc<dyn Provider>,
    model: String,
    system: String,
    tools: Vec<ToolDefinition>,
    web_search: bool,
    history: Mutex<Vec<Message>>,
}

impl ProviderSession {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, profile: &ModeProfile) -> Self {
        Self {
            provider,
            model: model.into(),
            system: profile.system_instruction.clone(),
            tools: profile.tool_definitions(),
            web_search: profile.web_search,
            history: Mutex::new(Vec::new()),
        }
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

#[async_trait]
impl ChatSession for ProviderSession {
    async fn send(
        &self,
        input: SessionInput,
        options: SendOptions,
    ) -> Result<SessionResponse, LLMError> {
        // Held for the whole exchange so history stays strictly alternating
        let mut history = self.history.lock().await;

        let follow_up = matches!(input, SessionInput::ToolResults(_));
        let message = match input {
            SessionInput::Text(text) => {
                drop_unanswered_calls(&mut history);
                Message::user(text)
            }
            SessionInput::ToolResults(results) => Message::tool_results(results),
        };
        history.push(message);

        let request = LLMRequest {
            model: self.model.clone(),
            system: Some(self.system.clone()),
            messages: history.clone(),
            tools: self.tools.clone(),
            web_search: self.web_search,
            thinking: options.thinking,
        };

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                // Drop the unanswered input so the next turn starts clean
                history.pop();
                if follow_up {
                    drop_failed_round(&mut history);
                }
                return Err(e);
            }
        };

        tracing::debug!(
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Session reply"
        );

        let reply = SessionResponse {
            text: response.text(),
            tool_calls: response.tool_uses(),
            citations: response.citations.clone(),
        };

        if !response.content.is_empty() {
            history.push(Message {
                role: Role::Assistant,
                content: response.content,
            });
        }

        Ok(reply)
    }
}

fn has_tool_calls(message: &Message) -> bool {
    message.role == Role::Assistant
        && message
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse(_)))
}

/// Remove a whole tool round whose results never got an answer.
///
/// A `functionCall` turn must be followed by its `functionResponse`, so the
/// call and the user text that prompted it go too.
fn drop_failed_round(history: &mut Vec<Message>) {
    if !history.last().is_some_and(has_tool_calls) {
        return;
    }
    history.pop();
    if history.last().is_some_and(|m| m.role == Role::User) {
        history.pop();
    }
}

/// Strip tool calls a previous turn chose not to run
fn drop_unanswered_calls(history: &mut Vec<Message>) {
    let Some(last) = history.last_mut() else {
        return;
    };
    if !has_tool_calls(last) {
        return;
    }
    last.content
        .retain(|block| !matches!(block, ContentBlock::ToolUse(_)));
    if last.content.is_empty() {
        history.pop();
    }
}

pub struct ProviderSessionFactory {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderSessionFactory {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl SessionFactory for ProviderSessionFactory {
    fn create(&self, profile: &ModeProfile) -> Arc<dyn ChatSession> {
        tracing::debug!(mode = %profile.mode, model = %self.model, "Creating session");
        Arc::new(ProviderSession::new(
            self.provider.clone(),
            self.model.clone(),
            profile,
        ))
    }
}
