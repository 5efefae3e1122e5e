//! Google Gemini chat provider with function calling and search grounding

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::provider::Provider;
use super::types::{
    Citation, ContentBlock, LLMError, LLMRequest, LLMResponse, Role, StopReason, ToolUse, Usage,
};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings shared by the chat, image and speech clients
#[derive(Clone)]
pub struct GeminiApi {
    api_key: String,
    base_url: String,
    http_client: Client,
}

impl GeminiApi {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LLMError> {
        Self::with_base_url(api_key, GEMINI_API_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, LLMError> {
        // Connect timeout only: model calls themselves are never cut short
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| LLMError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Request URL; the key travels in a header so it never shows up in errors
    pub(crate) fn endpoint(&self, model: &str, action: &str) -> String {
        format!("{}/{}:{}", self.base_url, model, action)
    }

    fn request(&self, model: &str, action: &str, body: &serde_json::Value) -> RequestBuilder {
        self.http_client
            .post(self.endpoint(model, action))
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
    }

    /// POST a JSON body and decode the JSON reply, mapping HTTP failures
    pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        model: &str,
        action: &str,
        body: &serde_json::Value,
    ) -> Result<T, LLMError> {
        let response = self
            .request(model, action, body)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_response(status.as_u16(), &text));
        }

        response.json().await.map_err(|e| LLMError::ParseError {
            message: e.without_url().to_string(),
        })
    }
}

/// Google Gemini provider
pub struct GeminiProvider {
    api: GeminiApi,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api: GeminiApi, default_model: impl Into<String>) -> Self {
        Self {
            api,
            default_model: default_model.into(),
        }
    }

    fn build_request_body(&self, request: &LLMRequest) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = Vec::new();

        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };

            let parts: Vec<serde_json::Value> = m
                .content
                .iter()
                .map(|c| match c {
                    ContentBlock::Text(text) => json!({ "text": text }),
                    ContentBlock::ToolUse(tool_use) => {
                        let mut part = json!({
                            "functionCall": {
                                "name": tool_use.name,
                                "args": tool_use.input
                            }
                        });
                        if let Some(signature) = &tool_use.thought_signature {
                            part["thoughtSignature"] = json!(signature);
                        }
                        part
                    }
                    ContentBlock::ToolResult(result) => json!({
                        "functionResponse": {
                            "name": result.name,
                            "response": result.to_payload()
                        }
                    }),
                })
                .collect();

            if !parts.is_empty() {
                contents.push(json!({
                    "role": role,
                    "parts": parts
                }));
            }
        }

        let mut body = json!({
            "contents": contents,
        });

        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({
                "parts": [{ "text": system }]
            });
        }

        if let Some(thinking) = request.thinking {
            body["generationConfig"] = json!({
                "thinkingConfig": { "thinkingBudget": thinking.budget_tokens }
            });
        }

        let mut tools: Vec<serde_json::Value> = Vec::new();

        if !request.tools.is_empty() {
            let function_declarations: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema
                    })
                })
                .collect();
            tools.push(json!({ "functionDeclarations": function_declarations }));
        }

        if request.web_search {
            tools.push(json!({ "googleSearch": {} }));
        }

        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        body
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let body = self.build_request_body(&request);
        tracing::debug!(
            model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            web_search = request.web_search,
            thinking = request.thinking.is_some(),
            "Sending generateContent request"
        );

        let resp: GeminiResponse = self.api.post_json(model, "generateContent", &body).await?;
        let response = convert_response(resp, model);

        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Received generateContent response"
        );

        Ok(response)
    }
}

pub(crate) fn parse_error_response(status: u16, body: &str) -> LLMError {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &json["error"];
        let message = error["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let status_code = error["code"].as_u64().unwrap_or(status as u64) as u16;

        match status {
            401 | 403 => LLMError::AuthError { message },
            429 => LLMError::RateLimit {
                retry_after_secs: 60,
            },
            400 => {
                if message.contains("API key") {
                    LLMError::AuthError { message }
                } else {
                    LLMError::InvalidRequest { message }
                }
            }
            404 => LLMError::ModelNotFound { model: message },
            _ => LLMError::ProviderError {
                status: status_code,
                message,
            },
        }
    } else {
        LLMError::ProviderError {
            status,
            message: body.to_string(),
        }
    }
}

fn convert_response(resp: GeminiResponse, model: &str) -> LLMResponse {
    let candidate = resp.candidates.into_iter().next().unwrap_or_default();
    let mut content: Vec<ContentBlock> = Vec::new();

    if let Some(parts) = candidate.content.and_then(|c| c.parts) {
        for part in parts {
            if let Some(text) = part.text {
                if !part.thought {
                    content.push(ContentBlock::Text(text));
                }
            }
            if let Some(function_call) = part.function_call {
                let mut tool_use = ToolUse::new(
                    function_call.name,
                    function_call.args.unwrap_or_else(|| json!({})),
                );
                tool_use.thought_signature = part.thought_signature;
                content.push(ContentBlock::ToolUse(tool_use));
            }
        }
    }

    let citations = candidate
        .grounding_metadata
        .map(|g| {
            g.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(|web| {
                    let url = web.uri?;
                    let title = web.title.unwrap_or_else(|| url.clone());
                    Some(Citation { title, url })
                })
                .collect()
        })
        .unwrap_or_default();

    let has_tool_use = content
        .iter()
        .any(|c| matches!(c, ContentBlock::ToolUse(_)));

    let stop_reason = match candidate.finish_reason.as_deref() {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => StopReason::ContentFilter,
        _ if has_tool_use => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    let usage = resp.usage_metadata.map_or(Usage::default(), |u| Usage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
        thinking_tokens: u.thoughts_token_count,
    });

    LLMResponse {
        id: resp
            .response_id
            .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4())),
        model: model.to_string(),
        content,
        citations,
        stop_reason,
        usage,
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    response_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<GeminiFunctionCall>,
    thought_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GeminiGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GeminiGroundingChunk {
    web: Option<GeminiWebSource>,
}

#[derive(Debug, Deserialize)]
struct GeminiWebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    thoughts_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ThinkingConfig, ToolDefinition, ToolResult};
    use pretty_assertions::assert_eq;

    fn provider() -> GeminiProvider {
        let api = GeminiApi::new("test-key").unwrap();
        GeminiProvider::new(api, "gemini-2.5-flash")
    }

    #[test]
    fn test_key_sent_as_header_not_in_url() {
        let api = GeminiApi::with_base_url("secret-key", "http://localhost:9/models/").unwrap();
        assert_eq!(
            api.endpoint("gemini-2.5-flash", "generateContent"),
            "http://localhost:9/models/gemini-2.5-flash:generateContent"
        );

        let request = api
            .request("gemini-2.5-flash", "generateContent", &json!({}))
            .build()
            .unwrap();
        assert!(!request.url().as_str().contains("secret-key"));
        assert_eq!(request.headers()[API_KEY_HEADER], "secret-key");
    }

    #[tokio::test]
    async fn test_network_error_does_not_leak_key() {
        // Nothing listens on the discard port
        let api = GeminiApi::with_base_url("secret-key", "http://127.0.0.1:9/models").unwrap();
        let err = api
            .post_json::<serde_json::Value>("gemini-2.5-flash", "generateContent", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::NetworkError { .. }));
        assert!(!err.to_string().contains("secret-key"));
        assert!(!err.to_string().contains("127.0.0.1"));
    }

    #[test]
    fn test_request_body_system_tools_and_thinking() {
        let request = LLMRequest {
            model: String::new(),
            system: Some("Be helpful".to_string()),
            messages: vec![Message::user("Hi")],
            tools: vec![ToolDefinition {
                name: "create_image".to_string(),
                description: "Draw".to_string(),
                input_schema: json!({"type": "OBJECT"}),
            }],
            web_search: false,
            thinking: Some(ThinkingConfig {
                budget_tokens: 8192,
            }),
        };

        let body = provider().build_request_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be helpful");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "create_image"
        );
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            8192
        );
    }

    #[test]
    fn test_request_body_web_search_without_functions() {
        let request = LLMRequest {
            messages: vec![Message::user("news?")],
            web_search: true,
            ..Default::default()
        };

        let body = provider().build_request_body(&request);
        assert_eq!(body["tools"], json!([{ "googleSearch": {} }]));
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_request_body_tool_round_trip_history() {
        let mut call = ToolUse::new("list_repository_files", json!({"repoUrl": "x"}));
        call.thought_signature = Some("sig-1".to_string());
        let result = ToolResult::failure(&call, "invalid");

        let request = LLMRequest {
            messages: vec![
                Message::user("look at x"),
                Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::ToolUse(call)],
                },
                Message::tool_results(vec![result]),
            ],
            ..Default::default()
        };

        let body = provider().build_request_body(&request);
        let model_part = &body["contents"][1]["parts"][0];
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(model_part["functionCall"]["name"], "list_repository_files");
        assert_eq!(model_part["thoughtSignature"], "sig-1");

        let response_part = &body["contents"][2]["parts"][0]["functionResponse"];
        assert_eq!(body["contents"][2]["role"], "user");
        assert_eq!(response_part["name"], "list_repository_files");
        assert_eq!(
            response_part["response"],
            json!({"success": false, "error": "invalid"})
        );
    }

    #[test]
    fn test_parse_error_response_auth() {
        let body = r#"{"error":{"code":403,"message":"API key not valid"}}"#;
        let err = parse_error_response(403, body);
        assert!(matches!(err, LLMError::AuthError { .. }));
    }

    #[test]
    fn test_parse_error_response_rate_limit() {
        let body = r#"{"error":{"code":429,"message":"Rate limit exceeded"}}"#;
        let err = parse_error_response(429, body);
        assert!(matches!(err, LLMError::RateLimit { .. }));
    }

    #[test]
    fn test_parse_error_response_non_json() {
        let err = parse_error_response(502, "Bad Gateway");
        assert!(matches!(err, LLMError::ProviderError { status: 502, .. }));
    }

    #[test]
    fn test_convert_response_text_skips_thoughts() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "pondering...", "thought": true},
                    {"text": "Hello, world!"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5},
            "responseId": "test-123"
        }))
        .unwrap();

        let response = convert_response(resp, "gemini-2.5-flash");
        assert_eq!(response.id, "test-123");
        assert_eq!(response.model, "gemini-2.5-flash");
        assert_eq!(response.text(), "Hello, world!");
        assert!(matches!(response.stop_reason, StopReason::EndTurn));
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_convert_response_function_calls_in_order() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "list_repository_files", "args": {"repoUrl": "u"}},
                     "thoughtSignature": "abc"},
                    {"functionCall": {"name": "get_file_content"}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let response = convert_response(resp, "gemini-2.5-flash");
        assert!(matches!(response.stop_reason, StopReason::ToolUse));
        let calls = response.tool_uses();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "list_repository_files");
        assert_eq!(calls[0].str_arg("repoUrl"), Some("u"));
        assert_eq!(calls[0].thought_signature.as_deref(), Some("abc"));
        assert_eq!(calls[1].name, "get_file_content");
        assert_eq!(calls[1].input, json!({}));
    }

    #[test]
    fn test_convert_response_grounding_citations() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "It rained."}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://a.example", "title": "A"}},
                    {"web": {"uri": "https://b.example"}},
                    {"retrievedContext": {}}
                ]}
            }]
        }))
        .unwrap();

        let response = convert_response(resp, "m");
        assert_eq!(
            response.citations,
            vec![
                Citation {
                    title: "A".to_string(),
                    url: "https://a.example".to_string()
                },
                Citation {
                    title: "https://b.example".to_string(),
                    url: "https://b.example".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_convert_response_without_candidates() {
        let resp: GeminiResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let response = convert_response(resp, "m");
        assert!(response.content.is_empty());
        assert!(response.citations.is_empty());
    }
}
