//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the chat-completions wire format;
//! the default deployment targets DashScope's compatible mode.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ChatClient, ChatMessage, ChatResponse, LlmError, ToolCall};

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Build the request body. Parallel tool calls are always disabled so the
/// model proposes at most one action per turn.
fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    tools: Option<&[Value]>,
) -> Result<Value, LlmError> {
    let mut body = json!({
        "model": model,
        "messages": serde_json::to_value(messages)
            .map_err(|e| LlmError::MalformedResponse(format!("message encoding: {}", e)))?,
    });

    if let Some(tools) = tools {
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
            body["parallel_tool_calls"] = json!(false);
        }
    }

    Ok(body)
}

/// Extract content and tool calls from `choices[0].message`.
fn parse_response(data: &Value) -> Result<ChatResponse, LlmError> {
    let message = data["choices"]
        .get(0)
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::MalformedResponse("missing choices[0].message".to_string()))?;

    let content = message["content"].as_str().map(|s| s.to_string());

    let tool_calls = match message.get("tool_calls") {
        Some(raw) if !raw.is_null() => Some(
            serde_json::from_value::<Vec<ToolCall>>(raw.clone())
                .map_err(|e| LlmError::MalformedResponse(format!("tool_calls: {}", e)))?,
        ),
        _ => None,
    };

    Ok(ChatResponse {
        content,
        tool_calls,
    })
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatResponse, LlmError> {
        let body = build_request_body(model, messages, tools)?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await?;
        parse_response(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn request_body_disables_parallel_tool_calls() {
        let messages = vec![ChatMessage::user("hi")];
        let tools = vec![json!({"type": "function", "function": {"name": "get_weather"}})];
        let body = build_request_body("qwen-plus", &messages, Some(&tools)).expect("body");

        assert_eq!(body["model"], "qwen-plus");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn request_body_without_tools_has_no_tool_fields() {
        let messages = vec![ChatMessage::user("hi")];
        let body = build_request_body("qwen-plus", &messages, None).expect("body");
        assert!(body.get("tools").is_none());
        assert!(body.get("parallel_tool_calls").is_none());
    }

    #[test]
    fn parse_response_reads_content_and_tool_calls() {
        let data = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\":\"Berlin\"}"}
                    }]
                }
            }]
        });

        let parsed = parse_response(&data).expect("parse");
        assert_eq!(parsed.content, None);
        let calls = parsed.tool_calls.expect("tool calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "get_weather");
    }

    #[test]
    fn parse_response_rejects_empty_choices() {
        let data = json!({"choices": []});
        assert!(matches!(
            parse_response(&data),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn plain_answer_parses_without_tool_calls() {
        let data = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "hello"}
            }]
        });
        let parsed = parse_response(&data).expect("parse");
        assert_eq!(parsed.content.as_deref(), Some("hello"));
        assert!(parsed.tool_calls.is_none());
        // Role only matters on the request side; ensure the enum still maps.
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
    }
}
