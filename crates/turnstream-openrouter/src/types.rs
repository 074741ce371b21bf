//! OpenRouter chat completions wire types.
//!
//! These mirror the OpenAI-compatible wire format and are not part of the
//! public API. Conversion to and from engine types happens in
//! [`convert`](crate::convert) and [`stream`](crate::stream).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Request types ──────────────────────────────────────────────────

/// Top-level request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transforms: Option<[&'static str; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
}

/// A single message in the conversation.
#[derive(Debug, Serialize)]
pub(crate) struct Message {
    pub role: &'static str,
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content: a plain string, or typed parts when images are attached.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

/// A tool call in an assistant message.
#[derive(Debug, Serialize)]
pub(crate) struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub function: FunctionCallRequest,
}

/// Function name and JSON-encoded arguments.
#[derive(Debug, Serialize)]
pub(crate) struct FunctionCallRequest {
    pub name: String,
    pub arguments: String,
}

/// Tool definition in function format.
#[derive(Debug, Serialize)]
pub(crate) struct Tool<'a> {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDef<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FunctionDef<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub parameters: &'a Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct Reasoning {
    pub effort: &'static str,
}

// ── Error types ────────────────────────────────────────────────────

/// Error response body, also delivered as a frame inside a stream.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: Option<Value>,
    pub message: String,
}

// ── Streaming types ────────────────────────────────────────────────

/// A single SSE chunk from the streaming API.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    pub content: Option<String>,
    #[serde(alias = "reasoning_content")]
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamToolCall {
    #[serde(default)]
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<StreamFunctionCall>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamFunctionCall {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_minimal() {
        let req = Request {
            model: "openai/gpt-4o-mini",
            messages: vec![Message {
                role: "user",
                content: Some(MessageContent::Text("Hello".into())),
                tool_calls: None,
                tool_call_id: None,
            }],
            stream: true,
            max_tokens: 8000,
            temperature: 0.7,
            top_p: 1.0,
            tools: None,
            transforms: None,
            reasoning: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert!(json.get("tools").is_none());
        assert!(json.get("transforms").is_none());
        assert!(json.get("reasoning").is_none());
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_content_parts_serialization() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "What is this?".into(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://example.com/cat.png".into(),
                },
            },
        ]);
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            serde_json::json!([
                {"type": "text", "text": "What is this?"},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}},
            ])
        );
    }

    #[test]
    fn test_chunk_deserialize_tool_call() {
        let json = serde_json::json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": ""}
                    }]
                },
                "finish_reason": null
            }]
        });
        let chunk: StreamChunk = serde_json::from_value(json).unwrap();
        let call = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("call_abc"));
        assert_eq!(
            call.function.as_ref().unwrap().name.as_deref(),
            Some("get_weather")
        );
    }

    #[test]
    fn test_chunk_reasoning_alias() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"reasoning_content":"hmm"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.reasoning.as_deref(), Some("hmm"));
    }

    #[test]
    fn test_chunk_missing_delta_and_index() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(chunk.choices[0].delta.content.is_none());

        let call: StreamToolCall =
            serde_json::from_str(r#"{"function":{"arguments":"{}"}}"#).unwrap();
        assert_eq!(call.index, 0);
    }

    #[test]
    fn test_error_response_deserialize() {
        let err: ErrorResponse = serde_json::from_str(
            r#"{"error":{"code":402,"message":"Insufficient credits"}}"#,
        )
        .unwrap();
        assert_eq!(err.error.message, "Insufficient credits");
        assert_eq!(err.error.code, Some(serde_json::json!(402)));
    }
}
