//! Conversion between engine types and OpenRouter wire types.

use turnstream::chat::{ChatMessage, ChatRole, ContentBlock};
use turnstream::delta::FinishReason;
use turnstream::{ChatRequest, EngineError};

use crate::config::OpenRouterConfig;
use crate::types::{
    ContentPart, ErrorResponse, FunctionCallRequest, FunctionDef, ImageUrl, Message,
    MessageContent, Reasoning, Request, Tool, ToolCallRequest,
};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 1.0;

// ── Request conversion ───────────────────────────────────────────────

/// Build a streaming request body from a [`ChatRequest`] and provider config.
pub(crate) fn build_request<'a>(
    request: &'a ChatRequest,
    config: &'a OpenRouterConfig,
) -> Request<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(Message {
            role: "system",
            content: Some(MessageContent::Text(system.clone())),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    messages.extend(request.messages.iter().map(convert_message));

    let tools = (!request.tools.is_empty()).then(|| {
        request
            .tools
            .iter()
            .map(|t| Tool {
                tool_type: "function",
                function: FunctionDef {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect()
    });

    let model = request.model.as_deref().unwrap_or(&config.model);
    Request {
        model,
        messages,
        stream: true,
        max_tokens: request
            .max_tokens
            .unwrap_or_else(|| default_max_tokens(model)),
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        top_p: request.top_p.unwrap_or(DEFAULT_TOP_P),
        tools,
        transforms: config.use_transforms.then_some(["middle-out"]),
        reasoning: request.reasoning.then_some(Reasoning { effort: "high" }),
    }
}

/// Output token cap used when the request does not set one.
pub(crate) fn default_max_tokens(model: &str) -> u32 {
    let model = model.to_ascii_lowercase();
    if model.contains("claude-sonnet-4") || model.contains("claude-opus-4") {
        4000
    } else if model.contains("claude") {
        8000
    } else if model.contains("gpt-4") {
        4000
    } else {
        8000
    }
}

fn convert_message(msg: &ChatMessage) -> Message {
    match msg.role {
        ChatRole::Assistant => {
            let tool_calls: Vec<_> = msg
                .tool_calls()
                .map(|call| ToolCallRequest {
                    id: call.id.clone(),
                    call_type: "function",
                    function: FunctionCallRequest {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect();
            Message {
                role: "assistant",
                content: msg.text_content().map(MessageContent::Text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }
        }
        ChatRole::Tool => {
            let (content, tool_call_id) = match msg.tool_result_block() {
                Some(result) => (result.content.clone(), Some(result.tool_call_id.clone())),
                None => (msg.text_content().unwrap_or_default(), None),
            };
            Message {
                role: "tool",
                content: Some(MessageContent::Text(content)),
                tool_calls: None,
                tool_call_id,
            }
        }
        role => Message {
            role: role.as_str(),
            content: Some(convert_user_content(msg)),
            tool_calls: None,
            tool_call_id: None,
        },
    }
}

/// A plain string unless images are attached, in which case text and
/// images become ordered content parts.
fn convert_user_content(msg: &ChatMessage) -> MessageContent {
    if !msg.has_images() {
        return MessageContent::Text(text_or_empty(&msg.content));
    }
    let parts = msg
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(ContentPart::Text { text: text.clone() }),
            ContentBlock::Image { url } => Some(ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            }),
            _ => None,
        })
        .collect();
    MessageContent::Parts(parts)
}

fn text_or_empty(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ── Stream conversion ────────────────────────────────────────────────

/// Map a wire `finish_reason` to [`FinishReason`].
pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "tool_calls" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        other => {
            tracing::warn!(finish_reason = other, "Unexpected OpenRouter finish_reason");
            FinishReason::Other(other.to_string())
        }
    }
}

// ── Error conversion ─────────────────────────────────────────────────

/// Convert an HTTP status and error body into an [`EngineError`].
pub(crate) fn convert_error(status: http::StatusCode, body: &str, model: &str) -> EngineError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);

    match status.as_u16() {
        401 | 403 => EngineError::Auth(message),
        402 => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("credit") || lower.contains("balance") {
                EngineError::InsufficientBalance(format!(
                    "Insufficient credits for {model}. Please add credits to your OpenRouter account."
                ))
            } else {
                EngineError::InsufficientBalance(format!(
                    "Payment required for {model}. Please check your OpenRouter billing."
                ))
            }
        }
        429 => EngineError::RateLimited(format!(
            "Rate limit exceeded for {model}. Please try again later."
        )),
        404 => EngineError::ModelNotFound(format!("Model {model} not found or not available.")),
        400 => EngineError::InvalidRequest(message),
        code => EngineError::Http {
            status: Some(status),
            message,
            retryable: matches!(code, 500 | 502 | 503),
        },
    }
}

/// Convert a transport-level failure into an [`EngineError`].
pub(crate) fn convert_transport_error(err: &reqwest::Error, timeout_ms: u64) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout {
            elapsed_ms: timeout_ms,
        }
    } else {
        EngineError::Http {
            status: err
                .status()
                .and_then(|s| http::StatusCode::from_u16(s.as_u16()).ok()),
            message: err.to_string(),
            retryable: err.is_connect() || err.is_body(),
        }
    }
}
