pub mod http;

pub use http::HttpChatService;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything that can go wrong talking to the chat service.
///
/// Callers in the send path never show these to the user; they collapse to
/// the fallback message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Network unreachable, timeout or non-2xx status
    #[error("transport failure: {0}")]
    Transport(String),

    /// 2xx status but the body was not the expected JSON
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub timestamp: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(message, Utc::now())
    }

    /// Timestamp rendered as ISO-8601 with millisecond precision and a `Z` suffix.
    pub fn at(message: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp: when.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Successful `/chat` response. Only `response` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl ChatReply {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            processing_time: None,
            timestamp: None,
            model_used: None,
        }
    }
}

/// Whatever the `/health` endpoint chose to say about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub openai: Option<String>,
}

/// Remote chat backend capability injected into the conversation client.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ChatError>;

    /// `Ok` for any 2xx answer from the health endpoint.
    async fn health_check(&self) -> Result<HealthReport, ChatError>;
}

#[async_trait]
impl<T: ChatService + ?Sized> ChatService for Arc<T> {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        (**self).send(request).await
    }

    async fn health_check(&self) -> Result<HealthReport, ChatError> {
        (**self).health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_timestamp_is_iso8601_millis() {
        let when = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let request = ChatRequest::at("hello", when);
        assert_eq!(request.timestamp, "2024-03-09T14:05:07.000Z");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["timestamp"], "2024-03-09T14:05:07.000Z");
    }

    #[test]
    fn test_reply_requires_only_response() {
        let reply: ChatReply = serde_json::from_str(r#"{"response": "hi"}"#).unwrap();
        assert_eq!(reply, ChatReply::text("hi"));

        let missing = serde_json::from_str::<ChatReply>(r#"{"processing_time": 0.2}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_reply_keeps_server_metadata() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"response": "hi", "processing_time": 1.234, "timestamp": "2024-01-01T00:00:00", "model_used": "gpt-4o-mini"}"#,
        )
        .unwrap();
        assert_eq!(reply.processing_time, Some(1.234));
        assert_eq!(reply.model_used.as_deref(), Some("gpt-4o-mini"));
    }
}
