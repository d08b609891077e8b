use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{ChatError, ChatReply, ChatRequest, ChatService, HealthReport};

/// `ChatService` backed by the JSON-over-HTTP chat server.
#[derive(Clone)]
pub struct HttpChatService {
    client: Client,
    base_url: String,
}

impl HttpChatService {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Like `new`, but every request gives up after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, ChatError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let url = format!("{}/chat", self.base_url);
        debug!(%url, chars = request.message.chars().count(), "posting chat message");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!("HTTP error! status: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| ChatError::MalformedResponse(e.to_string()))
    }

    async fn health_check(&self) -> Result<HealthReport, ChatError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!("health check returned {}", status)));
        }

        // Any 2xx is healthy, even when the body isn't the JSON we know about
        let report = response.json::<HealthReport>().await.unwrap_or_default();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service = HttpChatService::new("http://localhost:8000/");
        assert_eq!(service.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_send_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({ "message": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "hi",
                "processing_time": 0.42,
                "model_used": "gpt-4o-mini"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let reply = service.send(&ChatRequest::new("hello")).await.unwrap();

        assert_eq!(reply.response, "hi");
        assert_eq!(reply.processing_time, Some(0.42));
        assert_eq!(reply.model_used.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_send_body_carries_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        service.send(&ChatRequest::new("hello")).await.unwrap();

        let received: Vec<Request> = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_send_non_2xx_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "detail": "An error occurred while processing your request"
            })))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let err = service.send(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_send_missing_response_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "hi" })))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let err = service.send(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_send_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let err = service.send(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_send_unreachable_is_transport_failure() {
        // Port 9 (discard) on localhost is essentially never listening
        let service = HttpChatService::new("http://127.0.0.1:9");
        let err = service.send(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "late" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let service =
            HttpChatService::with_timeout(&server.uri(), Some(Duration::from_millis(100))).unwrap();
        let err = service.send(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_health_check_accepts_any_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let report = service.health_check().await.unwrap();
        assert_eq!(report, HealthReport::default());
    }

    #[tokio::test]
    async fn test_health_check_reads_status_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "healthy",
                "timestamp": "2024-01-01T00:00:00",
                "openai": "missing"
            })))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        let report = service.health_check().await.unwrap();
        assert_eq!(report.status.as_deref(), Some("healthy"));
        assert_eq!(report.openai.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn test_health_check_error_status_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = HttpChatService::new(&server.uri());
        assert!(service.health_check().await.is_err());
    }
}
