//! Send lifecycle for a single conversation
//!
//! `ConversationClient` sits between raw user input and the remote chat
//! service. A send goes through:
//!
//! 1. validation (blank input is dropped without a trace)
//! 2. optimistic echo of the user message and loading on
//! 3. a short randomized "thinking" delay
//! 4. one call to the chat service
//! 5. the reply, or the fixed fallback text on any failure, and loading off
//!
//! Steps 1-2 happen synchronously in [`ConversationClient::submit`]; 3-5 run
//! in a spawned [`SendTask`] that can be cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::message::Message;
use crate::renderer::Renderer;
use crate::service::{ChatError, ChatRequest, ChatService};

/// Shown in place of a reply whenever the chat call fails, whatever the reason.
pub const FALLBACK_MESSAGE: &str = "I'm sorry, but I'm having trouble connecting to my brain right now. Please try again in a moment, or check if the backend server is running.";

/// Text of the one-time warning appended when the startup health check fails.
pub fn health_warning(backend: &str) -> String {
    format!(
        "⚠️ Backend server is not responding. Please make sure the chat server is running on {}",
        backend
    )
}

/// What to do with a submit that arrives while a reply is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Refuse it; at most one call is ever outstanding.
    #[default]
    Reject,
    /// Let it through. Replies may then arrive out of send order.
    Allow,
}

/// Bounds of the synthetic pause before the chat call, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for ThinkDelay {
    fn default() -> Self {
        Self { min_ms: 500, max_ms: 1500 }
    }
}

impl ThinkDelay {
    pub fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    pub fn none() -> Self {
        Self::fixed(0)
    }

    /// Pick a delay uniformly from `[min_ms, max_ms]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub think_delay: ThinkDelay,
    pub concurrency: ConcurrencyPolicy,
    /// How the backend is named in the health warning
    pub backend_label: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            think_delay: ThinkDelay::default(),
            concurrency: ConcurrencyPolicy::default(),
            backend_label: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            think_delay: config.think_delay,
            concurrency: config.concurrency,
            backend_label: config.service_url().to_string(),
        }
    }
}

/// How a dispatched send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Replied,
    FellBack,
    Cancelled,
}

/// Result of [`ConversationClient::submit`].
#[derive(Debug)]
pub enum Submission {
    /// Input was blank after trimming; nothing happened.
    Empty,
    /// A reply is still pending and the policy refuses overlapping sends.
    Busy,
    /// The message was echoed and the rest of the lifecycle is running.
    Dispatched(SendTask),
}

impl Submission {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Submission::Dispatched(_))
    }
}

/// Handle to one in-flight send.
///
/// Dropping it detaches the task; the reply is still rendered.
#[derive(Debug)]
pub struct SendTask {
    handle: JoinHandle<SendOutcome>,
    cancel: CancellationToken,
}

impl SendTask {
    /// Stop waiting for the reply. Nothing more is rendered for this send
    /// except the loading indicator going off.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> SendOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "send task ended abnormally");
                SendOutcome::Cancelled
            }
        }
    }
}

struct Inner<S, R> {
    service: S,
    renderer: R,
    options: ClientOptions,
    in_flight: AtomicUsize,
}

/// Mediates between user input, the message log and the chat service.
pub struct ConversationClient<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for ConversationClient<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, R> ConversationClient<S, R>
where
    S: ChatService + 'static,
    R: Renderer,
{
    pub fn new(service: S, renderer: R, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                renderer,
                options,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// True while at least one chat call is outstanding.
    pub fn is_pending(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// One GET against the health endpoint. On failure a single warning is
    /// appended to the log; sending stays possible either way.
    pub async fn probe_health(&self) -> bool {
        match self.inner.service.health_check().await {
            Ok(report) => {
                info!(status = ?report.status, "backend connection established");
                if report.openai.as_deref() == Some("missing") {
                    warn!("backend reports its model API key is missing");
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "backend not available");
                let warning = health_warning(&self.inner.options.backend_label);
                self.inner.renderer.append_message(Message::assistant(warning));
                false
            }
        }
    }

    /// Start sending `raw`. Must be called from within a tokio runtime.
    ///
    /// On `Dispatched` the user message has already been echoed and the
    /// loading indicator is on; the caller should clear its input buffer.
    pub fn submit(&self, raw: &str) -> Submission {
        let Some(echo) = Message::from_input(raw) else {
            return Submission::Empty;
        };

        let previously = match self.inner.options.concurrency {
            ConcurrencyPolicy::Reject => {
                match self
                    .inner
                    .in_flight
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(prev) => prev,
                    Err(_) => {
                        debug!("submit rejected, reply still pending");
                        return Submission::Busy;
                    }
                }
            }
            ConcurrencyPolicy::Allow => self.inner.in_flight.fetch_add(1, Ordering::SeqCst),
        };

        let message = echo.text().to_string();
        self.inner.renderer.append_message(echo);
        if previously == 0 {
            self.inner.renderer.set_loading(true);
        }
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };

        let delay = self.inner.options.think_delay.sample(&mut rand::thread_rng());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::clone(&self.inner);

        info!(
            chars = message.chars().count(),
            delay_ms = delay.as_millis() as u64,
            "dispatching message"
        );

        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.deliver(message, delay, token).await
        });

        Submission::Dispatched(SendTask { handle, cancel })
    }
}

impl<S, R> Inner<S, R>
where
    S: ChatService,
    R: Renderer,
{
    async fn deliver(
        &self,
        message: String,
        delay: Duration,
        cancel: CancellationToken,
    ) -> SendOutcome {
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("send cancelled before dispatch");
                    return SendOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let request = ChatRequest::new(message);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("send cancelled while waiting for reply");
                return SendOutcome::Cancelled;
            }
            result = self.service.send(&request) => result,
        };

        match result.and_then(|reply| {
            if reply.response.trim().is_empty() {
                Err(ChatError::MalformedResponse("empty response".to_string()))
            } else {
                Ok(reply)
            }
        }) {
            Ok(reply) => {
                if let Some(seconds) = reply.processing_time {
                    debug!("Response generated in {}s", seconds);
                }
                self.renderer
                    .append_message(Message::assistant_from(reply.response, reply.model_used));
                SendOutcome::Replied
            }
            Err(e) => {
                warn!(error = %e, "chat request failed, showing fallback");
                self.renderer.append_message(Message::assistant(FALLBACK_MESSAGE));
                SendOutcome::FellBack
            }
        }
    }
}

/// Keeps the in-flight count honest however the send task ends, and turns
/// loading off when the last outstanding send finishes.
struct InFlightGuard<S, R: Renderer> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R: Renderer> Drop for InFlightGuard<S, R> {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.renderer.set_loading(false);
        }
    }
}
