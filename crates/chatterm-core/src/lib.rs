pub mod config;
pub mod conversation;
pub mod message;
pub mod renderer;
pub mod service;

// Re-export main types for convenience
pub use config::{Config, ConfigError, DEFAULT_BASE_URL};
pub use conversation::{
    health_warning, ClientOptions, ConcurrencyPolicy, ConversationClient, SendOutcome, SendTask,
    Submission, ThinkDelay, FALLBACK_MESSAGE,
};
pub use message::{Message, MessageLog, Role};
pub use renderer::Renderer;
pub use service::{ChatError, ChatReply, ChatRequest, ChatService, HealthReport, HttpChatService};
