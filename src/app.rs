use std::sync::Arc;

use chatterm_core::{
    ChatService, ConcurrencyPolicy, ConversationClient, MessageLog, SendTask, Submission,
};
use tracing::{debug, info};
use unicode_width::UnicodeWidthStr;

use crate::renderer::{ChannelRenderer, UiUpdate};

pub type Client = ConversationClient<Arc<dyn ChatService>, ChannelRenderer>;

/// The input box grows with its content up to this many rows
pub const MAX_INPUT_LINES: u16 = 5;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub log: MessageLog,
    pub loading: bool,
    pub backend_healthy: Option<bool>,
    pub status_note: Option<String>,

    // Input state
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat viewport (updated during render)
    pub chat_scroll: u16,
    pub follow_tail: bool,
    pub chat_height: u16,
    pub chat_total_lines: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Sending
    pub client: Client,
    pub send_tasks: Vec<SendTask>,
    pub base_url: String,
}

impl App {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            log: MessageLog::new(),
            loading: false,
            backend_healthy: None,
            status_note: None,

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            follow_tail: true,
            chat_height: 0,
            chat_total_lines: 0,

            animation_frame: 0,

            client,
            send_tasks: Vec::new(),
            base_url: base_url.into(),
        }
    }

    pub fn apply_update(&mut self, update: UiUpdate) {
        match update {
            UiUpdate::Append(message) => {
                self.log.append(message);
                // Newest entry comes into view
                self.follow_tail = true;
            }
            UiUpdate::Loading(active) => {
                self.loading = active;
                self.animation_frame = 0;
                if !active {
                    self.status_note = None;
                }
            }
        }
    }

    /// Whether Enter currently sends. Under the reject policy the send
    /// control is disabled while a reply is pending.
    pub fn send_enabled(&self) -> bool {
        !self.loading || self.client.options().concurrency == ConcurrencyPolicy::Allow
    }

    pub fn submit_input(&mut self) {
        match self.client.submit(&self.input) {
            Submission::Empty => {}
            Submission::Busy => {
                self.status_note =
                    Some("Still waiting for a reply (Esc to stop waiting)".to_string());
            }
            Submission::Dispatched(task) => {
                self.input.clear();
                self.cursor = 0;
                self.status_note = None;
                self.follow_tail = true;
                self.send_tasks.push(task);
            }
        }
    }

    /// Stop waiting for every outstanding reply. Returns false when there
    /// was nothing to cancel.
    pub fn cancel_pending(&mut self) -> bool {
        let live: Vec<&SendTask> = self.send_tasks.iter().filter(|t| !t.is_finished()).collect();
        if live.is_empty() {
            return false;
        }
        info!(count = live.len(), "cancelling pending sends");
        for task in live {
            task.cancel();
        }
        self.status_note = Some("Stopped waiting for the reply".to_string());
        true
    }

    /// Drop handles of sends that have completed.
    pub fn reap_finished(&mut self) {
        let before = self.send_tasks.len();
        self.send_tasks.retain(|t| !t.is_finished());
        let reaped = before - self.send_tasks.len();
        if reaped > 0 {
            debug!(reaped, "send tasks finished");
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete_forward(&mut self) {
        let char_count = self.input.chars().count();
        if self.cursor < char_count {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input.chars().count();
        self.cursor = (self.cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    /// Row and column of the cursor within the (possibly multi-line) input.
    /// Cursor row, and its column in terminal cells
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before = &self.input[..char_to_byte_index(&self.input, self.cursor)];
        let line = before.matches('\n').count();
        let col = before.rsplit('\n').next().map_or(0, |tail| tail.width());
        (line, col)
    }

    pub fn input_line_count(&self) -> usize {
        self.input.split('\n').count()
    }

    /// Rows the input box should show, without borders
    pub fn input_rows(&self) -> u16 {
        (self.input_line_count() as u16).clamp(1, MAX_INPUT_LINES)
    }

    // Chat scrolling

    fn max_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    /// Record the chat panel geometry from the last render and re-apply
    /// the tail-follow rule.
    pub fn update_chat_viewport(&mut self, height: u16, total_lines: u16) {
        self.chat_height = height;
        self.chat_total_lines = total_lines;
        if self.follow_tail {
            self.chat_scroll = self.max_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_scroll());
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_tail = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
        self.chat_scroll = self.max_scroll();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tui::{AppEvent, EventHandler};
    use async_trait::async_trait;
    use chatterm_core::{
        ChatError, ChatReply, ChatRequest, ClientOptions, HealthReport, Message, Role, ThinkDelay,
    };

    /// Replies "echo: <message>" to everything
    pub(crate) struct EchoService;

    #[async_trait]
    impl ChatService for EchoService {
        async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
            Ok(ChatReply::text(format!("echo: {}", request.message)))
        }

        async fn health_check(&self) -> Result<HealthReport, ChatError> {
            Ok(HealthReport::default())
        }
    }

    pub(crate) fn test_app(concurrency: ConcurrencyPolicy) -> (App, EventHandler) {
        let events = EventHandler::detached();
        let client = ConversationClient::new(
            Arc::new(EchoService) as Arc<dyn ChatService>,
            ChannelRenderer::new(events.sender()),
            ClientOptions {
                think_delay: ThinkDelay::none(),
                concurrency,
                backend_label: "http://localhost:8000".to_string(),
            },
        );
        (App::new(client, "http://localhost:8000"), events)
    }

    /// Feed queued UI updates into the app until loading switches off.
    pub(crate) async fn drain_until_idle(app: &mut App, events: &mut EventHandler) {
        while let Some(event) = events.next().await {
            if let AppEvent::Ui(update) = event {
                let done = matches!(update, UiUpdate::Loading(false));
                app.apply_update(update);
                if done {
                    break;
                }
            }
        }
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 10), s.len());
    }

    #[tokio::test]
    async fn test_input_editing_is_utf8_safe() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        for c in "añb".chars() {
            app.insert_char(c);
        }
        app.cursor_left();
        app.backspace();
        assert_eq!(app.input, "ab");
        assert_eq!(app.cursor, 1);

        app.cursor_home();
        app.delete_forward();
        assert_eq!(app.input, "b");

        app.cursor_end();
        app.insert_newline();
        app.insert_char('c');
        assert_eq!(app.input, "b\nc");
        assert_eq!(app.cursor_line_col(), (1, 1));
        assert_eq!(app.input_rows(), 2);
    }

    #[tokio::test]
    async fn test_cursor_column_counts_cells() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        for c in "你好".chars() {
            app.insert_char(c);
        }
        assert_eq!(app.cursor_line_col(), (0, 4));

        app.cursor_left();
        assert_eq!(app.cursor_line_col(), (0, 2));
    }

    #[tokio::test]
    async fn test_input_rows_capped() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        for _ in 0..10 {
            app.insert_newline();
        }
        assert_eq!(app.input_rows(), MAX_INPUT_LINES);
    }

    #[tokio::test]
    async fn test_blank_submit_keeps_everything() {
        let (mut app, mut events) = test_app(ConcurrencyPolicy::Reject);
        app.input = "   ".to_string();
        app.cursor = 3;

        app.submit_input();

        assert_eq!(app.input, "   ");
        assert!(app.send_tasks.is_empty());
        assert!(events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_submit_echoes_then_replies() {
        let (mut app, mut events) = test_app(ConcurrencyPolicy::Reject);
        app.input = "  hello ".to_string();
        app.cursor_end();

        app.submit_input();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);

        drain_until_idle(&mut app, &mut events).await;

        let messages: Vec<(Role, &str)> =
            app.log.iter().map(|m| (m.role(), m.text())).collect();
        assert_eq!(
            messages,
            vec![(Role::User, "hello"), (Role::Assistant, "echo: hello")]
        );
        assert!(!app.loading);
        assert!(app.send_enabled());
    }

    #[tokio::test]
    async fn test_busy_submit_keeps_input_and_notes_it() {
        let (mut app, mut events) = test_app(ConcurrencyPolicy::Reject);
        app.input = "first".to_string();
        app.submit_input();

        // Apply the echo and loading-on before the reply lands
        for _ in 0..2 {
            if let Some(AppEvent::Ui(update)) = events.try_next() {
                app.apply_update(update);
            }
        }
        assert!(app.loading);
        assert!(!app.send_enabled());

        app.input = "second".to_string();
        app.submit_input();
        assert_eq!(app.input, "second");
        assert!(app.status_note.is_some());

        drain_until_idle(&mut app, &mut events).await;
        assert_eq!(app.log.len(), 2);
        assert!(app.status_note.is_none());
    }

    #[tokio::test]
    async fn test_allow_policy_keeps_send_enabled() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Allow);
        app.apply_update(UiUpdate::Loading(true));
        assert!(app.send_enabled());
    }

    #[tokio::test]
    async fn test_viewport_follows_tail_until_scrolled() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        app.update_chat_viewport(10, 30);
        assert_eq!(app.chat_scroll, 20);

        app.scroll_up(5);
        assert!(!app.follow_tail);
        app.update_chat_viewport(10, 34);
        assert_eq!(app.chat_scroll, 15);

        // A new message re-attaches to the bottom
        app.apply_update(UiUpdate::Append(Message::assistant("new")));
        app.update_chat_viewport(10, 36);
        assert_eq!(app.chat_scroll, 26);

        app.scroll_half_page_up();
        assert_eq!(app.chat_scroll, 21);
        app.scroll_down(100);
        assert_eq!(app.chat_scroll, 26);
        assert!(app.follow_tail);
    }

    #[tokio::test]
    async fn test_tick_only_animates_while_loading() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.apply_update(UiUpdate::Loading(true));
        app.tick_animation();
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
    }

    #[tokio::test]
    async fn test_cancel_with_nothing_pending() {
        let (mut app, _events) = test_app(ConcurrencyPolicy::Reject);
        assert!(!app.cancel_pending());
        assert!(app.status_note.is_none());
    }
}
