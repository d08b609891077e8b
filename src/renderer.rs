use chatterm_core::{Message, Renderer};
use tokio::sync::mpsc;
use tracing::debug;

use crate::tui::AppEvent;

/// Instruction from the conversation client to the UI
#[derive(Debug, Clone)]
pub enum UiUpdate {
    Append(Message),
    Loading(bool),
}

/// Renderer that forwards into the event loop, so the UI state is only ever
/// touched from there and in the order the client produced the updates.
#[derive(Clone)]
pub struct ChannelRenderer {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelRenderer {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    fn post(&self, update: UiUpdate) {
        if self.tx.send(AppEvent::Ui(update)).is_err() {
            debug!("event loop closed, dropping UI update");
        }
    }
}

impl Renderer for ChannelRenderer {
    fn append_message(&self, message: Message) {
        self.post(UiUpdate::Append(message));
    }

    fn set_loading(&self, active: bool) {
        self.post(UiUpdate::Loading(active));
    }
}
