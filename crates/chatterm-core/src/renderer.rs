use crate::message::Message;

/// Display capability injected into the conversation client.
///
/// Implementations must not block: the client calls these from inside the
/// send lifecycle, between suspension points.
pub trait Renderer: Send + Sync + 'static {
    /// Append to the message log and bring the newest entry into view.
    fn append_message(&self, message: Message);

    /// Toggle the loading indicator. While active the send control is disabled.
    fn set_loading(&self, active: bool);
}
