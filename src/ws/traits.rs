//! Core traits at the transport seam.

use crate::Result;
use crate::message::Message;

/// Message parser trait for converting wire text to and from [`Message`]s.
///
/// # Example
///
/// ```ignore
/// pub struct StrictParser;
///
/// impl MessageParser for StrictParser {
///     fn parse(&self, text: &str) -> crate::Result<Message> {
///         let message: Message = text.parse()?;
///         // reject events without a type tag
///         message.msg_type().ok_or(...)?;
///         Ok(message)
///     }
///
///     fn encode(&self, message: &Message) -> crate::Result<String> {
///         message.to_json()
///     }
/// }
/// ```
pub trait MessageParser: Send + Sync + 'static {
    /// Decode one inbound text frame.
    fn parse(&self, text: &str) -> Result<Message>;

    /// Encode one outbound message into a text frame.
    fn encode(&self, message: &Message) -> Result<String>;
}

/// Plain JSON object parser.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl MessageParser for JsonParser {
    fn parse(&self, text: &str) -> Result<Message> {
        text.parse()
    }

    fn encode(&self, message: &Message) -> Result<String> {
        message.to_json()
    }
}

/// Callbacks invoked by [`Connection::run`](super::Connection::run).
///
/// All four run synchronously on the connection task, so implementations must not block.
pub trait EventHandler: Send + Sync {
    /// The handshake completed and the connection is open.
    fn on_open(&self);

    /// A text frame arrived.
    fn on_message(&self, text: &str);

    /// Reading from or writing to the socket failed.
    fn on_error(&self, detail: &str);

    /// The connection is gone. Fires exactly once per run.
    fn on_close(&self);
}
