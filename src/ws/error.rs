#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket and loop lifecycle error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error parsing a WebSocket message
    MessageParse(serde_json::Error),
    /// Received a payload that is valid JSON but not a message object
    InvalidMessage(String),
    /// WebSocket connection is not open, or was closed
    ConnectionClosed,
    /// Operation timed out
    Timeout,
    /// The loop or connection was already started
    AlreadyStarted,
    /// The loop was never started
    NotRunning,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::InvalidMessage(msg) => write!(f, "Invalid WebSocket message: {msg}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Timeout => write!(f, "WebSocket operation timed out"),
            Self::AlreadyStarted => write!(f, "Message loop already started"),
            Self::NotRunning => write!(f, "Message loop is not running"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

/// Returns `true` when `error` carries [`WsError::ConnectionClosed`].
#[must_use]
pub fn is_connection_closed(error: &crate::error::Error) -> bool {
    matches!(
        error.downcast_ref::<WsError>(),
        Some(WsError::ConnectionClosed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Kind};

    #[test]
    fn connection_closed_maps_to_websocket_kind() {
        let error: Error = WsError::ConnectionClosed.into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(is_connection_closed(&error));
        assert_eq!(error.to_string(), "WebSocket: WebSocket connection closed");
    }

    #[test]
    fn misuse_errors_are_not_connection_closed() {
        let error: Error = WsError::AlreadyStarted.into();

        assert!(!is_connection_closed(&error));
        assert!(matches!(
            error.downcast_ref::<WsError>(),
            Some(WsError::AlreadyStarted)
        ));
    }
}
