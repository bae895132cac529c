use std::fmt;

/// Classification of an asynchronous failure.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ErrorEventKind {
    /// An inbound frame could not be decoded into a message. The loop keeps running.
    #[strum(serialize = "decode message failed")]
    Decode,
    /// The socket reported a read or write failure.
    #[strum(serialize = "read socket failed")]
    Transport,
    /// The connection is gone. Terminal: nothing else is produced after it.
    #[strum(serialize = "websocket closed")]
    Closed,
}

/// Payload of [`ErrorEventKind::Closed`] events.
pub const CLOSED_RESULT: &str = "closed";

/// An asynchronous failure surfaced through the error inbox.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// The raw payload or error detail that triggered the failure
    pub result: String,
    pub kind: ErrorEventKind,
}

impl ErrorEvent {
    pub fn new<S: Into<String>>(result: S, kind: ErrorEventKind) -> Self {
        Self {
            result: result.into(),
            kind,
        }
    }

    pub(crate) fn decode<S: Into<String>>(raw: S) -> Self {
        Self::new(raw, ErrorEventKind::Decode)
    }

    pub(crate) fn transport<S: Into<String>>(detail: S) -> Self {
        Self::new(detail, ErrorEventKind::Transport)
    }

    pub(crate) fn closed() -> Self {
        Self::new(CLOSED_RESULT, ErrorEventKind::Closed)
    }

    /// Short human-readable classification, e.g. `"decode message failed"`.
    #[must_use]
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind == ErrorEventKind::Closed
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_strings() {
        assert_eq!(ErrorEvent::decode("{").message(), "decode message failed");
        assert_eq!(ErrorEvent::transport("reset").message(), "read socket failed");
        assert_eq!(ErrorEvent::closed().message(), "websocket closed");
    }

    #[test]
    fn closed_event_carries_closed_result() {
        let event = ErrorEvent::closed();

        assert!(event.is_closed());
        assert_eq!(event.result, "closed");
        assert_eq!(event.to_string(), "websocket closed: closed");
    }
}
