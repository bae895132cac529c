#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// Keepalive cadence callers typically hand to
/// [`MessageLoop::start`](crate::rtm::MessageLoop::start).
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for WebSocket connection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Maximum time to wait for the WebSocket handshake to complete
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_connect_timeout_is_ten_seconds() {
        let config = Config::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides_connect_timeout() {
        let config = Config::builder()
            .connect_timeout(Duration::from_millis(250))
            .build();
        assert_eq!(config.connect_timeout, Duration::from_millis(250));

        let config = Config::builder().build();
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT_DURATION);
    }
}
