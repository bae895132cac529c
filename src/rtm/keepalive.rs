use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Shared;
use crate::ws::MessageParser;
use crate::ws::error::is_connection_closed;

/// Ping every `interval` until `token` is cancelled or the connection refuses the ping.
pub(super) async fn run<P: MessageParser>(
    shared: Arc<Shared<P>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Keepalive cancellation requested, terminating...");
                break;
            }
            _ = ticker.tick() => {
                match shared.ping() {
                    Ok(()) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Keepalive ping sent");
                    }
                    Err(e) if is_connection_closed(&e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Connection closed, stopping keepalive");
                        break;
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Unable to send keepalive ping: {e:?}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                }
            }
        }
    }
}
