//! Realtime messaging (RTM) loop.
//!
//! [`MessageLoop`] owns one websocket [`Connection`], a keepalive task and two inboxes. Socket
//! events are translated into inbox items on the connection task; the caller pulls them out
//! with [`MessageLoop::receive_message`] and [`MessageLoop::receive_error`] from wherever it
//! likes, and writes through [`MessageLoop::send`].
//!
//! Every asynchronous failure (undecodable frame, socket error, close) becomes exactly one
//! [`ErrorEvent`]. Misuse (starting twice, sending while closed) is returned directly from the
//! offending call.
//!
//! # Example
//!
//! ```rust, no_run
//! use std::time::Duration;
//!
//! use rtm_client::message::Message;
//! use rtm_client::rtm::MessageLoop;
//! use rtm_client::ws::config::{Config, DEFAULT_KEEPALIVE_INTERVAL};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rtm = MessageLoop::new("wss://rtm.example.com/websocket", Config::default())?;
//!     rtm.start(DEFAULT_KEEPALIVE_INTERVAL)?;
//!
//!     while let Some(message) = rtm.receive_message(true, Some(Duration::from_secs(5))).await {
//!         if message.msg_type() == Some("hello") {
//!             let mut reply = Message::with_type("message");
//!             reply.set("channel", "C024BE91L");
//!             reply.set("text", "hi");
//!             rtm.send(&mut reply)?;
//!         }
//!     }
//!
//!     rtm.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod event;
pub mod inbox;
mod keepalive;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use event::{ErrorEvent, ErrorEventKind};
pub use inbox::Inbox;

use crate::Result;
use crate::error::Error;
use crate::message::Message;
use crate::ws::config::Config;
use crate::ws::{Connection, ConnectionState, EventHandler, JsonParser, MessageParser, WsError};

/// Lifecycle of a [`MessageLoop`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LoopState {
    /// Configured, not connected
    Created,
    /// Connection task active, keepalive armed
    Running,
    /// Connection closed; the inboxes may still hold residual items
    Stopped,
}

/// Websocket message loop with keepalive and pull-based inboxes.
///
/// Must be started from within a tokio runtime. Dropping the loop cancels the keepalive
/// and closes the connection; use [`MessageLoop::stop`] to also wait for both tasks.
pub struct MessageLoop<P: MessageParser = JsonParser> {
    shared: Arc<Shared<P>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the caller, the connection task and the keepalive task.
struct Shared<P: MessageParser> {
    connection: Connection,
    parser: P,
    state: Mutex<LoopState>,
    call_id: AtomicU64,
    /// Held from call id assignment until the frame is queued, so ids reach the wire in order
    outbound: Mutex<()>,
    messages: Inbox<Message>,
    errors: Inbox<ErrorEvent>,
    keepalive_interval: Mutex<Option<Duration>>,
    keepalive_token: CancellationToken,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
    /// Cancelled once the connection task has queued its closed event
    finished: CancellationToken,
}

impl MessageLoop<JsonParser> {
    /// Configure a loop for `endpoint` without connecting.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_parser(endpoint, config, JsonParser)
    }
}

impl<P: MessageParser> MessageLoop<P> {
    /// Configure a loop that decodes and encodes frames with `parser`.
    pub fn with_parser(endpoint: &str, config: Config, parser: P) -> Result<Self> {
        let connection = Connection::new(endpoint, config)?;

        Ok(Self {
            shared: Arc::new(Shared {
                connection,
                parser,
                state: Mutex::new(LoopState::Created),
                call_id: AtomicU64::new(0),
                outbound: Mutex::new(()),
                messages: Inbox::new(),
                errors: Inbox::new(),
                keepalive_interval: Mutex::new(None),
                keepalive_token: CancellationToken::new(),
                keepalive_task: Mutex::new(None),
                finished: CancellationToken::new(),
            }),
            connection_task: Mutex::new(None),
        })
    }

    /// Spawn the connection task. Pings start `keepalive_interval` after the socket opens.
    ///
    /// Fails with [`WsError::AlreadyStarted`] unless the loop is [`LoopState::Created`].
    pub fn start(&self, keepalive_interval: Duration) -> Result<()> {
        if keepalive_interval.is_zero() {
            return Err(Error::validation("keepalive interval must be non-zero"));
        }
        let runtime = Handle::try_current()?;

        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != LoopState::Created {
                return Err(WsError::AlreadyStarted.into());
            }
            *state = LoopState::Running;
        }

        *self
            .shared
            .keepalive_interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(keepalive_interval);

        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(async move {
            let handler = LoopHandler {
                shared: Arc::clone(&shared),
            };
            if let Err(e) = shared.connection.run(&handler).await {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Connection task ended with error");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        });

        *self
            .connection_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.shared.connection.endpoint(), ?keepalive_interval, "Message loop started");

        Ok(())
    }

    /// Close the connection and wait for the connection and keepalive tasks to finish.
    ///
    /// The close surfaces as one `"websocket closed"` [`ErrorEvent`], queued by the time any
    /// caller returns, concurrent callers included; the inboxes are not cleared. Stopping a
    /// loop that already stopped is a no-op, stopping one that never started fails with
    /// [`WsError::NotRunning`].
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match *state {
                LoopState::Created => return Err(WsError::NotRunning.into()),
                LoopState::Running => *state = LoopState::Stopped,
                LoopState::Stopped => {}
            }
        }

        // Keepalive goes first so no ping can race the close frame
        self.shared.keepalive_token.cancel();
        let keepalive = self
            .shared
            .keepalive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = keepalive {
            join(task).await;
        }

        self.shared.connection.close();
        let connection = self
            .connection_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = connection {
            join(task).await;
            self.shared.finished.cancel();
        } else {
            // Another caller owns the task; wait until it has wound down
            self.shared.finished.cancelled().await;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.shared.connection.endpoint(), "Message loop stopped");

        Ok(())
    }

    /// Send `message`, assigning it the next call id if it has none.
    ///
    /// The message is modified in place. Fails with [`WsError::ConnectionClosed`] when the
    /// connection is not open.
    pub fn send(&self, message: &mut Message) -> Result<()> {
        self.shared.send(message)
    }

    /// Send a keepalive ping.
    pub fn ping(&self) -> Result<()> {
        self.shared.ping()
    }

    /// Next call id: 1, 2, 3, ... across the lifetime of this loop.
    pub fn gen_call_id(&self) -> u64 {
        self.shared.gen_call_id()
    }

    /// Pop the oldest inbound message.
    ///
    /// With `block == false` this returns immediately. Otherwise it waits up to `timeout`
    /// (forever if `None`); expiry yields `None` and is not an error.
    pub async fn receive_message(&self, block: bool, timeout: Option<Duration>) -> Option<Message> {
        self.shared.messages.receive_with(block, timeout).await
    }

    /// Pop the oldest [`ErrorEvent`], with the same blocking rules as
    /// [`Self::receive_message`].
    pub async fn receive_error(&self, block: bool, timeout: Option<Duration>) -> Option<ErrorEvent> {
        self.shared.errors.receive_with(block, timeout).await
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        self.shared.connection.endpoint()
    }
}

impl<P: MessageParser> Drop for MessageLoop<P> {
    fn drop(&mut self) {
        self.shared.keepalive_token.cancel();
        self.shared.connection.close();
    }
}

async fn join(task: JoinHandle<()>) {
    if let Err(e) = task.await {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %e, "Message loop task failed");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}

impl<P: MessageParser> Shared<P> {
    fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gen_call_id(&self) -> u64 {
        self.call_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn send(&self, message: &mut Message) -> Result<()> {
        if self.state() != LoopState::Running || !self.connection.state().is_connected() {
            return Err(WsError::ConnectionClosed.into());
        }

        let _outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        if !message.has_call_id() {
            message.set_call_id(self.gen_call_id());
        }
        let text = self.parser.encode(message)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Sending WebSocket message");

        self.connection.send(text)
    }

    fn ping(&self) -> Result<()> {
        self.send(&mut Message::ping())
    }
}

/// Translates socket events into inbox items.
struct LoopHandler<P: MessageParser> {
    shared: Arc<Shared<P>>,
}

impl<P: MessageParser> EventHandler for LoopHandler<P> {
    fn on_open(&self) {
        let interval = *self
            .shared
            .keepalive_interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(interval) = interval else {
            return;
        };
        if self.shared.keepalive_token.is_cancelled() {
            return;
        }

        let task = tokio::spawn(keepalive::run(
            Arc::clone(&self.shared),
            interval,
            self.shared.keepalive_token.clone(),
        ));
        *self
            .shared
            .keepalive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    fn on_message(&self, text: &str) {
        match self.shared.parser.parse(text) {
            Ok(message) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?message, "Parsed WebSocket message");
                self.shared.messages.push(message);
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %e, "Failed to parse WebSocket message");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                self.shared.errors.push(ErrorEvent::decode(text));
            }
        }
    }

    fn on_error(&self, detail: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%detail, "WebSocket error");
        self.shared.errors.push(ErrorEvent::transport(detail));
    }

    fn on_close(&self) {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *state = LoopState::Stopped;
        }
        self.shared.keepalive_token.cancel();
        self.shared.errors.push(ErrorEvent::closed());
        self.shared.finished.cancel();
    }
}
