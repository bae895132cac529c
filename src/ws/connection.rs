#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::traits::EventHandler;
use crate::Result;
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Connection ended; it is never reopened
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// A single WebSocket connection driven by [`Connection::run`].
///
/// The connection dispatches socket events to an [`EventHandler`] and owns the only write half
/// of the socket. Outbound frames queued through [`Connection::send`] are written in order by
/// the task running [`Connection::run`], so concurrent senders never interleave on the wire.
///
/// A `Connection` is single-use: once `run` returns it stays [`ConnectionState::Closed`].
#[derive(Debug)]
pub struct Connection {
    endpoint: Url,
    config: Config,
    state_tx: watch::Sender<ConnectionState>,
    sender_tx: mpsc::UnboundedSender<String>,
    /// Taken by the first call to `run`
    sender_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Configure a connection to `endpoint` without opening it.
    ///
    /// The endpoint must be a `ws://` or `wss://` URL.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported WebSocket scheme `{}`",
                endpoint.scheme()
            )));
        }

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            endpoint,
            config,
            state_tx,
            sender_tx,
            sender_rx: Mutex::new(Some(sender_rx)),
            shutdown: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Connect and dispatch events to `handler` until the connection ends.
    ///
    /// Returns once the socket is closed by either side, fails, or [`Self::close`] is called.
    /// `handler.on_close` fires exactly once before this returns, whatever the outcome.
    pub async fn run<H>(&self, handler: &H) -> Result<()>
    where
        H: EventHandler + ?Sized,
    {
        let mut sender_rx = self
            .sender_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(WsError::AlreadyStarted)?;

        self.state_tx.send_replace(ConnectionState::Connecting);

        let connect = timeout(
            self.config.connect_timeout,
            connect_async(self.endpoint.as_str()),
        );
        let ws_stream = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                self.finish(&mut sender_rx, handler);
                return Ok(());
            }
            result = connect => match result {
                Ok(Ok((ws_stream, _))) => ws_stream,
                Ok(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "Unable to connect");
                    handler.on_error(&e.to_string());
                    self.finish(&mut sender_rx, handler);
                    return Err(WsError::Connection(e).into());
                }
                Err(_elapsed) => {
                    let error = WsError::Timeout;
                    #[cfg(feature = "tracing")]
                    tracing::warn!(endpoint = %self.endpoint, "Timed out connecting");
                    handler.on_error(&error.to_string());
                    self.finish(&mut sender_rx, handler);
                    return Err(error.into());
                }
            }
        };

        self.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "WebSocket connected");
        handler.on_open();

        let (mut write, mut read) = ws_stream.split();

        let outcome: Result<()> = loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    // Refuse new frames, then flush what was accepted before the close
                    self.state_tx.send_replace(ConnectionState::Closed);
                    sender_rx.close();
                    while let Ok(text) = sender_rx.try_recv() {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = write.send(Message::Close(None)).await;
                    break Ok(());
                }

                // Handle incoming messages
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received WebSocket text message");
                            handler.on_message(text.as_str());
                        }
                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => handler.on_message(text),
                            Err(e) => handler.on_error(&format!("binary frame is not UTF-8: {e}")),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(?frame, "Server closed WebSocket");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &frame;
                            break Ok(());
                        }
                        Some(Ok(_)) => {
                            // Ping/pong control frames are answered by tungstenite.
                        }
                        Some(Err(e)) => {
                            handler.on_error(&e.to_string());
                            break Err(WsError::Connection(e).into());
                        }
                        None => break Ok(()),
                    }
                }

                // Single writer for every outbound frame
                Some(text) = sender_rx.recv() => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        handler.on_error(&e.to_string());
                        break Err(WsError::Connection(e).into());
                    }
                }
            }
        };

        self.finish(&mut sender_rx, handler);

        outcome
    }

    fn finish<H>(&self, sender_rx: &mut mpsc::UnboundedReceiver<String>, handler: &H)
    where
        H: EventHandler + ?Sized,
    {
        self.state_tx.send_replace(ConnectionState::Closed);
        sender_rx.close();
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "WebSocket closed");
        handler.on_close();
    }

    /// Queue a text frame for the writer.
    ///
    /// Fails with [`WsError::ConnectionClosed`] unless the connection is open.
    pub fn send(&self, text: String) -> Result<()> {
        if !self.state().is_connected() {
            return Err(WsError::ConnectionClosed.into());
        }
        self.sender_tx
            .send(text)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Ask the running connection to close. Safe to call any number of times.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}
