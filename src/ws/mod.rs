//! WebSocket transport.
//!
//! # Architecture
//!
//! - [`Connection`]: a single tokio-tungstenite connection that reports socket events to an
//!   [`EventHandler`] and serializes every outbound frame through one writer
//! - [`MessageParser`]: decodes and encodes the wire text of realtime messages
//!
//! # Example
//!
//! ```ignore
//! let connection = Connection::new("wss://rtm.example.com/websocket", Config::default())?;
//! tokio::spawn(async move { connection.run(&handler).await });
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;

pub use connection::{Connection, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
