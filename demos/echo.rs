//! Connects to an RTM websocket, logs every event and echoes `message` events back to their
//! channel.
//!
//! The websocket URL comes from the authentication handshake of your chat service:
//! ```sh
//! RTM_URL=wss://... RUST_LOG=info,rtm_client=debug cargo run --example echo --features tracing
//! ```

use std::env;
use std::time::Duration;

use rtm_client::message::Message;
use rtm_client::rtm::MessageLoop;
use rtm_client::ws::config::{Config, DEFAULT_KEEPALIVE_INTERVAL};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const POLL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = env::var("RTM_URL")?;
    let rtm = MessageLoop::new(&endpoint, Config::default())?;
    rtm.start(DEFAULT_KEEPALIVE_INTERVAL)?;
    info!(endpoint = %rtm.endpoint(), state = %rtm.state(), "started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = rtm.receive_message(true, Some(POLL)) => {
                let Some(message) = message else { continue };
                info!(event_type = ?message.msg_type(), "received");

                if message.msg_type() == Some("message") && message.get("subtype").is_none() {
                    let mut echo = Message::with_type("message");
                    if let Some(channel) = message.get("channel") {
                        echo.set("channel", channel.clone());
                    }
                    if let Some(text) = message.get("text") {
                        echo.set("text", text.clone());
                    }
                    if let Err(e) = rtm.send(&mut echo) {
                        error!(error = %e, "unable to echo");
                    }
                }
            }
        }

        while let Some(event) = rtm.receive_error(false, None).await {
            warn!(result = %event.result, "{}", event.message());
            if event.is_closed() {
                return Ok(());
            }
        }
    }

    rtm.stop().await?;
    Ok(())
}
