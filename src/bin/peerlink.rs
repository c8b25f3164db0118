//! Demo negotiation client
//!
//! Registers with a signaling relay and either places a call or waits for
//! an inbound one, then runs the offer/answer and candidate exchange to
//! completion.
//!
//! # Usage
//!
//! ```bash
//! # Wait for an inbound call
//! cargo run --bin peerlink -- --relay-url ws://localhost:8443
//!
//! # Call peer 77 with a fixed local id
//! cargo run --bin peerlink -- --local-id 4821 --call 77
//! ```
//!
//! # Environment Variables
//!
//! - `PEERLINK_RELAY_URL`: Relay WebSocket URL (default: `ws://localhost:8443`)
//! - `PEERLINK_LOCAL_ID`: Local peer id (default: random numeric id)
//! - `PEERLINK_CALL_PEER`: Peer id to call (default: wait for inbound call)
//! - `PEERLINK_STUN_SERVERS`: Comma-separated STUN server URLs
//! - `PEERLINK_CONNECT_ATTEMPTS`: Relay dial attempts before giving up
//! - `RUST_LOG`: Logging level (default: `info`)

use anyhow::Context;
use clap::Parser;
use peerlink::{PeerClient, PeerClientConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "peerlink", about = "WebRTC signaling negotiation client")]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, env = "PEERLINK_RELAY_URL", default_value = "ws://localhost:8443")]
    relay_url: String,

    /// Local peer id (random numeric id when omitted)
    #[arg(long, env = "PEERLINK_LOCAL_ID")]
    local_id: Option<String>,

    /// Peer id to call; waits for an inbound call when omitted
    #[arg(long, env = "PEERLINK_CALL_PEER")]
    call: Option<String>,

    /// STUN server URLs, comma separated
    #[arg(
        long,
        env = "PEERLINK_STUN_SERVERS",
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// Relay dial attempts before giving up
    #[arg(long, env = "PEERLINK_CONNECT_ATTEMPTS", default_value_t = 3)]
    connect_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = PeerClientConfig {
        relay_url: args.relay_url,
        local_id: args.local_id,
        stun_servers: args.stun_servers,
        max_connect_attempts: args.connect_attempts,
        ..Default::default()
    };

    let client = PeerClient::new(config).context("invalid configuration")?;
    info!("local peer id: {}", client.local_id());

    tokio::select! {
        result = client.run(args.call) => {
            let state = result.context("negotiation failed")?;
            info!("session ended in state {:?}", state);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
