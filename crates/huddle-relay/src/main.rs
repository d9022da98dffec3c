//! huddle-relay: WebSocket signaling relay for peer-to-peer call setup.
//!
//! Clients join named rooms and exchange offer/answer/ICE payloads with the
//! other members. The relay routes frames on their `type` and `roomId`
//! fields alone and never inspects the rest; media never passes through
//! here, only the handshake that lets peers connect directly.

mod connection;
mod room;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::room::RoomRegistry;

#[derive(Parser)]
#[command(name = "huddle-relay", about = "WebSocket signaling relay for p2p call setup")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let registry = RoomRegistry::new();

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("huddle-relay listening on {}", addr);

    // Accept loop. No per-connection failure may take this down.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, registry).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
