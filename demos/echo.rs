//! Example: Echo Server and Reconnecting Client
//!
//! Starts a server that echoes every frame back, connects a client, sends a
//! few head/tail frames and prints the replies.
//!
//! Run with: `cargo run --example echo`
//! Set `RUST_LOG=debug` to watch the connection lifecycle.

use std::sync::Arc;
use std::time::Duration;

use frame_link::config::{ClientConfig, FramingConfig, FramingKind, LoggingConfig, ServerConfig};
use frame_link::core::checksum::CheckKind;
use frame_link::core::packet::Packet;
use frame_link::error::ProtocolError;
use frame_link::transport::{Client, ConnCallback, Connection, Server};
use frame_link::utils::logging::init_logging;
use frame_link::utils::metrics::global_metrics;
use tokio::sync::mpsc;

struct EchoServer;

impl ConnCallback for EchoServer {
    fn on_linked(&self, conn: &Arc<Connection>) {
        println!("[server] #{} linked from {:?}", conn.id(), conn.peer_addr());
    }

    fn on_received(&self, conn: &Arc<Connection>, packet: Packet) {
        let conn = Arc::clone(conn);
        tokio::spawn(async move {
            let _ = conn.send(&packet, Duration::from_secs(1)).await;
        });
    }

    fn on_closed(&self, conn: &Arc<Connection>) {
        println!("[server] #{} closed", conn.id());
    }
}

struct Replies(mpsc::UnboundedSender<String>);

impl ConnCallback for Replies {
    fn on_received(&self, _conn: &Arc<Connection>, packet: Packet) {
        if let Packet::HeadTail(frame) = packet {
            let _ = self.0.send(frame.to_string());
        }
    }

    fn on_errored(&self, err: &ProtocolError, _conn: Option<&Arc<Connection>>) {
        eprintln!("[client] error: {err}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig::default())?;

    let framing = FramingConfig {
        kind: FramingKind::HeadTail,
        head: b"<<".to_vec(),
        tail: b">>".to_vec(),
        type_len: 1,
        check: CheckKind::Crc16,
        ..FramingConfig::default()
    };
    let protocol = Arc::new(framing.build()?);

    let server = Arc::new(Server::new(
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        },
        protocol.clone(),
        Arc::new(EchoServer),
    ));
    // `start` runs the accept loop until `stop`, so give it its own task.
    let running = Arc::clone(&server);
    let accept = tokio::spawn(async move { running.start().await });
    let addr = server.listening().await;
    println!("=== Echo server on {addr} ===\n");

    let (tx, mut replies) = mpsc::unbounded_channel();
    let client = Client::new(
        ClientConfig {
            address: addr.to_string(),
            relink_wait: Duration::from_millis(200),
            ..ClientConfig::default()
        },
        protocol.clone(),
        Arc::new(Replies(tx)),
    );
    client.start()?;

    while client.is_closed() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for text in ["hello", "framed", "world"] {
        let packet = protocol.build_frame(b"M", text.as_bytes())?;
        client.send(&packet, Duration::from_secs(1)).await?;
        if let Some(reply) = replies.recv().await {
            println!("[client] reply: {reply}");
        }
    }

    client.stop().await?;
    server.stop().await?;
    if let Ok(result) = accept.await {
        result?;
    }

    let snapshot = global_metrics().snapshot();
    println!(
        "\nframes sent: {}, frames received: {}",
        snapshot.frames_sent, snapshot.frames_received
    );
    Ok(())
}
