//! Spawn `cat` as a stand-in server, exchange a few frames, then shut it down.
//!
//! Run with:
//!   cargo run --example echo-child --features peer

use std::time::Duration;

use lspipe::peer::{PeerConfig, ShutdownConfig};
use lspipe::transport::SpawnConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PeerConfig {
        shutdown: ShutdownConfig {
            timeout: Duration::from_millis(250),
            ..ShutdownConfig::default()
        },
        ..PeerConfig::default()
    };
    let mut peer = lspipe::peer::spawn_with_config(&SpawnConfig::new("cat"), config)?;
    eprintln!("Spawned {}", peer.id());

    for message in ["hello", "{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}", "bye"] {
        peer.send(message.as_bytes())?;
        let frame = peer.recv_timeout(Duration::from_secs(5))?;
        eprintln!(
            "Received {} bytes: {}",
            frame.payload.len(),
            frame.as_utf8().unwrap_or("<binary>")
        );
    }

    let report = peer.shutdown()?;
    eprintln!(
        "Shutdown: acknowledged={} exit_sent={} status={:?}",
        report.acknowledged, report.exit_sent, report.exit_status
    );
    Ok(())
}
