use std::ffi::OsString;
use std::path::PathBuf;

use lspipe_transport::{ProcessChannel, SpawnConfig};

use crate::error::Result;
use crate::peer::{Peer, PeerConfig};

/// Spawn `program` with `args` under an empty environment and default peer settings.
pub fn spawn<I, S>(program: impl Into<PathBuf>, args: I) -> Result<Peer>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    spawn_with_config(&SpawnConfig::new(program).args(args), PeerConfig::default())
}

/// Spawn with explicit process and peer configuration.
pub fn spawn_with_config(spawn_config: &SpawnConfig, peer_config: PeerConfig) -> Result<Peer> {
    let channel = ProcessChannel::spawn(spawn_config)?;
    Peer::from_channel(channel, peer_config)
}
