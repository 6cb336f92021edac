use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use lspipe_peer::{spawn_with_config, Peer, PeerConfig, ShutdownConfig, ShutdownProtocol};
use lspipe_transport::SpawnConfig;
use tracing::debug;

use crate::exit::{peer_error, CliError, CliResult, USAGE};
use crate::output::{print_shutdown, OutputFormat};

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Spawn a program, send it one frame and optionally print the reply.
    Send(SendArgs),
    /// Spawn a program and print the frames it writes.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ShutdownMode {
    /// JSON-RPC `shutdown` request followed by an `exit` notification.
    JsonRpc,
    /// Just close the pipes.
    None,
}

/// How to start the child and how to stop it.
#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Pass this process's environment to the child instead of an empty one.
    #[arg(long)]
    pub inherit_env: bool,
    /// Set an environment variable for the child (repeatable).
    #[arg(long = "env", short = 'e', value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub envs: Vec<(String, String)>,
    /// Pass the child's stderr through instead of discarding it.
    #[arg(long)]
    pub stderr: bool,
    /// Working directory for the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
    /// Messages sent to the child before its pipes are closed.
    #[arg(long, value_enum, default_value = "json-rpc")]
    pub shutdown: ShutdownMode,
    /// How long to wait for the shutdown acknowledgement (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub shutdown_timeout: String,
    /// How long the child may take to exit once its pipes are closed.
    #[arg(long, default_value = "2s")]
    pub exit_grace: String,
    /// Print a shutdown summary once the child has exited.
    #[arg(long)]
    pub report: bool,
    /// Program to run, followed by its arguments.
    #[arg(required = true, last = true, value_name = "PROGRAM")]
    pub command: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub child: ChildArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Payload to send once the child is running (repeatable, sent in order).
    #[arg(long = "send", value_name = "DATA")]
    pub send: Vec<String>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Stop when no frame arrives for this long (e.g. 10s, 500ms).
    #[arg(long)]
    pub idle_timeout: Option<String>,
    #[command(flatten)]
    pub child: ChildArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Spawn the child described by `args`.
pub fn spawn_peer(args: &ChildArgs) -> CliResult<Peer> {
    let Some((program, rest)) = args.command.split_first() else {
        return Err(CliError::new(USAGE, "missing program to run"));
    };

    let mut spawn = SpawnConfig::new(program)
        .args(rest.iter().cloned())
        .inherit_env(args.inherit_env)
        .inherit_stderr(args.stderr);
    for (key, value) in &args.envs {
        spawn = spawn.env(key, value);
    }
    if let Some(dir) = &args.cwd {
        spawn = spawn.current_dir(dir);
    }

    let protocol = match args.shutdown {
        ShutdownMode::JsonRpc => ShutdownProtocol::JsonRpc,
        ShutdownMode::None => ShutdownProtocol::Silent,
    };
    let peer_config = PeerConfig {
        shutdown: ShutdownConfig {
            protocol,
            timeout: parse_duration(&args.shutdown_timeout)?,
            exit_grace: parse_duration(&args.exit_grace)?,
            force_kill: true,
        },
        ..PeerConfig::default()
    };

    spawn_with_config(&spawn, peer_config).map_err(|err| peer_error("spawn failed", err))
}

/// Shut the child down and optionally print what happened.
pub fn shutdown_peer(peer: &mut Peer, args: &ChildArgs, format: OutputFormat) -> CliResult<()> {
    let report = peer
        .shutdown()
        .map_err(|err| peer_error("shutdown failed", err))?;
    debug!(peer = peer.id(), ?report, "child stopped");
    if args.report {
        print_shutdown(&report, peer.id(), format);
    }
    Ok(())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

fn parse_env_pair(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{input}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn env_pairs() {
        assert_eq!(
            parse_env_pair("RUST_LOG=debug").unwrap(),
            ("RUST_LOG".to_string(), "debug".to_string())
        );
        assert_eq!(
            parse_env_pair("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_env_pair("=value").is_err());
        assert!(parse_env_pair("novalue").is_err());
    }
}
