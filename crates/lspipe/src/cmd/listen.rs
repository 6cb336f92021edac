use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lspipe_peer::Peer;
use tracing::info;

use crate::cmd::{parse_duration, shutdown_peer, spawn_peer, ListenArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut peer = spawn_peer(&args.child)?;
    let received = receive(&mut peer, &args, idle_timeout, &running, format);
    let stopped = shutdown_peer(&mut peer, &args.child, format);

    received?;
    stopped?;
    Ok(SUCCESS)
}

fn receive(
    peer: &mut Peer,
    args: &ListenArgs,
    idle_timeout: Option<Duration>,
    running: &AtomicBool,
    format: OutputFormat,
) -> CliResult<()> {
    for data in &args.send {
        peer.send(data.as_bytes())
            .map_err(|err| peer_error("send failed", err))?;
    }

    let mut timer = peer.config().backoff.start();
    let mut printed = 0usize;
    let mut last_frame = Instant::now();

    while running.load(Ordering::SeqCst) {
        let frame = match peer.poll() {
            Ok(Some(frame)) => frame,
            Ok(None) if peer.is_eof() => {
                info!(peer = peer.id(), "child closed its output");
                return Ok(());
            }
            Ok(None) => {
                let deadline = idle_timeout.map(|idle| last_frame + idle);
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    info!(peer = peer.id(), "no frames within idle timeout");
                    return Ok(());
                }
                timer.wait(deadline);
                continue;
            }
            Err(err) => return Err(peer_error("receive failed", err)),
        };

        printed = printed.saturating_add(1);
        print_frame(&frame, printed, peer.id(), format);
        timer.reset();
        last_frame = Instant::now();

        if args.count.is_some_and(|count| printed >= count) {
            return Ok(());
        }
    }

    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
