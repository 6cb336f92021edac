//! Scoped SIGPIPE suppression.
//!
//! Writing to a pipe whose reader has exited raises SIGPIPE, which terminates the
//! process by default. Pipes have no per-call `MSG_NOSIGNAL`, so while any
//! [`SigpipeGuard`] is alive the signal is ignored process-wide and writes fail with
//! `EPIPE` instead. The previous disposition is restored when the last guard drops.

use std::io;
use std::sync::Mutex;

use tracing::{debug, warn};

struct GuardState {
    holders: usize,
    previous: Option<libc::sigaction>,
}

static STATE: Mutex<GuardState> = Mutex::new(GuardState {
    holders: 0,
    previous: None,
});

/// Keeps SIGPIPE ignored for as long as it lives.
#[derive(Debug)]
pub struct SigpipeGuard {
    _private: (),
}

impl SigpipeGuard {
    /// Ignore SIGPIPE until the returned guard (and every other live guard) is dropped.
    pub fn acquire() -> io::Result<Self> {
        let mut state = STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.holders == 0 {
            state.previous = Some(ignore_sigpipe()?);
            debug!("SIGPIPE ignored for child channels");
        }
        state.holders += 1;
        Ok(Self { _private: () })
    }

    #[cfg(test)]
    fn active() -> usize {
        STATE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .holders
    }
}

impl Drop for SigpipeGuard {
    fn drop(&mut self) {
        let mut state = STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.holders = state.holders.saturating_sub(1);
        if state.holders == 0 {
            if let Some(previous) = state.previous.take() {
                if let Err(err) = restore(&previous) {
                    warn!(error = %err, "failed to restore SIGPIPE disposition");
                } else {
                    debug!("SIGPIPE disposition restored");
                }
            }
        }
    }
}

fn ignore_sigpipe() -> io::Result<libc::sigaction> {
    // SAFETY: both structs are zero-initialized, which is a valid `sigaction` value;
    // `sigemptyset` only writes into the provided mask.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_IGN;
        libc::sigemptyset(&mut action.sa_mask);
        let mut previous: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(libc::SIGPIPE, &action, &mut previous) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(previous)
    }
}

fn restore(previous: &libc::sigaction) -> io::Result<()> {
    // SAFETY: `previous` was filled in by a successful `sigaction` call.
    let rc = unsafe { libc::sigaction(libc::SIGPIPE, previous, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
fn current_disposition() -> io::Result<libc::sighandler_t> {
    // SAFETY: a null `act` only queries the disposition into `current`.
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(libc::SIGPIPE, std::ptr::null(), &mut current) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(current.sa_sigaction)
    }
}
