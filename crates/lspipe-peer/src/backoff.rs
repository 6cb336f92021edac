use std::time::{Duration, Instant};

/// Retry policy between non-blocking polls that produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Yield the thread and retry immediately.
    Busy,
    /// Sleep a fixed interval between polls.
    Fixed(Duration),
    /// Double the sleep after every empty poll, starting at `initial` and capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(50),
        }
    }
}

impl Backoff {
    /// Start a fresh wait sequence.
    pub fn start(&self) -> BackoffTimer {
        BackoffTimer {
            policy: *self,
            next: self.first_delay(),
        }
    }

    fn first_delay(&self) -> Duration {
        match *self {
            Self::Busy => Duration::ZERO,
            Self::Fixed(interval) => interval,
            Self::Exponential { initial, .. } => initial,
        }
    }
}

/// Per-loop backoff state.
#[derive(Debug, Clone)]
pub struct BackoffTimer {
    policy: Backoff,
    next: Duration,
}

impl BackoffTimer {
    /// Delay the next call to [`wait`](Self::wait) would sleep, before deadline clamping.
    pub fn next_delay(&self) -> Duration {
        self.next
    }

    /// Sleep according to the policy, never past `deadline`.
    pub fn wait(&mut self, deadline: Option<Instant>) {
        let mut delay = self.next;
        if let Some(deadline) = deadline {
            delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        }

        if delay.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(delay);
        }

        if let Backoff::Exponential { max, .. } = self.policy {
            self.next = self.next.saturating_mul(2).min(max);
        }
    }

    /// Restart the sequence after a poll made progress.
    pub fn reset(&mut self) {
        self.next = self.policy.first_delay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_up_to_cap() {
        let mut timer = Backoff::Exponential {
            initial: Duration::from_micros(100),
            max: Duration::from_micros(350),
        }
        .start();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(timer.next_delay());
            timer.wait(None);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_micros(100),
                Duration::from_micros(200),
                Duration::from_micros(350),
                Duration::from_micros(350),
            ]
        );

        timer.reset();
        assert_eq!(timer.next_delay(), Duration::from_micros(100));
    }

    #[test]
    fn fixed_and_busy_do_not_grow() {
        let mut fixed = Backoff::Fixed(Duration::from_micros(50)).start();
        fixed.wait(None);
        fixed.wait(None);
        assert_eq!(fixed.next_delay(), Duration::from_micros(50));

        let mut busy = Backoff::Busy.start();
        busy.wait(None);
        assert_eq!(busy.next_delay(), Duration::ZERO);
    }

    #[test]
    fn wait_is_clamped_to_deadline() {
        let mut timer = Backoff::Fixed(Duration::from_secs(30)).start();
        let started = Instant::now();
        timer.wait(Some(started + Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn default_is_exponential() {
        assert!(matches!(Backoff::default(), Backoff::Exponential { .. }));
    }
}
