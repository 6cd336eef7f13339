use std::time::{Duration, Instant};

use super::delay::{sleep_escalating, sleep_through, ShutdownToken};

/// Bounded retry with escalating delay, shared by every cleaner.
///
/// Between failed attempts the loop sleeps `delay`; once shutdown was
/// requested it collapses to `shutdown_delay` so drains finish quickly.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub shutdown_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, shutdown_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            shutdown_delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    /// Returns whether the last attempt succeeded.
    pub fn run<F>(&self, token: &ShutdownToken, mut op: F) -> bool
    where
        F: FnMut() -> bool,
    {
        for attempt in 1..=self.max_attempts {
            if op() {
                return true;
            }
            if attempt < self.max_attempts {
                sleep_escalating(token, self.delay, self.shutdown_delay);
            }
        }
        false
    }
}

/// Retry `op` at a fixed `delay` until it succeeds, or until `deadline`
/// passes when one is set. The root log cleaner's final shutdown loop is
/// the only caller without a deadline.
pub fn retry_unbounded<F>(delay: Duration, deadline: Option<Instant>, mut op: F) -> bool
where
    F: FnMut() -> bool,
{
    loop {
        if op() {
            return true;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        sleep_through(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn succeeds_on_first_attempt() {
        let token = ShutdownToken::new();
        let mut calls = 0;
        let ok = policy(10).run(&token, || {
            calls += 1;
            true
        });
        assert!(ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn spends_entire_budget_on_persistent_failure() {
        let token = ShutdownToken::new();
        let mut calls = 0;
        let ok = policy(10).run(&token, || {
            calls += 1;
            false
        });
        assert!(!ok);
        assert_eq!(calls, 10);
    }

    #[test]
    fn stops_at_first_success_mid_budget() {
        let token = ShutdownToken::new();
        let mut calls = 0;
        let ok = policy(10).run(&token, || {
            calls += 1;
            calls == 4
        });
        assert!(ok);
        assert_eq!(calls, 4);
    }

    #[test]
    fn unbounded_retries_until_injected_success() {
        let mut calls = 0;
        let ok = retry_unbounded(Duration::from_millis(1), None, || {
            calls += 1;
            calls == 25
        });
        assert!(ok);
        assert_eq!(calls, 25);
    }

    #[test]
    fn unbounded_respects_deadline() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let ok = retry_unbounded(Duration::from_millis(5), Some(deadline), || false);
        assert!(!ok);
    }
}
