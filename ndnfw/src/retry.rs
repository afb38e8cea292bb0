use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::RetryOptions;

/// Attempt counter and pending timer of one readvertise table row.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    attempts: u32,
    timer: Option<JoinHandle<()>>,
}

impl RetryState {
    /// Cancel the pending timer and start counting from zero.
    pub(crate) fn stop(&mut self) {
        self.attempts = 0;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Record a failed attempt and return the delay before the next one, or
    /// `None` once the retry budget is exhausted.
    pub(crate) fn next_delay(&mut self, options: &RetryOptions) -> Option<Duration> {
        if !options.forever && self.attempts >= options.retries {
            return None;
        }
        let attempt = if options.forever {
            self.attempts.min(options.retries.saturating_sub(1))
        } else {
            self.attempts
        };
        self.attempts = self.attempts.saturating_add(1);
        Some(options.timeout(attempt))
    }

    pub(crate) fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Drop for RetryState {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(forever: bool, retries: u32) -> RetryOptions {
        RetryOptions {
            forever,
            retries,
            factor: 2.0,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(1000),
            randomize: false,
        }
    }

    #[test]
    fn test_bounded_retries() {
        let options = fixed(false, 2);
        let mut retry = RetryState::default();
        assert_eq!(retry.next_delay(&options), Some(Duration::from_millis(100)));
        assert_eq!(retry.next_delay(&options), Some(Duration::from_millis(200)));
        assert_eq!(retry.next_delay(&options), None);
        assert_eq!(retry.attempts(), 2);

        retry.stop();
        assert_eq!(retry.next_delay(&options), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_forever_reuses_last_delay() {
        let options = fixed(true, 3);
        let mut retry = RetryState::default();
        let delays: Vec<_> = (0..6).filter_map(|_| retry.next_delay(&options)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 400, 400, 400].map(Duration::from_millis).to_vec()
        );
    }
}
