use std::time::Duration;

use crate::error::{Error, Result};

/// Policy for resubmitting units of work which failed transiently.
///
/// The delay before the n-th retry is `base_delay * 2^(n-1)`.  Only errors
/// for which [`Error::is_transient`] holds are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.  Zero is treated
    /// as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Policy which never retries.
    pub const fn none() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO }
    }

    /// Delay to wait for after `attempt` (counting from one) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << shift)
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of
    /// attempts.
    ///
    /// `op` is passed the attempt number counting from one so that on
    /// retries it can first check whether the previous attempt took effect
    /// after all.  Once attempts run out the last transient error is turned
    /// into [`Error::RetriesExhausted`].
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut(u32) -> Result<T>,
    ) -> Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(err) if err.is_transient() => {
                    if attempt >= max_attempts {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "{what} failed (attempt {attempt}/{max_attempts}): \
                         {err}; retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                res => return res,
            }
        }
    }
}
