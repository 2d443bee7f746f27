use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use rand::RngExt;
use tracing::debug;

use crate::error::{TransportError, TransportErrorKind};

/// Result of one transport attempt as seen by a [`RetryPolicy`].
#[derive(Clone, Copy, Debug)]
pub enum AttemptOutcome<'a> {
    Response {
        status: StatusCode,
        headers: &'a HeaderMap,
    },
    Error(&'a TransportError),
}

/// Decides whether an attempt is repeated and waits between attempts.
///
/// Implementations are stateless; the engine passes the attempt counter in.
pub trait RetryPolicy: Send + Sync {
    fn should_repeat(&self, outcome: AttemptOutcome<'_>) -> bool;

    /// Blocks for the backoff of `attempt` and returns `true`, or returns `false`
    /// to stop retrying.
    fn delay_before_next_attempt(&self, attempt: usize) -> bool;
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for Arc<P> {
    fn should_repeat(&self, outcome: AttemptOutcome<'_>) -> bool {
        (**self).should_repeat(outcome)
    }

    fn delay_before_next_attempt(&self, attempt: usize) -> bool {
        (**self).delay_before_next_attempt(attempt)
    }
}

/// Never repeats.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_repeat(&self, _outcome: AttemptOutcome<'_>) -> bool {
        false
    }

    fn delay_before_next_attempt(&self, _attempt: usize) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct StandardRetry {
    max_retries: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    delays: Vec<Duration>,
    retryable_status_codes: BTreeSet<u16>,
    retryable_error_kinds: BTreeSet<TransportErrorKind>,
}

impl StandardRetry {
    pub const DEFAULT_MAX_RETRIES: usize = 3;
    pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_backoff: Self::DEFAULT_BASE_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
            jitter_ratio: 0.0,
            delays: Vec::new(),
            retryable_status_codes: BTreeSet::new(),
            retryable_error_kinds: BTreeSet::new(),
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        if self.max_backoff < self.base_backoff {
            self.max_backoff = self.base_backoff;
        }
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_backoff);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    /// Explicit delays, the first entry used after the first attempt. Attempts past
    /// the end reuse the last entry.
    pub fn delays(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays = delays.into_iter().collect();
        self
    }

    /// Status codes that trigger a repeat. Empty means every non-2xx status.
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Transport failures that trigger a repeat. Empty means every kind.
    pub fn retryable_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn configured_max_retries(&self) -> usize {
        self.max_retries
    }

    pub(crate) fn backoff_for_attempt(&self, attempt: usize) -> Duration {
        let backoff = match self.delays.as_slice() {
            [] => {
                let multiplier = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
                self.base_backoff
                    .saturating_mul(multiplier)
                    .min(self.max_backoff)
            }
            delays => delays[attempt.saturating_sub(1).min(delays.len() - 1)],
        };
        self.apply_jitter(backoff)
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_backoff_ms = self.max_backoff.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let sampled_ms = rand::rng()
            .random_range(low..=high)
            .min(max_backoff_ms.max(1));
        Duration::from_millis(sampled_ms)
    }
}

impl Default for StandardRetry {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for StandardRetry {
    fn should_repeat(&self, outcome: AttemptOutcome<'_>) -> bool {
        let repeat = match outcome {
            AttemptOutcome::Response { status, .. } => {
                !status.is_success()
                    && (self.retryable_status_codes.is_empty()
                        || self.retryable_status_codes.contains(&status.as_u16()))
            }
            AttemptOutcome::Error(error) => {
                self.retryable_error_kinds.is_empty()
                    || self.retryable_error_kinds.contains(&error.kind())
            }
        };
        debug!(?outcome, repeat, "retry decision");
        repeat
    }

    fn delay_before_next_attempt(&self, attempt: usize) -> bool {
        if attempt > self.max_retries {
            debug!(attempt, max_retries = self.max_retries, "retry budget exhausted");
            return false;
        }
        let backoff = self.backoff_for_attempt(attempt);
        debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retry backoff");
        if !backoff.is_zero() {
            std::thread::sleep(backoff);
        }
        true
    }
}

/// Cancellation flag checked between attempts. A call already in flight is not
/// interrupted.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, StatusCode};

    use super::{AbortSignal, AttemptOutcome, NoRetry, RetryPolicy, StandardRetry};
    use crate::error::{TransportError, TransportErrorKind};

    fn response(status: u16, headers: &HeaderMap) -> AttemptOutcome<'_> {
        AttemptOutcome::Response {
            status: StatusCode::from_u16(status).expect("valid status"),
            headers,
        }
    }

    #[test]
    fn no_retry_never_repeats() {
        let headers = HeaderMap::new();
        assert!(!NoRetry.should_repeat(response(503, &headers)));
        assert!(!NoRetry.delay_before_next_attempt(1));
    }

    #[test]
    fn standard_retry_repeats_only_non_success_statuses() {
        let headers = HeaderMap::new();
        let policy = StandardRetry::new();
        assert!(!policy.should_repeat(response(200, &headers)));
        assert!(!policy.should_repeat(response(204, &headers)));
        assert!(policy.should_repeat(response(404, &headers)));
        assert!(policy.should_repeat(response(503, &headers)));

        let narrowed = StandardRetry::new().retryable_status_codes([503]);
        assert!(narrowed.should_repeat(response(503, &headers)));
        assert!(!narrowed.should_repeat(response(500, &headers)));
    }

    #[test]
    fn standard_retry_filters_transport_error_kinds() {
        let timeout = TransportError::from_message(TransportErrorKind::Timeout, "timed out");
        let tls = TransportError::from_message(TransportErrorKind::Tls, "bad certificate");

        assert!(StandardRetry::new().should_repeat(AttemptOutcome::Error(&tls)));

        let policy = StandardRetry::new().retryable_error_kinds([TransportErrorKind::Timeout]);
        assert!(policy.should_repeat(AttemptOutcome::Error(&timeout)));
        assert!(!policy.should_repeat(AttemptOutcome::Error(&tls)));
    }

    #[test]
    fn delay_stops_after_max_retries() {
        let policy = StandardRetry::new()
            .max_retries(2)
            .base_backoff(Duration::ZERO);
        assert_eq!(
            StandardRetry::new().configured_max_retries(),
            StandardRetry::DEFAULT_MAX_RETRIES
        );
        assert_eq!(policy.configured_max_retries(), 2);
        assert!(policy.delay_before_next_attempt(1));
        assert!(policy.delay_before_next_attempt(2));
        assert!(!policy.delay_before_next_attempt(3));
    }

    #[test]
    fn linear_backoff_is_capped() {
        let policy = StandardRetry::new()
            .base_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_millis(250));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(5), Duration::from_millis(250));
    }

    #[test]
    fn explicit_delays_reuse_last_entry() {
        let policy = StandardRetry::new().delays([
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]);
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(5));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(10));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(20));
        assert_eq!(policy.backoff_for_attempt(9), Duration::from_millis(20));
    }

    #[test]
    fn jittered_backoff_never_exceeds_configured_max_backoff() {
        let policy = StandardRetry::new()
            .base_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_millis(120))
            .jitter_ratio(1.0);

        for _ in 0..256 {
            assert!(policy.backoff_for_attempt(3) <= Duration::from_millis(120));
        }
    }

    #[test]
    fn abort_signal_is_shared_between_clones() {
        let signal = AbortSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_aborted());
        signal.abort();
        assert!(observer.is_aborted());
    }
}
