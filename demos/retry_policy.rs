use std::sync::Arc;
use std::time::Duration;

use fluentreq::prelude::{
    AbortSignal, AttemptOutcome, Request, RetryPolicy, StandardRetry, TransportErrorKind,
};

/// Retries only on 429, pausing a fixed 250ms between attempts.
struct RetryAfter {
    max_retries: usize,
}

impl RetryPolicy for RetryAfter {
    fn should_repeat(&self, outcome: AttemptOutcome<'_>) -> bool {
        matches!(outcome, AttemptOutcome::Response { status, .. } if status.as_u16() == 429)
    }

    fn delay_before_next_attempt(&self, attempt: usize) -> bool {
        if attempt > self.max_retries {
            return false;
        }
        std::thread::sleep(Duration::from_millis(250));
        true
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let standard = StandardRetry::new()
        .max_retries(3)
        .retryable_status_codes([429, 502, 503, 504])
        .retryable_error_kinds([TransportErrorKind::Connect, TransportErrorKind::Timeout])
        .base_backoff(Duration::from_millis(100))
        .max_backoff(Duration::from_millis(800))
        .jitter_ratio(0.2);

    match Request::<String>::new("https://httpbin.org")
        .path("/status/503")
        .retry(standard)
        .fetch()
    {
        Ok(body) => println!("GET /status/503 => {body}"),
        Err(error) => println!("GET /status/503 => {} ({})", error, error.code().as_str()),
    }

    let abort = AbortSignal::new();
    let policy = Arc::new(RetryAfter { max_retries: 2 });
    let mut request = Request::<String>::new("https://httpbin.org")
        .path("/status/429")
        .retry(Arc::clone(&policy))
        .abort_on(&abort);
    abort.abort();
    match request.fetch() {
        Ok(body) => println!("GET /status/429 => {body}"),
        Err(error) => println!("GET /status/429 => {error}"),
    }
    Ok(())
}
