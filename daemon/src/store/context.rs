use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{Op, StoreError};

/// Per-operation context for store calls.
///
/// Carries a cancellation token and optional deadline, checked before the
/// store lock is taken, once it is held, and before any write is issued.
/// A context may also pin the reference time used for expiry filtering,
/// otherwise the wall clock is read once per operation.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    now: Option<DateTime<Utc>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the context to an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Pin the reference time for expiry filtering
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reference time for the operation
    pub fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Time remaining before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the context has been cancelled or the deadline has passed
    pub fn check(&self, op: Op) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled { op });
        }

        if let Some(d) = self.deadline {
            if Instant::now() >= d {
                return Err(StoreError::DeadlineExceeded { op });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_cancel() {
        let token = CancellationToken::new();
        let ctx = Context::new().with_cancel(token.clone());

        assert!(ctx.check(Op::BeaconSources).is_ok());

        token.cancel();
        assert!(matches!(
            ctx.check(Op::BeaconSources),
            Err(StoreError::Cancelled {
                op: Op::BeaconSources
            })
        ));
    }

    #[test]
    fn context_deadline() {
        let ctx = Context::new().with_deadline(Instant::now());

        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert!(matches!(
            ctx.check(Op::DeleteExpired),
            Err(StoreError::DeadlineExceeded { .. })
        ));

        let ctx = Context::new().with_timeout(Duration::from_secs(60));
        assert!(ctx.check(Op::DeleteExpired).is_ok());
        assert!(ctx.remaining().unwrap() > Duration::from_secs(30));
    }
}
