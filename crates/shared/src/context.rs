//! Correlation ids and request-scoped context.
//!
//! Every orchestrator operation creates a [`RequestContext`] carrying an
//! opaque correlation id and a cooperative cancellation token. The id is
//! threaded through forge calls, pipeline stages, and log lines so traces
//! can be joined across components.

use crate::{ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

/// An opaque correlation identifier used for logging and client calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                crate::ErrorCode::invalid_input(),
                "correlation id must be non-empty",
            ));
        }
        Ok(Self(Arc::<str>::from(trimmed)))
    }

    /// Create a new operation id, best-effort unique within this process.
    #[must_use]
    pub fn new_operation_id() -> Self {
        next_scoped_id(&OPERATION_ID_COUNTER, "op_")
    }

    /// Create a new update id, best-effort unique within this process.
    #[must_use]
    pub fn new_update_id() -> Self {
        next_scoped_id(&UPDATE_ID_COUNTER, "upd_")
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static OPERATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static UPDATE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_scoped_id(counter: &AtomicU64, prefix: &'static str) -> CorrelationId {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    CorrelationId(Arc::<str>::from(format!("{prefix}{n}").as_str()))
}

/// A clonable cancellation token that can be awaited.
///
/// Cancellation is best-effort: work that has not started is skipped;
/// in-flight work completes unless it cooperates at a suspension point.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel the token and wake all current/future waiters.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new request context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Convenience constructor: create a context with an auto-generated `op_*` id.
    #[must_use]
    pub fn new_operation() -> Self {
        Self::new(CorrelationId::new_operation_id())
    }

    /// Create a context with an explicit cancellation token (for sharing cancellation).
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(
                ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique_per_scope() {
        let first = CorrelationId::new_operation_id();
        let second = CorrelationId::new_operation_id();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("op_"));
        assert!(CorrelationId::new_update_id().as_str().starts_with("upd_"));
    }

    #[test]
    fn correlation_id_rejects_empty_input() {
        assert!(CorrelationId::parse("   ").is_err());
    }

    #[test]
    fn cancellation_is_observable() -> Result<()> {
        let ctx = RequestContext::new_operation();
        ctx.ensure_not_cancelled("test")?;
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.ensure_not_cancelled("test").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        assert!(handle.await.is_ok());
    }
}
