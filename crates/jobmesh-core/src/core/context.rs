// jobmesh-core/src/core/context.rs
// ============================================================================
// Module: Jobmesh Operation Context
// Description: Deadline and cooperative cancellation for public operations.
// Purpose: Let long batch operations stop promptly when asked to.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every public operation receives an [`OperationContext`]. Components call
//! [`OperationContext::check`] at each suspension point (database call,
//! plugin call, HTTP call) and use [`OperationContext::remaining`] to bound
//! blocking I/O. Clones share the cancellation flag, so cancelling any clone
//! cancels the whole operation tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_CONTEXT;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Deadline plus shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Optional absolute deadline.
    deadline: Option<Instant>,
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl OperationContext {
    /// Creates a context with no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derives a child sharing cancellation with a tighter deadline.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };
        Self {
            deadline,
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Cancels the context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fails when the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns an internal error naming the reason.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.is_cancelled() {
            return Err(DomainError::internal(ENTITY_CONTEXT, "context canceled"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(DomainError::internal(ENTITY_CONTEXT, "context deadline exceeded"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test assertions use unwrap/expect for clarity."
    )]

    use super::*;

    #[test]
    fn cancel_propagates_to_clones() {
        let ctx = OperationContext::background();
        let clone = ctx.clone();
        assert!(clone.check().is_ok());
        ctx.cancel();
        assert_eq!(clone.check().unwrap_err().message, "context canceled");
    }

    #[test]
    fn expired_deadline_fails_check() {
        let ctx = OperationContext::with_timeout(Duration::ZERO);
        assert_eq!(ctx.check().unwrap_err().message, "context deadline exceeded");
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn child_keeps_tighter_deadline() {
        let parent = OperationContext::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(3600));
        assert!(child.remaining().unwrap() <= Duration::from_secs(1));
    }
}
