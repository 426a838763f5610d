// crates/certmagic-store-core/src/model/context.rs
// ============================================================================
// Module: Operation Context
// Description: Per-call deadline and cancellation signal.
// Purpose: Bound every storage call so a stuck backend cannot hang callers.
// Dependencies: std
// ============================================================================

//! ## Overview
//! An [`OpContext`] travels with every storage call. Backends combine the
//! caller's deadline with their own configured query timeout and abort the
//! in-flight database work when either the deadline passes or the attached
//! [`CancelToken`] fires.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::interfaces::StorageError;

// ============================================================================
// SECTION: Cancel Token
// ============================================================================

/// Shared cancellation flag.
///
/// Clones observe the same flag; cancelling one cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// Flag set once cancellation is requested.
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Operation Context
// ============================================================================

/// Deadline and cancellation carried by a single storage call.
///
/// # Invariants
/// - `deadline`, when set, is an absolute monotonic instant.
/// - A context with no deadline is only bounded by the backend timeout.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Absolute deadline for the call.
    deadline: Option<Instant>,
    /// Optional cancellation token.
    cancel: Option<CancelToken>,
}

impl OpContext {
    /// Returns a context with no deadline and no cancellation.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    /// Returns a context that expires at `deadline`.
    #[must_use]
    pub const fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attaches a cancellation token to the context.
    #[must_use]
    pub fn cancellable(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the caller deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the attached cancellation token, if any.
    #[must_use]
    pub const fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    /// Returns true when the attached token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Returns the earlier of the caller deadline and `now + budget`.
    #[must_use]
    pub fn bounded_deadline(&self, budget: Duration) -> Instant {
        let now = Instant::now();
        let local = now.checked_add(budget).unwrap_or(now);
        match self.deadline {
            Some(deadline) if deadline < local => deadline,
            _ => local,
        }
    }

    /// Fails fast when the context is already cancelled or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Cancelled`] or [`StorageError::Timeout`].
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled("operation cancelled by caller".to_string()));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(StorageError::Timeout("operation deadline exceeded".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
