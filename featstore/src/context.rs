//! Cancellation and deadline signal passed to every store operation.
//!
//! A [`Context`] pairs a [`CancellationToken`] with an optional deadline.
//! Operations call [`Context::check`] on entry; scans over many entities
//! re-check every [`CANCEL_CHECK_INTERVAL`] entities. Cancellation never
//! rolls back a mutation that already started.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::CancelError;

/// Number of entities visited between cancellation checks during scans.
pub const CANCEL_CHECK_INTERVAL: usize = 64;

/// Cancellation token plus optional deadline.
///
/// Cloning a context shares its token: cancelling any clone cancels all.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use featstore::Context;
///
/// let ctx = Context::background();
/// assert!(ctx.check().is_ok());
///
/// let child = ctx.child().with_timeout(Duration::from_secs(5));
/// ctx.cancel();
/// assert!(child.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wraps an existing token, for callers that already manage one.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns a context that expires `timeout` from now.
    ///
    /// An earlier deadline already set on `self` is kept. A timeout too
    /// large to represent as an [`Instant`] sets no deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Returns a context that expires at `deadline`.
    ///
    /// An earlier deadline already set on `self` is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Creates a child context: cancelling the parent cancels the child, not
    /// the other way round. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Triggers cancellation for this context and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns an error if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// [`CancelError::Cancelled`] takes precedence over
    /// [`CancelError::DeadlineExceeded`].
    #[inline]
    pub fn check(&self) -> Result<(), CancelError> {
        if self.token.is_cancelled() {
            return Err(CancelError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CancelError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
