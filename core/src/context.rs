//! Cancellation and deadline context threaded through synthesized requests.
//!
//! The dispatcher never observes the context itself. It only inserts it into
//! the request extensions so the handler under test can react to it, e.g.
//! with axum's `Extension<RequestContext>` extractor.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Cancellation token plus an optional deadline.
///
/// Clones share the same token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh context together with the token that cancels it.
    pub fn with_cancel() -> (Self, CancellationToken) {
        let ctx = Self::default();
        let token = ctx.token.clone();
        (ctx, token)
    }

    /// Derive a context that expires at `deadline`. An earlier deadline
    /// already present on `self` is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Derive a context that expires after `timeout`. A timeout too large
    /// to represent as an `Instant` leaves the deadline unchanged.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `None` while the context is live; the reason once it is done.
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// The context attached to a request by the dispatcher, if any.
    pub fn from_request<B>(request: &http::Request<B>) -> Option<&Self> {
        request.extensions().get::<Self>()
    }
}
