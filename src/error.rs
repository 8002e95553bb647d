//! Error taxonomy: a four-valued [`Status`] plus the `thiserror`-derived
//! error types built from it.
//!
//! `Status` covers the four states a queue operation can end in (`success`,
//! `empty`, `full`, `closed`), with fixed textual messages so a caller who
//! only wants the status code can still reconstruct a stable message.

use thiserror::Error;

/// The four states a queue operation can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Empty,
    Full,
    Closed,
}

impl Status {
    /// A fixed, stable message for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Empty => "queue is empty",
            Status::Full => "queue is full",
            Status::Closed => "queue is closed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation found (or observed while waiting) that the queue is closed.
/// Carries back whatever value the caller tried to hand to a push, the way
/// `std::sync::mpsc::SendError` does, so a rejected send doesn't silently
/// drop the value.
#[derive(Debug, Error)]
#[error("{}", Status::Closed)]
pub struct ClosedError<T>(pub T);

impl<T> ClosedError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Result of a non-blocking `try_push`.
#[derive(Debug, Error)]
pub enum TrySendError<T> {
    #[error("{}", Status::Full)]
    Full(T),
    #[error("{}", Status::Closed)]
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) => v,
            TrySendError::Closed(v) => v,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            TrySendError::Full(_) => Status::Full,
            TrySendError::Closed(_) => Status::Closed,
        }
    }
}

/// Result of a non-blocking `try_pop`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("{}", Status::Empty)]
    Empty,
    #[error("{}", Status::Closed)]
    Closed,
}

impl TryRecvError {
    pub fn status(self) -> Status {
        match self {
            TryRecvError::Empty => Status::Empty,
            TryRecvError::Closed => Status::Closed,
        }
    }
}

/// A catch-all error type for callers who want a single error type rather
/// than the more specific `TrySendError`/`TryRecvError`/`ClosedError` family.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0}")]
pub struct QueueError(pub Status);

impl QueueError {
    pub fn status(self) -> Status {
        self.0
    }
}

impl<T> From<ClosedError<T>> for QueueError {
    fn from(_: ClosedError<T>) -> Self {
        QueueError(Status::Closed)
    }
}

impl From<TryRecvError> for QueueError {
    fn from(e: TryRecvError) -> Self {
        QueueError(e.status())
    }
}

impl<T> From<TrySendError<T>> for QueueError {
    fn from(e: TrySendError<T>) -> Self {
        QueueError(e.status())
    }
}

/// The failure half of `async_push`'s output. Distinct from [`TrySendError`]
/// because a suspending push has a third way to end besides `success` and
/// `closed`: the caller's cancellation token fired (or the future was
/// dropped) while it was parked as a push-waiter. This mirrors the
/// `set_value` / `set_error` / `set_stopped` three-way split a suspending
/// operation resolves to; `set_error` has no analogue here since this crate
/// has no fallible allocation step to surface.
#[derive(Debug, Error)]
pub enum AsyncSendError<T> {
    #[error("{}", Status::Closed)]
    Closed(T),
    #[error("operation was cancelled")]
    Cancelled(T),
}

impl<T> AsyncSendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            AsyncSendError::Closed(v) => v,
            AsyncSendError::Cancelled(v) => v,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AsyncSendError::Cancelled(_))
    }
}

/// The failure half of `async_pop`'s output; see [`AsyncSendError`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AsyncRecvError {
    #[error("{}", Status::Closed)]
    Closed,
    #[error("operation was cancelled")]
    Cancelled,
}

impl AsyncRecvError {
    pub fn is_cancelled(self) -> bool {
        matches!(self, AsyncRecvError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_messages_are_stable() {
        assert_eq!(Status::Success.as_str(), "success");
        assert_eq!(Status::Empty.as_str(), "queue is empty");
        assert_eq!(Status::Full.as_str(), "queue is full");
        assert_eq!(Status::Closed.as_str(), "queue is closed");
    }

    #[test]
    fn try_send_error_carries_value_back() {
        let err = TrySendError::Full(42);
        assert_eq!(err.status(), Status::Full);
        assert_eq!(err.into_inner(), 42);
    }
}
