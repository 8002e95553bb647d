//! `convoy` is a bounded, mutex-guarded concurrent queue that brokers values
//! of type `T` between producers and consumers.
//!
//! A queue buffers at most [`Queue::capacity`] values; a zero-capacity queue
//! is a *rendezvous* queue, where every transfer pairs one producer directly
//! with one consumer under the lock. Callers may block the current OS
//! thread ([`Queue::push`]/[`Queue::pop`]) or await a [`Future`]
//! ([`Queue::async_push`]/[`Queue::async_pop`]); either side can
//! [`Queue::close`] the queue, and a suspended operation can be cancelled
//! either implicitly (drop the future before it resolves) or explicitly (via
//! a [`cancel::CancellationToken`]).
//!
//! This is not a lock-free structure: all state lives behind one
//! [`std::sync::Mutex`], and fairness is FIFO only among waiters of the same
//! kind. There is no persistence, distribution, priority, per-item
//! expiration, or batch push/pop.
//!
//! [`Future`]: std::future::Future
//!
//! # Example
//!
//! ```
//! use convoy::Queue;
//!
//! let q: Queue<i32> = Queue::new(2);
//! q.push(1).unwrap();
//! q.push(2).unwrap();
//! assert!(q.try_push(3).is_err());
//! assert_eq!(q.pop().unwrap(), 1);
//! assert_eq!(q.pop().unwrap(), 2);
//! ```

pub mod cancel;
pub mod error;
pub mod queue;
mod ring;
mod util;

pub use cancel::CancellationToken;
pub use error::{
    AsyncRecvError, AsyncSendError, ClosedError, QueueError, Status, TryRecvError, TrySendError,
};
pub use queue::{PopFuture, PushFuture, Queue};
