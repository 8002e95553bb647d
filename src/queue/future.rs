//! Suspending `async_push`/`async_pop` operations.
//!
//! These behave like senders that, once connected to a receiver, resolve to
//! exactly one of a value, an error, or a cancellation. Rust's
//! `std::future::Future` already collapses that into one trait: `poll` plays
//! connect-and-start, `Poll::Ready` plays the value/error resolution, and
//! cancellation has no separate signal because it is just "dropped before
//! completion" — the same guarantee every Rust future already gets for
//! free. This module's `Drop` impls are where that guarantee is paid for: a
//! linked waiter must be unlinked before its memory goes away.

use std::future::Future;
use std::pin::Pin;
use std::ptr::NonNull;
use std::task::{Context, Poll};

use crate::cancel::{CallbackId, CancellationToken};
use crate::error::{AsyncRecvError, AsyncSendError};

use super::{LinkOutcome, PopNode, PushNode, Queue, Resolution, SendPtr, Wakes};

/// Where a `PushFuture`/`PopFuture` is in its one-shot lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    /// Not yet polled; the fast path hasn't been attempted.
    Initial,
    /// The fast path failed and the embedded node is linked into a waiter
    /// list, waiting for a partner, `close`, or cancellation.
    Linked,
    /// Resolved; polling again is a caller bug.
    Done,
}

/// The future returned by [`Queue::async_push`].
///
/// Pinned for its whole lifetime once polled: the embedded [`PushNode`] is
/// `!Unpin` and may be linked into the queue's intrusive waiter list, so
/// moving it while linked would corrupt the list. `Drop` unlinks it if that
/// never happened on its own.
pub struct PushFuture<'a, T> {
    queue: &'a Queue<T>,
    token: Option<CancellationToken>,
    callback_id: Option<CallbackId>,
    state: State,
    node: PushNode<T>,
}

impl<'a, T> PushFuture<'a, T> {
    pub(crate) fn new(queue: &'a Queue<T>, value: T) -> PushFuture<'a, T> {
        PushFuture {
            queue,
            token: None,
            callback_id: None,
            state: State::Initial,
            node: PushNode::new(value),
        }
    }

    /// Attaches a [`CancellationToken`]: if it is already cancelled, or is
    /// cancelled while this future is linked as a push-waiter, the future
    /// resolves to `Err(AsyncSendError::Cancelled(_))` instead of waiting
    /// forever.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }
}

impl<T> Future for PushFuture<'_, T> {
    type Output = Result<(), AsyncSendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: we never move `node` out of `self`, only read/write its
        // fields through shared references and the queue's mutex.
        let this = unsafe { self.get_unchecked_mut() };

        match this.state {
            State::Done => panic!("PushFuture polled after completion"),

            State::Initial => {
                if let Some(token) = &this.token {
                    if token.is_cancelled() {
                        this.state = State::Done;
                        let v = this
                            .node
                            .take_value()
                            .expect("unresolved push-waiter keeps its value");
                        return Poll::Ready(Err(AsyncSendError::Cancelled(v)));
                    }
                }

                let node_ptr = NonNull::from(&this.node);
                let mut wakes = Wakes::default();
                let outcome = {
                    let mut guard = this.queue.inner.state.lock().unwrap();
                    // Pre-arm the waker before the node can possibly become
                    // visible to a partner: once `try_push_or_link` links it
                    // under this same lock, the partner may read it the
                    // instant we release the guard.
                    this.node.set_waker(cx.waker().clone());
                    guard.try_push_or_link(node_ptr, &mut wakes)
                };
                wakes.run(&this.queue.inner.condvar);

                match outcome {
                    LinkOutcome::Completed => {
                        this.state = State::Done;
                        #[cfg(feature = "trace")]
                        tracing::trace!("async_push completed on the fast path");
                        Poll::Ready(Ok(()))
                    }
                    LinkOutcome::Closed => {
                        this.state = State::Done;
                        let v = this
                            .node
                            .take_value()
                            .expect("unresolved push-waiter keeps its value");
                        Poll::Ready(Err(AsyncSendError::Closed(v)))
                    }
                    LinkOutcome::Linked => {
                        this.state = State::Linked;
                        if let Some(token) = &this.token {
                            let queue = this.queue.clone();
                            let ptr = SendPtr(node_ptr);
                            this.callback_id = token.arm(move || queue.cancel_push_waiter(ptr.0));
                        }
                        #[cfg(feature = "trace")]
                        tracing::trace!("async_push linked a push-waiter");
                        Poll::Pending
                    }
                }
            }

            State::Linked => {
                let mut guard = this.queue.inner.state.lock().unwrap();
                match this.node.resolution() {
                    None => {
                        // Different poll, possibly a different waker.
                        this.node.set_waker(cx.waker().clone());
                        drop(guard);
                        Poll::Pending
                    }
                    Some(resolution) => {
                        drop(guard);
                        this.state = State::Done;
                        match resolution {
                            Resolution::Ready => Poll::Ready(Ok(())),
                            Resolution::Closed => {
                                let v = this
                                    .node
                                    .take_value()
                                    .expect("closed push-waiter keeps its value");
                                Poll::Ready(Err(AsyncSendError::Closed(v)))
                            }
                            Resolution::Cancelled => {
                                let v = this
                                    .node
                                    .take_value()
                                    .expect("cancelled push-waiter keeps its value");
                                Poll::Ready(Err(AsyncSendError::Cancelled(v)))
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<T> Drop for PushFuture<'_, T> {
    fn drop(&mut self) {
        if self.state != State::Linked {
            return;
        }

        // `reset` must happen before we touch the waiter list ourselves: it
        // synchronizes with an in-flight cancellation callback, so once it
        // returns nothing else still expects `node_ptr` to stay valid.
        if let Some(token) = self.token.take() {
            token.reset(self.callback_id.take());
        }

        let node_ptr = NonNull::from(&self.node);
        let mut guard = self.queue.inner.state.lock().unwrap();
        unsafe {
            guard.push_waiters.try_remove(node_ptr);
        }
    }
}

/// The future returned by [`Queue::async_pop`]. Mirror of [`PushFuture`].
pub struct PopFuture<'a, T> {
    queue: &'a Queue<T>,
    token: Option<CancellationToken>,
    callback_id: Option<CallbackId>,
    state: State,
    node: PopNode<T>,
}

impl<'a, T> PopFuture<'a, T> {
    pub(crate) fn new(queue: &'a Queue<T>) -> PopFuture<'a, T> {
        PopFuture {
            queue,
            token: None,
            callback_id: None,
            state: State::Initial,
            node: PopNode::new(),
        }
    }

    /// See [`PushFuture::with_cancellation`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }
}

impl<T> Future for PopFuture<'_, T> {
    type Output = Result<T, AsyncRecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Safety: see `PushFuture::poll`.
        let this = unsafe { self.get_unchecked_mut() };

        match this.state {
            State::Done => panic!("PopFuture polled after completion"),

            State::Initial => {
                if let Some(token) = &this.token {
                    if token.is_cancelled() {
                        this.state = State::Done;
                        return Poll::Ready(Err(AsyncRecvError::Cancelled));
                    }
                }

                let node_ptr = NonNull::from(&this.node);
                let mut wakes = Wakes::default();
                let outcome = {
                    let mut guard = this.queue.inner.state.lock().unwrap();
                    this.node.set_waker(cx.waker().clone());
                    guard.try_pop_or_link(node_ptr, &mut wakes)
                };
                wakes.run(&this.queue.inner.condvar);

                match outcome {
                    LinkOutcome::Completed => {
                        this.state = State::Done;
                        #[cfg(feature = "trace")]
                        tracing::trace!("async_pop completed on the fast path");
                        let v = this
                            .node
                            .take_value()
                            .expect("completed pop-waiter has a value");
                        Poll::Ready(Ok(v))
                    }
                    LinkOutcome::Closed => {
                        this.state = State::Done;
                        Poll::Ready(Err(AsyncRecvError::Closed))
                    }
                    LinkOutcome::Linked => {
                        this.state = State::Linked;
                        if let Some(token) = &this.token {
                            let queue = this.queue.clone();
                            let ptr = SendPtr(node_ptr);
                            this.callback_id = token.arm(move || queue.cancel_pop_waiter(ptr.0));
                        }
                        #[cfg(feature = "trace")]
                        tracing::trace!("async_pop linked a pop-waiter");
                        Poll::Pending
                    }
                }
            }

            State::Linked => {
                let mut guard = this.queue.inner.state.lock().unwrap();
                match this.node.resolution() {
                    None => {
                        this.node.set_waker(cx.waker().clone());
                        drop(guard);
                        Poll::Pending
                    }
                    Some(resolution) => {
                        drop(guard);
                        this.state = State::Done;
                        match resolution {
                            Resolution::Ready => Poll::Ready(Ok(this
                                .node
                                .take_value()
                                .expect("ready pop-waiter has a value"))),
                            Resolution::Closed => Poll::Ready(Err(AsyncRecvError::Closed)),
                            Resolution::Cancelled => Poll::Ready(Err(AsyncRecvError::Cancelled)),
                        }
                    }
                }
            }
        }
    }
}

impl<T> Drop for PopFuture<'_, T> {
    fn drop(&mut self) {
        if self.state != State::Linked {
            return;
        }

        if let Some(token) = self.token.take() {
            token.reset(self.callback_id.take());
        }

        let node_ptr = NonNull::from(&self.node);
        let mut guard = self.queue.inner.state.lock().unwrap();
        unsafe {
            guard.pop_waiters.try_remove(node_ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Queue;
    use crate::cancel::CancellationToken;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn async_push_pop_round_trip() {
        let q: Queue<i32> = Queue::new(2);
        q.async_push(1).await.unwrap();
        q.async_push(2).await.unwrap();
        assert_eq!(q.async_pop().await.unwrap(), 1);
        assert_eq!(q.async_pop().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn async_pop_completes_on_close() {
        let q: Queue<i32> = Queue::new(1);
        q.close();
        assert!(q.async_pop().await.unwrap_err() == crate::error::AsyncRecvError::Closed);
    }

    #[tokio::test]
    async fn async_pop_rendezvous_with_async_push() {
        let q: Queue<i32> = Queue::rendezvous();
        let producer = q.clone();
        let handle = tokio::spawn(async move {
            for i in 1..=4 {
                producer.async_push(i).await.unwrap();
            }
        });

        for expected in 1..=4 {
            assert_eq!(q.async_pop().await.unwrap(), expected);
        }
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn async_pop_cancellation_on_empty_queue_completes_and_unlinks() {
        let q: Queue<i32> = Queue::new(1);
        let token = CancellationToken::new();
        let cancel_handle = token.clone();

        let mut fut = tokio_test::task::spawn(q.async_pop().with_cancellation(token));
        // Poll once to get it linked as a pop-waiter.
        assert_pending!(fut.poll());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_handle.cancel();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = assert_ready!(fut.poll());
        assert!(result.unwrap_err().is_cancelled());
        assert!(q.try_push(1).is_ok());
        assert_eq!(q.try_pop().unwrap(), 1);
    }
}
