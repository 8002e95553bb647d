//! The queue core: buffering, closing, waiter queues, signalling and the
//! rendezvous protocol.
//!
//! `Shared<T>` holds everything behind the single mutex; `Queue<T>` is a
//! cheap `Arc` handle around it. A single `Condvar` wakes every blocked
//! thread on any state change; each one re-checks its own waiter's outcome
//! before going back to sleep, so spurious wakeups are harmless and no
//! per-waiter signalling primitive is needed for the blocking path.

pub mod future;

use std::marker::PhantomPinned;
use std::ptr::NonNull;
use std::sync::{Arc, Condvar, Mutex};
use std::task::Waker;

use crate::cancel::{CallbackId, CancellationToken};
use crate::error::{AsyncRecvError, AsyncSendError, ClosedError, TryRecvError, TrySendError};
use crate::ring::RingBuffer;
use crate::util::linked_list::{Link, LinkedList, Pointers};
use crate::util::macros::generate_addr_of_methods;
use crate::util::unsafe_cell::UnsafeCell;

pub use future::{PopFuture, PushFuture};

/// How a waiter's wait ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Resolution {
    Ready,
    Closed,
    Cancelled,
}

/// A push-waiter: the value a producer is trying to hand off, plus the link
/// fields and the wake-up mechanism. Lives in the caller's stack frame
/// (blocking `push`) or inside a [`PushFuture`] (`async_push`); never
/// allocated by the queue itself.
pub(crate) struct PushNode<T> {
    pointers: Pointers<PushNode<T>>,
    value: UnsafeCell<Option<T>>,
    resolution: UnsafeCell<Option<Resolution>>,
    waker: UnsafeCell<Option<Waker>>,
    _pin: PhantomPinned,
}

impl<T> PushNode<T> {
    pub(crate) fn new(value: T) -> PushNode<T> {
        PushNode {
            pointers: Pointers::new(),
            value: UnsafeCell::new(Some(value)),
            resolution: UnsafeCell::new(None),
            waker: UnsafeCell::new(None),
            _pin: PhantomPinned,
        }
    }

    generate_addr_of_methods! {
        impl<T> PushNode {
            unsafe fn addr_of_pointers(self: NonNull<Self>) -> NonNull<Pointers<PushNode<T>>> {
                &self.pointers
            }
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        self.resolution.with(|p| unsafe { (*p) })
    }

    fn set_resolution(&self, r: Resolution) {
        self.resolution.with_mut(|p| unsafe { (*p) = Some(r) });
    }

    fn take_value(&self) -> Option<T> {
        self.value.with_mut(|p| unsafe { (*p).take() })
    }

    fn put_value(&self, v: T) {
        self.value.with_mut(|p| unsafe { (*p) = Some(v) });
    }

    fn set_waker(&self, w: Waker) {
        self.waker.with_mut(|p| unsafe { (*p) = Some(w) });
    }

    fn take_waker(&self) -> Option<Waker> {
        self.waker.with_mut(|p| unsafe { (*p).take() })
    }
}

/// A pop-waiter: a result slot a consumer is waiting to have filled, plus
/// link fields and a wake-up mechanism. Mirror of [`PushNode`].
pub(crate) struct PopNode<T> {
    pointers: Pointers<PopNode<T>>,
    value: UnsafeCell<Option<T>>,
    resolution: UnsafeCell<Option<Resolution>>,
    waker: UnsafeCell<Option<Waker>>,
    _pin: PhantomPinned,
}

impl<T> PopNode<T> {
    pub(crate) fn new() -> PopNode<T> {
        PopNode {
            pointers: Pointers::new(),
            value: UnsafeCell::new(None),
            resolution: UnsafeCell::new(None),
            waker: UnsafeCell::new(None),
            _pin: PhantomPinned,
        }
    }

    generate_addr_of_methods! {
        impl<T> PopNode {
            unsafe fn addr_of_pointers(self: NonNull<Self>) -> NonNull<Pointers<PopNode<T>>> {
                &self.pointers
            }
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        self.resolution.with(|p| unsafe { (*p) })
    }

    fn set_resolution(&self, r: Resolution) {
        self.resolution.with_mut(|p| unsafe { (*p) = Some(r) });
    }

    fn take_value(&self) -> Option<T> {
        self.value.with_mut(|p| unsafe { (*p).take() })
    }

    fn put_value(&self, v: T) {
        self.value.with_mut(|p| unsafe { (*p) = Some(v) });
    }

    fn set_waker(&self, w: Waker) {
        self.waker.with_mut(|p| unsafe { (*p) = Some(w) });
    }

    fn take_waker(&self) -> Option<Waker> {
        self.waker.with_mut(|p| unsafe { (*p).take() })
    }
}

/// `NonNull` is itself `!Send`; a waiter node lives in the caller's stack
/// frame (blocking `push`/`pop`) or inside a future for the duration it is
/// linked, and is only ever touched while the queue mutex is held, so it is
/// sound to ferry the raw pointer into a cancellation callback that may run
/// on another thread.
struct SendPtr<T>(NonNull<T>);
unsafe impl<T> Send for SendPtr<T> {}

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SendPtr<T> {}

/// Outcome of attempting a fast-path transfer before linking a waiter.
/// `try_push_or_link`/`try_pop_or_link` fold the "check, else link" step
/// into one lock-held call so a concurrent partner operation can never
/// observe the moment between the check and the link (splitting it across
/// two lock acquisitions would let a push and a pop both believe they own
/// the same slot).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum LinkOutcome {
    Completed,
    Linked,
    Closed,
}

struct PushLink<T>(std::marker::PhantomData<T>);

unsafe impl<T> Link for PushLink<T> {
    type Handle = NonNull<PushNode<T>>;
    type Target = PushNode<T>;

    fn as_raw(handle: &NonNull<PushNode<T>>) -> NonNull<PushNode<T>> {
        *handle
    }

    unsafe fn from_raw(ptr: NonNull<PushNode<T>>) -> NonNull<PushNode<T>> {
        ptr
    }

    unsafe fn pointers(target: NonNull<PushNode<T>>) -> NonNull<Pointers<PushNode<T>>> {
        PushNode::addr_of_pointers(target)
    }
}

struct PopLink<T>(std::marker::PhantomData<T>);

unsafe impl<T> Link for PopLink<T> {
    type Handle = NonNull<PopNode<T>>;
    type Target = PopNode<T>;

    fn as_raw(handle: &NonNull<PopNode<T>>) -> NonNull<PopNode<T>> {
        *handle
    }

    unsafe fn from_raw(ptr: NonNull<PopNode<T>>) -> NonNull<PopNode<T>> {
        ptr
    }

    unsafe fn pointers(target: NonNull<PopNode<T>>) -> NonNull<Pointers<PopNode<T>>> {
        PopNode::addr_of_pointers(target)
    }
}

/// Everything a post-unlock step needs to finish waking whoever was just
/// resolved, collected while the mutex is held and executed only after it
/// is released, so a condvar notify or `Waker::wake` never runs with the
/// lock held.
#[derive(Default)]
struct Wakes {
    wakers: Vec<Waker>,
    notify: bool,
}

impl Wakes {
    fn push(&mut self, waker: Option<Waker>) {
        self.notify = true;
        if let Some(w) = waker {
            self.wakers.push(w);
        }
    }

    fn run(self, condvar: &Condvar) {
        if self.notify {
            condvar.notify_all();
        }
        for w in self.wakers {
            w.wake();
        }
    }
}

struct Shared<T> {
    buffer: RingBuffer<T>,
    closed: bool,
    push_waiters: LinkedList<PushLink<T>, PushNode<T>>,
    pop_waiters: LinkedList<PopLink<T>, PopNode<T>>,
}

impl<T> Shared<T> {
    fn new(capacity: usize) -> Shared<T> {
        Shared {
            buffer: RingBuffer::new(capacity),
            closed: false,
            push_waiters: LinkedList::new(),
            pop_waiters: LinkedList::new(),
        }
    }

    /// Attempts an immediate transfer, either to a waiting popper or into
    /// the buffer. Never blocks or links a waiter; the wake-up dispatch is
    /// left to the caller to run once the mutex is dropped.
    fn try_push(&mut self, v: T, wakes: &mut Wakes) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(v));
        }

        if let Some(popper) = self.pop_waiters.pop_front() {
            let popper = unsafe { popper.as_ref() };
            popper.put_value(v);
            popper.set_resolution(Resolution::Ready);
            wakes.push(popper.take_waker());
            #[cfg(feature = "trace")]
            tracing::trace!("try_push matched a pop-waiter directly");
            return Ok(());
        }

        if self.buffer.capacity() > 0 && !self.buffer.is_full() {
            self.buffer.push_back(v);
            return Ok(());
        }

        Err(TrySendError::Full(v))
    }

    /// Mirror of `try_push`: serves a waiting pusher first, then the buffer.
    fn try_pop(&mut self, wakes: &mut Wakes) -> Result<T, TryRecvError> {
        if let Some(pusher) = self.push_waiters.pop_front() {
            let pusher = unsafe { pusher.as_ref() };
            let v = pusher.take_value().expect("push-waiter without a value");
            pusher.set_resolution(Resolution::Ready);
            wakes.push(pusher.take_waker());
            #[cfg(feature = "trace")]
            tracing::trace!("try_pop matched a push-waiter directly");

            if self.buffer.capacity() > 0 {
                // Invariant: a push-waiter only exists when the buffer is
                // full, so there is always a head element to hand back,
                // keeping the waiter's value ordered behind it.
                let u = self.buffer.pop_front();
                self.buffer.push_back(v);
                return Ok(u);
            }
            return Ok(v);
        }

        if !self.buffer.is_empty() {
            return Ok(self.buffer.pop_front());
        }

        if self.closed {
            return Err(TryRecvError::Closed);
        }

        Err(TryRecvError::Empty)
    }

    /// Attempts delivery; on failure links `node_ptr` instead, atomically
    /// with the attempt. Used by every path that may need to wait (blocking
    /// and suspending alike) so the "check, else link" step is never split
    /// across two lock acquisitions — splitting it would let a concurrent
    /// pop open up room between the check and the link, linking a
    /// push-waiter while the buffer has space and breaking invariant 2.
    fn try_push_or_link(&mut self, node_ptr: NonNull<PushNode<T>>, wakes: &mut Wakes) -> LinkOutcome {
        if self.closed {
            return LinkOutcome::Closed;
        }

        let node = unsafe { node_ptr.as_ref() };

        if let Some(popper) = self.pop_waiters.pop_front() {
            let popper = unsafe { popper.as_ref() };
            popper.put_value(node.take_value().expect("unresolved push-waiter has a value"));
            popper.set_resolution(Resolution::Ready);
            wakes.push(popper.take_waker());
            return LinkOutcome::Completed;
        }

        if self.buffer.capacity() > 0 && !self.buffer.is_full() {
            self.buffer
                .push_back(node.take_value().expect("unresolved push-waiter has a value"));
            return LinkOutcome::Completed;
        }

        self.push_waiters.push_back(node_ptr);
        LinkOutcome::Linked
    }

    /// Dual of [`Shared::try_push_or_link`].
    fn try_pop_or_link(&mut self, node_ptr: NonNull<PopNode<T>>, wakes: &mut Wakes) -> LinkOutcome {
        if let Some(pusher) = self.push_waiters.pop_front() {
            let pusher = unsafe { pusher.as_ref() };
            let v = pusher.take_value().expect("push-waiter without a value");
            pusher.set_resolution(Resolution::Ready);
            wakes.push(pusher.take_waker());

            let node = unsafe { node_ptr.as_ref() };
            if self.buffer.capacity() > 0 {
                let u = self.buffer.pop_front();
                self.buffer.push_back(v);
                node.put_value(u);
            } else {
                node.put_value(v);
            }
            return LinkOutcome::Completed;
        }

        if !self.buffer.is_empty() {
            let v = self.buffer.pop_front();
            unsafe { node_ptr.as_ref() }.put_value(v);
            return LinkOutcome::Completed;
        }

        if self.closed {
            return LinkOutcome::Closed;
        }

        self.pop_waiters.push_back(node_ptr);
        LinkOutcome::Linked
    }

    fn close(&mut self, wakes: &mut Wakes) {
        if self.closed {
            return;
        }
        self.closed = true;

        while let Some(node) = self.push_waiters.pop_front() {
            let node = unsafe { node.as_ref() };
            node.set_resolution(Resolution::Closed);
            wakes.push(node.take_waker());
        }
        while let Some(node) = self.pop_waiters.pop_front() {
            let node = unsafe { node.as_ref() };
            node.set_resolution(Resolution::Closed);
            wakes.push(node.take_waker());
        }

        #[cfg(feature = "trace")]
        tracing::trace!("queue closed, waiter lists drained");
    }

    fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }
}

struct Inner<T> {
    state: Mutex<Shared<T>>,
    condvar: Condvar,
}

/// A bounded concurrent queue brokering values of `T` between producers and
/// consumers. Cloning is cheap (an `Arc` bump); every clone refers to the
/// same underlying state.
pub struct Queue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.state.lock().unwrap();
        f.debug_struct("Queue")
            .field("capacity", &guard.capacity())
            .field("len", &guard.len())
            .field("closed", &guard.closed)
            .finish()
    }
}

impl<T> Queue<T> {
    /// Constructs an empty, open queue. `capacity == 0` puts the queue in
    /// rendezvous mode.
    pub fn new(capacity: usize) -> Queue<T> {
        Queue {
            inner: Arc::new(Inner {
                state: Mutex::new(Shared::new(capacity)),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Alias for [`Queue::new`] that reads better when the capacity is
    /// known to be positive at the call site.
    pub fn bounded(capacity: usize) -> Queue<T> {
        Queue::new(capacity)
    }

    /// A zero-capacity queue: every transfer pairs one producer directly
    /// with one consumer.
    pub fn rendezvous() -> Queue<T> {
        Queue::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.lock().unwrap().capacity()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A rendezvous queue (`capacity() == 0`) has no backing storage at all,
    /// so it is permanently both empty and full: `is_empty()` and
    /// `is_full()` agree rather than disagree on a phantom buffer.
    pub fn is_full(&self) -> bool {
        let guard = self.inner.state.lock().unwrap();
        guard.len() == guard.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    /// Sets the queue closed and drains both waiter lists with `closed`.
    /// Idempotent.
    pub fn close(&self) {
        let mut wakes = Wakes::default();
        {
            let mut guard = self.inner.state.lock().unwrap();
            guard.close(&mut wakes);
        }
        wakes.run(&self.inner.condvar);
    }

    pub fn try_push(&self, v: T) -> Result<(), TrySendError<T>> {
        let mut wakes = Wakes::default();
        let result = {
            let mut guard = self.inner.state.lock().unwrap();
            guard.try_push(v, &mut wakes)
        };
        wakes.run(&self.inner.condvar);
        result
    }

    pub fn try_pop(&self) -> Result<T, TryRecvError> {
        let mut wakes = Wakes::default();
        let result = {
            let mut guard = self.inner.state.lock().unwrap();
            guard.try_pop(&mut wakes)
        };
        wakes.run(&self.inner.condvar);
        result
    }

    /// Blocks the current thread until `v` is accepted or the queue closes.
    pub fn push(&self, v: T) -> Result<(), ClosedError<T>> {
        match self.push_cancellable(v, None) {
            Ok(()) => Ok(()),
            Err(AsyncSendError::Closed(v)) => Err(ClosedError(v)),
            Err(AsyncSendError::Cancelled(_)) => {
                unreachable!("push without a token cannot be cancelled")
            }
        }
    }

    /// Blocks the current thread until `v` is accepted, the queue closes,
    /// or `token` (if supplied) is cancelled.
    pub fn push_cancellable(
        &self,
        v: T,
        token: Option<&CancellationToken>,
    ) -> Result<(), AsyncSendError<T>> {
        if let Some(token) = token {
            if token.is_cancelled() {
                return Err(AsyncSendError::Cancelled(v));
            }
        }

        let node = PushNode::new(v);
        let node_ptr = NonNull::from(&node);

        let mut wakes = Wakes::default();
        let mut guard = self.inner.state.lock().unwrap();
        let outcome = guard.try_push_or_link(node_ptr, &mut wakes);
        drop(guard);
        wakes.run(&self.inner.condvar);

        match outcome {
            LinkOutcome::Completed => return Ok(()),
            LinkOutcome::Closed => {
                let v = node.take_value().expect("unlinked push-waiter keeps its value");
                return Err(AsyncSendError::Closed(v));
            }
            LinkOutcome::Linked => {}
        }

        let callback_id = token.map(|token| {
            let queue = self.clone();
            let ptr = SendPtr(node_ptr);
            token.arm(move || queue.cancel_push_waiter(ptr.0))
        });

        let mut guard = self.inner.state.lock().unwrap();
        let result = loop {
            match node.resolution() {
                None => {
                    guard = self.inner.condvar.wait(guard).unwrap();
                }
                Some(Resolution::Ready) => break Ok(()),
                Some(Resolution::Closed) => {
                    let v = node.take_value().expect("closed push-waiter keeps its value");
                    break Err(AsyncSendError::Closed(v));
                }
                Some(Resolution::Cancelled) => {
                    let v = node
                        .take_value()
                        .expect("cancelled push-waiter keeps its value");
                    break Err(AsyncSendError::Cancelled(v));
                }
            }
        };
        drop(guard);

        // By now `node` is fully resolved and thus already unlinked by
        // whoever resolved it. Disarming the token is still required so a
        // cancellation racing the very last moment doesn't fire against a
        // node whose stack frame is about to unwind; `reset` on an id that
        // already fired or never existed is a no-op.
        if let Some(token) = token {
            token.reset(callback_id.flatten());
        }

        result
    }

    pub fn pop(&self) -> Result<T, ClosedError<()>> {
        match self.pop_cancellable(None) {
            Ok(v) => Ok(v),
            Err(AsyncRecvError::Closed) => Err(ClosedError(())),
            Err(AsyncRecvError::Cancelled) => {
                unreachable!("pop without a token cannot be cancelled")
            }
        }
    }

    pub fn pop_cancellable(
        &self,
        token: Option<&CancellationToken>,
    ) -> Result<T, AsyncRecvError> {
        if let Some(token) = token {
            if token.is_cancelled() {
                return Err(AsyncRecvError::Cancelled);
            }
        }

        let node = PopNode::<T>::new();
        let node_ptr = NonNull::from(&node);

        let mut wakes = Wakes::default();
        let mut guard = self.inner.state.lock().unwrap();
        let outcome = guard.try_pop_or_link(node_ptr, &mut wakes);
        drop(guard);
        wakes.run(&self.inner.condvar);

        match outcome {
            LinkOutcome::Completed => {
                return Ok(node.take_value().expect("completed pop-waiter has a value"));
            }
            LinkOutcome::Closed => return Err(AsyncRecvError::Closed),
            LinkOutcome::Linked => {}
        }

        let callback_id = token.map(|token| {
            let queue = self.clone();
            let ptr = SendPtr(node_ptr);
            token.arm(move || queue.cancel_pop_waiter(ptr.0))
        });

        let mut guard = self.inner.state.lock().unwrap();
        let result = loop {
            match node.resolution() {
                None => {
                    guard = self.inner.condvar.wait(guard).unwrap();
                }
                Some(Resolution::Ready) => {
                    break Ok(node.take_value().expect("ready pop-waiter has a value"));
                }
                Some(Resolution::Closed) => {
                    break Err(AsyncRecvError::Closed);
                }
                Some(Resolution::Cancelled) => {
                    break Err(AsyncRecvError::Cancelled);
                }
            }
        };
        drop(guard);

        if let Some(token) = token {
            token.reset(callback_id.flatten());
        }

        result
    }

    /// Cancellation-adaptor callback for a blocking push-waiter: re-enters
    /// the mutex, removes the waiter if it is still linked, and — only then
    /// — marks it cancelled and wakes it. A no-op if the waiter already
    /// completed by another path; whichever side takes the mutex first and
    /// finds the waiter still linked wins the race.
    fn cancel_push_waiter(&self, node_ptr: NonNull<PushNode<T>>) {
        let mut wakes = Wakes::default();
        {
            let mut guard = self.inner.state.lock().unwrap();
            if unsafe { guard.push_waiters.try_remove(node_ptr) }.is_some() {
                let node = unsafe { node_ptr.as_ref() };
                node.set_resolution(Resolution::Cancelled);
                wakes.push(node.take_waker());
            }
        }
        wakes.run(&self.inner.condvar);
    }

    fn cancel_pop_waiter(&self, node_ptr: NonNull<PopNode<T>>) {
        let mut wakes = Wakes::default();
        {
            let mut guard = self.inner.state.lock().unwrap();
            if unsafe { guard.pop_waiters.try_remove(node_ptr) }.is_some() {
                let node = unsafe { node_ptr.as_ref() };
                node.set_resolution(Resolution::Cancelled);
                wakes.push(node.take_waker());
            }
        }
        wakes.run(&self.inner.condvar);
    }

    /// Suspending push: returns a future resolving to `Ok(())`, or an error
    /// carrying the value back on close or cancellation.
    pub fn async_push(&self, v: T) -> PushFuture<'_, T> {
        PushFuture::new(self, v)
    }

    /// Suspending pop: dual of [`Queue::async_push`].
    pub fn async_pop(&self) -> PopFuture<'_, T> {
        PopFuture::new(self)
    }
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendezvous_queue_is_always_empty_and_full() {
        let q: Queue<i32> = Queue::new(0);
        assert!(q.is_empty());
        assert!(q.is_full());
    }

    #[test]
    fn capacity_two_smoke_test() {
        let q: Queue<i32> = Queue::new(2);
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert!(matches!(q.try_push(3), Err(TrySendError::Full(3))));
        assert_eq!(q.pop().unwrap(), 1);
        assert_eq!(q.pop().unwrap(), 2);
    }

    #[test]
    fn initially_closed_rejects_both_sides() {
        let q: Queue<i32> = Queue::new(1);
        q.close();
        assert!(matches!(q.push(1), Err(ClosedError(1))));
        assert!(matches!(q.pop(), Err(ClosedError(()))));
    }

    #[test]
    fn drain_after_close_then_closed() {
        let q: Queue<i32> = Queue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.close();
        assert_eq!(q.pop().unwrap(), 1);
        assert_eq!(q.pop().unwrap(), 2);
        assert!(matches!(q.pop(), Err(ClosedError(()))));
    }

    #[test]
    fn close_is_idempotent() {
        let q: Queue<i32> = Queue::new(1);
        q.close();
        q.close();
        assert!(q.is_closed());
    }

    #[test]
    fn blocking_pop_interrupted_by_close() {
        use std::thread;
        use std::time::Duration;

        let q: Queue<i32> = Queue::new(1);
        let q2 = q.clone();
        let reader = thread::spawn(move || q2.pop());

        thread::sleep(Duration::from_millis(20));
        q.push(1).unwrap();
        q.close();

        assert_eq!(reader.join().unwrap().unwrap(), 1);
        assert!(matches!(q.pop(), Err(ClosedError(()))));
    }

    #[test]
    fn rendezvous_orders_values() {
        use std::thread;

        let q: Queue<i32> = Queue::rendezvous();
        let producer = q.clone();
        let handle = thread::spawn(move || {
            for i in 1..=4 {
                producer.push(i).unwrap();
            }
        });

        for expected in 1..=4 {
            assert_eq!(q.pop().unwrap(), expected);
        }
        handle.join().unwrap();
    }

    #[test]
    fn push_cancellable_returns_value_on_cancel() {
        use std::thread;
        use std::time::Duration;

        let q: Queue<i32> = Queue::new(0);
        let token = CancellationToken::new();
        let cancel_handle = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel_handle.cancel();
        });

        let err = q.push_cancellable(7, Some(&token)).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.into_inner(), 7);
        assert!(q.try_pop().is_err());
    }
}
