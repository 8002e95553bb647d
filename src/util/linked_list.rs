//! An intrusive doubly linked list of `!Unpin` nodes.
//!
//! A generic container over externally-owned nodes that embed their own
//! link fields, following the no-sentinel design tokio's internal linked
//! list uses. The list does not allocate and does not own the nodes it
//! links; it only ever borrows them for the duration they are linked.
//!
//! Every operation here is O(1) and requires the caller to already hold
//! whatever lock protects the list — this module has no synchronization of
//! its own.

use std::marker::PhantomPinned;
use std::ptr::NonNull;

use crate::util::unsafe_cell::UnsafeCell;

/// Implemented for the node type embedded in a list. `Handle` is what callers
/// pass in and get back (usually `NonNull<Target>`); `Target` is the node
/// type itself.
///
/// # Safety
///
/// Implementations must ensure `pointers` always returns a pointer to the
/// same `Pointers<Target>` field for a given node, and that the node is
/// `!Unpin` for as long as it may be linked.
pub(crate) unsafe trait Link {
    type Handle;
    type Target;

    fn as_raw(handle: &Self::Handle) -> NonNull<Self::Target>;

    /// # Safety
    /// `ptr` must have been produced by a prior call to `as_raw` on a live handle.
    unsafe fn from_raw(ptr: NonNull<Self::Target>) -> Self::Handle;

    /// # Safety
    /// `target` must be a valid, live node.
    unsafe fn pointers(target: NonNull<Self::Target>) -> NonNull<Pointers<Self::Target>>;
}

/// The intrusive link fields embedded in a list node.
pub(crate) struct Pointers<T> {
    inner: UnsafeCell<PointersInner<T>>,
}

struct PointersInner<T> {
    next: Option<NonNull<T>>,
    prev: Option<NonNull<T>>,
    _pin: PhantomPinned,
}

impl<T> Pointers<T> {
    pub(crate) fn new() -> Pointers<T> {
        Pointers {
            inner: UnsafeCell::new(PointersInner {
                next: None,
                prev: None,
                _pin: PhantomPinned,
            }),
        }
    }

    fn get_next(&self) -> Option<NonNull<T>> {
        self.inner.with(|p| unsafe { (*p).next })
    }

    fn set_next(&self, val: Option<NonNull<T>>) {
        self.inner.with_mut(|p| unsafe { (*p).next = val });
    }

    fn get_prev(&self) -> Option<NonNull<T>> {
        self.inner.with(|p| unsafe { (*p).prev })
    }

    fn set_prev(&self, val: Option<NonNull<T>>) {
        self.inner.with_mut(|p| unsafe { (*p).prev = val });
    }

    /// A node with both links null and that is not the list's sole element
    /// is, by construction, unlinked. `try_remove` relies on this.
    fn is_unlinked(&self) -> bool {
        self.get_next().is_none() && self.get_prev().is_none()
    }
}

impl<T> std::fmt::Debug for Pointers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pointers")
            .field("next", &self.get_next())
            .field("prev", &self.get_prev())
            .finish()
    }
}

/// A FIFO-capable intrusive doubly linked list.
///
/// `push_front`/`push_back` insert at either end; `pop_front`/`pop_back`
/// remove from either end; `remove`/`try_remove` unlink an arbitrary node.
pub(crate) struct LinkedList<L, T> {
    head: Option<NonNull<T>>,
    tail: Option<NonNull<T>>,
    _marker: std::marker::PhantomData<*const L>,
}

unsafe impl<L: Link> Send for LinkedList<L, L::Target> where L::Target: Send {}
unsafe impl<L: Link> Sync for LinkedList<L, L::Target> where L::Target: Sync {}

impl<L: Link> LinkedList<L, L::Target> {
    pub(crate) fn new() -> LinkedList<L, L::Target> {
        LinkedList {
            head: None,
            tail: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn front(&self) -> Option<NonNull<L::Target>> {
        self.head
    }

    pub(crate) fn back(&self) -> Option<NonNull<L::Target>> {
        self.tail
    }

    pub(crate) fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(node) = cur {
            n += 1;
            cur = unsafe { L::pointers(node).as_ref().get_next() };
        }
        n
    }

    /// Insert `val` at the front of the list.
    ///
    /// # Safety
    /// `val` must not already be linked into any list.
    pub(crate) fn push_front(&mut self, val: L::Handle) {
        let ptr = L::as_raw(&val);
        std::mem::forget(val);
        unsafe {
            let pointers = L::pointers(ptr).as_ref();
            pointers.set_prev(None);
            pointers.set_next(self.head);

            if let Some(head) = self.head {
                L::pointers(head).as_ref().set_prev(Some(ptr));
            }
            self.head = Some(ptr);
            if self.tail.is_none() {
                self.tail = Some(ptr);
            }
        }
    }

    /// Insert `val` at the back of the list.
    pub(crate) fn push_back(&mut self, val: L::Handle) {
        let ptr = L::as_raw(&val);
        std::mem::forget(val);
        unsafe {
            let pointers = L::pointers(ptr).as_ref();
            pointers.set_next(None);
            pointers.set_prev(self.tail);

            if let Some(tail) = self.tail {
                L::pointers(tail).as_ref().set_next(Some(ptr));
            }
            self.tail = Some(ptr);
            if self.head.is_none() {
                self.head = Some(ptr);
            }
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<L::Handle> {
        let head = self.head?;
        unsafe {
            let pointers = L::pointers(head).as_ref();
            self.head = pointers.get_next();

            match self.head {
                Some(new_head) => L::pointers(new_head).as_ref().set_prev(None),
                None => self.tail = None,
            }

            pointers.set_next(None);
            pointers.set_prev(None);
            Some(L::from_raw(head))
        }
    }

    pub(crate) fn pop_back(&mut self) -> Option<L::Handle> {
        let tail = self.tail?;
        unsafe {
            let pointers = L::pointers(tail).as_ref();
            self.tail = pointers.get_prev();

            match self.tail {
                Some(new_tail) => L::pointers(new_tail).as_ref().set_next(None),
                None => self.head = None,
            }

            pointers.set_next(None);
            pointers.set_prev(None);
            Some(L::from_raw(tail))
        }
    }

    /// Removes `node` from wherever it is in the list.
    ///
    /// # Safety
    /// `node` must currently be linked into `self`.
    pub(crate) unsafe fn remove(&mut self, node: NonNull<L::Target>) -> Option<L::Handle> {
        let pointers = L::pointers(node).as_ref();
        let prev = pointers.get_prev();
        let next = pointers.get_next();

        match prev {
            Some(prev) => L::pointers(prev).as_ref().set_next(next),
            None => self.head = next,
        }
        match next {
            Some(next) => L::pointers(next).as_ref().set_prev(prev),
            None => self.tail = prev,
        }

        pointers.set_next(None);
        pointers.set_prev(None);
        Some(L::from_raw(node))
    }

    /// Removes `node` if it is currently linked in `self`; returns `false`
    /// and does nothing otherwise. Safe to call more than once for the same
    /// node — the second call is a no-op. This is the building block that
    /// makes cancellation races safe: whichever of "partner wakes me",
    /// "close drains me", or "I get cancelled" gets the lock first wins.
    ///
    /// # Safety
    /// `node` must either be linked into `self` or fully unlinked (not
    /// linked into some *other* list).
    pub(crate) unsafe fn try_remove(&mut self, node: NonNull<L::Target>) -> Option<L::Handle> {
        let pointers = L::pointers(node).as_ref();
        if pointers.is_unlinked() && self.head != Some(node) {
            return None;
        }
        self.remove(node)
    }
}

impl<L: Link> Drop for LinkedList<L, L::Target> {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}
