//! Cooperative cancellation: a shareable [`CancellationToken`] plus the
//! internal arm/reset adaptor the suspending operations bind it through.
//!
//! Callers hold a cloneable `CancellationToken` and pass it to a suspending
//! operation; the token moves through three states: unarmed (no callback
//! registered), armed (a callback sitting in `Inner::callbacks`), and
//! discarded (the callback removed by id in `reset`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    // Holding this lock for the duration of `cancel`'s callback loop is what
    // makes `reset` synchronize with an in-flight callback: `reset` cannot
    // return having "discarded" a callback that is still running, because it
    // cannot acquire the lock until `cancel` has finished running every
    // callback it drained.
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// A one-shot, clonable stop signal. Cloned handles share the same
/// underlying state; cancelling any clone cancels all of them.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A handle to a callback registered with [`CancellationToken::arm`],
/// required to later call [`CancellationToken::reset`]. `None` means the
/// token was already cancelled at `arm` time and the callback ran inline,
/// so there is nothing left to disarm.
pub(crate) struct CallbackId(u64);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A token that derives its cancellation from this one: cancelling the
    /// parent cancels the child, but cancelling the child alone leaves the
    /// parent (and any siblings) unaffected.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();
        let weak_child = child.clone();
        // If we're already cancelled, arm() below fires inline.
        let id = self.arm(move || weak_child.cancel());
        // The child's own cancellation doesn't need to deregister from the
        // parent: once the parent fires, the registration is consumed; if
        // the child fires first, the parent callback is harmless to leave
        // armed (it will just re-cancel an already-cancelled child).
        std::mem::forget(id);
        child
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Idempotent: only the first call runs
    /// callbacks. Every callback armed before this call (and not yet reset)
    /// runs exactly once, synchronously, on this thread.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(feature = "trace")]
        tracing::trace!("cancellation token fired");

        let mut callbacks = self.inner.callbacks.lock().unwrap();
        let to_run = std::mem::take(&mut *callbacks);
        for (_, cb) in to_run {
            cb();
        }
        // `callbacks` stays locked for the whole loop above, so a concurrent
        // `reset` blocks until every callback has returned.
    }

    /// Spawns a background thread that cancels this token after `delay`. A
    /// convenience for callers that want a timeout without pulling in a
    /// scheduler dependency this crate does not otherwise need.
    pub fn with_timeout(delay: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let handle = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            handle.cancel();
        });
        token
    }

    /// Registers `callback` to run (at most once) the moment this token is
    /// cancelled. If the token is already cancelled, `callback` runs inline
    /// and `None` is returned (nothing to later `reset`).
    pub(crate) fn arm(&self, callback: impl FnOnce() + Send + 'static) -> Option<CallbackId> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            callback();
            return None;
        }

        let mut callbacks = self.inner.callbacks.lock().unwrap();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            drop(callbacks);
            callback();
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        callbacks.push((id, Box::new(callback)));
        Some(CallbackId(id))
    }

    /// Disarms a previously armed callback. After this returns, the
    /// callback either already ran to completion, or is guaranteed never to
    /// run. A `None` id (the already-fired-inline case from `arm`) is a
    /// no-op.
    pub(crate) fn reset(&self, id: Option<CallbackId>) {
        let Some(id) = id else { return };
        let mut callbacks = self.inner.callbacks.lock().unwrap();
        callbacks.retain(|(cid, _)| *cid != id.0);
    }
}

/// Converts a count measured in some ratio of a second into whole
/// nanoseconds, saturating on overflow rather than wrapping, and rounding a
/// truncating-to-zero nonzero result up to one nanosecond rather than
/// losing it outright. `CancellationToken::with_timeout` does not need it
/// directly (`std::time::Duration` is already nanosecond-resolution and
/// unsigned), but it is kept as public API for callers building a token on
/// top of a lower-resolution clock.
pub fn safe_nanosecond_cast(count: i64, ratio_num: i64, ratio_den: i64) -> i64 {
    const NANOS_PER_SEC: i64 = 1_000_000_000;

    if count == 0 {
        return 0;
    }

    // nanos = count * ratio_num * NANOS_PER_SEC / ratio_den, computed in this
    // order (scale by ratio_num/ratio_den conceptually first, then by
    // NANOS_PER_SEC) to avoid losing precision for sub-nanosecond ratios.
    let scale = match ratio_num.checked_mul(NANOS_PER_SEC) {
        Some(v) => v / ratio_den,
        None => {
            return if count > 0 { i64::MAX } else { i64::MIN };
        }
    };

    match count.checked_mul(scale) {
        Some(0) => {
            // Exact zero only possible if `scale` is zero, meaning the
            // caller's unit is coarser than a nanosecond and this count
            // rounds to nothing: round a nonzero input up to one nanosecond
            // rather than silently dropping it.
            if count > 0 {
                1
            } else {
                -1
            }
        }
        Some(v) => v,
        None => {
            if (count > 0) == (scale >= 0) {
                i64::MAX
            } else {
                i64::MIN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn zero_in_maps_to_zero_out() {
        assert_eq!(safe_nanosecond_cast(0, 1, 1), 0);
    }

    #[test]
    fn positive_overflow_saturates_to_max() {
        assert_eq!(safe_nanosecond_cast(i64::MAX, 1_000_000_000, 1), i64::MAX);
    }

    #[test]
    fn negative_overflow_saturates_to_min() {
        assert_eq!(safe_nanosecond_cast(i64::MIN, 1_000_000_000, 1), i64::MIN);
    }

    #[test]
    fn exact_conversion() {
        // 5 seconds, expressed in units of whole seconds (ratio 1/1).
        assert_eq!(safe_nanosecond_cast(5, 1, 1), 5_000_000_000);
    }

    #[test]
    fn truncating_nonzero_rounds_up_to_one_nanosecond() {
        // 1 unit where a unit is 1 / 2_000_000_000 of a second is half a
        // nanosecond: truncating division would yield 0, but the input was
        // nonzero, so it must round up to 1ns.
        assert_eq!(safe_nanosecond_cast(1, 1, 2_000_000_000), 1);
        assert_eq!(safe_nanosecond_cast(-1, 1, 2_000_000_000), -1);
    }

    #[test]
    fn cancel_runs_armed_callback_exactly_once() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = token.arm(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(id.is_some());
        token.cancel();
        token.cancel(); // idempotent
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_before_cancel_prevents_callback() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = token.arm(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        token.reset(id);
        token.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arm_after_cancel_fires_inline() {
        let token = CancellationToken::new();
        token.cancel();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = token.arm(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(id.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_token_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
