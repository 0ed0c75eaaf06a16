use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{fence, AtomicPtr, AtomicUsize};

/// Shared header for one pointee. Every `Arc` and `WeakArc` aliasing the
/// pointee points at the same block; it is freed by whichever handle drops
/// the last unit of `weak_count`.
pub(crate) struct ControlBlock<D> {
    /// Number of `Arc`s.
    strong_count: AtomicUsize,
    /// Number of `WeakArc`s, plus one if there are any `Arc`s.
    /// `usize::MAX` while `Arc::get_mut` is checking for uniqueness.
    weak_count: AtomicUsize,
    /// Boxed deleter. Null once the last `Arc` has taken it.
    deleter: AtomicPtr<D>,
}

impl<D> ControlBlock<D> {
    /// Allocates a block for a freshly wrapped pointee: one strong handle,
    /// and the implicit weak unit owned by the strong group.
    pub(crate) fn allocate(deleter: D) -> NonNull<ControlBlock<D>> {
        NonNull::from(Box::leak(Box::new(ControlBlock {
            strong_count: AtomicUsize::new(1),
            weak_count: AtomicUsize::new(1),
            deleter: AtomicPtr::new(Box::into_raw(Box::new(deleter))),
        })))
    }

    /// Safety: `block` came from `allocate`, and both counts have reached zero.
    pub(crate) unsafe fn free(block: NonNull<ControlBlock<D>>) {
        drop(Box::from_raw(block.as_ptr()));
    }

    pub(crate) fn strong(&self) -> usize {
        self.strong_count.load(Relaxed)
    }

    pub(crate) fn weak(&self) -> usize {
        self.weak_count.load(Relaxed)
    }

    pub(crate) fn increment_strong(&self) {
        if self.strong_count.fetch_add(1, Relaxed) > usize::MAX / 2 {
            std::process::abort();
        }
    }

    /// Promotion: bumps the strong count only if it has not reached zero.
    pub(crate) fn increment_strong_if_nonzero(&self) -> bool {
        let mut n = self.strong_count.load(Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > usize::MAX / 2 {
                std::process::abort();
            }
            if let Err(e) = self
                .strong_count
                .compare_exchange_weak(n, n + 1, Relaxed, Relaxed)
            {
                n = e;
                continue;
            }
            return true;
        }
    }

    /// Returns true for the handle that dropped the count to zero. That
    /// thread has synchronized with every earlier release.
    pub(crate) fn decrement_strong(&self) -> bool {
        if self.strong_count.fetch_sub(1, Release) == 1 {
            fence(Acquire);
            return true;
        }
        false
    }

    /// Used when a `WeakArc` is cloned: the count is already at least one
    /// above the implicit unit, so it can't be locked by `get_mut`.
    pub(crate) fn increment_weak(&self) {
        if self.weak_count.fetch_add(1, Relaxed) > usize::MAX / 2 {
            std::process::abort();
        }
    }

    /// Used when downgrading an `Arc`; waits out a concurrent `get_mut`.
    pub(crate) fn increment_weak_from_strong(&self) {
        let mut n = self.weak_count.load(Relaxed);
        loop {
            if n == usize::MAX {
                std::hint::spin_loop();
                n = self.weak_count.load(Relaxed);
                continue;
            }
            if n > usize::MAX / 2 {
                std::process::abort();
            }
            // Acquire pairs with the Release store in `unlock_weak`.
            if let Err(e) = self
                .weak_count
                .compare_exchange_weak(n, n + 1, Acquire, Relaxed)
            {
                n = e;
                continue;
            }
            return;
        }
    }

    pub(crate) fn decrement_weak(&self) -> bool {
        if self.weak_count.fetch_sub(1, Release) == 1 {
            fence(Acquire);
            return true;
        }
        false
    }

    /// Succeeds only when no `WeakArc` exists, and holds off new ones until
    /// `unlock_weak`.
    pub(crate) fn lock_weak_for_uniqueness(&self) -> bool {
        // Acquire matches WeakArc::drop's Release decrement, so that any
        // promoted handles are visible in the following strong load.
        self.weak_count
            .compare_exchange(1, usize::MAX, Acquire, Relaxed)
            .is_ok()
    }

    pub(crate) fn unlock_weak(&self) {
        self.weak_count.store(1, Release);
    }

    /// Installs a new deleter and drops the previous one without calling it.
    pub(crate) fn replace_deleter(&self, deleter: D) {
        let new = Box::into_raw(Box::new(deleter));
        let old = self.deleter.swap(new, AcqRel);
        if !old.is_null() {
            // Safety: the swap handed us sole ownership of `old`.
            drop(unsafe { Box::from_raw(old) });
        }
    }

    /// Hands the deleter to the last strong release. Only the first call
    /// gets it.
    pub(crate) fn take_deleter(&self) -> Option<D> {
        let old = self.deleter.swap(ptr::null_mut(), Acquire);
        if old.is_null() {
            return None;
        }
        // Safety: the swap handed us sole ownership of `old`.
        Some(*unsafe { Box::from_raw(old) })
    }
}

impl<D> Drop for ControlBlock<D> {
    fn drop(&mut self) {
        let pending = *self.deleter.get_mut();
        if !pending.is_null() {
            unsafe { drop(Box::from_raw(pending)) };
        }
    }
}
