use std::fmt;

use super::control_block::ControlBlock;
use super::deleter::{DefaultDelete, Deleter};
use super::reference_counting::{Arc, Parts};

/// A non-owning observer of an [`Arc`]'s pointee.
///
/// Keeps the control block alive, never the pointee. The pointee is only
/// reachable through [`WeakArc::lock`], which yields an empty `Arc` once the
/// last strong handle is gone.
pub struct WeakArc<T, D: Deleter<T> = DefaultDelete> {
    inner: Option<Parts<T, D>>,
}

unsafe impl<T: Send + Sync, D: Deleter<T>> Send for WeakArc<T, D> {}

unsafe impl<T: Send + Sync, D: Deleter<T>> Sync for WeakArc<T, D> {}

impl<T> WeakArc<T> {
    pub const fn new() -> WeakArc<T> {
        WeakArc { inner: None }
    }
}

impl<T, D: Deleter<T>> WeakArc<T, D> {
    /// Takes over a weak unit the caller already counted.
    pub(super) fn from_parts(parts: Parts<T, D>) -> Self {
        WeakArc { inner: Some(parts) }
    }

    /// Promotes to a strong handle, or returns an empty `Arc` if the
    /// pointee has already been released.
    pub fn lock(&self) -> Arc<T, D> {
        match &self.inner {
            Some(p) if p.control().increment_strong_if_nonzero() => Arc::from_parts(*p),
            _ => Arc::empty(),
        }
    }

    pub fn upgrade(&self) -> Option<Arc<T, D>> {
        let arc = self.lock();
        if arc.is_empty() {
            None
        } else {
            Some(arc)
        }
    }

    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of `Arc`s still alive for the pointee.
    pub fn use_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |p| p.control().strong())
    }

    /// Number of `WeakArc`s for the pointee, this one included.
    pub fn weak_count(&self) -> usize {
        let Some(p) = &self.inner else {
            return 0;
        };
        let control = p.control();
        let weak = control.weak();
        if control.strong() > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        let control = |w: &Self| w.inner.map(|p| p.control);
        control(this) == control(other)
    }
}

impl<T, D: Deleter<T>> From<&Arc<T, D>> for WeakArc<T, D> {
    fn from(arc: &Arc<T, D>) -> Self {
        match arc.parts() {
            Some(p) => {
                p.control().increment_weak_from_strong();
                WeakArc::from_parts(p)
            }
            None => WeakArc { inner: None },
        }
    }
}

impl<T, D: Deleter<T>> Clone for WeakArc<T, D> {
    fn clone(&self) -> Self {
        if let Some(p) = &self.inner {
            p.control().increment_weak();
        }
        WeakArc { inner: self.inner }
    }

    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T, D: Deleter<T>> Drop for WeakArc<T, D> {
    fn drop(&mut self) {
        if let Some(p) = self.inner.take() {
            // The pointee, if it ever existed, was released by the last `Arc`.
            if p.control().decrement_weak() && p.control().strong() == 0 {
                // Safety: both counts are zero; this was the last holder.
                unsafe { ControlBlock::free(p.control) }
            }
        }
    }
}

impl<T, D: Deleter<T>> Default for WeakArc<T, D> {
    fn default() -> Self {
        WeakArc { inner: None }
    }
}

impl<T, D: Deleter<T>> fmt::Debug for WeakArc<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(WeakArc)")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering::Relaxed;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::thread;

    #[test]
    fn test() {
        static NUM_DROPS: AtomicUsize = AtomicUsize::new(0);
        struct DetectDrop;
        impl Drop for DetectDrop {
            fn drop(&mut self) {
                NUM_DROPS.fetch_add(1, Relaxed);
            }
        }
        // Create an Arc with two weak pointers.
        let x = Arc::new(("hello", DetectDrop));
        let y = x.downgrade();
        let z = WeakArc::from(&x);
        let t = thread::spawn(move || {
            // Weak pointer should be lockable at this point.
            let y = y.lock();
            assert_eq!(y.0, "hello");
        });
        assert_eq!(x.0, "hello");
        t.join().unwrap();
        // The data shouldn't be dropped yet,
        // and the weak pointer should be lockable.
        assert_eq!(NUM_DROPS.load(Relaxed), 0);
        assert!(z.upgrade().is_some());
        drop(x);

        // Now, the data should be dropped, and the
        // weak pointer should no longer be lockable.
        assert_eq!(NUM_DROPS.load(Relaxed), 1);
        assert!(z.upgrade().is_none());
        assert!(z.lock().is_empty());
    }

    #[test]
    fn test_weak_outliving_arcs_is_expired() {
        let mut weak = WeakArc::new();
        assert!(weak.expired());
        {
            let strong = Arc::new(String::from("short-lived"));
            weak = WeakArc::from(&strong);
            assert!(!weak.expired());
        }
        assert!(weak.expired());
        assert_eq!(weak.use_count(), 0);
        assert_eq!(weak.lock().use_count(), 0);
        assert_eq!(weak.weak_count(), 1);
    }

    #[test]
    fn test_multiple_strong_arcs_one_weak() {
        static ALIVE: AtomicUsize = AtomicUsize::new(0);
        struct TestObject;
        impl TestObject {
            fn new() -> Self {
                ALIVE.fetch_add(1, Relaxed);
                TestObject
            }
        }
        impl Drop for TestObject {
            fn drop(&mut self) {
                ALIVE.fetch_sub(1, Relaxed);
            }
        }

        let strong1 = Arc::new(TestObject::new());
        let strong2 = strong1.clone();
        let weak = WeakArc::from(&strong1);

        assert_eq!(weak.lock().use_count(), 3);
        assert_eq!(strong2.use_count(), 2);
        assert!(Arc::ptr_eq(&weak.lock(), &strong1));
        assert_eq!(ALIVE.load(Relaxed), 1);

        drop((strong1, strong2));
        assert_eq!(ALIVE.load(Relaxed), 0);
        assert!(weak.expired());
    }

    #[test]
    fn test_custom_deleter_with_weak() {
        static ALIVE: AtomicUsize = AtomicUsize::new(0);
        struct TestObject;
        impl Drop for TestObject {
            fn drop(&mut self) {
                ALIVE.fetch_sub(1, Relaxed);
            }
        }

        let deleted = AtomicBool::new(false);
        let calls = AtomicUsize::new(0);
        {
            let (deleted, calls) = (&deleted, &calls);
            let deleter = move |obj: Box<TestObject>| {
                drop(obj);
                deleted.store(true, Relaxed);
                calls.fetch_add(1, Relaxed);
            };
            ALIVE.fetch_add(1, Relaxed);
            let strong = Arc::make_arc_with(TestObject, deleter);
            let weak = WeakArc::from(&strong);
            drop(strong);
            assert!(weak.expired());
        }
        assert!(deleted.load(Relaxed));
        assert_eq!(calls.load(Relaxed), 1);
        assert_eq!(ALIVE.load(Relaxed), 0);
    }

    #[test]
    fn test_clone_and_count() {
        let strong = Arc::new(11);
        let w1 = strong.downgrade();
        let mut w2 = WeakArc::default();
        w2.clone_from(&w1);
        assert_eq!(w1.weak_count(), 2);
        assert_eq!(strong.weak_count(), 2);
        assert!(WeakArc::ptr_eq(&w1, &w2));

        w2.clone_from(&w1);
        assert_eq!(w1.weak_count(), 2);

        drop(strong);
        assert_eq!(w1.weak_count(), 2);
        drop(w2);
        assert_eq!(w1.weak_count(), 1);
    }

    #[test]
    fn test_weak_clone_from_zero_sized_pointees() {
        let a = Arc::new(());
        let b = Arc::new(());
        let mut wa = a.downgrade();
        let wb = b.downgrade();
        assert!(!WeakArc::ptr_eq(&wa, &wb));

        wa.clone_from(&wb);
        assert!(WeakArc::ptr_eq(&wa, &wb));
        assert_eq!(a.weak_count(), 0);
        assert_eq!(b.weak_count(), 2);
        assert!(Arc::ptr_eq(&wa.lock(), &b));
    }

    #[test]
    fn test_empty_weak() {
        let weak: WeakArc<i32> = WeakArc::default();
        assert!(weak.expired());
        assert!(weak.lock().is_empty());
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.use_count(), 0);
        assert_eq!(weak.weak_count(), 0);
        assert_eq!(format!("{:?}", weak.clone()), "(WeakArc)");

        let from_empty = WeakArc::from(&Arc::<i32>::empty());
        assert!(WeakArc::ptr_eq(&weak, &from_empty));
    }

    #[test]
    fn test_lock_racing_final_release() {
        static NUM_DROPS: AtomicUsize = AtomicUsize::new(0);
        struct DetectDrop(u32);
        impl Drop for DetectDrop {
            fn drop(&mut self) {
                NUM_DROPS.fetch_add(1, Relaxed);
            }
        }

        for _ in 0..50 {
            NUM_DROPS.store(0, Relaxed);
            let strong = Arc::new(DetectDrop(42));
            let weak = strong.downgrade();
            thread::scope(|s| {
                for _ in 0..4 {
                    let weak = weak.clone();
                    s.spawn(move || {
                        for _ in 0..1_000 {
                            match weak.upgrade() {
                                Some(arc) => assert_eq!(arc.0, 42),
                                None => break,
                            }
                        }
                    });
                }
                drop(strong);
            });
            assert_eq!(NUM_DROPS.load(Relaxed), 1);
            assert!(weak.expired());
        }
    }

    #[test]
    fn test_last_strong_and_last_weak_dropped_on_different_threads() {
        static DELETES: AtomicUsize = AtomicUsize::new(0);
        static DELETER_DROPS: AtomicUsize = AtomicUsize::new(0);
        struct CountingDelete;
        impl Deleter<u64> for CountingDelete {
            fn delete(self, value: Box<u64>) {
                assert_eq!(*value, 7);
                DELETES.fetch_add(1, Relaxed);
            }
        }
        impl Drop for CountingDelete {
            fn drop(&mut self) {
                DELETER_DROPS.fetch_add(1, Relaxed);
            }
        }

        const ROUNDS: usize = 2_000;
        for _ in 0..ROUNDS {
            let strong = Arc::<u64, CountingDelete>::make_arc_with(7, CountingDelete);
            let weak = strong.downgrade();
            thread::scope(|s| {
                s.spawn(move || drop(strong));
                s.spawn(move || {
                    // Sometimes this promotion makes this thread the last
                    // strong holder as well.
                    let _ = weak.lock();
                    drop(weak);
                });
            });
        }
        assert_eq!(DELETES.load(Relaxed), ROUNDS);
        assert_eq!(DELETER_DROPS.load(Relaxed), ROUNDS);
    }

    #[test]
    fn test_promotion_never_revives() {
        let strong = Arc::new(1);
        let weak = strong.downgrade();
        drop(strong);
        for _ in 0..3 {
            assert!(weak.lock().is_empty());
            assert_eq!(weak.use_count(), 0);
        }
    }
}
