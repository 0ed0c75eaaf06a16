/// Destruction policy for the pointee of an [`Arc`](super::Arc).
///
/// `delete` consumes the deleter, so it can run at most once per pointee.
/// It is called on whichever thread drops the last strong handle.
pub trait Deleter<T>: Send {
    fn delete(self, value: Box<T>);
}

/// Frees the pointee with an ordinary drop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T> Deleter<T> for DefaultDelete {
    fn delete(self, value: Box<T>) {
        drop(value);
    }
}

impl<T, F> Deleter<T> for F
where
    F: FnOnce(Box<T>) + Send,
{
    fn delete(self, value: Box<T>) {
        self(value)
    }
}

#[test]
fn test_closure_deleter_receives_value() {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::Relaxed;

    static SEEN: AtomicUsize = AtomicUsize::new(0);
    let d = |b: Box<usize>| {
        SEEN.store(*b, Relaxed);
    };
    d.delete(Box::new(42));
    assert_eq!(SEEN.load(Relaxed), 42);
    DefaultDelete.delete(Box::new(String::from("dropped")));
}
