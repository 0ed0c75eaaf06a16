use std::fmt;

/// Errors reported by the checked accessors of [`Arc`](crate::Arc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcError {
    /// The handle has no pointee (default-constructed, taken from, or
    /// produced by locking an expired `WeakArc`).
    Empty,
}

impl fmt::Display for ArcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArcError::Empty => f.write_str("access through an empty Arc"),
        }
    }
}

impl std::error::Error for ArcError {}

#[test]
fn test_error_display() {
    assert_eq!(ArcError::Empty.to_string(), "access through an empty Arc");
    let boxed: Box<dyn std::error::Error> = Box::new(ArcError::Empty);
    assert!(boxed.source().is_none());
}
