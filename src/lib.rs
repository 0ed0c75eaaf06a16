//! `Arc` and `WeakArc`: a shared-ownership pointer with a pluggable deleter,
//! thread-safe reference counting, and exactly-once release of the pointee.

mod arc;
mod error;

pub use arc::{Arc, DefaultDelete, Deleter, WeakArc};
pub use error::ArcError;
