//! Strong and weak reference-counted handles sharing one control block.
//!
//! The control block holds two counters: the number of `Arc`s, and the
//! number of `WeakArc`s plus one for as long as any `Arc` exists. The
//! pointee is released when the first reaches zero, the block itself when
//! the second does.

mod control_block;
mod deleter;
mod reference_counting;
mod weak;

pub use deleter::{DefaultDelete, Deleter};
pub use reference_counting::Arc;
pub use weak::WeakArc;
