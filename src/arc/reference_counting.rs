use std::fmt;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::fence;
use std::sync::atomic::Ordering::Acquire;

use super::control_block::ControlBlock;
use super::deleter::{DefaultDelete, Deleter};
use super::weak::WeakArc;
use crate::error::ArcError;

/// The pointee and its control block. Both are present or the handle is empty.
pub(super) struct Parts<T, D> {
    pub(super) ptr: NonNull<T>,
    pub(super) control: NonNull<ControlBlock<D>>,
}

impl<T, D> Clone for Parts<T, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, D> Copy for Parts<T, D> {}

impl<T, D> Parts<T, D> {
    pub(super) fn control(&self) -> &ControlBlock<D> {
        // Safety: any handle holding `Parts` owns a unit of the weak count,
        // so the block is still allocated.
        unsafe { self.control.as_ref() }
    }
}

/// A strong, thread-safe reference-counted handle.
///
/// The pointee lives in its own heap allocation next to a separate control
/// block. When the last `Arc` goes away the pointee is handed to the deleter
/// `D`; the control block stays alive until the last [`WeakArc`] is gone too.
///
/// An `Arc` may be empty (see [`Arc::empty`]). Dereferencing an empty `Arc`
/// panics; use [`Arc::get`] or [`Arc::try_get`] to check first.
pub struct Arc<T, D: Deleter<T> = DefaultDelete> {
    inner: Option<Parts<T, D>>,
}

unsafe impl<T: Send + Sync, D: Deleter<T>> Send for Arc<T, D> {}

unsafe impl<T: Send + Sync, D: Deleter<T>> Sync for Arc<T, D> {}

impl<T> Arc<T> {
    pub fn new(value: T) -> Arc<T> {
        Arc::make_arc_with(value, DefaultDelete)
    }

    pub fn from_box(value: Box<T>) -> Arc<T> {
        Arc::from_box_with(value, DefaultDelete)
    }
}

impl<T, D: Deleter<T>> Arc<T, D> {
    pub const fn empty() -> Self {
        Arc { inner: None }
    }

    /// Allocates `value` and wraps it, using a default-constructed deleter.
    pub fn make_arc(value: T) -> Self
    where
        D: Default,
    {
        Self::make_arc_with(value, D::default())
    }

    pub fn make_arc_with(value: T, deleter: D) -> Self {
        Self::from_box_with(Box::new(value), deleter)
    }

    pub fn from_box_with(value: Box<T>, deleter: D) -> Self {
        Arc {
            inner: Some(Parts {
                ptr: NonNull::from(Box::leak(value)),
                control: ControlBlock::allocate(deleter),
            }),
        }
    }

    /// `None` produces an empty `Arc`; the deleter is dropped unused.
    pub fn from_option(value: Option<Box<T>>, deleter: D) -> Self {
        match value {
            Some(value) => Self::from_box_with(value, deleter),
            None => Self::empty(),
        }
    }

    /// Wraps parts whose strong count has already been bumped for us.
    pub(super) fn from_parts(parts: Parts<T, D>) -> Self {
        Arc { inner: Some(parts) }
    }

    pub(super) fn parts(&self) -> Option<Parts<T, D>> {
        self.inner
    }

    /// Moves the binding out, leaving `self` empty. No counter is touched.
    pub fn take(&mut self) -> Self {
        Arc {
            inner: self.inner.take(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of `Arc`s sharing the pointee, 0 for an empty handle.
    ///
    /// Advisory only: other threads may change it right after the load.
    pub fn use_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |p| p.control().strong())
    }

    /// Advisory, like [`Arc::use_count`].
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of `WeakArc`s observing the pointee.
    pub fn weak_count(&self) -> usize {
        match &self.inner {
            None => 0,
            Some(p) => match p.control().weak() {
                // Locked by `get_mut`, which only succeeds with no weak handles.
                usize::MAX => 0,
                n => n - 1,
            },
        }
    }

    pub fn as_ptr(&self) -> *const T {
        self.inner
            .as_ref()
            .map_or(ptr::null(), |p| p.ptr.as_ptr() as *const T)
    }

    /// True when both handles share a control block, or both are empty.
    /// Zero-sized pointees all live at the same dangling address, so the
    /// pointee address alone can't tell bindings apart.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        let control = |a: &Self| a.inner.map(|p| p.control);
        control(this) == control(other)
    }

    pub fn get(&self) -> Option<&T> {
        // Safety: we hold a strong reference, so the pointee is alive.
        self.inner.as_ref().map(|p| unsafe { p.ptr.as_ref() })
    }

    pub fn try_get(&self) -> Result<&T, ArcError> {
        self.get().ok_or(ArcError::Empty)
    }

    /// Exclusive access, available only when this is the sole `Arc` and no
    /// `WeakArc` could promote behind our back.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let parts = self.inner.as_mut()?;
        let control = parts.control();
        if !control.lock_weak_for_uniqueness() {
            return None;
        }
        let is_unique = control.strong() == 1;
        // Release matches the Acquire increment in `downgrade`, so strong
        // count changes that follow a downgrade can't affect `is_unique`.
        control.unlock_weak();
        if !is_unique {
            return None;
        }
        // Acquire to match Arc::drop's Release decrement, to make sure
        // nothing else is accessing the pointee.
        fence(Acquire);
        // Safety: nothing else can reach the pointee while we hold `&mut self`.
        Some(unsafe { parts.ptr.as_mut() })
    }

    /// Replaces the deleter that will run when the last `Arc` is dropped.
    ///
    /// The previous deleter is dropped without being called. Racing this
    /// against the final release from another alias is impossible while
    /// `self` is alive, since `self` keeps the strong count above zero.
    pub fn set_deleter(&self, deleter: D) -> Result<(), ArcError> {
        let parts = self.inner.as_ref().ok_or(ArcError::Empty)?;
        parts.control().replace_deleter(deleter);
        Ok(())
    }

    pub fn downgrade(&self) -> WeakArc<T, D> {
        WeakArc::from(self)
    }
}

impl<T, D: Deleter<T>> Deref for Arc<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Arc"),
        }
    }
}

impl<T, D: Deleter<T>> Clone for Arc<T, D> {
    fn clone(&self) -> Self {
        if let Some(p) = &self.inner {
            p.control().increment_strong();
        }
        Arc { inner: self.inner }
    }

    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T, D: Deleter<T>> Drop for Arc<T, D> {
    fn drop(&mut self) {
        let Some(parts) = self.inner.take() else {
            return;
        };
        if parts.control().decrement_strong() {
            // Now that there's no `Arc`s left, drop the implicit weak
            // unit that represented all of them. Held in a guard so it is
            // released even if the deleter panics.
            let _implicit = WeakArc::from_parts(parts);
            // Safety: the strong count is zero, so nothing will access
            // the pointee anymore.
            let value = unsafe { Box::from_raw(parts.ptr.as_ptr()) };
            match parts.control().take_deleter() {
                Some(deleter) => deleter.delete(value),
                None => drop(value),
            }
        }
    }
}

impl<T, D: Deleter<T>> Default for Arc<T, D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Box<T>> for Arc<T> {
    fn from(value: Box<T>) -> Self {
        Arc::from_box(value)
    }
}

impl<T: fmt::Debug, D: Deleter<T>> fmt::Debug for Arc<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}

impl<T: fmt::Display, D: Deleter<T>> fmt::Display for Arc<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}
