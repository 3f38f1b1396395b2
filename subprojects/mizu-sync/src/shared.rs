//! # Shared cell
//!
//! A reference-counted value behind a reader/writer lock.
//!
//! Services that run on different threads but drive the same device (the
//! `apm` family, the display compositor, a guest's GPU) hold clones of one
//! [`Shared<T>`]. Any number of readers may hold the value at once; a writer
//! is exclusive.
//!
//! ```text
//! let controller = Shared::new(ApmController::default());
//! let other = controller.clone();
//! other.write().set_mode(mode);
//! assert_eq!(controller.read().mode(), mode);
//! ```

use std::{fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared read access to a [`Shared<T>`].
pub type SharedReader<'a, T> = RwLockReadGuard<'a, T>;

/// Exclusive write access to a [`Shared<T>`].
pub type SharedWriter<'a, T> = RwLockWriteGuard<'a, T>;

/// One `T` shared between threads behind a reader/writer lock.
///
/// Cloning shares the same value.
pub struct Shared<T: ?Sized> {
    inner: Arc<RwLock<T>>,
}

impl<T> Shared<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }
}

impl<T: ?Sized> Shared<T> {
    /// Locks for shared read access, blocking while a writer holds the lock.
    #[inline]
    pub fn read(&self) -> SharedReader<'_, T> {
        self.inner.read()
    }

    /// Locks for exclusive write access.
    #[inline]
    pub fn write(&self) -> SharedWriter<'_, T> {
        self.inner.write()
    }

    /// Attempts shared access without blocking.
    #[inline]
    pub fn try_read(&self) -> Option<SharedReader<'_, T>> {
        self.inner.try_read()
    }

    /// Attempts exclusive access without blocking.
    #[inline]
    pub fn try_write(&self) -> Option<SharedWriter<'_, T>> {
        self.inner.try_write()
    }

    /// Returns the value without taking the lock.
    ///
    /// # Safety
    ///
    /// No other reference to the value (locked or unlocked) may exist while
    /// the returned reference lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn unlocked(&self) -> &mut T {
        // SAFETY: exclusivity is guaranteed by the caller.
        unsafe { &mut *self.inner.data_ptr() }
    }

    /// Returns `true` if both cells share one value.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(value) => f.debug_struct("Shared").field("value", &&*value).finish(),
            None => f.debug_struct("Shared").field("value", &"<locked>").finish(),
        }
    }
}
