//! Fixed-capacity, inline vector for small, bounded collections.
//!
//! Used by the prefetch worker for its pending-cancel list: the number of
//! outstanding ids is bounded by the channel capacity, so a linear scan over
//! a handful of inline slots beats any hashed structure.
//!
//! # Invariants
//! - `len <= N` at all times.
//! - Elements in `0..len` are initialized and valid.
//! - Elements in `len..N` are uninitialized and must never be read or dropped.
//!
//! # Design Notes
//! - Uses `MaybeUninit` to avoid `T: Default` and to skip zeroing.
//! - Overflow is reported to the caller (`try_push`) instead of allocating.
//! - All internal `unsafe` blocks rely on the invariants above.

use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;

/// Fixed-capacity vector backed by an inline array.
///
/// # Guarantees
/// - Capacity is always `N`; this type never reallocates.
/// - Elements are stored contiguously. `swap_remove` does not preserve order.
pub struct FixedVec<T, const N: usize> {
    // Number of initialized elements in `buf`.
    len: usize,
    // Inline storage; only `0..len` is initialized.
    buf: [MaybeUninit<T>; N],
}

fn uninit_array<T, const N: usize>() -> [MaybeUninit<T>; N] {
    // SAFETY: An uninitialized `MaybeUninit<T>` is always valid, and the array
    // only contains `MaybeUninit` values.
    unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() }
}

impl<T, const N: usize> FixedVec<T, N> {
    /// Creates an empty `FixedVec` with all slots uninitialized.
    pub fn new() -> Self {
        Self {
            len: 0,
            buf: uninit_array(),
        }
    }

    /// Number of initialized elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no elements are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true when `len == N`.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Appends `value`, returning it back as `Err` when the vector is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.buf[self.len].write(value);
        self.len += 1;
        Ok(())
    }

    /// Removes the element at `index` by moving the last element into its
    /// slot. O(1); does not preserve order.
    ///
    /// # Panics
    /// - Panics if `index >= len`.
    pub fn swap_remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "swap_remove index {index} out of bounds (len {})",
            self.len
        );
        let last = self.len - 1;
        self.buf.swap(index, last);
        self.len = last;
        // SAFETY: slot `last` held an initialized element (it was inside
        // `0..len` before the decrement) and is now outside the live prefix,
        // so it is read exactly once.
        unsafe { self.buf[last].as_ptr().read() }
    }

    /// Returns a shared slice of the initialized prefix.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `0..len` is initialized and contiguous.
        unsafe { std::slice::from_raw_parts(self.buf.as_ptr().cast::<T>(), self.len) }
    }

    /// Drops all initialized elements, leaving capacity unchanged.
    pub fn clear(&mut self) {
        // needs_drop is a const fn, so this branch is eliminated at compile time.
        if std::mem::needs_drop::<T>() {
            // SAFETY: only the first `len` elements are initialized.
            unsafe {
                for i in 0..self.len {
                    std::ptr::drop_in_place(self.buf[i].as_mut_ptr());
                }
            }
        }
        self.len = 0;
    }
}

impl<T: PartialEq, const N: usize> FixedVec<T, N> {
    /// Removes the first element equal to `value`, returning true if one was
    /// found.
    pub fn remove_item(&mut self, value: &T) -> bool {
        match self.as_slice().iter().position(|item| item == value) {
            Some(index) => {
                drop(self.swap_remove(index));
                true
            }
            None => false,
        }
    }
}

impl<T, const N: usize> Default for FixedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for FixedVec<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_slice().fmt(f)
    }
}

impl<T, const N: usize> Deref for FixedVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, const N: usize> Drop for FixedVec<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}
