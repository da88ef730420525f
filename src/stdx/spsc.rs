//! Wait-free SPSC (Single-Producer, Single-Consumer) bounded channel.
//!
//! # Design
//!
//! The ring is a fixed array of `N` slots that own their items by value, plus
//! two monotonically increasing `u32` counters:
//!
//! - `pushed`: number of completed pushes. Only the producer stores it.
//! - `popped`: number of completed pops. Only the consumer stores it.
//!
//! The number of queued items is `pushed - popped` (wrapping), always in
//! `[0, N]`. The slot for a counter value `c` is `c & (N - 1)`, so counter
//! wraparound at `u32::MAX` is harmless as long as `N` is a power of two.
//!
//! # Key properties
//!
//! - **Wait-free**: `try_push` and `try_pop` complete in bounded steps and
//!   never block. A full channel is reported back to the producer with the
//!   rejected item so it can treat the condition as backpressure.
//! - **No CAS**: Only `Acquire`/`Release` loads and stores.
//! - **Cached remote counter**: The producer caches `popped` and reloads it
//!   only on apparent-full; the consumer caches `pushed` and reloads it only on
//!   apparent-empty.
//! - **Cache-line padded**: The two counters live on separate cache lines.
//! - **Power-of-2 capacity**: Checked at compile time; there is no runtime
//!   error path for a bad capacity.
//!
//! # Ordering
//!
//! ```text
//! Producer writes slot, then Release-stores pushed  →  consumer Acquire-loads pushed, then reads slot
//! Consumer reads slot, then Release-stores popped   →  producer Acquire-loads popped, then writes slot
//! ```
//!
//! # Safety
//!
//! Uses `unsafe` for `MaybeUninit` slot access. The producer only writes slots
//! outside `[popped, pushed)` and the consumer only reads slots inside it.
//! Handles take `&mut self`, so each role is used by one thread at a time.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(loom))]
use std::sync::Arc;

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(loom)]
use loom::sync::Arc;

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

// Compile-time proof that u32 -> usize is safe on this platform.
const _: () = assert!(
    std::mem::size_of::<usize>() >= std::mem::size_of::<u32>(),
    "Platform must have at least 32-bit addressing"
);

/// Create an uninitialized `[MaybeUninit<T>; N]` without running any constructors.
fn uninit_array<T, const N: usize>() -> [MaybeUninit<T>; N] {
    // SAFETY: An uninitialized MaybeUninit<T> is valid by definition.
    unsafe { MaybeUninit::<[MaybeUninit<T>; N]>::uninit().assume_init() }
}

// ============================================================================
// Shared Ring Storage
// ============================================================================

/// Shared storage backing the channel.
///
/// # Invariants
///
/// - `N` is a power of 2 and fits in `u32` (validated at compile time).
/// - Slots in the logical range `[popped, pushed)` (masked) are initialized;
///   all other slots are uninitialized.
/// - `pushed.wrapping_sub(popped) <= N`.
struct SpscRing<T, const N: usize> {
    /// Slot storage. The producer writes and the consumer reads different
    /// slots concurrently; the counters decide who owns which slot.
    buf: UnsafeCell<[MaybeUninit<T>; N]>,

    /// Completed pop count. Stored by the consumer (Release), loaded by the
    /// producer (Acquire) to detect free slots.
    popped: CachePadded<AtomicU32>,

    /// Completed push count. Stored by the producer (Release), loaded by the
    /// consumer (Acquire) to detect published slots.
    pushed: CachePadded<AtomicU32>,
}

impl<T, const N: usize> SpscRing<T, N> {
    const CAPACITY: u32 = {
        assert!(N > 0, "SPSC capacity must be > 0");
        assert!(N & (N - 1) == 0, "SPSC capacity must be power of 2");
        assert!(
            N <= u32::MAX as usize / 2,
            "N must fit in u32 and not risk overflow"
        );
        N as u32
    };

    /// Bitmask for power-of-2 modulo: `counter & MASK == counter % CAPACITY`.
    const MASK: u32 = Self::CAPACITY - 1;

    fn new() -> Self {
        // Force compile-time validation of CAPACITY.
        let _ = Self::CAPACITY;

        Self {
            buf: UnsafeCell::new(uninit_array()),
            popped: CachePadded::new(AtomicU32::new(0)),
            pushed: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Snapshot of the queued item count.
    ///
    /// Exact when called by either endpoint for its own counter; the remote
    /// counter may advance concurrently, so the value can be stale by the
    /// time it is used.
    #[inline]
    fn len(&self) -> u32 {
        let popped = self.popped.load(Ordering::Acquire);
        let pushed = self.pushed.load(Ordering::Acquire);
        let len = pushed.wrapping_sub(popped);
        debug_assert!(len <= Self::CAPACITY, "SPSC count out of range: {len}");
        len
    }
}

// SAFETY: The SPSC protocol ensures that producer and consumer access
// disjoint slots. The atomic counters enforce the access discipline.
unsafe impl<T: Send, const N: usize> Sync for SpscRing<T, N> {}
unsafe impl<T: Send, const N: usize> Send for SpscRing<T, N> {}

impl<T, const N: usize> Drop for SpscRing<T, N> {
    fn drop(&mut self) {
        // Drop any items remaining in the ring.
        let popped = self.popped.load(Ordering::Relaxed);
        let pushed = self.pushed.load(Ordering::Relaxed);
        let buf = self.buf.get_mut();

        let mut idx = popped;
        while idx != pushed {
            let slot = (idx & Self::MASK) as usize;
            // SAFETY: Slots in [popped, pushed) are initialized.
            unsafe { buf[slot].assume_init_drop() };
            idx = idx.wrapping_add(1);
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Producer half of the channel.
///
/// The handle can be moved to another thread; `try_push` takes `&mut self`,
/// so only one thread pushes at a time.
pub struct SpscProducer<T, const N: usize> {
    ring: Arc<SpscRing<T, N>>,
    /// Cached snapshot of the consumer's `popped`. Only refreshed when the
    /// ring appears full.
    cached_popped: u32,
}

impl<T, const N: usize> SpscProducer<T, N> {
    /// Attempt to push `value` into the ring.
    ///
    /// Returns `Ok(())` if successful, `Err(value)` if the ring is full.
    ///
    /// # Ordering
    ///
    /// 1. Read current `pushed` (Relaxed; only this handle writes it).
    /// 2. If `pushed - cached_popped >= capacity`, reload `popped` with
    ///    Acquire to observe consumer progress.
    /// 3. Write value into slot at `pushed & MASK`.
    /// 4. Release-store `pushed + 1` to publish the slot.
    #[inline(always)]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let pushed = self.ring.pushed.load(Ordering::Relaxed);

        if pushed.wrapping_sub(self.cached_popped) >= SpscRing::<T, N>::CAPACITY {
            self.cached_popped = self.ring.popped.load(Ordering::Acquire);
            if pushed.wrapping_sub(self.cached_popped) >= SpscRing::<T, N>::CAPACITY {
                return Err(value);
            }
        }

        let slot = (pushed & SpscRing::<T, N>::MASK) as usize;
        // SAFETY: The slot is outside [popped, pushed), so the consumer will
        // not read it until `pushed` is advanced below.
        unsafe {
            let buf = &mut *self.ring.buf.get();
            buf[slot] = MaybeUninit::new(value);
        }

        self.ring
            .pushed
            .store(pushed.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Number of items currently queued (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len() as usize
    }

    /// Returns true when no items are queued (snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Returns true when a push would be rejected right now.
    ///
    /// From the producer's side a `true` can only turn `false` later, never
    /// the other way round.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.len() == SpscRing::<T, N>::CAPACITY
    }

    /// Fixed capacity `N`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Consumer half of the channel.
///
/// The handle can be moved to another thread; `try_pop` takes `&mut self`,
/// so only one thread pops at a time.
pub struct SpscConsumer<T, const N: usize> {
    ring: Arc<SpscRing<T, N>>,
    /// Cached snapshot of the producer's `pushed`. Only refreshed when the
    /// ring appears empty.
    cached_pushed: u32,
}

impl<T, const N: usize> SpscConsumer<T, N> {
    /// Attempt to pop a value from the ring.
    ///
    /// Returns `Some(value)` if successful, `None` if the ring is empty.
    ///
    /// # Ordering
    ///
    /// 1. Read current `popped` (Relaxed; only this handle writes it).
    /// 2. If `popped == cached_pushed`, reload `pushed` with Acquire.
    /// 3. Read value from slot at `popped & MASK`.
    /// 4. Release-store `popped + 1` to free the slot.
    #[inline(always)]
    pub fn try_pop(&mut self) -> Option<T> {
        let popped = self.ring.popped.load(Ordering::Relaxed);

        if popped == self.cached_pushed {
            self.cached_pushed = self.ring.pushed.load(Ordering::Acquire);
            if popped == self.cached_pushed {
                return None;
            }
        }

        let slot = (popped & SpscRing::<T, N>::MASK) as usize;
        // SAFETY: The slot is inside [popped, pushed) and therefore
        // initialized. The producer will not overwrite it until `popped`
        // is advanced below.
        let value = unsafe {
            let buf = &*self.ring.buf.get();
            buf[slot].as_ptr().read()
        };

        self.ring
            .popped
            .store(popped.wrapping_add(1), Ordering::Release);

        Some(value)
    }

    /// Attempt to pop up to `out.len()` values from the ring in batch.
    ///
    /// Returns the number of values actually popped (0 if ring is empty).
    /// Values are written into `out[0..n]`; callers must `assume_init` only
    /// those.
    ///
    /// Refreshes the cached `pushed` once, reads every available slot, then
    /// publishes a single `popped` update.
    #[inline]
    pub fn try_pop_batch(&mut self, out: &mut [MaybeUninit<T>]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let popped = self.ring.popped.load(Ordering::Relaxed);
        self.cached_pushed = self.ring.pushed.load(Ordering::Acquire);

        let available = self.cached_pushed.wrapping_sub(popped) as usize;
        if available == 0 {
            return 0;
        }

        let count = available.min(out.len());

        // SAFETY: All slots in [popped, popped+count) are initialized.
        unsafe {
            let buf = &*self.ring.buf.get();
            for (i, slot_out) in out[..count].iter_mut().enumerate() {
                let slot = (popped.wrapping_add(i as u32) & SpscRing::<T, N>::MASK) as usize;
                *slot_out = MaybeUninit::new(buf[slot].as_ptr().read());
            }
        }

        self.ring
            .popped
            .store(popped.wrapping_add(count as u32), Ordering::Release);

        count
    }

    /// Number of items currently queued (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len() as usize
    }

    /// Returns true when a pop would return `None` right now.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Returns true when every slot is occupied (snapshot).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.len() == SpscRing::<T, N>::CAPACITY
    }

    /// Fixed capacity `N`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

// ============================================================================
// Constructor
// ============================================================================

/// Create a new SPSC channel with capacity `N` (must be power of 2).
///
/// Returns a `(SpscProducer, SpscConsumer)` pair sharing one heap-allocated
/// ring. The ring, and any items still queued, are dropped once both handles
/// are gone.
///
/// # Panics
///
/// Compile-time panic if `N` is not a power of 2, is zero, or exceeds `u32::MAX / 2`.
///
/// # Example
///
/// ```
/// use readahead_rs::stdx::spsc_channel;
///
/// let (mut tx, mut rx) = spsc_channel::<u64, 8>();
/// tx.try_push(42).unwrap();
/// assert_eq!(rx.try_pop(), Some(42));
/// ```
pub fn spsc_channel<T: Send, const N: usize>() -> (SpscProducer<T, N>, SpscConsumer<T, N>) {
    let _ = SpscRing::<T, N>::CAPACITY;

    let ring = Arc::new(SpscRing::<T, N>::new());
    let producer = SpscProducer {
        ring: Arc::clone(&ring),
        cached_popped: 0,
    };
    let consumer = SpscConsumer {
        ring,
        cached_pushed: 0,
    };
    (producer, consumer)
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================


// ============================================================================
// Loom Tests
// ============================================================================
