//! Split reference counting over packed counted pointers.
//!
//! Every atomic slot that can hand out a node pointer (a stack head, a queue
//! head or tail, a queue node's `next`) stores a [`CountedPtr`]: the node
//! address packed together with an *external count* in a single `u64`, so one
//! CAS covers both fields. A thread never dereferences a node it has not
//! registered on: [`AtomicCountedPtr::acquire_ref`] bumps the slot's external
//! count, and the returned handle is the thread's licence to touch the node.
//!
//! Each node carries a [`SplitCount`] with two sub-fields: an internal count
//! (wrapping, transiently negative while a race loser's decrement lands ahead
//! of the winner's fold) and the number of external counters still holding the
//! node. Retiring a handle folds `external - 2` into the internal count — the
//! handle's own share and the slot's share retire together — and drops the
//! counter tally by one. The thread whose committed update observes both
//! sub-fields at zero frees the node, exactly once, and it need not be the
//! thread that unlinked it.
//!
//! The scheme needs no hazard-pointer registry and no epoch machinery; its
//! only global state is the slots themselves.

use core::marker::PhantomData;

use crate::primitive::{AtomicU64, Ordering};

const PTR_BITS: u32 = 48;
const PTR_MASK: u64 = (1 << PTR_BITS) - 1;
/// One external-count increment in packed form.
const EXTERNAL_ONE: u64 = 1 << PTR_BITS;
const EXTERNAL_MAX: u64 = (1 << 16) - 1;

/// A {node pointer, external count} pair packed into one word.
///
/// The external count of a handle in flight is always at least 1: it says how
/// many logical owners this particular snapshot may stand for until it is
/// either passed on or folded back into the node's internal count.
///
/// Layout: low 48 bits pointer (canonical user-space address), high 16 bits
/// external count.
pub(crate) struct CountedPtr<N> {
    bits: u64,
    _marker: PhantomData<*mut N>,
}

impl<N> Clone for CountedPtr<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for CountedPtr<N> {}

impl<N> PartialEq for CountedPtr<N> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<N> Eq for CountedPtr<N> {}

impl<N> core::fmt::Debug for CountedPtr<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CountedPtr")
            .field("ptr", &self.ptr())
            .field("external", &self.external_count())
            .finish()
    }
}

impl<N> CountedPtr<N> {
    /// The empty handle: null pointer, zero external count.
    pub(crate) fn null() -> Self {
        Self::from_bits(0)
    }

    /// Wraps a freshly allocated node with an external count of 1, ready to
    /// be installed in exactly one atomic slot.
    ///
    /// # Panics
    /// Debug builds panic if the address does not fit in 48 bits.
    pub(crate) fn new(ptr: *mut N) -> Self {
        let addr = ptr as u64;
        debug_assert_eq!(addr & !PTR_MASK, 0, "node address exceeds 48 bits");
        Self::from_bits(addr | EXTERNAL_ONE)
    }

    fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }

    /// The node this handle refers to (null for the empty handle).
    pub(crate) fn ptr(self) -> *mut N {
        (self.bits & PTR_MASK) as *mut N
    }

    pub(crate) fn is_null(self) -> bool {
        self.bits & PTR_MASK == 0
    }

    /// The external count carried by this snapshot.
    pub(crate) fn external_count(self) -> u32 {
        (self.bits >> PTR_BITS) as u32
    }

    /// The same handle with one more registered owner.
    fn bumped(self) -> Self {
        debug_assert!(u64::from(self.external_count()) < EXTERNAL_MAX);
        Self::from_bits(self.bits + EXTERNAL_ONE)
    }

    /// The same handle with one owner fewer. Used to hand a registration
    /// straight back to the slot it came from when the node was never
    /// touched, which keeps a polled-while-empty slot's count from growing.
    pub(crate) fn unbumped(self) -> Self {
        debug_assert!(self.external_count() >= 1);
        Self::from_bits(self.bits - EXTERNAL_ONE)
    }
}

/// An atomic slot holding a [`CountedPtr`].
pub(crate) struct AtomicCountedPtr<N> {
    bits: AtomicU64,
    _marker: PhantomData<*mut N>,
}

impl<N> AtomicCountedPtr<N> {
    pub(crate) fn new(value: CountedPtr<N>) -> Self {
        Self {
            bits: AtomicU64::new(value.bits),
            _marker: PhantomData,
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> CountedPtr<N> {
        CountedPtr::from_bits(self.bits.load(order))
    }

    pub(crate) fn compare_exchange(
        &self,
        current: CountedPtr<N>,
        new: CountedPtr<N>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<N>, CountedPtr<N>> {
        self.bits
            .compare_exchange(current.bits, new.bits, success, failure)
            .map(CountedPtr::from_bits)
            .map_err(CountedPtr::from_bits)
    }

    pub(crate) fn compare_exchange_weak(
        &self,
        current: CountedPtr<N>,
        new: CountedPtr<N>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<N>, CountedPtr<N>> {
        self.bits
            .compare_exchange_weak(current.bits, new.bits, success, failure)
            .map(CountedPtr::from_bits)
            .map_err(CountedPtr::from_bits)
    }

    /// Registers one more owner on whatever handle the slot currently holds
    /// and returns that handle.
    ///
    /// `observed` is a hint from an earlier load; on contention the loop
    /// re-reads and retries, so the returned handle always reflects a
    /// successfully committed increment. The slot may hold the empty handle,
    /// in which case the increment is committed all the same and the caller
    /// sees a null node.
    pub(crate) fn acquire_ref(&self, mut observed: CountedPtr<N>) -> CountedPtr<N> {
        loop {
            let registered = observed.bumped();
            match self.compare_exchange_weak(
                observed,
                registered,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return registered,
                Err(current) => observed = current,
            }
        }
    }
}

const COUNTERS_SHIFT: u32 = 32;
const INTERNAL_MASK: u64 = u32::MAX as u64;

/// A node's atomic count record: {internal count, external-counter count}.
///
/// Both sub-fields live in one `AtomicU64` (internal in the low half,
/// wrapping; counters in the high half) updated by compare-exchange loops
/// rather than blind fetch-adds, so an internal-count borrow can never ripple
/// into the counter field.
pub(crate) struct SplitCount {
    bits: AtomicU64,
}

impl SplitCount {
    /// A fresh record: internal count 0, `external_counters` live counters.
    pub(crate) fn new(external_counters: u32) -> Self {
        Self {
            bits: AtomicU64::new(u64::from(external_counters) << COUNTERS_SHIFT),
        }
    }

    /// Retires a slot's handle: folds `external - 2` into the internal count
    /// and drops the external-counter tally by one. Returns true when the
    /// combined count reached zero and the caller must free the node.
    pub(crate) fn release_external(&self, handle_external: u32) -> bool {
        self.update(handle_external.wrapping_sub(2), 1)
    }

    /// Drops one internal credit (a thread that registered but lost its
    /// race). Returns true when the combined count reached zero.
    pub(crate) fn release_internal(&self) -> bool {
        self.update(1u32.wrapping_neg(), 0)
    }

    fn update(&self, internal_delta: u32, counter_dec: u32) -> bool {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let internal = (current & INTERNAL_MASK) as u32;
            let counters = (current >> COUNTERS_SHIFT) as u32;
            debug_assert!(counters >= counter_dec, "external counter underflow");
            let next = (u64::from(counters - counter_dec) << COUNTERS_SHIFT)
                | u64::from(internal.wrapping_add(internal_delta));
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next == 0,
                Err(actual) => current = actual,
            }
        }
    }
}

/// A node whose lifetime is governed by a [`SplitCount`].
pub(crate) trait RefCounted {
    fn split_count(&self) -> &SplitCount;
}

/// Retires `handle` after its owner is done with the node, freeing the node
/// if this was the last reference.
///
/// # Safety
/// `handle` must be non-null and must have been obtained from
/// [`AtomicCountedPtr::acquire_ref`] (or carried over from a slot the caller
/// just emptied), and must not be used again afterwards.
pub(crate) unsafe fn release<N: RefCounted>(handle: CountedPtr<N>) {
    let node = handle.ptr();
    debug_assert!(!node.is_null());
    if (*node).split_count().release_external(handle.external_count()) {
        drop(Box::from_raw(node));
    }
}

/// Drops a single internal credit on `node`, freeing it if this was the last
/// reference. Used by threads that registered on a node and then lost the
/// removal race.
///
/// # Safety
/// The caller must hold exactly one unreleased registration on `node` and
/// must not touch the node afterwards.
pub(crate) unsafe fn release_single<N: RefCounted>(node: *mut N) {
    if (*node).split_count().release_internal() {
        drop(Box::from_raw(node));
    }
}
