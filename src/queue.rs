//! A lock-free, unbounded MPMC FIFO queue.
//!
//! The chain always contains at least one node: a sentinel with no payload.
//! "Empty" means head and tail refer to the same node, never a null check.
//! Enqueueing claims the current tail's empty data slot, then links a fresh
//! sentinel successor — two separate CAS steps, so an enqueuer that loses the
//! data claim *helps* finish the winner's link instead of retrying from
//! scratch, which bounds retries by the number of contending producers.
//!
//! Head, tail and every node's `next` are counted pointers, reclaimed with
//! the split reference counting protocol from [`refcount`](crate::refcount).
//! A node starts with two external counters because head and tail can both
//! hold it (they both start on the sentinel).
//!
//! Values are delivered in per-producer program order: if one thread's
//! enqueue of A happens-before its enqueue of B, A is extracted first.

use core::ptr;

use crossbeam_utils::CachePadded;

use crate::primitive::{AtomicPtr, Ordering};
use crate::refcount::{
    release, release_single, AtomicCountedPtr, CountedPtr, RefCounted, SplitCount,
};

struct Node<T> {
    /// Boxed payload; null while the node is still the unclaimed tail.
    data: AtomicPtr<T>,
    count: SplitCount,
    next: AtomicCountedPtr<Node<T>>,
}

impl<T> Node<T> {
    /// A fresh sentinel: no payload, no successor, two external counters.
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: AtomicPtr::new(ptr::null_mut()),
            count: SplitCount::new(2),
            next: AtomicCountedPtr::new(CountedPtr::null()),
        }))
    }
}

impl<T> RefCounted for Node<T> {
    fn split_count(&self) -> &SplitCount {
        &self.count
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        // A node owns its boxed payload until an extraction nulls the slot.
        let data = self.data.load(Ordering::Relaxed);
        if !data.is_null() {
            // SAFETY: the payload box is exclusively ours once the node dies.
            unsafe { drop(Box::from_raw(data)) };
        }
    }
}

/// An unbounded lock-free FIFO queue.
///
/// `enqueue` and `extract_front` may be called from any number of threads
/// concurrently. Each value is delivered to exactly one extractor, or dropped
/// when the queue itself is dropped.
pub struct LockFreeQueue<T> {
    head: CachePadded<AtomicCountedPtr<Node<T>>>,
    tail: CachePadded<AtomicCountedPtr<Node<T>>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Creates an empty queue: head and tail share one sentinel node.
    pub fn new() -> Self {
        let sentinel = CountedPtr::new(Node::sentinel());
        Self {
            head: CachePadded::new(AtomicCountedPtr::new(sentinel)),
            tail: CachePadded::new(AtomicCountedPtr::new(sentinel)),
        }
    }

    /// Appends `value` at the back of the queue.
    ///
    /// Never fails and never blocks. The payload box and the spare successor
    /// node are allocated before any shared state is touched, so the
    /// operation is commit-or-no-op.
    pub fn enqueue(&self, value: T) {
        let data = Box::into_raw(Box::new(value));
        let mut spare = CountedPtr::new(Node::sentinel());
        let mut observed = self.tail.load(Ordering::Relaxed);
        loop {
            let tail = self.tail.acquire_ref(observed);
            let node = tail.ptr();
            // SAFETY: the registered handle keeps the tail node alive.
            let (data_slot, next_slot) = unsafe { (&(*node).data, &(*node).next) };

            if data_slot
                .compare_exchange(ptr::null_mut(), data, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // Data claimed. Link our spare as the successor, unless a
                // helper got there first, in which case adopt theirs.
                let next = match next_slot.compare_exchange(
                    CountedPtr::null(),
                    spare,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => spare,
                    Err(linked) => {
                        // SAFETY: our spare was never published anywhere.
                        unsafe { drop(Box::from_raw(spare.ptr())) };
                        linked
                    }
                };
                // SAFETY: `tail` is our registered handle on the old tail.
                unsafe { self.swing_tail(tail, next) };
                return;
            }

            // Lost the data claim: help complete the contended node's link so
            // no enqueuer is ever starved, then chase the new tail.
            let next = match next_slot.compare_exchange(
                CountedPtr::null(),
                spare,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let linked = spare;
                    // The chain consumed our spare; bring another.
                    spare = CountedPtr::new(Node::sentinel());
                    linked
                }
                Err(linked) => linked,
            };
            // SAFETY: as above.
            unsafe { self.swing_tail(tail, next) };
            observed = self.tail.load(Ordering::Relaxed);
        }
    }

    /// Removes and returns the value at the front, or `None` if the queue is
    /// empty. Emptiness is a normal result, not an error.
    pub fn extract_front(&self) -> Option<T> {
        let mut observed = self.head.load(Ordering::Relaxed);
        loop {
            let head = self.head.acquire_ref(observed);
            let node = head.ptr();
            if node == self.tail.load(Ordering::Acquire).ptr() {
                // Empty by the sentinel convention. The registration taken
                // above must still be returned: preferably straight back to
                // the slot (so a poll loop on an empty queue cannot grow the
                // slot's count), otherwise through the node's record.
                if self
                    .head
                    .compare_exchange(head, head.unbumped(), Ordering::Relaxed, Ordering::Relaxed)
                    .is_err()
                {
                    // SAFETY: we hold the registration from `acquire_ref`.
                    unsafe { release_single(node) };
                }
                return None;
            }
            // SAFETY: the registered handle keeps the node alive.
            let next = unsafe { &(*node).next }.load(Ordering::Acquire);
            match self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    // Head is past the node; take sole ownership of the
                    // payload. The slot cannot be empty: a successor is only
                    // ever linked after the data claim succeeded.
                    // SAFETY: node is alive until `release` below.
                    let data = unsafe { &(*node).data }.swap(ptr::null_mut(), Ordering::AcqRel);
                    debug_assert!(!data.is_null());
                    // SAFETY: `head` is the handle registered above.
                    unsafe { release(head) };
                    // SAFETY: the swap transferred the payload box to us.
                    return Some(*unsafe { Box::from_raw(data) });
                }
                Err(current) => {
                    // SAFETY: we hold the registration from `acquire_ref`.
                    unsafe { release_single(node) };
                    observed = current;
                }
            }
        }
    }

    /// Whether the queue was empty at some instant during the call.
    ///
    /// Purely a snapshot; concurrent operations may invalidate the answer
    /// immediately.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).ptr() == self.tail.load(Ordering::Relaxed).ptr()
    }

    /// Advances tail from `old_tail`'s node to `new_tail`, then retires this
    /// thread's registration on the old tail: through its external counter if
    /// this thread performed the swing, or as a plain reference if another
    /// thread got there first.
    ///
    /// # Safety
    /// `old_tail` must be this thread's registered handle on the current tail
    /// node and must not be used afterwards.
    unsafe fn swing_tail(&self, mut old_tail: CountedPtr<Node<T>>, new_tail: CountedPtr<Node<T>>) {
        let node = old_tail.ptr();
        loop {
            match self.tail.compare_exchange_weak(
                old_tail,
                new_tail,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    release(old_tail);
                    return;
                }
                Err(current) if current.ptr() == node => {
                    // Same node, refreshed external count; retry the swing.
                    old_tail = current;
                }
                Err(_) => {
                    // Another thread advanced the tail and its release will
                    // credit our registration; give that credit back.
                    release_single(node);
                    return;
                }
            }
        }
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        let mut drained = 0_usize;
        while self.extract_front().is_some() {
            drained += 1;
        }
        // Quiescent and drained: both slots hold the one remaining sentinel.
        let sentinel = self.head.load(Ordering::Relaxed);
        debug_assert_eq!(sentinel.ptr(), self.tail.load(Ordering::Relaxed).ptr());
        // SAFETY: exclusive access; no outstanding handles can exist.
        unsafe { drop(Box::from_raw(sentinel.ptr())) };
        if drained > 0 {
            #[cfg(feature = "tracing")]
            tracing::trace!(drained, "dropped queue still held elements");
        }
    }
}
