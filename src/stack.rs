//! A lock-free, unbounded MPMC LIFO stack.
//!
//! Nodes are reclaimed with the split reference counting protocol from
//! [`refcount`](crate::refcount): one atomic counted head slot, and each node
//! carries an internal/external count record. Progress is lock-free — a
//! losing CAS retries, but some thread's operation always commits — and no
//! operation ever blocks.
//!
//! Concurrent pushes race for the head and their relative order is
//! unspecified; the most recently linked push is the next pop's victim.

use core::mem::ManuallyDrop;

use crossbeam_utils::CachePadded;

use crate::primitive::Ordering;
use crate::refcount::{
    release, release_single, AtomicCountedPtr, CountedPtr, RefCounted, SplitCount,
};

struct Node<T> {
    data: ManuallyDrop<T>,
    count: SplitCount,
    /// Written only while the node is still private; immutable once linked.
    next: CountedPtr<Node<T>>,
}

impl<T> RefCounted for Node<T> {
    fn split_count(&self) -> &SplitCount {
        &self.count
    }
}

/// An unbounded lock-free LIFO stack.
///
/// `push` and `pop` may be called from any number of threads concurrently.
/// Values are never duplicated and never lost: each pushed value is returned
/// by exactly one `pop`, or dropped when the stack itself is dropped.
pub struct LockFreeStack<T> {
    head: CachePadded<AtomicCountedPtr<Node<T>>>,
}

unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> LockFreeStack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicCountedPtr::new(CountedPtr::null())),
        }
    }

    /// Pushes `value` onto the stack.
    ///
    /// Never fails and never blocks; the node is private until the head swing
    /// commits, so there is no window in which another thread can observe a
    /// half-initialized element.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            data: ManuallyDrop::new(value),
            // Exactly one slot (the head) will hold the new node.
            count: SplitCount::new(1),
            next: CountedPtr::null(),
        }));
        let handle = CountedPtr::new(node);
        let mut expected = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is unpublished; no other thread can see it.
            unsafe { (*node).next = expected };
            match self.head.compare_exchange_weak(
                expected,
                handle,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => expected = current,
            }
        }
    }

    /// Pops the most recently pushed value, or `None` if the stack is empty.
    ///
    /// Emptiness is a normal result, not an error, and is answered without
    /// blocking.
    pub fn pop(&self) -> Option<T> {
        let mut observed = self.head.load(Ordering::Relaxed);
        loop {
            // Registering on the empty handle would be pointless churn on the
            // slot's count; an observed null head is already a linearizable
            // empty answer.
            if observed.is_null() {
                return None;
            }
            let handle = self.head.acquire_ref(observed);
            let node = handle.ptr();
            if node.is_null() {
                return None;
            }
            // SAFETY: the registered handle keeps the node alive; `next` is
            // immutable after publication.
            let next = unsafe { (*node).next };
            match self
                .head
                .compare_exchange(handle, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    // The winning CAS grants sole ownership of the payload;
                    // in-flight losers may still reference the node itself,
                    // so the node is released, not freed, here.
                    // SAFETY: exactly one thread wins the CAS for this node.
                    let value = unsafe { ManuallyDrop::take(&mut (*node).data) };
                    // SAFETY: `handle` came from `acquire_ref` above.
                    unsafe { release(handle) };
                    return Some(value);
                }
                Err(current) => {
                    // SAFETY: we hold the registration taken by `acquire_ref`.
                    unsafe { release_single(node) };
                    observed = current;
                }
            }
        }
    }

    /// Whether the stack was empty at some instant during the call.
    ///
    /// Purely a snapshot; concurrent pushes and pops may invalidate the
    /// answer immediately.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        let mut drained = 0_usize;
        while self.pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            #[cfg(feature = "tracing")]
            tracing::trace!(drained, "dropped stack still held elements");
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn lifo_order_single_thread() {
        let stack = LockFreeStack::new();
        assert!(stack.is_empty());
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert!(!stack.is_empty());
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_on_fresh_stack_is_none() {
        let stack: LockFreeStack<String> = LockFreeStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
    }

    struct Tally(Arc<AtomicUsize>);

    impl Drop for Tally {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn drop_drains_and_frees_every_element() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stack = LockFreeStack::new();
        for _ in 0..10 {
            stack.push(Tally(Arc::clone(&drops)));
        }
        // Popped values are dropped by the caller, the rest by the stack.
        drop(stack.pop());
        drop(stack.pop());
        assert_eq!(drops.load(Ordering::Relaxed), 2);
        drop(stack);
        assert_eq!(drops.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn concurrent_push_pop_smoke() {
        const PER_THREAD: usize = 1000;
        let stack = LockFreeStack::new();
        let popped = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            let stack = &stack;
            let popped = &popped;
            for t in 0..4 {
                scope.spawn(move || {
                    for i in 0..PER_THREAD {
                        stack.push(t * PER_THREAD + i);
                    }
                });
            }
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..PER_THREAD {
                        if stack.pop().is_some() {
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        let mut rest = 0;
        while stack.pop().is_some() {
            rest += 1;
        }
        assert_eq!(popped.load(Ordering::Relaxed) + rest, 4 * PER_THREAD);
    }
}
