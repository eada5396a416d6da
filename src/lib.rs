//! # `strand` - Lock-free stack and queue with split reference counting
//!
//! Two unbounded, multi-producer multi-consumer linked collections — a LIFO
//! [`LockFreeStack`] and a FIFO [`LockFreeQueue`] — sharing one safe
//! memory-reclamation scheme: split (external/internal) reference counting
//! over singly-linked nodes, driven entirely by atomic read-modify-write and
//! compare-and-swap operations. No locks, no hazard-pointer runtime, no
//! epoch collector.
//!
//! ## Guarantees
//!
//! - **Lock-free progress**: no operation ever blocks; a losing CAS retries,
//!   and some thread's operation always completes in a bounded number of
//!   steps. Individual operations are not wait-free — a single thread may
//!   retry indefinitely under sustained contention.
//! - **Exactly-once reclamation**: a node is freed precisely when its
//!   internal count and external-counter count are simultaneously zero, by
//!   whichever thread observes that transition — never while any thread
//!   still holds a handle to it, and never twice.
//! - **Exactly-once delivery**: payload ownership transfers atomically from
//!   the one inserter that wins the link race to the one remover that wins
//!   the unlink race; no value is ever observed by two removers.
//! - **ABA immunity**: every shared slot stores a counted pointer, not a
//!   bare one, so a recycled address cannot satisfy a stale compare.
//!
//! The queue preserves per-producer FIFO order. The stack only promises that
//! the most recently linked push is the next pop's result; concurrent pushes
//! race and their relative order is unspecified.
//!
//! Both structures are unbounded (allocation-limited only) and drain
//! themselves deterministically on drop.
//!
//! ## Example
//!
//! ```rust
//! use strand::LockFreeQueue;
//!
//! let queue = LockFreeQueue::new();
//! std::thread::scope(|scope| {
//!     scope.spawn(|| {
//!         for i in 0..100 {
//!             queue.enqueue(i);
//!         }
//!     });
//!     scope.spawn(|| {
//!         let mut last = None;
//!         while last != Some(99) {
//!             if let Some(value) = queue.extract_front() {
//!                 last = Some(value);
//!             }
//!         }
//!     });
//! });
//! assert!(queue.is_empty());
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod primitive;
mod refcount;

pub mod queue;
pub mod stack;

pub use queue::LockFreeQueue;
pub use stack::LockFreeStack;

// Compile-time layout claims: the counted handle must stay a single word so
// that one CAS covers both the pointer and its external count.
const _: () = {
    use core::mem;

    assert!(mem::size_of::<refcount::CountedPtr<u64>>() == mem::size_of::<u64>());
    assert!(mem::align_of::<refcount::CountedPtr<u64>>() == mem::align_of::<u64>());
};
