//! Atomic primitives, swappable for loom's instrumented versions.
//!
//! Built normally, this re-exports `core::sync::atomic`. Built with
//! `RUSTFLAGS="--cfg loom"`, the same names resolve to loom's model-checked
//! atomics so the whole reclamation protocol can be explored exhaustively.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicPtr, AtomicU64};

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicPtr, AtomicU64};

pub(crate) use core::sync::atomic::Ordering;
