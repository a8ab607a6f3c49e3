//! # equeue
//!
//! A single cooperative queue of deferred calls and software timers.
//!
//! All callbacks execute strictly one at a time, to completion, on the
//! dispatching thread; there is no preemption between any two handlers.
//! Components built on top of the queue rely on this to perform multi-step
//! read-modify-write sequences without additional locking.
//!
//! The queue keeps a *virtual* millisecond clock. Tests drive it
//! deterministically with [`EventQueue::advance`]; production code maps real
//! elapsed time onto the same clock through [`EventQueue::dispatch_forever`].

pub mod queue;

pub use queue::{EventQueue, TimerId};
