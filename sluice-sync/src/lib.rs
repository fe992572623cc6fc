//! Synchronization primitives shared by the Sluice crates.
//!
//! This crate bundles the small set of coordination tools that the worker
//! pool and its callers need:
//!
//! - [`WaitGroup`]: a counting completion primitive. Any task may register
//!   outstanding work before spawning dependents, and any number of callers
//!   can await the count reaching zero.
//! - [`ShutdownSignal`] / [`ShutdownHandle`]: a broadcast shutdown request
//!   that cooperating tasks check at every suspension point.
//! - [`SharedMap`]: a sharded, lock-based associative container safe for
//!   concurrent access from many tasks.
//!
//! All primitives are designed to be shared by cloning cheap handles rather
//! than wrapping them in additional locks.

mod map;
mod shutdown;
mod waitgroup;

pub use self::map::*;
pub use self::shutdown::*;
pub use self::waitgroup::*;
