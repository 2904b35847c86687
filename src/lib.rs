//! `uring-heap`: a safe, slot-allocator-backed wrapper over `io_uring`
//! submission and completion.
//!
//! The crate is built from two pieces, leaves-first:
//!
//! - [`heap`] — a fixed-capacity arena ("the heap") mapping short integer
//!   handles to caller-supplied payloads, with use-after-free detection.
//!   This is what lets a [`heap::SlotId`] travel through the kernel as
//!   opaque `user_data` and come back identifying exactly one in-flight
//!   operation.
//! - [`ring`] — the coordinator that pairs a [`heap::Heap`] with a real
//!   `io_uring::IoUring`: preparing submission entries, draining them to the
//!   kernel, and reaping completions back into `(token, result)` pairs.
//!
//! [`flags`] holds the value-type vocabularies (`O_*` open flags,
//! `RESOLVE_*` bits, poll masks, the access tag, and the socket-address
//! container) the operation catalogue on [`ring::Ring`] takes as arguments.
//!
//! This crate does not provide a scheduler, a concurrency runtime
//! integration, or internal thread safety: [`ring::Ring`] is single-owner,
//! and all calls on it must be serialized by the caller (see its `!Sync`
//! bound).

pub mod error;
pub mod flags;
pub mod heap;
pub mod ring;

pub use error::{Error, Result};
pub use flags::{Access, OpenFlags, PollMask, ResolveFlags, SockAddrStorage};
pub use heap::{Entry, Heap, SlotId};
pub use ring::{error_of_errno, Completion, Ring};
