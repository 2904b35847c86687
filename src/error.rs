//! Error types for the heap and ring layers.

use std::fmt;

use crate::heap::SlotId;

/// Errors that can be raised by [`Heap`](crate::heap::Heap) and [`Ring`](crate::ring::Ring).
///
/// Back-pressure (the allocator or submission queue being full) is not
/// represented here: operation submission surfaces that as `None`, not an
/// `Err`, per the propagation policy in the crate's design notes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `Ring::new`/`Ring::with_buffer_len` was given a non-positive queue depth.
    #[error("invalid queue depth: {0} (must be > 0)")]
    InvalidQueueDepth(u32),

    /// The allocator has no free slots. Programmer-visible only when callers
    /// bypass the back-pressure protocol and call [`Heap::alloc`](crate::heap::Heap::alloc) directly.
    #[error("slot allocator has no free slots")]
    NoSpace,

    /// `free` was called on a slot id that does not identify a live slot,
    /// either because it was already freed or because its version has been
    /// recycled by a later allocation.
    #[error("slot {0:?} was already freed or reused")]
    AlreadyFreed(SlotId),

    /// A caller-supplied argument violates a documented precondition, e.g. a
    /// `cancel` targeting a [`SlotId`] whose version no longer matches the
    /// live slot.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A kernel or registration call failed. Carries the original
    /// [`std::io::Error`], including its errno.
    #[error(transparent)]
    System(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, Error>;
