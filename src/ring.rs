//! The ring coordinator: couples a [`Heap`] of in-flight operation state to
//! a real kernel `io_uring` instance, implementing the alloc-then-prepare
//! submission protocol and the completion-reaping surface.
//!
//! Built on top of the `io-uring` crate's `IoUring`/`opcode`/`types`, the
//! same way `lightway-app-utils`'s driver layers a connection-oriented API
//! over the same crate: construct an `IoUring`, register a fixed buffer,
//! push `opcode::*` entries built from `Heap`-issued slot ids, and drain
//! completions by reading `cqe.user_data()`/`cqe.result()` back out.

use std::ffi::CString;
use std::io::{self, IoSlice, IoSliceMut};
#[cfg(feature = "unstable")]
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Duration;

use io_uring::{opcode, types, IoUring};

use crate::error::{Error, Result};
use crate::flags::{Access, OpenFlags, PollMask, ResolveFlags, SockAddrStorage};
use crate::heap::{Heap, SlotId};

/// Memory the allocator must keep alive for the lifetime of a kernel
/// submission that references it, per the extra-data ownership policy.
enum ExtraData {
    None,
    OpenHow {
        path: CString,
        how: Box<types::OpenHow>,
    },
    SockAddr(SockAddrStorage),
    Readv(Vec<IoSliceMut<'static>>),
    Writev(Vec<IoSlice<'static>>),
}

struct Payload {
    token: u64,
    extra: ExtraData,
}

/// A reaped completion: the caller's original token and the kernel's signed
/// result (`>= 0` success, `< 0` is `-errno`).
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub token: u64,
    pub result: i32,
}

/// The safe coordinator over one kernel `io_uring` instance.
///
/// Not `Sync`: spec.md's single-owner, no-internal-synchronization
/// requirement is encoded in the type rather than left to caller
/// discipline. `Ring` is `Send` (moving it to another thread and then using
/// it there exclusively is fine), but sharing a `&Ring`/`&mut Ring` across
/// threads is not, so it does not implement `Sync`.
pub struct Ring {
    io_uring: IoUring,
    heap: Heap<Payload>,
    buf: Vec<u8>,
    queue_depth: u32,
    dirty: bool,
    // `IoUring` itself carries `unsafe impl Sync`, trusting callers to
    // serialize access; this marker withholds that half of the promise so
    // `&Ring`/`&mut Ring` cannot cross a thread boundary, while `Cell<()>`
    // being `Send` leaves `Ring` auto-`Send` as normal.
    _not_sync: std::marker::PhantomData<std::cell::Cell<()>>,
}

impl Ring {
    /// Build a ring with `queue_depth` allocator slots and kernel submission
    /// slots, and no registered fixed buffer.
    pub fn new(queue_depth: u32) -> Result<Self> {
        Self::with_buffer_len(queue_depth, 0)
    }

    /// Build a ring with `queue_depth` slots and a registered fixed buffer of
    /// `buf_len` bytes, registered before this call returns.
    pub fn with_buffer_len(queue_depth: u32, buf_len: usize) -> Result<Self> {
        if queue_depth == 0 {
            return Err(Error::InvalidQueueDepth(queue_depth));
        }

        let io_uring = IoUring::new(queue_depth)?;
        let buf = vec![0u8; buf_len];
        if !buf.is_empty() {
            let iov = libc::iovec {
                iov_base: buf.as_ptr() as *mut libc::c_void,
                iov_len: buf.len(),
            };
            unsafe { io_uring.submitter().register_buffers(&[iov])? };
        }

        Ok(Ring {
            io_uring,
            heap: Heap::with_capacity(queue_depth as usize),
            buf,
            queue_depth,
            dirty: false,
            _not_sync: std::marker::PhantomData,
        })
    }

    /// Unregister and replace the fixed buffer. Unsafe in the sense that the
    /// caller must ensure no fixed read/write referencing the old buffer is
    /// still in flight; this is not checked, matching the open question
    /// spec.md leaves unresolved for buffer re-registration.
    pub fn realloc_buffer(&mut self, new_len: usize) -> Result<()> {
        self.io_uring.submitter().unregister_buffers()?;
        self.buf = vec![0u8; new_len];
        if !self.buf.is_empty() {
            let iov = libc::iovec {
                iov_base: self.buf.as_ptr() as *mut libc::c_void,
                iov_len: self.buf.len(),
            };
            unsafe { self.io_uring.submitter().register_buffers(&[iov])? };
        }
        Ok(())
    }

    #[inline]
    pub fn queue_depth(&self) -> u32 {
        self.queue_depth
    }

    #[inline]
    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Consume the ring, tearing down the kernel instance. Operations still
    /// in flight are not guaranteed to complete; this is a known, accepted
    /// limitation, not a bug (see the crate's design notes on teardown).
    pub fn exit(self) {
        if !self.buf.is_empty() {
            // Best-effort: the ring fd is about to be closed regardless, so a
            // failure here has nothing left to report to.
            let _ = self.io_uring.submitter().unregister_buffers();
        }
        // `IoUring::drop` closes the ring fd and unmaps its queues once
        // `self` falls out of scope.
    }

    fn try_submit<F>(&mut self, token: u64, extra: ExtraData, build: F) -> Option<SlotId>
    where
        F: FnOnce(&ExtraData, u64) -> io_uring::squeue::Entry,
    {
        let entry = self.heap.alloc(Payload { token, extra }).ok()?;
        let id = entry.id();
        let payload = self.heap.get(id).expect("just allocated");
        let sqe = build(&payload.extra, id.raw());

        let pushed = {
            let mut sq = self.io_uring.submission();
            unsafe { sq.push(&sqe) }.is_ok()
        };

        if !pushed {
            let _ = self.heap.free(id);
            return None;
        }

        self.dirty = true;
        Some(id)
    }

    /// A no-op submission, useful for wake-ups and plumbing tests.
    pub fn noop(&mut self, token: u64) -> Option<SlotId> {
        self.try_submit(token, ExtraData::None, |_extra, user_data| {
            opcode::Nop::new().build().user_data(user_data)
        })
    }

    /// Open or create a file. `dir` defaults to the CWD sentinel (`AT_FDCWD`)
    /// when absent. The completion result is the new fd, or `-errno`.
    pub fn openat2(
        &mut self,
        token: u64,
        access: Access,
        flags: OpenFlags,
        mode: u32,
        resolve: ResolveFlags,
        dir: Option<RawFd>,
        path: impl AsRef<Path>,
    ) -> Option<SlotId> {
        let path = CString::new(path.as_ref().as_os_str().as_bytes()).ok()?;
        let how = Box::new(
            types::OpenHow::new()
                .flags(u64::from(flags.with_access(access) as u32))
                .mode(u64::from(mode))
                .resolve(resolve.bits()),
        );
        let dir_fd = types::Fd(dir.unwrap_or(libc::AT_FDCWD));

        self.try_submit(
            token,
            ExtraData::OpenHow { path, how },
            move |extra, user_data| {
                let (path, how) = match extra {
                    ExtraData::OpenHow { path, how } => (path, how.as_ref()),
                    _ => unreachable!("openat2 always stores ExtraData::OpenHow"),
                };
                opcode::OpenAt2::new(dir_fd, path.as_ptr(), how as *const types::OpenHow)
                    .build()
                    .user_data(user_data)
            },
        )
    }

    /// Close `fd`.
    pub fn close(&mut self, token: u64, fd: RawFd) -> Option<SlotId> {
        self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::Close::new(types::Fd(fd)).build().user_data(user_data)
        })
    }

    /// Read `len` bytes at `buf_off` within the registered fixed buffer.
    pub fn read_fixed(
        &mut self,
        token: u64,
        fd: RawFd,
        buf_off: u32,
        len: u32,
        file_off: i64,
    ) -> Option<SlotId> {
        let ptr = self
            .buf
            .get_mut(buf_off as usize..(buf_off as usize + len as usize))?
            .as_mut_ptr();
        self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::ReadFixed::new(types::Fd(fd), ptr, len, 0)
                .offset(file_off)
                .build()
                .user_data(user_data)
        })
    }

    /// Write `len` bytes at `buf_off` within the registered fixed buffer.
    pub fn write_fixed(
        &mut self,
        token: u64,
        fd: RawFd,
        buf_off: u32,
        len: u32,
        file_off: i64,
    ) -> Option<SlotId> {
        let ptr = self
            .buf
            .get(buf_off as usize..(buf_off as usize + len as usize))?
            .as_ptr();
        self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::WriteFixed::new(types::Fd(fd), ptr, len, 0)
                .offset(file_off)
                .build()
                .user_data(user_data)
        })
    }

    /// Scatter read into caller-owned buffers. The buffers are folded into
    /// the allocator's payload so they stay alive until the completion is
    /// reaped, for the same reason `openat2`'s path and open-how need to.
    pub fn readv(
        &mut self,
        token: u64,
        fd: RawFd,
        iovecs: Vec<IoSliceMut<'static>>,
        file_off: i64,
    ) -> Option<SlotId> {
        let iovec_ptr = iovecs.as_ptr() as *mut libc::iovec;
        let len = iovecs.len() as u32;
        self.try_submit(
            token,
            ExtraData::Readv(iovecs),
            move |_extra, user_data| {
                opcode::Readv::new(types::Fd(fd), iovec_ptr, len)
                    .offset(file_off)
                    .build()
                    .user_data(user_data)
            },
        )
    }

    /// Gather write from caller-owned buffers.
    pub fn writev(
        &mut self,
        token: u64,
        fd: RawFd,
        iovecs: Vec<IoSlice<'static>>,
        file_off: i64,
    ) -> Option<SlotId> {
        let iovec_ptr = iovecs.as_ptr() as *const libc::iovec;
        let len = iovecs.len() as u32;
        self.try_submit(
            token,
            ExtraData::Writev(iovecs),
            move |_extra, user_data| {
                opcode::Writev::new(types::Fd(fd), iovec_ptr, len)
                    .offset(file_off)
                    .build()
                    .user_data(user_data)
            },
        )
    }

    /// Single-shot readiness notification.
    pub fn poll_add(&mut self, token: u64, fd: RawFd, mask: PollMask) -> Option<SlotId> {
        self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::PollAdd::new(types::Fd(fd), mask.bits() as u32)
                .build()
                .user_data(user_data)
        })
    }

    /// Kernel-side byte copy from `src` to `dst`.
    pub fn splice(&mut self, token: u64, src: RawFd, dst: RawFd, len: u32) -> Option<SlotId> {
        self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::Splice::new(types::Fd(src), -1, types::Fd(dst), -1, len)
                .build()
                .user_data(user_data)
        })
    }

    /// Client-side connect. `addr` is folded into the payload so the kernel's
    /// reference to it stays valid for the operation's lifetime.
    pub fn connect(&mut self, token: u64, fd: RawFd, addr: SockAddrStorage) -> Option<SlotId> {
        let addrlen = addr.len();
        self.try_submit(token, ExtraData::SockAddr(addr), move |extra, user_data| {
            let addr = match extra {
                ExtraData::SockAddr(addr) => addr,
                _ => unreachable!("connect always stores ExtraData::SockAddr"),
            };
            opcode::Connect::new(types::Fd(fd), addr.as_ptr(), addrlen)
                .build()
                .user_data(user_data)
        })
    }

    /// Accept with close-on-exec set on the returned fd.
    pub fn accept(&mut self, token: u64, fd: RawFd) -> Option<SlotId> {
        self.try_submit(
            token,
            ExtraData::SockAddr(SockAddrStorage::zeroed()),
            move |extra, user_data| {
                let addr = match extra {
                    ExtraData::SockAddr(addr) => addr,
                    _ => unreachable!("accept always stores ExtraData::SockAddr"),
                };
                // SAFETY: `addr` is owned by this allocation and outlives the
                // submission; the kernel only ever writes through these
                // pointers while the operation is in flight.
                let addr_ptr = addr.as_ptr() as *mut libc::sockaddr;
                let len_ptr = {
                    let addr = addr as *const SockAddrStorage as *mut SockAddrStorage;
                    unsafe { (*addr).len_mut_ptr() }
                };
                opcode::Accept::new(types::Fd(fd), addr_ptr, len_ptr)
                    .flags(libc::SOCK_CLOEXEC)
                    .build()
                    .user_data(user_data)
            },
        )
    }

    /// Request cancellation of the operation identified by `target`.
    ///
    /// Returns `Ok(None)` on back-pressure (no kernel submission slot free),
    /// `Err(Error::InvalidArgument(_))` if `target` does not currently
    /// identify a live slot (already completed and reaped, or never valid —
    /// a programmer error, not a race outcome), and `Ok(Some(id))` once the
    /// cancel request itself has been queued.
    pub fn cancel(&mut self, token: u64, target: SlotId) -> Result<Option<SlotId>> {
        if !self.heap.contains(target) {
            return Err(Error::invalid_argument(format_args!(
                "cancel target {target:?} is not a live slot"
            )));
        }

        Ok(self.try_submit(token, ExtraData::None, move |_extra, user_data| {
            opcode::AsyncCancel::new(target.raw())
                .build()
                .user_data(user_data)
        }))
    }

    /// Hand off all prepared entries to the kernel, returning the number it
    /// accepted. A no-op (returns 0) if nothing has been prepared since the
    /// last call.
    pub fn submit(&mut self) -> Result<usize> {
        if !self.dirty {
            return Ok(0);
        }
        self.dirty = false;
        let n = self.io_uring.submit()?;
        Ok(n)
    }

    fn reap_one(&mut self, cqe: io_uring::cqueue::Entry) -> Completion {
        let id = SlotId::from_raw(cqe.user_data());
        let result = cqe.result();
        let payload = self
            .heap
            .free(id)
            .expect("a reaped completion's slot id must still be live");
        Completion {
            token: payload.token,
            result,
        }
    }

    /// Non-blocking: returns immediately with the next completion, if any is
    /// already available.
    pub fn peek(&mut self) -> Option<Completion> {
        let cqe = self.io_uring.completion().next()?;
        Some(self.reap_one(cqe))
    }

    /// Non-blocking: fills `out` with as many already-available completions
    /// as fit, returning the number written. Entries past the returned count
    /// are left uninitialized.
    ///
    /// A batched alternative to repeatedly calling [`Ring::peek`] on a hot
    /// reap loop. Requires the `unstable` feature.
    #[cfg(feature = "unstable")]
    pub fn peek_batch(&mut self, out: &mut [MaybeUninit<Completion>]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.io_uring.completion().next() {
                Some(cqe) => {
                    out[n] = MaybeUninit::new(self.reap_one(cqe));
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Block for at most `timeout` (or indefinitely if `None`) until a
    /// completion is available, then return it. A signal interrupting the
    /// wait (`EINTR`) or, with a timeout, the timeout elapsing (`ETIME`) are
    /// both transient and reported as `Ok(None)`, not an error.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<Completion>> {
        if let Some(cqe) = self.io_uring.completion().next() {
            return Ok(Some(self.reap_one(cqe)));
        }

        match timeout {
            None => {
                if let Err(err) = self.io_uring.submit_and_wait(1) {
                    return match err.raw_os_error() {
                        Some(libc::EINTR) => Ok(None),
                        _ => Err(err.into()),
                    };
                }
            }
            Some(timeout) => {
                let ts = types::Timespec::new()
                    .sec(timeout.as_secs())
                    .nsec(timeout.subsec_nanos());
                let args = types::SubmitArgs::new().timespec(&ts);
                match self.io_uring.submitter().submit_with_args(1, &args) {
                    Ok(_) => {}
                    Err(err) => {
                        return match err.raw_os_error() {
                            Some(libc::ETIME) | Some(libc::EINTR) => Ok(None),
                            _ => Err(err.into()),
                        };
                    }
                }
            }
        }

        Ok(self.io_uring.completion().next().map(|cqe| self.reap_one(cqe)))
    }
}

/// Translate a (possibly negative) completion result's absolute value to the
/// host's symbolic error category. Negative completion results encode
/// `-errno`; callers that need more than "what kind of failure was this"
/// should consult `result.abs()` against `libc::E*` directly.
pub fn error_of_errno(e: i32) -> io::ErrorKind {
    io::Error::from_raw_os_error(e.abs()).kind()
}
