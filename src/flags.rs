//! Value-type vocabularies shared by the operation catalogue: open-flags,
//! resolve-flags, poll masks and the access tag, plus the socket address
//! container `openat2`/`connect`/`accept` pass through.

use std::io;
use std::mem;

/// How a file is to be opened, independent of the raw `O_*` bits.
///
/// Folded into the final `openat2` open-flags as `flags | rdonly/wronly/rdwr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    R,
    W,
    RW,
}

impl Access {
    fn os_flag(self) -> libc::c_int {
        match self {
            Access::R => libc::O_RDONLY,
            Access::W => libc::O_WRONLY,
            Access::RW => libc::O_RDWR,
        }
    }
}

bitflags::bitflags! {
    /// Host `O_*` open-flag bits, combinable with bitwise-or.
    #[derive(Default)]
    pub struct OpenFlags: libc::c_int {
        const CREAT = libc::O_CREAT;
        const EXCL = libc::O_EXCL;
        const NOCTTY = libc::O_NOCTTY;
        const TRUNC = libc::O_TRUNC;
        const APPEND = libc::O_APPEND;
        const NONBLOCK = libc::O_NONBLOCK;
        const DSYNC = libc::O_DSYNC;
        const DIRECT = libc::O_DIRECT;
        const LARGEFILE = libc::O_LARGEFILE;
        const DIRECTORY = libc::O_DIRECTORY;
        const NOFOLLOW = libc::O_NOFOLLOW;
        const NOATIME = libc::O_NOATIME;
        const CLOEXEC = libc::O_CLOEXEC;
        const SYNC = libc::O_SYNC;
        const PATH = libc::O_PATH;
        const TMPFILE = libc::O_TMPFILE;
    }
}

impl OpenFlags {
    /// Combine with the `O_RDONLY`/`O_WRONLY`/`O_RDWR` bit implied by `access`,
    /// as required by the `openat2` submission rule.
    pub(crate) fn with_access(self, access: Access) -> libc::c_int {
        self.bits() | access.os_flag()
    }
}

bitflags::bitflags! {
    /// `RESOLVE_*` bits understood by `openat2(2)`.
    #[derive(Default)]
    pub struct ResolveFlags: u64 {
        const NO_XDEV = 0x01;
        const NO_MAGICLINKS = 0x02;
        const NO_SYMLINKS = 0x04;
        const BENEATH = 0x08;
        const IN_ROOT = 0x10;
        const CACHED = 0x20;
    }
}

bitflags::bitflags! {
    /// `POLL*` readiness bits for `poll_add`.
    #[derive(Default)]
    pub struct PollMask: u32 {
        const IN = libc::POLLIN as u32;
        const OUT = libc::POLLOUT as u32;
        const ERR = libc::POLLERR as u32;
        const HUP = libc::POLLHUP as u32;
    }
}

/// An owned, opaque `sockaddr` buffer sized for any host address family.
///
/// Constructible from a populated `libc::sockaddr_storage` (e.g. via
/// `socket2::SockAddr`) for `connect`; for `accept` a zeroed instance is
/// written into by the kernel and the resulting length is read back with
/// [`SockAddrStorage::len`].
pub struct SockAddrStorage {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl SockAddrStorage {
    /// A zeroed buffer of maximum size, for operations where the kernel
    /// fills in the address (`accept`).
    pub fn zeroed() -> Self {
        SockAddrStorage {
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    /// Build from raw address bytes and their declared length, as produced by
    /// `socket2::SockAddr::as_ptr`/`len`.
    ///
    /// # Safety
    /// `len` must not exceed `size_of::<libc::sockaddr_storage>()`, and the
    /// `len` bytes at `addr` must be a valid `sockaddr` of some supported
    /// family.
    pub unsafe fn from_raw_parts(addr: *const libc::sockaddr, len: libc::socklen_t) -> io::Result<Self> {
        if len as usize > mem::size_of::<libc::sockaddr_storage>() {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let mut storage: libc::sockaddr_storage = mem::zeroed();
        std::ptr::copy_nonoverlapping(
            addr as *const u8,
            &mut storage as *mut _ as *mut u8,
            len as usize,
        );
        Ok(SockAddrStorage { storage, len })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const libc::sockaddr {
        &self.storage as *const _ as *const libc::sockaddr
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
        &mut self.storage as *mut _ as *mut libc::sockaddr
    }

    /// Length in bytes of the address currently stored, or (before `accept`
    /// writes to it) the buffer's declared capacity.
    #[inline]
    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    /// A mutable pointer to the length field, for operations (`accept`) the
    /// kernel writes the resulting address length back into.
    #[inline]
    pub fn len_mut_ptr(&mut self) -> *mut libc::socklen_t {
        &mut self.len as *mut _
    }
}
