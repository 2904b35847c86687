//! Scenarios 3, 4, 5 and 9: `openat2`, fixed read/write against the
//! registered buffer, scatter `readv`, and `openat2` resolve-flag handling.

mod common;

use std::io::IoSliceMut;
use std::os::unix::io::RawFd;

use uring_heap::{Access, Ring};

fn submit_and_wait(ring: &mut Ring) -> anyhow::Result<uring_heap::Completion> {
    ring.submit()?;
    Ok(ring.wait(None)?.expect("one completion was submitted"))
}

#[test]
fn open_dev_null_then_raw_read_is_empty() -> anyhow::Result<()> {
    common::init();
    let mut ring = Ring::new(5)?;

    let token = 0xA_u64;
    ring.openat2(
        token,
        Access::R,
        Default::default(),
        0,
        Default::default(),
        None,
        "/dev/null",
    )
    .expect("submission should not back-pressure");

    let completion = submit_and_wait(&mut ring)?;
    assert_eq!(completion.token, token);
    assert!(completion.result >= 0, "openat2 failed: {}", completion.result);

    let fd = completion.result as RawFd;
    let mut buf = [0u8; 5];
    let n = nix::unistd::read(fd, &mut buf)?;
    assert_eq!(n, 0);

    nix::unistd::close(fd)?;
    ring.exit();
    Ok(())
}

#[test]
fn fixed_read_lands_in_registered_buffer() -> anyhow::Result<()> {
    common::init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.txt");
    std::fs::write(&path, b"A test file")?;

    let mut ring = Ring::with_buffer_len(5, 64)?;

    let open_token = 0x1;
    ring.openat2(
        open_token,
        Access::R,
        Default::default(),
        0,
        Default::default(),
        None,
        &path,
    )
    .expect("submission should not back-pressure");
    let opened = submit_and_wait(&mut ring)?;
    assert!(opened.result >= 0, "openat2 failed: {}", opened.result);
    let fd = opened.result as RawFd;

    let read_token = 0x2;
    ring.read_fixed(read_token, fd, 3, 5, 2)
        .expect("submission should not back-pressure");
    let completion = submit_and_wait(&mut ring)?;
    assert_eq!(completion.token, read_token);
    assert_eq!(completion.result, 5);
    assert_eq!(&ring.buf()[3..8], b"test ");

    nix::unistd::close(fd)?;
    ring.exit();
    Ok(())
}

#[test]
fn scatter_read_splits_across_iovecs() -> anyhow::Result<()> {
    common::init();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.txt");
    std::fs::write(&path, b"A test file")?;

    let mut ring = Ring::new(5)?;

    let open_token = 0x1;
    ring.openat2(
        open_token,
        Access::R,
        Default::default(),
        0,
        Default::default(),
        None,
        &path,
    )
    .expect("submission should not back-pressure");
    let opened = submit_and_wait(&mut ring)?;
    let fd = opened.result as RawFd;

    let buf1: &'static mut [u8] = Box::leak(vec![0u8; 3].into_boxed_slice());
    let buf2: &'static mut [u8] = Box::leak(vec![0u8; 7].into_boxed_slice());
    let iovecs = vec![IoSliceMut::new(buf1), IoSliceMut::new(buf2)];

    let token = 0x2;
    ring.readv(token, fd, iovecs, 0)
        .expect("submission should not back-pressure");
    let completion = submit_and_wait(&mut ring)?;
    assert_eq!(completion.token, token);
    assert_eq!(completion.result, 10);
    assert_eq!(buf1, b"A t");
    assert_eq!(buf2, b"est fil");

    nix::unistd::close(fd)?;
    ring.exit();
    Ok(())
}

#[test]
fn resolve_flags_reject_escaping_symlinks() -> anyhow::Result<()> {
    use uring_heap::ResolveFlags;

    common::init();
    let mut ring = Ring::new(5)?;

    let mut open = |path: &str, resolve: ResolveFlags| -> anyhow::Result<i32> {
        let token = 0x1;
        ring.openat2(token, Access::R, Default::default(), 0, resolve, None, path)
            .expect("submission should not back-pressure");
        let completion = submit_and_wait(&mut ring)?;
        Ok(completion.result)
    };

    let fd = open(".", ResolveFlags::empty())?;
    assert!(fd >= 0, "open '.' with no resolve flags failed: {fd}");
    nix::unistd::close(fd as RawFd)?;

    let fd = open(".", ResolveFlags::BENEATH)?;
    assert!(fd >= 0, "open '.' with BENEATH failed: {fd}");
    nix::unistd::close(fd as RawFd)?;

    let fd = open("..", ResolveFlags::empty())?;
    assert!(fd >= 0, "open '..' with no resolve flags failed: {fd}");
    nix::unistd::close(fd as RawFd)?;

    let fd = open("..", ResolveFlags::BENEATH)?;
    assert_eq!(fd, -libc::EXDEV, "escaping '..' under BENEATH should be -EXDEV");

    ring.exit();
    Ok(())
}
