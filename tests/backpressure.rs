//! Testable properties from the crate's design notes: `submit()` is a
//! no-op when nothing is dirty, `peek()` is non-blocking on an empty
//! completion queue, and submission refusal is back-pressure (`None`),
//! not an error, once the allocator's capacity is exhausted.

mod common;

use uring_heap::Ring;

#[test]
fn submit_is_a_noop_when_nothing_is_dirty() -> anyhow::Result<()> {
    common::init();
    let mut ring = Ring::new(2)?;
    assert_eq!(ring.submit()?, 0);
    ring.exit();
    Ok(())
}

#[test]
fn peek_on_an_empty_queue_returns_none() -> anyhow::Result<()> {
    common::init();
    let mut ring = Ring::new(2)?;
    assert!(ring.peek().is_none());
    ring.exit();
    Ok(())
}

#[test]
fn exhausting_allocator_capacity_is_back_pressure_not_an_error() -> anyhow::Result<()> {
    common::init();
    let mut ring = Ring::new(2)?;

    assert!(ring.noop(1).is_some());
    assert!(ring.noop(2).is_some());
    // The allocator's two slots are both live; a third submission must be
    // refused rather than panicking or erroring.
    assert!(ring.noop(3).is_none());

    assert_eq!(ring.submit()?, 2);
    for _ in 0..2 {
        ring.wait(None)?.expect("both queued noops complete");
    }

    // Slots were reaped, so capacity is available again.
    assert!(ring.noop(4).is_some());
    ring.submit()?;
    ring.wait(None)?.expect("the retried noop completes");

    ring.exit();
    Ok(())
}
