//! Shared test setup: installs a `tracing` subscriber so the `trace!`/
//! `debug!` calls in `src/heap.rs`/`src/ring.rs` actually have somewhere to
//! go when a test is run with `RUST_LOG` set, matching the teacher's own
//! `tests/common/mod.rs`.

pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
