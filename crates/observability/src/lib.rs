//! Process-wide logging setup shared by binaries and tests.

/// Tracing subscriber configuration (filter, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, init_with};

/// Install the default subscriber: JSON lines, filtered by `RUST_LOG`
/// (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    init_with(LogFormat::Json);
}
