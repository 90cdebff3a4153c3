//! Tracing/logging setup shared by the stock ledger binaries.

/// Subscriber construction (filters, JSON layer).
pub mod subscriber;

/// Initialize process-wide tracing with `info` as the default level.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init_with_default("info");
}

pub use subscriber::init_with_default;
