//! Tracing and logging (shared setup).

/// Initialize process-wide tracing.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{LogFormat, ParseLogFormatError, SUMMARY_TARGET};
