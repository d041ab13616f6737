//! Tracing/logging setup shared by the binaries.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
/// An unrecognized `LOG_FORMAT` is rejected before anything is installed.
pub fn init() -> Result<(), tracing::UnknownLogFormat> {
    tracing::init(tracing::LogFormat::from_env()?);
    Ok(())
}

/// Tracing configuration (filters, output format).
pub mod tracing;
