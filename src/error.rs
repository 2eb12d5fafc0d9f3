//! Error types for the fallible ambient subsystems.
//!
//! Scheduling and paging failures (admission failure, unresolved page
//! faults, memory violations) are part of the core's normal control flow —
//! see [`crate::scheduler`] and [`crate::paging`] — and are modeled as data,
//! not as `Result::Err`. Only genuinely exceptional, startup-time or I/O
//! conditions get a typed error here.

use std::io;

/// Failure while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("key `{key}` has invalid value `{value}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("key `{key}` value {value} must be a power of two")]
    NotPowerOfTwo { key: &'static str, value: u64 },
}

/// Failure while writing to or reading from the backing-store file.
///
/// A backing-store I/O failure never kills the owning process; the
/// pager logs `[FAILED]` and frees the frame anyway. This type exists so
/// that boundary, not the pager's in-memory bookkeeping, can use `?`.
#[derive(Debug, thiserror::Error)]
pub enum PagingError {
    #[error("backing store I/O error: {0}")]
    BackingStore(#[from] io::Error),

    #[error("page id universe exhausted ({allocated}/{capacity})")]
    PageIdsExhausted { allocated: usize, capacity: usize },
}
