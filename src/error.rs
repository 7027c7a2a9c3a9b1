//! Errors produced while parsing containers. Soft failures (wrong magic, missing optional
//! records) are usually reported as `false` or `None` by the callers; these are the hard ones.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    /// The input violates a structural invariant, e.g. a header count is out of range or the
    /// data ends early.
    #[error("bad input format: {0}")]
    BadInputFormat(String),

    /// The requested range isn't backed by any segment of a virtual address space.
    #[error("virtual address range is not mapped: {address:#018x} ({count} bytes)")]
    InvalidVirtualAddress { address: u64, count: usize },

    /// Well formed input that this crate can't decode (compressed PDZ data).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Arithmetic on sizes or offsets taken from the input overflowed.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// A record descriptor was used in a way it doesn't support.
    #[error("layout error: {0}")]
    Layout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub fn bad_format(mesg: impl Into<String>) -> Self {
        FormatError::BadInputFormat(mesg.into())
    }

    pub fn overflow(mesg: impl Into<String>) -> Self {
        FormatError::Overflow(mesg.into())
    }

    /// True for the errors that best-effort scans over optional metadata swallow.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            FormatError::BadInputFormat(_)
                | FormatError::InvalidVirtualAddress { .. }
                | FormatError::Overflow(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;

/// Adds two file-supplied values, failing instead of wrapping.
pub fn checked_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| FormatError::overflow(format!("{a:#x} + {b:#x}")))
}

/// Multiplies two file-supplied values, failing instead of wrapping.
pub fn checked_mul(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| FormatError::overflow(format!("{a:#x} * {b:#x}")))
}
