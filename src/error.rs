//! The closed error taxonomy returned by every fallible ACFS operation.

use thiserror::Error;

/// Stable, closed set of result codes for ACFS operations.
///
/// Mirrors the original C implementation's `acfs_error_t` one-for-one;
/// there is no "unknown error" variant because the enum is exhaustive by
/// construction.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AcfsError {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("filesystem not initialized")]
    NotInitialized,
    #[error("filesystem already initialized")]
    AlreadyInitialized,
    #[error("no space left on device")]
    NoSpace,
    #[error("data not found")]
    DataNotFound,
    #[error("data corrupted")]
    DataCorrupted,
    #[error("i/o error")]
    IoError,
    #[error("invalid filesystem")]
    InvalidFilesystem,
    #[error("directory full")]
    ClusterFull,
    #[error("crc mismatch")]
    CrcMismatch,
}

impl AcfsError {
    /// Human-readable description, kept for callers porting from the C
    /// `acfs_error_string` API. Prefer `Display`/`to_string()` directly.
    pub fn description(&self) -> &'static str {
        match self {
            AcfsError::InvalidParam => "invalid parameter",
            AcfsError::NotInitialized => "filesystem not initialized",
            AcfsError::AlreadyInitialized => "filesystem already initialized",
            AcfsError::NoSpace => "no space left on device",
            AcfsError::DataNotFound => "data not found",
            AcfsError::DataCorrupted => "data corrupted",
            AcfsError::IoError => "i/o error",
            AcfsError::InvalidFilesystem => "invalid filesystem",
            AcfsError::ClusterFull => "directory full",
            AcfsError::CrcMismatch => "crc mismatch",
        }
    }
}

pub type Result<T> = std::result::Result<T, AcfsError>;

/// Error returned by [`crate::Acfs::read`].
///
/// An undersized buffer is still an `InvalidParam` condition per the
/// closed taxonomy above, but `read`'s contract additionally requires
/// reporting the stored payload's actual size on that failure (mirroring
/// the original C API's `acfs_read`, which sets `*actual_size` before
/// returning `ACFS_ERROR_INVALID_PARAM`) so the caller can resize without
/// a separate `get_size` call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error(transparent)]
    Fs(#[from] AcfsError),
    #[error("read buffer too small: need {actual_size} bytes")]
    BufferTooSmall { actual_size: u32 },
}
