//! Error types for the slot table and its backing image.

use super::FILE_NAME_LEN;
use nix::errno::Errno;
use thiserror::Error;

/// Errors returned by the filesystem manager and the image codec.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("No free slot left on the volume")]
    NoSpace,

    #[error("Write of {len} bytes at offset {offset} exceeds the per-file capacity")]
    CapacityExceeded { offset: u64, len: u64 },

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Corrupt image: {0}")]
    CorruptHeader(String),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Invalid owner: {0:?}")]
    InvalidOwner(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Host errno a driver should report for this error.
    pub fn errno(&self) -> Errno {
        match self {
            FsError::NotFound(_) => Errno::ENOENT,
            FsError::AlreadyExists(_) => Errno::EEXIST,
            FsError::NoSpace => Errno::ENOSPC,
            FsError::CapacityExceeded { .. } => Errno::EFBIG,
            FsError::InvalidHandle(_) => Errno::EBADF,
            FsError::InvalidName(name) if name.len() >= FILE_NAME_LEN => Errno::ENAMETOOLONG,
            FsError::InvalidName(_) | FsError::InvalidOwner(_) => Errno::EINVAL,
            FsError::Io(err) => err.raw_os_error().map_or(Errno::EIO, Errno::from_i32),
            FsError::CorruptHeader(_) | FsError::LockPoisoned | FsError::Encoding(_) => {
                Errno::EIO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound("a".into()).errno(), Errno::ENOENT);
        assert_eq!(FsError::AlreadyExists("a".into()).errno(), Errno::EEXIST);
        assert_eq!(FsError::NoSpace.errno(), Errno::ENOSPC);
        assert_eq!(
            FsError::CapacityExceeded {
                offset: 960,
                len: 1
            }
            .errno(),
            Errno::EFBIG
        );
        assert_eq!(FsError::InvalidHandle(64).errno(), Errno::EBADF);
        assert_eq!(FsError::CorruptHeader("x".into()).errno(), Errno::EIO);
    }

    #[test]
    fn invalid_name_errno_depends_on_length() {
        let long = "x".repeat(FILE_NAME_LEN);
        assert_eq!(FsError::InvalidName(long).errno(), Errno::ENAMETOOLONG);
        assert_eq!(FsError::InvalidName("a/b".into()).errno(), Errno::EINVAL);
    }

    #[test]
    fn io_errno_passthrough() {
        let err = FsError::from(io::Error::from_raw_os_error(Errno::EACCES as i32));
        assert_eq!(err.errno(), Errno::EACCES);

        let err = FsError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.errno(), Errno::EIO);
    }
}
