use libc::{
    EEXIST, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR, ENOTEMPTY,
};
use thiserror::Error;

/// The error type for every storage-engine operation.
///
/// I/O failures against the backing image are treated as unrecoverable: the
/// in-progress operation is abandoned and the error is surfaced as-is. There is
/// no retry or degraded-mode path.
#[derive(Debug, Error)]
pub enum FsError {
    /// The backing disk image could not be read or written.
    #[error("disk image I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk structures violate an invariant.
    #[error("corrupt disk image: {0}")]
    Corrupt(String),

    /// The path does not resolve to any live chain head.
    #[error("no such file or directory")]
    NotFound,

    /// The allocation scan found no free block.
    #[error("no free blocks left")]
    NoSpace,

    /// The operation requires a directory.
    #[error("not a directory")]
    NotADirectory,

    /// The operation requires a regular file.
    #[error("is a directory")]
    IsDirectory,

    /// The directory still has children.
    #[error("directory is not empty")]
    NotEmpty,

    /// The path already resolves to a live entry.
    #[error("file or directory already exists")]
    AlreadyExists,

    /// The full path does not fit in an inode's name field.
    #[error("path is too long")]
    NameTooLong,

    /// The name is empty, non-UTF-8, or contains a nul byte.
    #[error("invalid name")]
    InvalidName,
}

impl FsError {
    /// The errno reported to the filesystem-callback layer.
    ///
    /// The match is exhaustive so that adding a variant without assigning its
    /// errno is a compile error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Io(_) => EIO,
            FsError::Corrupt(_) => EIO,
            FsError::NotFound => ENOENT,
            FsError::NoSpace => ENOSPC,
            FsError::NotADirectory => ENOTDIR,
            FsError::IsDirectory => EISDIR,
            FsError::NotEmpty => ENOTEMPTY,
            FsError::AlreadyExists => EEXIST,
            FsError::NameTooLong => ENAMETOOLONG,
            FsError::InvalidName => EINVAL,
        }
    }
}
