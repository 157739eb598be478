use std::fmt::{self, Debug};
use std::str;

use serde::{Deserialize, Serialize};

use crate::error::FsError;

use super::block::BLOCK_SIZE;

/// The number of bytes an inode occupies at the head of its chain.
pub const INODE_SIZE: usize = 56;
const_assert!(INODE_SIZE < BLOCK_SIZE);

/// The number of bytes reserved for an inode's name, including the nul terminator.
pub const NAME_FIELD_SIZE: usize = 32;

/// The maximum supported length of a full path, in bytes.
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;

/// The metadata record stored at the start of a chain's first block.
///
/// The name is the full absolute path of the file or directory and is its sole
/// identity: there are no inode numbers. Content bytes follow the record,
/// continuing at offset zero of each successor block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    /// full path of the file or directory
    pub name: InodeName,
    /// content size in bytes
    pub size: u32,
    /// modification time, in seconds since the unix epoch
    pub mod_time: i64,
    /// access time, in seconds since the unix epoch
    pub acc_time: i64,
    /// file type and permission bits
    pub mode: FileMode,
}

impl Inode {
    pub fn new(name: InodeName, mode: FileMode, now: i64) -> Self {
        Self {
            name,
            size: 0,
            mod_time: now,
            acc_time: now,
            mode,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }
}

/// A full path, as stored in an [`Inode`].
///
/// Paths of at most [`MAX_NAME_LEN`] bytes of UTF-8 are supported.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeName([u8; NAME_FIELD_SIZE]);

impl InodeName {
    pub fn as_str(&self) -> Result<&str, FsError> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());

        str::from_utf8(&self.0[..len])
            .map_err(|_| FsError::Corrupt("inode name is not valid UTF-8".to_string()))
    }
}

impl TryFrom<&str> for InodeName {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        if value.is_empty() || value.bytes().any(|b| b == 0) {
            return Err(FsError::InvalidName);
        }

        let mut converted = [0; NAME_FIELD_SIZE];
        converted[..value.len()].copy_from_slice(value.as_bytes());

        Ok(InodeName(converted))
    }
}

impl Debug for InodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InodeName")
            .field(&self.as_str().unwrap_or("<invalid>"))
            .finish()
    }
}

impl fmt::Display for InodeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str().map_err(|_| fmt::Error)?)
    }
}

/// A mode value: file type plus permission bits, in `libc` encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMode(pub u32);

impl FileMode {
    pub fn directory(permissions: u32) -> Self {
        FileMode(libc::S_IFDIR as u32 | permissions)
    }

    pub fn regular(permissions: u32) -> Self {
        FileMode(libc::S_IFREG as u32 | permissions)
    }

    pub fn is_directory(self) -> bool {
        self.0 & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    pub fn permissions(self) -> u16 {
        (self.0 & 0o7777) as u16
    }
}
