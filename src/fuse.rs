use std::ffi::OsStr;
use std::ops::ControlFlow;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::chainfs::ChainFs;
use crate::disk_format::block::BLOCK_SIZE;
use crate::disk_format::inode::MAX_NAME_LEN;
use crate::disk_format::table::BlockIndex;
use crate::error::FsError;
use crate::storage::DiskStorage;

/// Translates FUSE callbacks into storage-engine calls.
///
/// FUSE reserves inode number zero and uses one for the mount root, so the
/// adapter exposes chain head `h` as inode number `h + 1`.
pub struct ChainFuse<S: DiskStorage> {
    fs: ChainFs<S>,
    first_free_handle: u64,
}

fn fuse_ino(head: BlockIndex) -> u64 {
    head as u64 + 1
}

fn chain_head(ino: u64) -> BlockIndex {
    ino.saturating_sub(1) as BlockIndex
}

fn timestamp(seconds: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds.max(0) as u64)
}

/// The last component of a full path.
fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl<S: DiskStorage> ChainFuse<S> {
    const TTL: Duration = Duration::new(1, 0);
    const GENERATION: u64 = 1;

    pub fn new(fs: ChainFs<S>) -> Self {
        Self {
            fs,
            first_free_handle: 0,
        }
    }

    fn attributes(&self, head: BlockIndex) -> Result<FileAttr, FsError> {
        let inode = self.fs.stat(head)?;

        Ok(FileAttr {
            ino: fuse_ino(head),
            size: inode.size as u64,
            blocks: (inode.size as u64).div_ceil(BLOCK_SIZE as u64),
            atime: timestamp(inode.acc_time),
            mtime: timestamp(inode.mod_time),
            ctime: timestamp(inode.mod_time),
            crtime: timestamp(inode.mod_time),
            kind: if inode.is_directory() {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: inode.mode.permissions(),
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE as u32,
        })
    }

    /// The full path of `name` under the directory at `parent`.
    fn child_path(&self, parent: BlockIndex, name: &OsStr) -> Result<String, FsError> {
        let name = name.to_str().ok_or(FsError::InvalidName)?;
        let parent_inode = self.fs.stat(parent)?;
        let parent_path = parent_inode.name.as_str()?;

        Ok(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }

    fn lookup_entry(&self, parent: BlockIndex, name: &OsStr) -> Result<FileAttr, FsError> {
        let path = self.child_path(parent, name)?;
        let head = self.fs.resolve(&path)?;

        self.attributes(head)
    }

    fn directory_listing(
        &self,
        dir: BlockIndex,
    ) -> Result<Vec<(u64, FileType, String)>, FsError> {
        let inode = self.fs.stat(dir)?;
        let parent = self.fs.parent_of(inode.name.as_str()?)?;

        let mut listing = vec![
            (fuse_ino(dir), FileType::Directory, ".".to_string()),
            (fuse_ino(parent), FileType::Directory, "..".to_string()),
        ];

        for child in self.fs.list_entries(dir)? {
            let child_inode = self.fs.stat(child)?;
            let kind = if child_inode.is_directory() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };

            listing.push((
                fuse_ino(child),
                kind,
                leaf(child_inode.name.as_str()?).to_string(),
            ));
        }

        Ok(listing)
    }

    fn assign_file_handle(&mut self) -> u64 {
        let assigned = self.first_free_handle;
        self.first_free_handle += 1;

        assigned
    }
}

impl<S: DiskStorage> Filesystem for ChainFuse<S> {
    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let num_free_blocks = self.fs.num_free_blocks();

        reply.statfs(
            self.fs.num_blocks() as u64,
            num_free_blocks as u64,
            num_free_blocks as u64,
            self.fs.num_entries() as u64,
            num_free_blocks as u64,
            BLOCK_SIZE as u32,
            MAX_NAME_LEN as u32,
            BLOCK_SIZE as u32,
        );
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_entry(chain_head(parent), name) {
            Ok(attr) => reply.entry(&Self::TTL, &attr, Self::GENERATION),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.attributes(chain_head(ino)) {
            Ok(attr) => reply.attr(&Self::TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let head = chain_head(ino);

        if let Some(new_size) = size {
            if let Err(err) = self.fs.truncate(head, new_size) {
                reply.error(err.errno());
                return;
            }
        }

        match self.attributes(head) {
            Ok(attr) => reply.attr(&Self::TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.fs.stat(chain_head(ino)) {
            Ok(_) => reply.opened(self.assign_file_handle(), flags as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.fs.stat(chain_head(ino)) {
            Ok(_) => reply.opened(self.assign_file_handle(), flags as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        match self.fs.read(chain_head(ino), offset as usize, size as usize) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.fs.write(chain_head(ino), offset as usize, data) {
            Ok(write_len) => reply.written(write_len as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let listing = match self.directory_listing(chain_head(ino)) {
            Ok(listing) => listing,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        listing
            .into_iter()
            .enumerate()
            .skip(offset as usize)
            .try_for_each(|(i, (entry_ino, kind, name))| {
                let is_buffer_full = reply.add(entry_ino, (i + 1) as i64, kind, name);

                if is_buffer_full {
                    return ControlFlow::Break(());
                }

                ControlFlow::Continue(())
            });

        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let result = self
            .child_path(chain_head(parent), name)
            .and_then(|path| self.fs.create_entry(&path, false))
            .and_then(|head| self.attributes(head));

        match result {
            Ok(attr) => reply.created(
                &Self::TTL,
                &attr,
                Self::GENERATION,
                self.assign_file_handle(),
                flags as u32,
            ),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self
            .child_path(chain_head(parent), name)
            .and_then(|path| self.fs.create_entry(&path, true))
            .and_then(|head| self.attributes(head));

        match result {
            Ok(attr) => reply.entry(&Self::TTL, &attr, Self::GENERATION),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(chain_head(parent), name)
            .and_then(|path| self.fs.remove_file(&path));

        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(chain_head(parent), name)
            .and_then(|path| self.fs.remove_directory(&path));

        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}
