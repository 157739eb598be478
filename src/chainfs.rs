use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::alloc::AllocationTable;
use crate::disk_format::block::BLOCK_SIZE;
use crate::disk_format::inode::{FileMode, Inode, InodeName, INODE_SIZE};
use crate::disk_format::layout::Layout;
use crate::disk_format::table::{BlockIndex, END_BLOCK, FREE_BLOCK, ROOT_BLOCK, TABLE_ENTRY_SIZE};
use crate::error::FsError;
use crate::storage::DiskStorage;

/// The storage engine: a chain-allocated filesystem over a flat disk image.
///
/// Files and directories are identified by their full path, stored in the inode
/// at the head of their block chain. Directory content is a dense, unordered
/// array of child chain-head indices. The engine assumes a single in-flight
/// caller; it holds the only copy of the allocation table and keeps it in
/// lockstep with the image on every mutation.
pub struct ChainFs<S: DiskStorage> {
    pub storage: S,
    layout: Layout,
    table: AllocationTable,
    /// Maps each live full path to its chain head. Kept in lockstep with
    /// create/remove so lookups don't rescan the whole block area.
    path_index: HashMap<String, BlockIndex>,
}

/// Writes an empty filesystem onto `storage`: a cleared allocation table and a
/// root directory occupying block zero.
pub fn format<S: DiskStorage>(storage: &S) -> Result<(), FsError> {
    let layout = Layout::from_image_size(storage.size()?)?;

    storage.write_at(0, &vec![0; layout.num_blocks * TABLE_ENTRY_SIZE])?;
    storage.write_at(
        layout.table_entry_position(ROOT_BLOCK),
        &END_BLOCK.to_le_bytes(),
    )?;

    let root = Inode::new(InodeName::try_from("/")?, FileMode::directory(0o755), now());
    storage.write_at(layout.block_position(ROOT_BLOCK), &encode_inode(&root)?)?;

    Ok(())
}

impl<S: DiskStorage> ChainFs<S> {
    /// Loads a formatted image: reads the allocation table wholesale, rebuilds
    /// the path index from the live chain heads, and verifies the structural
    /// invariants before returning.
    pub fn load(storage: S) -> Result<Self, FsError> {
        let layout = Layout::from_image_size(storage.size()?)?;
        let table = AllocationTable::load(&storage, layout)?;

        info!(
            "{} total blocks, {} free",
            table.len(),
            table.num_free_blocks()
        );

        let mut fs = Self {
            storage,
            layout,
            table,
            path_index: HashMap::new(),
        };

        fs.rebuild_path_index()?;
        fs.check_consistency()?;

        info!("{} live entries", fs.path_index.len());

        Ok(fs)
    }

    pub fn num_blocks(&self) -> usize {
        self.table.len()
    }

    pub fn num_free_blocks(&self) -> usize {
        self.table.num_free_blocks()
    }

    pub fn num_entries(&self) -> usize {
        self.path_index.len()
    }

    /// Maps a full path to its chain head.
    pub fn resolve(&self, path: &str) -> Result<BlockIndex, FsError> {
        self.path_index.get(path).copied().ok_or(FsError::NotFound)
    }

    /// The chain head of `path`'s parent directory: the prefix before the last
    /// separator, or the root when there is none.
    pub fn parent_of(&self, path: &str) -> Result<BlockIndex, FsError> {
        match path.rfind('/') {
            None | Some(0) => Ok(ROOT_BLOCK),
            Some(separator) => self.resolve(&path[..separator]),
        }
    }

    /// Loads the inode of a live chain head. Fails with [`FsError::NotFound`]
    /// for anything else: free blocks, chain interiors, out-of-range indices.
    pub fn stat(&self, index: BlockIndex) -> Result<Inode, FsError> {
        if !self.layout.contains(index) || self.table.is_free(index) {
            return Err(FsError::NotFound);
        }

        let inode = self.read_inode(index)?;
        let Ok(name) = inode.name.as_str() else {
            return Err(FsError::NotFound);
        };

        if self.path_index.get(name).copied() != Some(index) {
            return Err(FsError::NotFound);
        }

        Ok(inode)
    }

    pub fn read_inode(&self, index: BlockIndex) -> Result<Inode, FsError> {
        let mut buf = [0; INODE_SIZE];
        self.storage
            .read_at(self.layout.block_position(index), &mut buf)?;

        decode_inode(&buf)
    }

    pub fn write_inode(&self, index: BlockIndex, inode: &Inode) -> Result<(), FsError> {
        self.storage
            .write_at(self.layout.block_position(index), &encode_inode(inode)?)
    }

    /// Creates a file or directory at `path` and links it into its parent.
    ///
    /// The head block is claimed before the parent's content array is touched,
    /// so a chain extension inside the parent cannot hand the same block out
    /// again; if the parent append fails the head is released, never orphaned.
    pub fn create_entry(&mut self, path: &str, is_directory: bool) -> Result<BlockIndex, FsError> {
        if !path.starts_with('/') || path.ends_with('/') {
            return Err(FsError::InvalidName);
        }

        let name = InodeName::try_from(path)?;

        if self.path_index.contains_key(path) {
            return Err(FsError::AlreadyExists);
        }

        let parent = self.parent_of(path)?;
        if !self.read_inode(parent)?.is_directory() {
            return Err(FsError::NotADirectory);
        }

        let head = self.table.allocate_free_block()?;
        self.table.set(&self.storage, head, END_BLOCK)?;

        let mode = if is_directory {
            FileMode::directory(0o755)
        } else {
            FileMode::regular(0o666)
        };
        self.write_inode(head, &Inode::new(name, mode, now()))?;

        if let Err(err) = self.add_dir_entry(head, parent) {
            self.table.set(&self.storage, head, FREE_BLOCK)?;
            return Err(err);
        }

        self.path_index.insert(path.to_string(), head);
        info!("created {path} at block {head}");

        Ok(head)
    }

    /// Unlinks a regular file and returns its blocks to the free pool.
    pub fn remove_file(&mut self, path: &str) -> Result<(), FsError> {
        let head = self.resolve(path)?;

        if self.read_inode(head)?.is_directory() {
            return Err(FsError::IsDirectory);
        }

        self.destroy(path, head)
    }

    /// Removes an empty directory. A non-empty directory fails with
    /// [`FsError::NotEmpty`] before any block is touched.
    pub fn remove_directory(&mut self, path: &str) -> Result<(), FsError> {
        let head = self.resolve(path)?;
        let inode = self.read_inode(head)?;

        if !inode.is_directory() {
            return Err(FsError::NotADirectory);
        }

        if inode.size != 0 {
            return Err(FsError::NotEmpty);
        }

        self.destroy(path, head)
    }

    fn destroy(&mut self, path: &str, head: BlockIndex) -> Result<(), FsError> {
        if head == ROOT_BLOCK {
            return Err(FsError::InvalidName);
        }

        let parent = self.parent_of(path)?;
        self.remove_dir_entry(head, parent)?;

        for block in self.chain_blocks(head)? {
            self.table.set(&self.storage, block, FREE_BLOCK)?;
        }

        self.path_index.remove(path);
        info!("removed {path}");

        Ok(())
    }

    /// The chain heads of a directory's children. Names are not stored here;
    /// they live in the children's own inodes.
    pub fn list_entries(&self, dir: BlockIndex) -> Result<Vec<BlockIndex>, FsError> {
        let inode = self.stat(dir)?;

        if !inode.is_directory() {
            return Err(FsError::NotADirectory);
        }

        self.read_dir_content(dir, &inode)
    }

    /// Reads up to `len` content bytes starting at `offset`, clamped to the
    /// recorded size. The read continues across block boundaries.
    pub fn read(&mut self, head: BlockIndex, offset: usize, len: usize) -> Result<Vec<u8>, FsError> {
        let mut inode = self.stat(head)?;

        info!("[block #{head}] reading (offset = {offset}; len = {len})");

        let end = (offset + len).min(inode.size as usize);
        let data = if offset < end {
            self.read_content(head, offset, end - offset)?
        } else {
            vec![]
        };

        inode.acc_time = now();
        self.write_inode(head, &inode)?;

        Ok(data)
    }

    /// Writes `data` at `offset`, extending the chain as needed. Writing past
    /// the end of the file zero-fills the gap. On [`FsError::NoSpace`] a
    /// partial chain extension is rolled back and nothing is written.
    pub fn write(&mut self, head: BlockIndex, offset: usize, data: &[u8]) -> Result<usize, FsError> {
        let mut inode = self.stat(head)?;

        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }

        info!(
            "[block #{head}] writing (offset = {offset}; data.len() = {})",
            data.len()
        );

        let size = inode.size as usize;
        let end = offset + data.len();
        u32::try_from(end).map_err(|_| FsError::NoSpace)?;

        self.grow_chain(head, &inode, end)?;

        if offset > size {
            self.write_content(head, size, &vec![0; offset - size])?;
        }
        self.write_content(head, offset, data)?;

        inode.size = inode.size.max(end as u32);
        inode.mod_time = now();
        self.write_inode(head, &inode)?;

        Ok(data.len())
    }

    /// Sets the file's size. Shrinking frees the now-unused trailing blocks;
    /// growing zero-fills the new range.
    pub fn truncate(&mut self, head: BlockIndex, new_size: u64) -> Result<(), FsError> {
        let mut inode = self.stat(head)?;

        if inode.is_directory() {
            return Err(FsError::IsDirectory);
        }

        let new_size = u32::try_from(new_size).map_err(|_| FsError::NoSpace)?;
        let old_size = inode.size as usize;

        if (new_size as usize) < old_size {
            self.shrink_chain(head, new_size as usize)?;
        } else if new_size as usize > old_size {
            self.grow_chain(head, &inode, new_size as usize)?;

            // newly allocated blocks are zeroed at allocation; the slack of the
            // old tail block still holds stale bytes
            let old_capacity = blocks_needed(old_size) * BLOCK_SIZE - INODE_SIZE;
            let stale_end = (new_size as usize).min(old_capacity);
            if stale_end > old_size {
                self.write_content(head, old_size, &vec![0; stale_end - old_size])?;
            }
        }

        inode.size = new_size;
        inode.mod_time = now();
        self.write_inode(head, &inode)
    }

    /// Verifies the structural invariants: a root directory at block zero,
    /// every non-free block in exactly one cycle-free chain, chain lengths
    /// matching recorded sizes, and directory content arrays of entry-aligned
    /// size whose elements are live chain heads.
    pub fn check_consistency(&self) -> Result<(), FsError> {
        if self.table.is_free(ROOT_BLOCK) {
            return Err(FsError::Corrupt("root block is free".to_string()));
        }

        let root = self.read_inode(ROOT_BLOCK)?;
        if !root.is_directory() {
            return Err(FsError::Corrupt("root inode is not a directory".to_string()));
        }
        if root.name.as_str()? != "/" {
            return Err(FsError::Corrupt("root inode is not named '/'".to_string()));
        }

        let heads: HashSet<BlockIndex> = self.path_index.values().copied().collect();
        let mut owner = vec![None::<BlockIndex>; self.table.len()];

        for (path, &head) in &self.path_index {
            let inode = self.read_inode(head)?;

            if inode.name.as_str()? != path {
                return Err(FsError::Corrupt(format!(
                    "inode at block {head} is not named {path}"
                )));
            }

            let blocks = self.chain_blocks(head)?;
            for &block in &blocks {
                if let Some(other) = owner[block as usize] {
                    return Err(FsError::Corrupt(format!(
                        "block {block} belongs to the chains of both {other} and {head}"
                    )));
                }

                owner[block as usize] = Some(head);
            }

            if blocks.len() != blocks_needed(inode.size as usize) {
                return Err(FsError::Corrupt(format!(
                    "chain at block {head} has {} blocks for {} content bytes",
                    blocks.len(),
                    inode.size
                )));
            }

            if inode.is_directory() {
                if inode.size as usize % TABLE_ENTRY_SIZE != 0 {
                    return Err(FsError::Corrupt(format!(
                        "directory {path} has unaligned size {}",
                        inode.size
                    )));
                }

                for child in self.read_dir_content(head, &inode)? {
                    if !heads.contains(&child) {
                        return Err(FsError::Corrupt(format!(
                            "directory {path} references block {child}, which is not a chain head"
                        )));
                    }
                }
            }
        }

        for index in 0..self.table.len() as BlockIndex {
            if !self.table.is_free(index) && owner[index as usize].is_none() {
                return Err(FsError::Corrupt(format!(
                    "block {index} is allocated but belongs to no chain"
                )));
            }
        }

        Ok(())
    }

    fn rebuild_path_index(&mut self) -> Result<(), FsError> {
        // a chain head is a non-free block that no table entry points to
        let mut referenced = vec![false; self.table.len()];
        for index in 0..self.table.len() as BlockIndex {
            let entry = self.table.get(index);

            if entry != FREE_BLOCK && entry != END_BLOCK {
                if !self.layout.contains(entry) {
                    return Err(FsError::Corrupt(format!(
                        "block {index} links to out-of-range block {entry}"
                    )));
                }

                referenced[entry as usize] = true;
            }
        }

        self.path_index.clear();

        for index in 0..self.table.len() as BlockIndex {
            if self.table.is_free(index) || referenced[index as usize] {
                continue;
            }

            let inode = self.read_inode(index)?;
            let path = inode.name.as_str()?.to_string();

            if let Some(other) = self.path_index.insert(path.clone(), index) {
                return Err(FsError::Corrupt(format!(
                    "blocks {other} and {index} both hold an inode named {path}"
                )));
            }
        }

        Ok(())
    }

    /// Appends `child` to `dir`'s content array, extending the chain with a
    /// fresh block when the tail is exactly full.
    fn add_dir_entry(&mut self, child: BlockIndex, dir: BlockIndex) -> Result<(), FsError> {
        let mut inode = self.read_inode(dir)?;

        if !inode.is_directory() {
            return Err(FsError::NotADirectory);
        }

        let end = inode.size as usize + TABLE_ENTRY_SIZE;
        self.grow_chain(dir, &inode, end)?;
        self.write_content(dir, inode.size as usize, &child.to_le_bytes())?;

        inode.size = end as u32;
        inode.mod_time = now();
        self.write_inode(dir, &inode)
    }

    /// Removes `child` from `dir`'s content array by swapping the last element
    /// into its slot: entry order is not preserved, by contract. A tail block
    /// left fully vacated by the shrink is freed; the head never is.
    fn remove_dir_entry(&mut self, child: BlockIndex, dir: BlockIndex) -> Result<(), FsError> {
        let mut inode = self.read_inode(dir)?;

        if !inode.is_directory() {
            return Err(FsError::NotADirectory);
        }

        let mut children = self.read_dir_content(dir, &inode)?;
        let slot = children
            .iter()
            .position(|&entry| entry == child)
            .ok_or_else(|| {
                FsError::Corrupt(format!(
                    "block {child} is not an entry of the directory at block {dir}"
                ))
            })?;

        children.swap_remove(slot);
        self.write_dir_content(dir, &children)?;

        inode.size -= TABLE_ENTRY_SIZE as u32;
        inode.mod_time = now();
        self.write_inode(dir, &inode)?;

        self.shrink_chain(dir, inode.size as usize)
    }

    fn read_dir_content(&self, dir: BlockIndex, inode: &Inode) -> Result<Vec<BlockIndex>, FsError> {
        let size = inode.size as usize;

        if size % TABLE_ENTRY_SIZE != 0 {
            return Err(FsError::Corrupt(format!(
                "directory at block {dir} has unaligned size {size}"
            )));
        }

        let raw = self.read_content(dir, 0, size)?;

        Ok(raw
            .chunks_exact(TABLE_ENTRY_SIZE)
            .map(|pair| BlockIndex::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    fn write_dir_content(&self, dir: BlockIndex, children: &[BlockIndex]) -> Result<(), FsError> {
        let raw: Vec<u8> = children
            .iter()
            .flat_map(|child| child.to_le_bytes())
            .collect();

        self.write_content(dir, 0, &raw)
    }

    /// Walks the chain to the block holding content byte `offset` and reads
    /// `len` bytes, following successor links across block boundaries.
    fn read_content(&self, head: BlockIndex, offset: usize, len: usize) -> Result<Vec<u8>, FsError> {
        let mut data = Vec::with_capacity(len);

        if len == 0 {
            return Ok(data);
        }

        let mut position = INODE_SIZE + offset;
        let end = position + len;
        let mut block = self.locate(head, position / BLOCK_SIZE)?;

        while position < end {
            let block_offset = position % BLOCK_SIZE;
            let step = (BLOCK_SIZE - block_offset).min(end - position);

            let mut buf = vec![0; step];
            self.storage.read_at(
                self.layout.block_position(block) + block_offset as u64,
                &mut buf,
            )?;
            data.extend_from_slice(&buf);

            position += step;
            if position < end {
                block = self.table.successor(block)?.ok_or_else(|| {
                    FsError::Corrupt(format!("chain at block {head} ends short of its content"))
                })?;
            }
        }

        Ok(data)
    }

    /// The write counterpart of [`Self::read_content`]. The chain must already
    /// be long enough; callers grow it first.
    fn write_content(&self, head: BlockIndex, offset: usize, data: &[u8]) -> Result<(), FsError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut position = INODE_SIZE + offset;
        let end = position + data.len();
        let mut written = 0;
        let mut block = self.locate(head, position / BLOCK_SIZE)?;

        while position < end {
            let block_offset = position % BLOCK_SIZE;
            let step = (BLOCK_SIZE - block_offset).min(end - position);

            self.storage.write_at(
                self.layout.block_position(block) + block_offset as u64,
                &data[written..written + step],
            )?;

            written += step;
            position += step;
            if position < end {
                block = self.table.successor(block)?.ok_or_else(|| {
                    FsError::Corrupt(format!("chain at block {head} ends short of its content"))
                })?;
            }
        }

        Ok(())
    }

    /// Advances `chain_index` links from `head`.
    fn locate(&self, head: BlockIndex, chain_index: usize) -> Result<BlockIndex, FsError> {
        let mut block = head;

        for _ in 0..chain_index {
            block = self.table.successor(block)?.ok_or_else(|| {
                FsError::Corrupt(format!(
                    "chain at block {head} is shorter than {chain_index} blocks"
                ))
            })?;
        }

        Ok(block)
    }

    /// Every block of the chain starting at `head`, in order. Bounded by the
    /// block count, so a cycle surfaces as corruption instead of a hang.
    fn chain_blocks(&self, head: BlockIndex) -> Result<Vec<BlockIndex>, FsError> {
        let mut blocks = vec![head];
        let mut block = head;

        while let Some(next) = self.table.successor(block)? {
            blocks.push(next);
            block = next;

            if blocks.len() > self.table.len() {
                return Err(FsError::Corrupt(format!(
                    "chain at block {head} contains a cycle"
                )));
            }
        }

        Ok(blocks)
    }

    /// Extends the chain until it can hold `new_size` content bytes. Fresh
    /// blocks are linked at the tail, marked END, and zeroed. If the scan runs
    /// out of free blocks the partial extension is undone before returning
    /// [`FsError::NoSpace`].
    fn grow_chain(&mut self, head: BlockIndex, inode: &Inode, new_size: usize) -> Result<(), FsError> {
        let blocks = self.chain_blocks(head)?;
        let mut tail = *blocks.last().expect("a chain includes its head");

        for _ in blocks.len()..blocks_needed(new_size) {
            let fresh = match self.table.allocate_free_block() {
                Ok(fresh) => fresh,
                Err(err) => {
                    self.shrink_chain(head, inode.size as usize)?;
                    return Err(err);
                }
            };

            self.table.set(&self.storage, tail, fresh)?;
            self.table.set(&self.storage, fresh, END_BLOCK)?;
            self.storage
                .write_at(self.layout.block_position(fresh), &[0; BLOCK_SIZE])?;

            tail = fresh;
        }

        Ok(())
    }

    /// Frees every chain block past the last one needed to hold `new_size`
    /// content bytes and marks the new tail END. Never frees the head: even an
    /// empty chain needs its inode-bearing block.
    fn shrink_chain(&mut self, head: BlockIndex, new_size: usize) -> Result<(), FsError> {
        let keep = blocks_needed(new_size);
        let blocks = self.chain_blocks(head)?;

        if blocks.len() <= keep {
            return Ok(());
        }

        self.table.set(&self.storage, blocks[keep - 1], END_BLOCK)?;
        for &block in &blocks[keep..] {
            self.table.set(&self.storage, block, FREE_BLOCK)?;
        }

        Ok(())
    }
}

/// The number of blocks a chain needs to hold its inode plus `size` content
/// bytes. Never less than one: the head block always exists.
fn blocks_needed(size: usize) -> usize {
    (INODE_SIZE + size).div_ceil(BLOCK_SIZE)
}

fn encode_inode(inode: &Inode) -> Result<Vec<u8>, FsError> {
    bincode::serialize(inode).map_err(|err| FsError::Corrupt(format!("serializing inode: {err}")))
}

fn decode_inode(bytes: &[u8]) -> Result<Inode, FsError> {
    bincode::deserialize(bytes).map_err(|err| FsError::Corrupt(format!("parsing inode: {err}")))
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    /// Content bytes that fit in a chain's head block.
    const HEAD_CAPACITY: usize = BLOCK_SIZE - INODE_SIZE;

    fn test_fs(num_blocks: usize) -> ChainFs<MemoryStorage> {
        let storage = MemoryStorage::new(Layout::new(num_blocks).unwrap());
        format(&storage).unwrap();

        ChainFs::load(storage).unwrap()
    }

    fn table_snapshot(fs: &ChainFs<MemoryStorage>) -> Vec<BlockIndex> {
        (0..fs.table.len() as BlockIndex)
            .map(|index| fs.table.get(index))
            .collect()
    }

    fn chain_len(fs: &ChainFs<MemoryStorage>, head: BlockIndex) -> usize {
        fs.chain_blocks(head).unwrap().len()
    }

    #[test]
    fn test_format_creates_root() {
        let fs = test_fs(8);

        assert_eq!(fs.resolve("/").unwrap(), ROOT_BLOCK);

        let root = fs.read_inode(ROOT_BLOCK).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.size, 0);
        assert_eq!(fs.num_free_blocks(), 7);
    }

    #[test]
    fn test_load_unformatted_fails() {
        let storage = MemoryStorage::new(Layout::new(8).unwrap());

        assert!(matches!(
            ChainFs::load(storage),
            Err(FsError::Corrupt(_))
        ));
    }

    #[test]
    fn test_create_then_resolve() {
        let mut fs = test_fs(8);

        let head = fs.create_entry("/a", false).unwrap();
        assert_eq!(fs.resolve("/a").unwrap(), head);

        let inode = fs.stat(head).unwrap();
        assert!(!inode.is_directory());
        assert_eq!(inode.size, 0);
        assert_eq!(inode.name.as_str().unwrap(), "/a");
    }

    #[test]
    fn test_resolve_missing() {
        let fs = test_fs(8);

        assert!(matches!(fs.resolve("/nope"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_create_duplicate() {
        let mut fs = test_fs(8);

        fs.create_entry("/a", false).unwrap();
        assert!(matches!(
            fs.create_entry("/a", true),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn test_create_in_missing_parent() {
        let mut fs = test_fs(8);

        assert!(matches!(
            fs.create_entry("/missing/a", false),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn test_create_under_file() {
        let mut fs = test_fs(8);

        fs.create_entry("/f", false).unwrap();
        assert!(matches!(
            fs.create_entry("/f/a", false),
            Err(FsError::NotADirectory)
        ));
    }

    #[test]
    fn test_create_rejects_long_path() {
        let mut fs = test_fs(8);
        let path = format!("/{}", "a".repeat(40));

        assert!(matches!(
            fs.create_entry(&path, false),
            Err(FsError::NameTooLong)
        ));
    }

    #[test]
    fn test_parent_of_nested() {
        let mut fs = test_fs(16);

        let a = fs.create_entry("/a", true).unwrap();
        let b = fs.create_entry("/a/b", true).unwrap();
        fs.create_entry("/a/b/c", false).unwrap();

        assert_eq!(fs.parent_of("/a").unwrap(), ROOT_BLOCK);
        assert_eq!(fs.parent_of("/a/b").unwrap(), a);
        assert_eq!(fs.parent_of("/a/b/c").unwrap(), b);
    }

    #[test]
    fn test_directory_size_tracks_entries() {
        let mut fs = test_fs(16);

        for path in ["/a", "/b", "/c"] {
            fs.create_entry(path, false).unwrap();
        }

        let root = fs.read_inode(ROOT_BLOCK).unwrap();
        assert_eq!(root.size as usize % TABLE_ENTRY_SIZE, 0);

        let children = fs.list_entries(ROOT_BLOCK).unwrap();
        assert_eq!(children.len(), root.size as usize / TABLE_ENTRY_SIZE);
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn test_list_entries_on_file() {
        let mut fs = test_fs(8);

        let head = fs.create_entry("/f", false).unwrap();
        assert!(matches!(
            fs.list_entries(head),
            Err(FsError::NotADirectory)
        ));
    }

    #[test]
    fn test_stat_rejects_non_heads() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[7; 600]).unwrap();

        let interior = fs.chain_blocks(head).unwrap()[1];
        assert!(matches!(fs.stat(interior), Err(FsError::NotFound)));

        let free = fs.table.allocate_free_block().unwrap();
        assert!(matches!(fs.stat(free), Err(FsError::NotFound)));
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut fs = test_fs(8);

        let head = fs.create_entry("/f", false).unwrap();
        let data = b"hello, chain".to_vec();

        assert_eq!(fs.write(head, 0, &data).unwrap(), data.len());
        assert_eq!(fs.stat(head).unwrap().size as usize, data.len());
        assert_eq!(fs.read(head, 0, data.len()).unwrap(), data);
    }

    #[test]
    fn test_write_spans_blocks() {
        let mut fs = test_fs(16);

        fs.create_entry("/a", true).unwrap();
        let head = fs.create_entry("/a/b", false).unwrap();

        let data: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        assert!(data.len() > HEAD_CAPACITY);

        assert_eq!(fs.write(head, 0, &data).unwrap(), 300);
        assert_eq!(chain_len(&fs, head), 2);
        assert_eq!(fs.stat(head).unwrap().size, 300);
        assert_eq!(fs.read(head, 0, 300).unwrap(), data);

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_append_accumulates() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, b"front ").unwrap();
        fs.write(head, 6, b"back").unwrap();

        assert_eq!(fs.read(head, 0, 64).unwrap(), b"front back");
    }

    #[test]
    fn test_overwrite_at_offset() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[b'x'; 300]).unwrap();
        fs.write(head, 150, b"yyyy").unwrap();

        let data = fs.read(head, 0, 300).unwrap();
        assert_eq!(data.len(), 300);
        assert_eq!(&data[148..156], b"xxyyyyxx");
        assert_eq!(fs.stat(head).unwrap().size, 300);
    }

    #[test]
    fn test_write_past_end_zero_fills_gap() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[1, 2]).unwrap();
        fs.write(head, 10, &[3]).unwrap();

        assert_eq!(fs.read(head, 0, 64).unwrap(), [1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn test_read_clamps_to_size() {
        let mut fs = test_fs(8);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[9; 10]).unwrap();

        assert_eq!(fs.read(head, 0, 1000).unwrap().len(), 10);
        assert_eq!(fs.read(head, 8, 1000).unwrap(), [9, 9]);
        assert!(fs.read(head, 10, 4).unwrap().is_empty());
        assert!(fs.read(head, 99, 4).unwrap().is_empty());
    }

    #[test]
    fn test_remove_file_frees_chain() {
        let mut fs = test_fs(16);
        let free_before = fs.num_free_blocks();

        let head = fs.create_entry("/x", false).unwrap();
        fs.write(head, 0, &[5; 600]).unwrap();
        let blocks = fs.chain_blocks(head).unwrap();
        assert_eq!(blocks.len(), 3);

        fs.remove_file("/x").unwrap();

        assert!(matches!(fs.resolve("/x"), Err(FsError::NotFound)));
        for block in blocks {
            assert!(fs.table.is_free(block));
        }
        assert_eq!(fs.num_free_blocks(), free_before);

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_empty_directory() {
        let mut fs = test_fs(8);
        let free_before = fs.num_free_blocks();

        let head = fs.create_entry("/d", true).unwrap();
        fs.remove_directory("/d").unwrap();

        assert!(matches!(fs.resolve("/d"), Err(FsError::NotFound)));
        assert!(fs.table.is_free(head));
        assert_eq!(fs.num_free_blocks(), free_before);
    }

    #[test]
    fn test_remove_non_empty_directory_fails_without_mutation() {
        let mut fs = test_fs(8);

        fs.create_entry("/d", true).unwrap();
        fs.create_entry("/d/child", false).unwrap();

        let before = table_snapshot(&fs);
        assert!(matches!(
            fs.remove_directory("/d"),
            Err(FsError::NotEmpty)
        ));
        assert_eq!(table_snapshot(&fs), before);
        assert!(fs.resolve("/d/child").is_ok());
    }

    #[test]
    fn test_remove_directory_on_file() {
        let mut fs = test_fs(8);

        fs.create_entry("/f", false).unwrap();
        assert!(matches!(
            fs.remove_directory("/f"),
            Err(FsError::NotADirectory)
        ));
    }

    #[test]
    fn test_remove_file_on_directory() {
        let mut fs = test_fs(8);

        fs.create_entry("/d", true).unwrap();
        assert!(matches!(fs.remove_file("/d"), Err(FsError::IsDirectory)));
    }

    #[test]
    fn test_remove_root_rejected() {
        let mut fs = test_fs(8);

        assert!(fs.remove_directory("/").is_err());
        assert_eq!(fs.resolve("/").unwrap(), ROOT_BLOCK);
    }

    #[test]
    fn test_exhaustion_propagates_without_side_effects() {
        // root plus three usable blocks
        let mut fs = test_fs(4);

        fs.create_entry("/f1", false).unwrap();
        fs.create_entry("/f2", false).unwrap();
        fs.create_entry("/f3", false).unwrap();
        assert_eq!(fs.num_free_blocks(), 0);

        let before = table_snapshot(&fs);
        assert!(matches!(
            fs.create_entry("/f4", false),
            Err(FsError::NoSpace)
        ));
        assert_eq!(table_snapshot(&fs), before);
        assert!(matches!(fs.resolve("/f4"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_write_exhaustion_rolls_back_extension() {
        let mut fs = test_fs(4);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[1; 100]).unwrap();
        fs.create_entry("/g", false).unwrap();
        assert_eq!(fs.num_free_blocks(), 1);

        // needs two more blocks; only one is available, so the first link of
        // the extension must be undone
        let before = table_snapshot(&fs);
        assert!(matches!(
            fs.write(head, 0, &[2; 600]),
            Err(FsError::NoSpace)
        ));
        assert_eq!(table_snapshot(&fs), before);
        assert_eq!(fs.stat(head).unwrap().size, 100);
        assert_eq!(fs.read(head, 0, 100).unwrap(), [1; 100]);

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_create_releases_head_when_parent_append_fails() {
        let mut fs = test_fs(128);

        fs.create_entry("/d", true).unwrap();
        let entries_per_head = HEAD_CAPACITY / TABLE_ENTRY_SIZE;
        for i in 0..entries_per_head {
            fs.create_entry(&format!("/d/f{i:03}"), false).unwrap();
        }

        // drain the free pool so the next create finds exactly one free block:
        // its own head, leaving nothing for the parent's chain extension
        while fs.num_free_blocks() > 1 {
            let filler = format!("/fill{}", fs.num_free_blocks());
            fs.create_entry(&filler, false).unwrap();
        }

        let before = table_snapshot(&fs);
        assert!(matches!(
            fs.create_entry("/d/overflow", false),
            Err(FsError::NoSpace)
        ));
        assert_eq!(table_snapshot(&fs), before);

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_directory_chain_extends_and_shrinks_at_boundary() {
        let mut fs = test_fs(128);

        let dir = fs.create_entry("/d", true).unwrap();
        let entries_per_head = HEAD_CAPACITY / TABLE_ENTRY_SIZE;

        for i in 0..entries_per_head {
            fs.create_entry(&format!("/d/f{i:03}"), false).unwrap();
        }
        assert_eq!(chain_len(&fs, dir), 1);

        // one past the head's capacity extends the chain
        fs.create_entry("/d/last", false).unwrap();
        assert_eq!(chain_len(&fs, dir), 2);

        // dropping back to the boundary frees the vacated tail
        fs.remove_file("/d/f000").unwrap();
        assert_eq!(chain_len(&fs, dir), 1);
        assert_eq!(
            fs.stat(dir).unwrap().size as usize,
            entries_per_head * TABLE_ENTRY_SIZE
        );

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_removing_only_entry_keeps_head() {
        let mut fs = test_fs(8);

        let dir = fs.create_entry("/d", true).unwrap();
        fs.create_entry("/d/only", false).unwrap();
        fs.remove_file("/d/only").unwrap();

        assert_eq!(chain_len(&fs, dir), 1);
        assert_eq!(fs.stat(dir).unwrap().size, 0);
        assert!(!fs.table.is_free(dir));
    }

    #[test]
    fn test_swap_remove_reorders_entries() {
        let mut fs = test_fs(16);

        fs.create_entry("/d", true).unwrap();
        let a = fs.create_entry("/d/a", false).unwrap();
        let b = fs.create_entry("/d/b", false).unwrap();
        let c = fs.create_entry("/d/c", false).unwrap();

        let dir = fs.resolve("/d").unwrap();
        assert_eq!(fs.list_entries(dir).unwrap(), vec![a, b, c]);

        fs.remove_file("/d/a").unwrap();
        assert_eq!(fs.list_entries(dir).unwrap(), vec![c, b]);
    }

    #[test]
    fn test_truncate_shrink_frees_blocks() {
        let mut fs = test_fs(16);
        let free_before = fs.num_free_blocks();

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[7; 600]).unwrap();
        assert_eq!(chain_len(&fs, head), 3);

        fs.truncate(head, 100).unwrap();

        assert_eq!(chain_len(&fs, head), 1);
        assert_eq!(fs.stat(head).unwrap().size, 100);
        assert_eq!(fs.read(head, 0, 600).unwrap(), [7; 100]);
        assert_eq!(fs.num_free_blocks(), free_before - 1);

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_truncate_grow_zero_fills() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[1; 10]).unwrap();
        fs.truncate(head, 300).unwrap();

        assert_eq!(chain_len(&fs, head), 2);

        let data = fs.read(head, 0, 300).unwrap();
        assert_eq!(&data[..10], [1; 10]);
        assert!(data[10..].iter().all(|&b| b == 0));

        fs.check_consistency().unwrap();
    }

    #[test]
    fn test_truncate_directory_rejected() {
        let mut fs = test_fs(8);

        let dir = fs.create_entry("/d", true).unwrap();
        assert!(matches!(fs.truncate(dir, 0), Err(FsError::IsDirectory)));
    }

    #[test]
    fn test_reload_preserves_state() {
        let mut fs = test_fs(32);

        fs.create_entry("/a", true).unwrap();
        let file = fs.create_entry("/a/b", false).unwrap();
        fs.write(file, 0, &[42; 300]).unwrap();
        fs.create_entry("/c", false).unwrap();
        fs.remove_file("/c").unwrap();

        let storage = fs.storage;
        let mut reloaded = ChainFs::load(storage).unwrap();

        assert_eq!(reloaded.resolve("/a/b").unwrap(), file);
        assert_eq!(reloaded.read(file, 0, 300).unwrap(), [42; 300]);
        assert!(matches!(reloaded.resolve("/c"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_consistency_detects_cycle() {
        let mut fs = test_fs(16);

        let head = fs.create_entry("/f", false).unwrap();
        fs.write(head, 0, &[1; 600]).unwrap();

        let blocks = fs.chain_blocks(head).unwrap();
        let tail = *blocks.last().unwrap();
        fs.table.set(&fs.storage, tail, blocks[1]).unwrap();

        assert!(matches!(
            fs.check_consistency(),
            Err(FsError::Corrupt(_))
        ));
    }

    #[test]
    fn test_consistency_detects_leaked_block() {
        let mut fs = test_fs(16);

        let leaked = fs.table.allocate_free_block().unwrap();
        fs.table.set(&fs.storage, leaked, END_BLOCK).unwrap();

        assert!(matches!(
            fs.check_consistency(),
            Err(FsError::Corrupt(_))
        ));
    }
}
