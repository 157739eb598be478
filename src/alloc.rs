//! The block-allocation table: one successor entry per block, fully resident in
//! memory and mirrored on disk at the region preceding the block area.

use crate::disk_format::layout::Layout;
use crate::disk_format::table::{BlockIndex, END_BLOCK, FREE_BLOCK, TABLE_ENTRY_SIZE};
use crate::error::FsError;
use crate::storage::DiskStorage;

/// The in-memory copy of the on-disk allocation table.
///
/// This is the single shared mutable resource of the engine. It is owned by the
/// filesystem value and threaded through every mutating operation by exclusive
/// reference; every `set` persists the on-disk entry synchronously before
/// returning, so the resident copy and the image never diverge.
pub struct AllocationTable {
    layout: Layout,
    entries: Vec<BlockIndex>,
}

impl AllocationTable {
    /// Reads the table region of the image wholesale.
    pub fn load<S: DiskStorage>(storage: &S, layout: Layout) -> Result<Self, FsError> {
        let mut raw = vec![0; layout.num_blocks * TABLE_ENTRY_SIZE];
        storage.read_at(0, &mut raw)?;

        let entries = raw
            .chunks_exact(TABLE_ENTRY_SIZE)
            .map(|pair| BlockIndex::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { layout, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: BlockIndex) -> BlockIndex {
        self.entries[index as usize]
    }

    pub fn is_free(&self, index: BlockIndex) -> bool {
        self.get(index) == FREE_BLOCK
    }

    /// Updates the entry for `index` and synchronously persists it.
    pub fn set<S: DiskStorage>(
        &mut self,
        storage: &S,
        index: BlockIndex,
        value: BlockIndex,
    ) -> Result<(), FsError> {
        self.entries[index as usize] = value;

        storage.write_at(self.layout.table_entry_position(index), &value.to_le_bytes())
    }

    /// Finds the first free block, scanning from index one: block zero is the
    /// root's chain head and is never handed out.
    ///
    /// The returned block is *not* claimed. Callers must `set` it (to
    /// [`END_BLOCK`] or to a successor) before the next allocation, or it will
    /// be handed out again. Fine under the single-threaded model.
    pub fn allocate_free_block(&self) -> Result<BlockIndex, FsError> {
        (1..self.entries.len() as BlockIndex)
            .find(|&index| self.is_free(index))
            .ok_or(FsError::NoSpace)
    }

    pub fn num_free_blocks(&self) -> usize {
        self.entries.iter().filter(|&&e| e == FREE_BLOCK).count()
    }

    /// The successor of `index` within its chain, or `None` at the chain tail.
    pub fn successor(&self, index: BlockIndex) -> Result<Option<BlockIndex>, FsError> {
        match self.get(index) {
            END_BLOCK => Ok(None),
            FREE_BLOCK => Err(FsError::Corrupt(format!(
                "chain runs through free block {index}"
            ))),
            next if !self.layout.contains(next) => Err(FsError::Corrupt(format!(
                "block {index} links to out-of-range block {next}"
            ))),
            next => Ok(Some(next)),
        }
    }
}
