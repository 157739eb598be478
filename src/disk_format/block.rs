use std::mem::size_of;

/// size of a block in bytes
pub const BLOCK_SIZE: usize = 256;

pub type Block = [u8; BLOCK_SIZE];
const_assert!(size_of::<Block>() == BLOCK_SIZE);
