use crate::constants::PAGE_SIZE;
use crate::memory::Block;

pub type SlotIndex = usize;

/// Paging disk - simulates secondary storage for demand paging
///
/// Blocks are only ever appended; slots are never reclaimed, so sustained
/// fault traffic across many processes grows the store without bound.
#[derive(Debug, Default)]
pub struct SwapStore {
    blocks: Vec<Block>,
}

impl SwapStore {
    pub fn new() -> Self {
        SwapStore { blocks: Vec::new() }
    }

    /// Grow the store by one zeroed block and return its slot
    pub fn append_block(&mut self) -> SlotIndex {
        self.blocks.push([0u8; PAGE_SIZE]);
        self.blocks.len() - 1
    }

    /// Read an entire block
    pub fn read(&self, slot: SlotIndex) -> Block {
        self.blocks[slot]
    }

    /// Replace an entire block
    pub fn write(&mut self, slot: SlotIndex, block: &Block) {
        self.blocks[slot] = *block;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
