use crate::constants::*;

/// One page worth of bytes; the unit of every frame, swap and staging copy
pub type Block = [u8; PAGE_SIZE];

pub type FrameIndex = usize;

/// Byte-addressable RAM of the simulated machine
pub struct PhysicalMemory {
    data: Box<[u8]>,
}

impl PhysicalMemory {
    /// Create a new physical memory of `num_frames` frames, all zeros
    pub fn new(num_frames: usize) -> Self {
        PhysicalMemory {
            data: vec![0u8; num_frames * PAGE_SIZE].into_boxed_slice(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.data.len() / PAGE_SIZE
    }

    /// Read a byte from physical memory
    #[inline]
    pub fn read(&self, address: usize) -> u8 {
        self.data[address]
    }

    /// Write a byte to physical memory
    #[inline]
    pub fn write(&mut self, address: usize, value: u8) {
        self.data[address] = value;
    }

    /// Calculate the starting address of a frame
    #[inline]
    pub fn frame_to_address(frame: FrameIndex) -> usize {
        frame * PAGE_SIZE
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Default for PhysicalMemory {
    fn default() -> Self {
        Self::new(NUM_PHYS_PAGES)
    }
}

/// Copy the contents of `frame` out of a raw memory array
pub fn read_frame(memory: &[u8], frame: FrameIndex) -> Block {
    let start = PhysicalMemory::frame_to_address(frame);
    let mut block = [0u8; PAGE_SIZE];
    block.copy_from_slice(&memory[start..start + PAGE_SIZE]);
    block
}

/// Overwrite `frame` in a raw memory array with `block`
pub fn write_frame(memory: &mut [u8], frame: FrameIndex, block: &Block) {
    let start = PhysicalMemory::frame_to_address(frame);
    memory[start..start + PAGE_SIZE].copy_from_slice(block);
}

/// Ownership bitmap over the physical frames, shared by every address space
#[derive(Debug, Clone)]
pub struct FrameTable {
    used: Vec<bool>,
}

impl FrameTable {
    pub fn new(num_frames: usize) -> Self {
        FrameTable {
            used: vec![false; num_frames],
        }
    }

    /// Claim the lowest-indexed free frame, or `None` when all are taken
    pub fn allocate(&mut self) -> Option<FrameIndex> {
        let frame = self.used.iter().position(|&used| !used)?;
        self.used[frame] = true;
        Some(frame)
    }

    /// Give a frame back. The caller must own it; a double release is not detected.
    pub fn release(&mut self, frame: FrameIndex) {
        self.used[frame] = false;
    }

    #[inline]
    pub fn is_claimed(&self, frame: FrameIndex) -> bool {
        self.used[frame]
    }

    pub fn free_count(&self) -> usize {
        self.used.iter().filter(|&&used| !used).count()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Indices of every claimed frame, ascending
    pub fn claimed(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.used
            .iter()
            .enumerate()
            .filter_map(|(frame, &used)| used.then_some(frame))
    }
}
