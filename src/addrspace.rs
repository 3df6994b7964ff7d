//! Per-process address spaces.
//!
//! Loading an image gives the first pages of the address space whatever
//! frames are still free, in ascending order, and spills every remaining page
//! into freshly appended swap blocks. Loading never fails for lack of RAM.

use crate::constants::*;
use crate::error::{Result, VmError};
use crate::fs::OpenFile;
use crate::machine::Machine;
use crate::memory::{Block, FrameIndex, write_frame};
use crate::noff::{NoffHeader, Segment};
use crate::page_table::{Location, PageRef, PageTable, PageTableEntry, SpaceId};
use crate::pager::Pager;

#[derive(Debug)]
pub struct AddressSpace {
    id: SpaceId,
    page_table: PageTable,
    num_pages: usize,
}

impl AddressSpace {
    /// Load an executable image into a new address space.
    ///
    /// `memory` is the machine's physical memory. Nothing is claimed from the
    /// frame table or the swap store unless the header is well formed.
    pub fn load(
        id: SpaceId,
        executable: &dyn OpenFile,
        pager: &mut Pager,
        memory: &mut [u8],
        stack_size: usize,
    ) -> Result<AddressSpace> {
        // Step 1: read and validate the header
        let mut raw = [0u8; NOFF_HEADER_SIZE];
        let read = executable.read_at(&mut raw, 0);
        let noff = NoffHeader::parse(&raw[..read])?;

        // Step 2: how big is the address space?
        let size = noff.memory_size(stack_size);
        let num_pages = size.div_ceil(PAGE_SIZE);
        let size = num_pages * PAGE_SIZE;
        log::debug!("Initializing address space {}: {} pages, {} bytes", id, num_pages, size);

        for (name, segment) in [
            ("code", &noff.code),
            ("initialized data", &noff.init_data),
            ("uninitialized data", &noff.uninit_data),
        ] {
            if segment.size > 0 && segment.end() > size as u64 {
                return Err(VmError::MalformedImage(format!(
                    "{} segment [{:#x}, {:#x}) lies outside the {} byte address space",
                    name,
                    segment.virtual_address,
                    segment.end(),
                    size
                )));
            }
        }

        // Step 3-5: resident pages first, the rest spill to swap
        let mut entries = Vec::with_capacity(num_pages);
        let mut frames_left = true;
        for vpn in 0..num_pages {
            let frame = if frames_left { pager.frames.allocate() } else { None };
            match frame {
                Some(frame) => {
                    entries.push(PageTableEntry::resident(vpn, frame));
                    pager.policy.on_load(PageRef::new(id, vpn));
                }
                None => {
                    frames_left = false;
                    entries.push(PageTableEntry::swapped(vpn, pager.swap.append_block()));
                }
            }
        }

        // Step 6: stage the segments in a zeroed image of the address space
        let mut staging = vec![0u8; size];
        copy_segment(executable, &noff.code, "code", &mut staging);
        copy_segment(executable, &noff.init_data, "data", &mut staging);
        if noff.uninit_data.size > 0 {
            log::debug!(
                "bss section [{:#x}, {:#x}) zero-filled",
                noff.uninit_data.virtual_address,
                noff.uninit_data.end()
            );
        }

        // Step 7: move every staged page to its backing store
        for (entry, chunk) in entries.iter().zip(staging.chunks_exact(PAGE_SIZE)) {
            let mut block: Block = [0u8; PAGE_SIZE];
            block.copy_from_slice(chunk);
            match entry.location {
                Location::Resident(frame) => write_frame(memory, frame, &block),
                Location::Swapped(slot) => {
                    pager.swap.write(slot, &block);
                    pager.stats.disk_writes += 1;
                }
            }
        }

        Ok(AddressSpace {
            id,
            page_table: PageTable::new(entries),
            num_pages,
        })
    }

    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn entry(&self, vpn: usize) -> Option<PageTableEntry> {
        self.page_table.get(vpn)
    }

    /// Frames currently backing this space, in virtual page order
    pub fn resident_frames(&self) -> Vec<FrameIndex> {
        self.page_table
            .snapshot()
            .iter()
            .filter_map(PageTableEntry::frame)
            .collect()
    }

    /// Set the initial values for the user-level register set
    pub fn init_registers(&self, machine: &mut dyn Machine) {
        for reg in 0..NUM_TOTAL_REGS {
            machine.write_register(reg, 0);
        }

        // Execution starts at the first byte of the image
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, INSTRUCTION_SIZE);

        let stack_top = (self.num_pages * PAGE_SIZE).saturating_sub(STACK_GUARD);
        machine.write_register(STACK_REG, stack_top as i32);
        log::debug!("Initializing stack pointer: {}", stack_top);
    }

    /// Capture the machine's live page table back into this space
    pub fn save_state(&mut self, machine: &dyn Machine) {
        if let Some(table) = machine.page_table() {
            self.page_table = table.clone();
            self.num_pages = machine.page_table_size();
        }
    }

    /// Make the machine translate through this space
    pub fn restore_state(&self, machine: &mut dyn Machine) {
        machine.set_page_table(Some(self.page_table.clone()), self.num_pages);
    }

    /// Release every resident frame and stop tracking this space's pages.
    ///
    /// Swap blocks held by swapped-out pages are abandoned.
    pub fn destroy(self, pager: &mut Pager) -> Vec<FrameIndex> {
        let frames = self.resident_frames();
        for &frame in &frames {
            pager.frames.release(frame);
        }
        pager.policy.forget_space(self.id);
        log::debug!("destroyed {}, released frames {:?}", self.id, frames);
        frames
    }
}

fn copy_segment(executable: &dyn OpenFile, segment: &Segment, name: &str, staging: &mut [u8]) {
    if segment.size == 0 {
        return;
    }
    let start = segment.virtual_address as usize;
    let end = start + segment.size as usize;
    log::debug!("Initializing {} segment [{:#x}, {:#x})", name, start, end);

    let read = executable.read_at(&mut staging[start..end], segment.file_offset as usize);
    if read < segment.size as usize {
        log::warn!("{} segment truncated: read {} of {} bytes", name, read, segment.size);
    }
}
