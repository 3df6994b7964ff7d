//! System-wide paging state and the page fault handler.

use std::collections::BTreeMap;

use crate::addrspace::AddressSpace;
use crate::constants::{BAD_VADDR_REG, PAGE_SIZE};
use crate::error::{Result, VmError};
use crate::machine::Machine;
use crate::memory::{FrameTable, read_frame, write_frame};
use crate::page_table::{Location, PageFlags, PageRef, SpaceId};
use crate::replacement::{EvictionPolicy, PolicyKind};
use crate::stats::Statistics;
use crate::swap::SwapStore;

/// Owns everything shared by all address spaces: frame ownership, the swap
/// store, the eviction policy and the paging counters.
pub struct Pager {
    pub frames: FrameTable,
    pub swap: SwapStore,
    pub policy: Box<dyn EvictionPolicy>,
    pub stats: Statistics,
}

impl Pager {
    pub fn new(num_frames: usize, policy: PolicyKind) -> Self {
        Pager {
            frames: FrameTable::new(num_frames),
            swap: SwapStore::new(),
            policy: policy.build(),
            stats: Statistics::default(),
        }
    }

    /// Bring the page at the machine's bad virtual address into memory.
    ///
    /// The victim's frame content and the target's swap block trade places,
    /// so the victim ends up in exactly the slot the target vacated. Both
    /// entries come out with every flag cleared. On error the fault is
    /// fatal to the running program.
    pub fn handle_page_fault(
        &mut self,
        machine: &mut dyn Machine,
        spaces: &BTreeMap<SpaceId, AddressSpace>,
        current: SpaceId,
    ) -> Result<()> {
        self.stats.page_faults += 1;

        // Step 1: locate the faulting entry
        let bad_vaddr = machine.read_register(BAD_VADDR_REG) as u32;
        let vpn = bad_vaddr as usize / PAGE_SIZE;
        log::debug!("page fault at {:#x} (vpn {}) in {}", bad_vaddr, vpn, current);

        let space = spaces.get(&current).ok_or(VmError::UnknownSpace(current))?;
        let target_table = space.page_table();
        let target = target_table
            .get(vpn)
            .filter(|_| vpn < space.num_pages())
            .ok_or(VmError::UnexpectedFault {
                vpn,
                reason: "address lies beyond the address space",
            })?;
        let slot = match target.location {
            Location::Swapped(slot) => slot,
            Location::Resident(_) => {
                return Err(VmError::UnexpectedFault {
                    vpn,
                    reason: "page is already resident",
                });
            }
        };

        // Step 2: pick a victim
        let victim = self
            .policy
            .select_victim()
            .ok_or(VmError::EvictionSetEmpty { vpn })?;
        let victim_table = spaces
            .get(&victim.space)
            .ok_or(VmError::UnknownSpace(victim.space))?
            .page_table();
        let frame = victim_table
            .get(victim.vpn)
            .and_then(|entry| entry.frame())
            .ok_or(VmError::UnexpectedFault {
                vpn: victim.vpn,
                reason: "eviction victim is not resident",
            })?;

        // Step 3: exchange frame and swap contents
        let evicted = read_frame(machine.main_memory(), frame);
        let incoming = self.swap.read(slot);
        write_frame(machine.main_memory_mut(), frame, &incoming);
        self.swap.write(slot, &evicted);
        self.stats.disk_reads += 1;
        self.stats.disk_writes += 1;

        // Step 4 and 5: flip both entries
        target_table.update(vpn, |entry| {
            entry.location = Location::Resident(frame);
            entry.flags = PageFlags::empty();
        });
        victim_table.update(victim.vpn, |entry| {
            entry.location = Location::Swapped(slot);
            entry.flags = PageFlags::empty();
        });

        // Step 6
        self.policy.on_install(PageRef::new(current, vpn));

        log::debug!(
            "frame {} swapped: {} in, {} out to slot {}",
            frame,
            PageRef::new(current, vpn),
            victim,
            slot
        );
        Ok(())
    }
}
