use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::memory::FrameIndex;
use crate::swap::SlotIndex;

/// Identifies one address space for the lifetime of the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub u32);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as{}", self.0)
    }
}

/// Where the contents of a virtual page currently live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Resident(FrameIndex),
    Swapped(SlotIndex),
}

impl Location {
    pub fn is_resident(&self) -> bool {
        matches!(self, Location::Resident(_))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const DIRTY = 1 << 0;
        const READ_ONLY = 1 << 1;
        const REFERENCED = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub virtual_page: usize,
    pub location: Location,
    pub flags: PageFlags,
}

impl PageTableEntry {
    pub fn resident(virtual_page: usize, frame: FrameIndex) -> Self {
        PageTableEntry {
            virtual_page,
            location: Location::Resident(frame),
            flags: PageFlags::empty(),
        }
    }

    pub fn swapped(virtual_page: usize, slot: SlotIndex) -> Self {
        PageTableEntry {
            virtual_page,
            location: Location::Swapped(slot),
            flags: PageFlags::empty(),
        }
    }

    /// A page is valid exactly when it is backed by a frame
    #[inline]
    pub fn valid(&self) -> bool {
        matches!(self.location, Location::Resident(_))
    }

    pub fn frame(&self) -> Option<FrameIndex> {
        match self.location {
            Location::Resident(frame) => Some(frame),
            Location::Swapped(_) => None,
        }
    }

    pub fn slot(&self) -> Option<SlotIndex> {
        match self.location {
            Location::Swapped(slot) => Some(slot),
            Location::Resident(_) => None,
        }
    }

    pub fn dirty(&self) -> bool {
        self.flags.contains(PageFlags::DIRTY)
    }

    pub fn read_only(&self) -> bool {
        self.flags.contains(PageFlags::READ_ONLY)
    }

    pub fn referenced(&self) -> bool {
        self.flags.contains(PageFlags::REFERENCED)
    }
}

/// A page table shared between its address space and the machine's
/// page-table register.
///
/// The simulated CPU marks pages referenced and dirty through the same
/// table the fault handler rewrites, so both sides hold a handle to one
/// live vector. Execution is single threaded, hence `Rc<RefCell<_>>`.
#[derive(Debug, Clone, Default)]
pub struct PageTable(Rc<RefCell<Vec<PageTableEntry>>>);

impl PageTable {
    pub fn new(entries: Vec<PageTableEntry>) -> Self {
        PageTable(Rc::new(RefCell::new(entries)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, vpn: usize) -> Option<PageTableEntry> {
        self.0.borrow().get(vpn).copied()
    }

    /// Apply `f` to the entry for `vpn`, returning `None` if there is no such page
    pub fn update<R>(&self, vpn: usize, f: impl FnOnce(&mut PageTableEntry) -> R) -> Option<R> {
        self.0.borrow_mut().get_mut(vpn).map(f)
    }

    /// Copy of every entry, in virtual page order
    pub fn snapshot(&self) -> Vec<PageTableEntry> {
        self.0.borrow().clone()
    }

    /// Whether both handles refer to the same live table
    pub fn ptr_eq(&self, other: &PageTable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Names one page-table entry system-wide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageRef {
    pub space: SpaceId,
    pub vpn: usize,
}

impl PageRef {
    pub fn new(space: SpaceId, vpn: usize) -> Self {
        PageRef { space, vpn }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.vpn)
    }
}
