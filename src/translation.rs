use crate::constants::*;
use crate::machine::ExceptionType;
use crate::page_table::{PageFlags, PageTable};

/// Represents the decomposed components of a Virtual Address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u32,
    pub vpn: usize,
    pub offset: usize,
}

impl VirtualAddress {
    /// Decompose a raw VA into page number and offset
    pub fn from_raw(va: u32) -> Self {
        let vpn = va as usize / PAGE_SIZE;
        let offset = va as usize % PAGE_SIZE;

        VirtualAddress { va, vpn, offset }
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VA({}) = (vpn={}, offset={})", self.va, self.vpn, self.offset)
    }
}

/// Result of an address translation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationResult {
    Success(usize),
    PageFault,
    ReadOnlyViolation,
    AddressError,
}

impl TranslationResult {
    /// The trap this result raises, if any
    pub fn exception(&self) -> Option<ExceptionType> {
        match self {
            TranslationResult::Success(_) => None,
            TranslationResult::PageFault => Some(ExceptionType::PageFault),
            TranslationResult::ReadOnlyViolation => Some(ExceptionType::ReadOnly),
            TranslationResult::AddressError => Some(ExceptionType::AddressError),
        }
    }
}

/// Translate a virtual address through a page table.
///
/// A successful translation marks the page referenced, and dirty when
/// `writing`.
pub fn translate(
    va: &VirtualAddress,
    table: &PageTable,
    table_size: usize,
    writing: bool,
) -> TranslationResult {
    // Step 1: Check the page lies inside the address space
    if va.vpn >= table_size {
        return TranslationResult::AddressError;
    }
    let Some(entry) = table.get(va.vpn) else {
        return TranslationResult::AddressError;
    };

    // Step 2: Non-resident pages fault
    let Some(frame) = entry.frame() else {
        return TranslationResult::PageFault;
    };

    // Step 3: Permission check
    if writing && entry.read_only() {
        return TranslationResult::ReadOnlyViolation;
    }

    // Step 4: Record the reference
    table.update(va.vpn, |entry| {
        entry.flags.insert(PageFlags::REFERENCED);
        if writing {
            entry.flags.insert(PageFlags::DIRTY);
        }
    });

    // Step 5: PA = frame * PAGE_SIZE + offset
    TranslationResult::Success(frame * PAGE_SIZE + va.offset)
}
