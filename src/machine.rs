//! The CPU side of the simulation.
//!
//! [`Machine`] is the interface the paging code relies on: a register file,
//! raw physical memory and the page-table register. [`SimMachine`] is a
//! reference-trace CPU that drives it: instead of decoding instructions it
//! replays a list of memory references and system calls, trapping into an
//! [`ExceptionHandler`] whenever a reference cannot be translated.

use std::collections::VecDeque;

use crate::constants::*;
use crate::error::{Result, VmError};
use crate::memory::PhysicalMemory;
use crate::page_table::PageTable;
use crate::translation::{TranslationResult, VirtualAddress, translate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    Syscall,
    PageFault,
    ReadOnly,
    BusError,
    AddressError,
    Overflow,
    IllegalInstr,
}

/// What the machine should do after a trap has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Continue,
    Halt,
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    Exited(i32),
    /// The reference trace ran out without the program exiting
    TraceEnd,
}

/// Kernel entry point invoked synchronously on every trap
pub trait ExceptionHandler {
    fn handle(&mut self, machine: &mut dyn Machine, which: ExceptionType) -> Result<Resume>;

    /// Called after every successful translation of `vpn` in the installed table
    fn page_referenced(&mut self, _vpn: usize) {}
}

pub trait Machine {
    fn read_register(&self, reg: usize) -> i32;

    fn write_register(&mut self, reg: usize, value: i32);

    fn main_memory(&self) -> &[u8];

    fn main_memory_mut(&mut self) -> &mut [u8];

    /// The page table addresses are currently translated through
    fn page_table(&self) -> Option<&PageTable>;

    fn page_table_size(&self) -> usize;

    fn set_page_table(&mut self, table: Option<PageTable>, size: usize);

    /// Execute user code until the program halts, exits or a fatal trap occurs
    fn run(&mut self, handler: &mut dyn ExceptionHandler) -> Result<RunOutcome>;
}

/// One step of a reference trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(u32),
    Write(u32, u8),
    Syscall { code: i32, arg: i32 },
}

/// A memory reference that completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub va: u32,
    pub pa: usize,
    pub value: u8,
    pub write: bool,
}

pub struct SimMachine {
    registers: [i32; NUM_TOTAL_REGS],
    memory: PhysicalMemory,
    page_table: Option<PageTable>,
    page_table_size: usize,
    trace: VecDeque<Access>,
    references: Vec<Reference>,
}

impl SimMachine {
    pub fn new(num_frames: usize) -> Self {
        SimMachine {
            registers: [0; NUM_TOTAL_REGS],
            memory: PhysicalMemory::new(num_frames),
            page_table: None,
            page_table_size: 0,
            trace: VecDeque::new(),
            references: Vec::new(),
        }
    }

    /// Queue accesses to be executed by the next `run`
    pub fn push_trace(&mut self, trace: impl IntoIterator<Item = Access>) {
        self.trace.extend(trace);
    }

    pub fn pending(&self) -> usize {
        self.trace.len()
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn take_references(&mut self) -> Vec<Reference> {
        std::mem::take(&mut self.references)
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    fn advance_pc(&mut self) {
        let pc = self.registers[PC_REG];
        self.registers[PREV_PC_REG] = pc;
        self.registers[PC_REG] = self.registers[NEXT_PC_REG];
        self.registers[NEXT_PC_REG] += INSTRUCTION_SIZE;
    }

    /// Perform one memory reference, trapping until it translates.
    ///
    /// Returns `Some` when the handler asked the machine to stop.
    fn reference(
        &mut self,
        handler: &mut dyn ExceptionHandler,
        va: u32,
        store: Option<u8>,
    ) -> Result<Option<RunOutcome>> {
        let vaddr = VirtualAddress::from_raw(va);
        let mut faulted = false;

        loop {
            let table = self.page_table.clone().ok_or(VmError::NoActiveSpace)?;
            let result = translate(&vaddr, &table, self.page_table_size, store.is_some());

            let which = match result {
                TranslationResult::Success(pa) => {
                    handler.page_referenced(vaddr.vpn);
                    let value = match store {
                        Some(byte) => {
                            self.memory.write(pa, byte);
                            byte
                        }
                        None => self.memory.read(pa),
                    };
                    self.references.push(Reference {
                        va,
                        pa,
                        value,
                        write: store.is_some(),
                    });
                    return Ok(None);
                }
                TranslationResult::PageFault if faulted => {
                    return Err(VmError::UnexpectedFault {
                        vpn: vaddr.vpn,
                        reason: "page still not resident after fault handling",
                    });
                }
                other => other.exception().unwrap_or(ExceptionType::AddressError),
            };

            self.registers[BAD_VADDR_REG] = va as i32;
            match handler.handle(self, which)? {
                Resume::Continue if which == ExceptionType::PageFault => faulted = true,
                // Nothing to retry after a trap the handler chose to skip
                Resume::Continue => return Ok(None),
                Resume::Halt => return Ok(Some(RunOutcome::Halted)),
                Resume::Exit(code) => return Ok(Some(RunOutcome::Exited(code))),
            }
        }
    }
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new(NUM_PHYS_PAGES)
    }
}

impl Machine for SimMachine {
    fn read_register(&self, reg: usize) -> i32 {
        self.registers[reg]
    }

    fn write_register(&mut self, reg: usize, value: i32) {
        self.registers[reg] = value;
    }

    fn main_memory(&self) -> &[u8] {
        self.memory.data()
    }

    fn main_memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut()
    }

    fn page_table(&self) -> Option<&PageTable> {
        self.page_table.as_ref()
    }

    fn page_table_size(&self) -> usize {
        self.page_table_size
    }

    fn set_page_table(&mut self, table: Option<PageTable>, size: usize) {
        self.page_table = table;
        self.page_table_size = size;
    }

    fn run(&mut self, handler: &mut dyn ExceptionHandler) -> Result<RunOutcome> {
        while let Some(access) = self.trace.pop_front() {
            let stop = match access {
                Access::Read(va) => self.reference(handler, va, None)?,
                Access::Write(va, byte) => self.reference(handler, va, Some(byte))?,
                Access::Syscall { code, arg } => {
                    self.registers[SYSCALL_CODE_REG] = code;
                    self.registers[ARG1_REG] = arg;
                    match handler.handle(self, ExceptionType::Syscall)? {
                        Resume::Continue => None,
                        Resume::Halt => Some(RunOutcome::Halted),
                        Resume::Exit(code) => Some(RunOutcome::Exited(code)),
                    }
                }
            };
            if let Some(outcome) = stop {
                return Ok(outcome);
            }
            if !matches!(access, Access::Syscall { .. }) {
                self.advance_pc();
            }
        }
        Ok(RunOutcome::TraceEnd)
    }
}
