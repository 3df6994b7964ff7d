//! Entry point into the kernel from user programs.
//!
//! Two kinds of trap are serviced: system calls and page faults. Anything
//! else the machine raises is fatal to the running program.
//!
//! System call convention: code in r2, first argument in r4.

use std::collections::BTreeMap;

use crate::addrspace::AddressSpace;
use crate::constants::*;
use crate::error::{Result, VmError};
use crate::machine::{ExceptionHandler, ExceptionType, Machine, Resume};
use crate::page_table::{PageRef, SpaceId};
use crate::pager::Pager;

/// Kernel state visible to a trap taken while `current` is running
pub struct TrapContext<'a> {
    pub pager: &'a mut Pager,
    pub spaces: &'a BTreeMap<SpaceId, AddressSpace>,
    pub current: SpaceId,
    /// Values printed by the program
    pub console: &'a mut Vec<i32>,
}

impl TrapContext<'_> {
    fn syscall(&mut self, machine: &mut dyn Machine) -> Resume {
        let code = machine.read_register(SYSCALL_CODE_REG);
        match code {
            SC_HALT => {
                log::info!("Shutdown, initiated by user program");
                Resume::Halt
            }
            SC_EXIT => {
                let status = machine.read_register(ARG1_REG);
                log::info!("{} exited with status {}", self.current, status);
                advance_pc(machine);
                Resume::Exit(status)
            }
            SC_PRINT_INT => {
                let value = machine.read_register(ARG1_REG);
                log::info!("Print integer: {}", value);
                self.console.push(value);
                advance_pc(machine);
                Resume::Continue
            }
            _ => {
                log::warn!("Unexpected system call {}", code);
                advance_pc(machine);
                Resume::Continue
            }
        }
    }
}

impl ExceptionHandler for TrapContext<'_> {
    fn handle(&mut self, machine: &mut dyn Machine, which: ExceptionType) -> Result<Resume> {
        match which {
            ExceptionType::Syscall => Ok(self.syscall(machine)),
            ExceptionType::PageFault => {
                self.pager
                    .handle_page_fault(machine, self.spaces, self.current)?;
                Ok(Resume::Continue)
            }
            other => {
                log::error!(
                    "Unexpected user mode exception {:?} at {:#x}",
                    other,
                    machine.read_register(BAD_VADDR_REG)
                );
                Err(VmError::UnexpectedException(other))
            }
        }
    }

    fn page_referenced(&mut self, vpn: usize) {
        self.pager.policy.on_access(PageRef::new(self.current, vpn));
    }
}

/// Step past the trapping instruction so it is not re-executed
fn advance_pc(machine: &mut dyn Machine) {
    let pc = machine.read_register(PC_REG);
    let next = machine.read_register(NEXT_PC_REG);
    machine.write_register(PREV_PC_REG, pc);
    machine.write_register(PC_REG, next);
    machine.write_register(NEXT_PC_REG, next + INSTRUCTION_SIZE);
}
