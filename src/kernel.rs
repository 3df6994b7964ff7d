//! Process-level orchestration of the paging subsystem.

use std::collections::BTreeMap;

use crate::addrspace::AddressSpace;
use crate::config::VmConfig;
use crate::constants::PAGE_SIZE;
use crate::error::{Result, VmError};
use crate::exception::TrapContext;
use crate::fs::FileSystem;
use crate::machine::{Machine, RunOutcome};
use crate::memory::{FrameIndex, FrameTable};
use crate::pager::Pager;
use crate::page_table::SpaceId;
use crate::replacement::EvictionPolicy;
use crate::stats::Statistics;
use crate::swap::SwapStore;

pub struct Kernel<M: Machine> {
    config: VmConfig,
    machine: M,
    fs: Box<dyn FileSystem>,
    pager: Pager,
    spaces: BTreeMap<SpaceId, AddressSpace>,
    current: Option<SpaceId>,
    next_id: u32,
    console: Vec<i32>,
}

impl<M: Machine> Kernel<M> {
    pub fn new(config: VmConfig, machine: M, fs: Box<dyn FileSystem>) -> Result<Self> {
        config.validate()?;
        let needed = config.num_phys_pages * PAGE_SIZE;
        if machine.main_memory().len() < needed {
            return Err(VmError::Config(format!(
                "machine has {} bytes of memory, {} frames need {}",
                machine.main_memory().len(),
                config.num_phys_pages,
                needed
            )));
        }

        log::debug!(
            "kernel up: {} frames, {} policy",
            config.num_phys_pages,
            config.policy
        );
        Ok(Kernel {
            pager: Pager::new(config.num_phys_pages, config.policy),
            config,
            machine,
            fs,
            spaces: BTreeMap::new(),
            current: None,
            next_id: 0,
            console: Vec::new(),
        })
    }

    /// Load `name` into a new address space without running it
    pub fn spawn(&mut self, name: &str) -> Result<SpaceId> {
        let executable = self
            .fs
            .open(name)
            .ok_or_else(|| VmError::ImageNotFound(name.to_string()))?;
        let id = SpaceId(self.next_id);
        let space = AddressSpace::load(
            id,
            executable.as_ref(),
            &mut self.pager,
            self.machine.main_memory_mut(),
            self.config.user_stack_size,
        )?;
        self.next_id += 1;

        log::info!("loaded `{}` as {} ({} pages)", name, id, space.num_pages());
        self.spaces.insert(id, space);
        Ok(id)
    }

    pub fn init_registers(&mut self, id: SpaceId) -> Result<()> {
        let space = self.spaces.get(&id).ok_or(VmError::UnknownSpace(id))?;
        space.init_registers(&mut self.machine);
        Ok(())
    }

    /// Context switch: capture the running space's table, install `id`'s
    pub fn switch_to(&mut self, id: SpaceId) -> Result<()> {
        if !self.spaces.contains_key(&id) {
            return Err(VmError::UnknownSpace(id));
        }
        if let Some(previous) = self.current.filter(|&previous| previous != id) {
            if let Some(space) = self.spaces.get_mut(&previous) {
                space.save_state(&self.machine);
            }
        }
        let space = self.spaces.get(&id).ok_or(VmError::UnknownSpace(id))?;
        space.restore_state(&mut self.machine);
        self.current = Some(id);
        Ok(())
    }

    /// Run the current space until it halts, exits or traps fatally.
    ///
    /// An exiting program's address space is destroyed.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let current = self.current.ok_or(VmError::NoActiveSpace)?;
        let mut traps = TrapContext {
            pager: &mut self.pager,
            spaces: &self.spaces,
            current,
            console: &mut self.console,
        };

        let outcome = match self.machine.run(&mut traps) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{} aborted: {}", current, e);
                return Err(e);
            }
        };
        if let RunOutcome::Exited(status) = outcome {
            log::info!("{} finished with status {}", current, status);
            self.destroy(current)?;
        }
        Ok(outcome)
    }

    /// Load and run a program, the way a freshly forked thread would
    pub fn execute(&mut self, name: &str) -> Result<RunOutcome> {
        let id = self.spawn(name)?;
        self.init_registers(id)?;
        self.switch_to(id)?;
        self.run()
    }

    /// Tear down an address space, returning the frames it released
    pub fn destroy(&mut self, id: SpaceId) -> Result<Vec<FrameIndex>> {
        let space = self.spaces.remove(&id).ok_or(VmError::UnknownSpace(id))?;
        if self.current == Some(id) {
            self.machine.set_page_table(None, 0);
            self.current = None;
        }
        Ok(space.destroy(&mut self.pager))
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn stats(&self) -> Statistics {
        self.pager.stats
    }

    pub fn frames(&self) -> &FrameTable {
        &self.pager.frames
    }

    pub fn swap(&self) -> &SwapStore {
        &self.pager.swap
    }

    pub fn policy(&self) -> &dyn EvictionPolicy {
        self.pager.policy.as_ref()
    }

    pub fn space(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(&id)
    }

    pub fn spaces(&self) -> impl Iterator<Item = &AddressSpace> {
        self.spaces.values()
    }

    pub fn current(&self) -> Option<SpaceId> {
        self.current
    }

    /// Integers printed by user programs, oldest first
    pub fn console(&self) -> &[i32] {
        &self.console
    }
}
