pub mod addrspace;
pub mod config;
pub mod constants;
pub mod error;
pub mod exception;
pub mod fs;
pub mod io;
pub mod kernel;
pub mod machine;
pub mod memory;
pub mod noff;
pub mod page_table;
pub mod pager;
pub mod replacement;
pub mod stats;
pub mod swap;
pub mod translation;

// Re-export commonly used items for convenience
pub use addrspace::AddressSpace;
pub use config::VmConfig;
pub use constants::*;
pub use error::{Result, VmError};
pub use kernel::Kernel;
pub use machine::{Access, Machine, RunOutcome, SimMachine};
pub use page_table::{Location, PageRef, SpaceId};
pub use replacement::{EvictionPolicy, PolicyKind};
pub use stats::Statistics;
