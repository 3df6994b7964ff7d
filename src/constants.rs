/// Size of one page, one frame and one swap block, in bytes
pub const PAGE_SIZE: usize = 128;

/// Default number of physical frames in the simulated machine
pub const NUM_PHYS_PAGES: usize = 128;
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;

/// Fixed stack region appended after the three segments of an image
pub const USER_STACK_SIZE: usize = 1024;

pub const NOFF_MAGIC: u32 = 0x00ba_dfad;
pub const NOFF_HEADER_SIZE: usize = 40;

pub const INSTRUCTION_SIZE: i32 = 4;
// Keeps the initial stack pointer off the last byte of the address space.
pub const STACK_GUARD: usize = 16;

// Register file layout
pub const NUM_GP_REGS: usize = 32;
pub const SYSCALL_CODE_REG: usize = 2;
pub const ARG1_REG: usize = 4;
pub const STACK_REG: usize = 29;
pub const RET_ADDR_REG: usize = 31;
pub const PC_REG: usize = 34;
pub const NEXT_PC_REG: usize = 35;
pub const PREV_PC_REG: usize = 36;
pub const BAD_VADDR_REG: usize = 39;
pub const NUM_TOTAL_REGS: usize = 40;

// System call codes
pub const SC_HALT: i32 = 0;
pub const SC_EXIT: i32 = 1;
pub const SC_PRINT_INT: i32 = 11;
