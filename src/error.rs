use thiserror::Error;

use crate::machine::ExceptionType;
use crate::page_table::SpaceId;

/// Everything that can go wrong while loading images or servicing traps
#[derive(Debug, Error)]
pub enum VmError {
    #[error("unable to open executable image `{0}`")]
    ImageNotFound(String),

    #[error("malformed executable image: {0}")]
    MalformedImage(String),

    /// A page fault arrived with nothing resident to evict
    #[error("page fault on virtual page {vpn} with an empty eviction set")]
    EvictionSetEmpty { vpn: usize },

    #[error("unexpected page fault on virtual page {vpn}: {reason}")]
    UnexpectedFault { vpn: usize, reason: &'static str },

    #[error("unexpected user mode exception {0:?}")]
    UnexpectedException(ExceptionType),

    #[error("no address space with id {0}")]
    UnknownSpace(SpaceId),

    #[error("no address space is installed on the machine")]
    NoActiveSpace,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid trace token `{0}`")]
    Trace(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VmError>;
