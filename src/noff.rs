//! Segment header of an executable image.
//!
//! The header is a fixed 40 byte record: the magic word followed by the
//! code, initialized-data and uninitialized-data descriptors, each three
//! 32-bit words. Images may be written in either byte order; the loader
//! accepts whichever interpretation yields the expected magic.

use nom::IResult;
use nom::number::Endianness;
use nom::number::complete::u32 as word_of;

use crate::constants::{NOFF_HEADER_SIZE, NOFF_MAGIC};
use crate::error::{Result, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub size: u32,
    pub virtual_address: u32,
    /// Ignored for uninitialized data, which is zero-filled
    pub file_offset: u32,
}

impl Segment {
    /// One past the last virtual byte this segment occupies
    pub fn end(&self) -> u64 {
        u64::from(self.virtual_address) + u64::from(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoffHeader {
    pub magic: u32,
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

fn word(endian: Endianness, input: &[u8]) -> IResult<&[u8], u32> {
    word_of(endian)(input)
}

fn segment(endian: Endianness, input: &[u8]) -> IResult<&[u8], Segment> {
    let (input, size) = word(endian, input)?;
    let (input, virtual_address) = word(endian, input)?;
    let (input, file_offset) = word(endian, input)?;
    Ok((
        input,
        Segment {
            size,
            virtual_address,
            file_offset,
        },
    ))
}

fn header(endian: Endianness, input: &[u8]) -> IResult<&[u8], NoffHeader> {
    let (input, magic) = word(endian, input)?;
    let (input, code) = segment(endian, input)?;
    let (input, init_data) = segment(endian, input)?;
    let (input, uninit_data) = segment(endian, input)?;
    Ok((
        input,
        NoffHeader {
            magic,
            code,
            init_data,
            uninit_data,
        },
    ))
}

impl NoffHeader {
    /// Parse a header, falling back to the byte-swapped reading when the
    /// magic does not match directly.
    pub fn parse(bytes: &[u8]) -> Result<NoffHeader> {
        if bytes.len() < NOFF_HEADER_SIZE {
            return Err(VmError::MalformedImage(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                NOFF_HEADER_SIZE
            )));
        }

        let mut seen = NOFF_MAGIC;
        for endian in [Endianness::Little, Endianness::Big] {
            let (_, parsed) = header(endian, bytes)
                .map_err(|e| VmError::MalformedImage(format!("unreadable header: {e}")))?;
            if parsed.magic == NOFF_MAGIC {
                if endian == Endianness::Big {
                    log::debug!("image header is byte-swapped");
                }
                return Ok(parsed);
            }
            seen = parsed.magic;
        }

        Err(VmError::MalformedImage(format!(
            "bad magic {:#010x}, expected {:#010x}",
            seen.swap_bytes(),
            NOFF_MAGIC
        )))
    }

    /// Bytes needed by the three segments plus a stack of `stack_size`
    pub fn memory_size(&self, stack_size: usize) -> usize {
        self.code.size as usize
            + self.init_data.size as usize
            + self.uninit_data.size as usize
            + stack_size
    }

    pub fn to_bytes(&self, endian: Endianness) -> Vec<u8> {
        let words = [
            self.magic,
            self.code.size,
            self.code.virtual_address,
            self.code.file_offset,
            self.init_data.size,
            self.init_data.virtual_address,
            self.init_data.file_offset,
            self.uninit_data.size,
            self.uninit_data.virtual_address,
            self.uninit_data.file_offset,
        ];
        let mut out = Vec::with_capacity(NOFF_HEADER_SIZE);
        for w in words {
            match endian {
                Endianness::Big => out.extend_from_slice(&w.to_be_bytes()),
                _ => out.extend_from_slice(&w.to_le_bytes()),
            }
        }
        out
    }
}

/// Assembles a complete image: header, then code, then initialized data.
///
/// Segments are laid out back to back in the virtual address space starting
/// at zero, code first.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    code: Vec<u8>,
    init_data: Vec<u8>,
    uninit_size: u32,
    endian: Endianness,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        ImageBuilder {
            code: Vec::new(),
            init_data: Vec::new(),
            uninit_size: 0,
            endian: Endianness::Little,
        }
    }

    pub fn code(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.code = code.into();
        self
    }

    pub fn init_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.init_data = data.into();
        self
    }

    pub fn uninit_data(mut self, size: u32) -> Self {
        self.uninit_size = size;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endianness::Big;
        self
    }

    pub fn header(&self) -> NoffHeader {
        let code_size = self.code.len() as u32;
        let data_size = self.init_data.len() as u32;
        let header_size = NOFF_HEADER_SIZE as u32;
        NoffHeader {
            magic: NOFF_MAGIC,
            code: Segment {
                size: code_size,
                virtual_address: 0,
                file_offset: header_size,
            },
            init_data: Segment {
                size: data_size,
                virtual_address: code_size,
                file_offset: header_size + code_size,
            },
            uninit_data: Segment {
                size: self.uninit_size,
                virtual_address: code_size + data_size,
                file_offset: 0,
            },
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = self.header().to_bytes(self.endian);
        image.extend_from_slice(&self.code);
        image.extend_from_slice(&self.init_data);
        image
    }
}
