use std::fs;
use std::path::Path;

use crate::error::{Result, VmError};
use crate::machine::Access;

/// Parse a reference trace.
///
/// Tokens are whitespace separated: a bare number is a read of that virtual
/// address, `w<addr>=<byte>` is a write. Addresses may be decimal or `0x` hex.
pub fn parse_trace(content: &str) -> Result<Vec<Access>> {
    content.split_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> Result<Access> {
    let invalid = || VmError::Trace(format!("Invalid trace token: {}", token));

    match token.strip_prefix('w') {
        Some(write) => {
            let (addr, value) = write.split_once('=').ok_or_else(invalid)?;
            let va = parse_address(addr).ok_or_else(invalid)?;
            let value: u8 = value.parse().map_err(|_| invalid())?;
            Ok(Access::Write(va, value))
        }
        None => parse_address(token).map(Access::Read).ok_or_else(invalid),
    }
}

fn parse_address(s: &str) -> Option<u32> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<Vec<Access>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_trace(&content)
}

/// Write one physical address per completed reference, space separated
pub fn write_results<P: AsRef<Path>>(path: P, addresses: &[usize]) -> Result<()> {
    let output: Vec<String> = addresses.iter().map(|pa| pa.to_string()).collect();
    fs::write(path.as_ref(), output.join(" "))?;
    Ok(())
}
