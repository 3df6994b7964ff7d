use std::fmt;

/// Paging counters; they only ever increase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub page_faults: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Paging: faults {}\nDisk I/O: reads {}, writes {}",
            self.page_faults, self.disk_reads, self.disk_writes
        )
    }
}
