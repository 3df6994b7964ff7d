use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// An opened executable image
pub trait OpenFile {
    /// Copy up to `buf.len()` bytes starting at `offset`; returns the count copied
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of executable images
pub trait FileSystem {
    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>>;
}

/// Image contents held in memory once opened
#[derive(Debug, Clone)]
pub struct ImageFile {
    bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        ImageFile { bytes }
    }
}

impl OpenFile for ImageFile {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        if offset >= self.bytes.len() {
            return 0;
        }
        let count = buf.len().min(self.bytes.len() - offset);
        buf[..count].copy_from_slice(&self.bytes[offset..offset + count]);
        count
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Reads images from a directory on the host
#[derive(Debug, Clone)]
pub struct HostFileSystem {
    root: PathBuf,
}

impl HostFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostFileSystem { root: root.into() }
    }
}

impl FileSystem for HostFileSystem {
    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>> {
        let path = self.root.join(name);
        match fs::read(&path) {
            Ok(bytes) => Some(Box::new(ImageFile::new(bytes))),
            Err(e) => {
                log::debug!("open {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// In-memory file system, keyed by image name
#[derive(Debug, Clone, Default)]
pub struct MemFileSystem {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl FileSystem for MemFileSystem {
    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>> {
        self.files
            .get(name)
            .map(|bytes| Box::new(ImageFile::new(bytes.clone())) as Box<dyn OpenFile>)
    }
}
