use std::{fs::File, ops::Deref, path::Path};

use memmap2::Mmap;

use crate::{dex_err, error::DexError, Result};

use super::debug::DebugInfoAccessor;

/// Anything that can hand out the raw bytes of a debug info stream.
pub trait DebugInfoContainer: AsRef<[u8]> + Deref<Target = [u8]> {
    fn data(&self) -> &[u8] {
        self.as_ref()
    }

    fn file_size(&self) -> usize {
        self.data().len()
    }
}

impl DebugInfoContainer for Mmap {}

impl DebugInfoContainer for Vec<u8> {}

pub struct InMemoryContainer<'a>(&'a [u8]);

impl<'a> InMemoryContainer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(data)
    }
}

impl Deref for InMemoryContainer<'_> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl AsRef<[u8]> for InMemoryContainer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

impl DebugInfoContainer for InMemoryContainer<'_> {}

/// A file holding one or more debug info streams, e.g. a raw dump or a whole
/// dex file.
pub struct DebugInfoFile<C: DebugInfoContainer = Mmap> {
    container: C,
    location: String,
}

impl DebugInfoFile<Mmap> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the mapping is read-only and the file is not modified by us
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            container: mmap,
            location: path.as_ref().display().to_string(),
        })
    }
}

impl<C: DebugInfoContainer> DebugInfoFile<C> {
    pub fn from_container(container: C, location: &str) -> Self {
        Self {
            container,
            location: location.to_string(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn file_size(&self) -> usize {
        self.container.file_size()
    }

    /// Accessor for the stream starting at `offset`.
    pub fn debug_info_at(&self, offset: u32) -> Result<DebugInfoAccessor<'_>> {
        let data = self.container.data();
        if offset as usize >= data.len() {
            return dex_err!(TruncatedStream {
                offset: offset as usize
            });
        }
        Ok(DebugInfoAccessor::new(&data[offset as usize..]))
    }
}
