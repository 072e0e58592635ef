use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use tracing::debug;

use crate::{dex_err, error::DexError, Result};

use super::{output::offset_of, ByteOutput, DexSection, SectionContent};

static NEXT_SECTION_ID: AtomicU32 = AtomicU32::new(0);

/// Handle to an item stored in a [`DebugInfoSection`]. Only valid for the
/// section that handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugInfoRef {
    section: u32,
    index: usize,
}

// ----------------------------------------------------------------------------
// DebugInfoSection
// ----------------------------------------------------------------------------

/// Section payload holding the debug info streams of many methods back to
/// back. Identical streams are stored once.
#[derive(Debug)]
pub struct DebugInfoSection {
    id: u32,
    data: Vec<u8>,
    offsets: Vec<u32>,
    interned: HashMap<Vec<u8>, DebugInfoRef>,
    frozen: bool,
}

impl Default for DebugInfoSection {
    fn default() -> Self {
        Self {
            id: NEXT_SECTION_ID.fetch_add(1, Ordering::Relaxed),
            data: Vec::new(),
            offsets: Vec::new(),
            interned: HashMap::new(),
            frozen: false,
        }
    }
}

impl DebugInfoSection {
    /// Items are byte streams and need no alignment of their own.
    pub const ALIGNMENT: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: &[u8]) -> Result<DebugInfoRef> {
        if self.frozen {
            return dex_err!(SectionLifecycle {
                section: "debug_info",
                reason: "items added after prepare",
            });
        }
        if let Some(existing) = self.interned.get(item) {
            return Ok(*existing);
        }

        let offset = offset_of(self.data.len())?;
        let fits = u32::try_from(item.len())
            .ok()
            .and_then(|size| offset.checked_add(size));
        if fits.is_none() {
            return dex_err!(OffsetOverflow {
                offset,
                size: u32::try_from(item.len()).unwrap_or(u32::MAX),
                section: "debug_info",
            });
        }

        let item_ref = DebugInfoRef {
            section: self.id,
            index: self.offsets.len(),
        };
        self.data.extend_from_slice(item);
        self.offsets.push(offset);
        self.interned.insert(item.to_vec(), item_ref);
        Ok(item_ref)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn check_ref(&self, item: DebugInfoRef) -> Result<usize> {
        if item.section != self.id || item.index >= self.offsets.len() {
            return dex_err!(ForeignSectionItem {
                index: item.index,
                section: "debug_info",
            });
        }
        Ok(item.index)
    }

    /// Offset of the item relative to the start of the section.
    pub fn item_offset(&self, item: DebugInfoRef) -> Result<u32> {
        let index = self.check_ref(item)?;
        Ok(self.offsets[index])
    }

    pub fn item_data(&self, item: DebugInfoRef) -> Result<&[u8]> {
        let index = self.check_ref(item)?;
        Ok(self.data_at(index))
    }

    fn data_at(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.data.len(), |end| *end as usize);
        &self.data[start..end]
    }
}

impl SectionContent for DebugInfoSection {
    fn write_size(&self) -> u32 {
        self.data.len() as u32
    }

    fn prepare(&mut self) -> Result<()> {
        self.frozen = true;
        self.interned = HashMap::new();
        debug!(items = self.len(), size = self.data.len(), "prepared debug info section");
        Ok(())
    }

    fn write_to(&self, out: &mut ByteOutput) -> Result<()> {
        for (idx, offset) in self.offsets.iter().enumerate() {
            let start = out.cursor()?;
            out.write_bytes(self.data_at(idx));
            out.annotate_from(start, || format!("debug_info_item[{idx}] +{offset:#x}"))?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// DexLayout
// ----------------------------------------------------------------------------

/// Places and writes a fixed sequence of sections. Every section starts at
/// the first offset past its predecessor that satisfies its own alignment.
#[derive(Default)]
pub struct DexLayout<'s> {
    sections: Vec<&'s mut dyn DexSection>,
}

impl<'s> DexLayout<'s> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, section: &'s mut dyn DexSection) -> &mut Self {
        self.sections.push(section);
        self
    }

    /// Prepares all sections, assigns offsets starting at the cursor of `out`
    /// and writes them. Returns the end offset.
    pub fn write(&mut self, out: &mut ByteOutput) -> Result<u32> {
        for section in self.sections.iter_mut() {
            section.prepare()?;
        }

        let mut offset = out.cursor()?;
        for section in self.sections.iter_mut() {
            let placed = section.set_offset(offset)?;
            let size = section.write_size();
            offset = match placed.checked_add(size) {
                Some(end) => end,
                None => {
                    return dex_err!(OffsetOverflow {
                        offset: placed,
                        size,
                        section: section.name(),
                    })
                }
            };
            debug!(section = section.name(), offset = placed, size, "laid out section");
        }

        for section in self.sections.iter_mut() {
            section.write(out)?;
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Section;

    #[test]
    fn test_add_deduplicates() {
        let mut section = DebugInfoSection::new();
        let a = section.add(&[1, 0, 7, 0]).unwrap();
        let b = section.add(&[2, 0, 7, 0x0e, 0]).unwrap();
        let c = section.add(&[1, 0, 7, 0]).unwrap();

        assert_eq!(a, c);
        assert_eq!(section.len(), 2);
        assert_eq!(section.item_offset(a).unwrap(), 0);
        assert_eq!(section.item_offset(b).unwrap(), 4);
        assert_eq!(section.item_data(b).unwrap(), [2, 0, 7, 0x0e, 0]);
        assert_eq!(section.write_size(), 9);
    }

    #[test]
    fn test_ref_from_other_section() {
        let mut first = DebugInfoSection::new();
        let mut second = DebugInfoSection::new();
        first.add(&[1, 0, 7, 0]).unwrap();
        let foreign = second.add(&[2, 0, 7, 0]).unwrap();

        // same index, different owner
        assert!(matches!(
            first.item_offset(foreign),
            Err(DexError::ForeignSectionItem { index: 0, .. })
        ));
        assert!(first.item_data(foreign).is_err());
        assert_eq!(second.item_data(foreign).unwrap(), [2, 0, 7, 0]);
    }

    #[test]
    fn test_add_after_prepare() {
        let mut section = DebugInfoSection::new();
        section.add(&[1, 0, 7, 0]).unwrap();
        section.prepare().unwrap();
        assert!(matches!(
            section.add(&[1, 0, 7, 0]),
            Err(DexError::SectionLifecycle { .. })
        ));
    }

    #[test]
    fn test_layout_places_sections_in_order() {
        let mut first = DebugInfoSection::new();
        first.add(&[1, 2, 3]).unwrap();
        let mut second = DebugInfoSection::new();
        let item = second.add(&[4, 5]).unwrap();

        let mut first = Section::new("first", 1, first).unwrap();
        let mut second = Section::new("second", 4, second).unwrap();

        let mut out = ByteOutput::new();
        out.write_u8(0xff);
        let end = {
            let mut layout = DexLayout::new();
            layout.add(&mut first).add(&mut second);
            layout.write(&mut out).unwrap()
        };

        assert_eq!(first.file_offset(), Some(1));
        assert_eq!(second.file_offset(), Some(4));
        assert_eq!(end, 6);
        assert_eq!(second.absolute_offset(second.content().item_offset(item).unwrap()).unwrap(), 4);
        assert_eq!(out.data(), [0xff, 1, 2, 3, 4, 5]);
    }
}
