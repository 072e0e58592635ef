use tracing::trace;

use crate::{dex_err, error::DexError, Result};

use super::ByteOutput;

/// Payload of a [`Section`]. The section takes care of placement, the content
/// only knows its own bytes.
pub trait SectionContent {
    /// Size in bytes that [`SectionContent::write_to`] will produce.
    fn write_size(&self) -> u32;

    /// Called once before the section is written.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_to(&self, out: &mut ByteOutput) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Unplaced,
    Placed(u32),
    Written(u32),
}

// ----------------------------------------------------------------------------
// Section
// ----------------------------------------------------------------------------
#[derive(Debug)]
pub struct Section<C> {
    name: &'static str,
    alignment: u32,
    placement: Placement,
    prepared: bool,
    content: C,
}

impl<C: SectionContent> Section<C> {
    pub fn new(name: &'static str, alignment: u32, content: C) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return dex_err!(BadSectionAlignment {
                alignment,
                section: name
            });
        }
        Ok(Self {
            name,
            alignment,
            placement: Placement::Unplaced,
            prepared: false,
            content,
        })
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline(always)]
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    #[inline(always)]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn file_offset(&self) -> Option<u32> {
        match self.placement {
            Placement::Unplaced => None,
            Placement::Placed(offset) | Placement::Written(offset) => Some(offset),
        }
    }

    #[inline(always)]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut C {
        &mut self.content
    }

    pub fn write_size(&self) -> u32 {
        self.content.write_size()
    }

    /// Rounds `requested` up to the alignment and freezes it as the file
    /// offset of this section.
    pub fn set_offset(&mut self, requested: u32) -> Result<u32> {
        if self.placement != Placement::Unplaced {
            return dex_err!(SectionLifecycle {
                section: self.name,
                reason: "file offset already set",
            });
        }

        let mask = self.alignment - 1;
        let assigned = match requested.checked_add(mask) {
            Some(end) => end & !mask,
            None => {
                return dex_err!(OffsetOverflow {
                    offset: requested,
                    size: mask,
                    section: self.name,
                })
            }
        };
        trace!(section = self.name, requested, assigned, "placed section");
        self.placement = Placement::Placed(assigned);
        Ok(assigned)
    }

    /// Converts an offset relative to the start of this section into a file
    /// offset.
    pub fn absolute_offset(&self, relative: u32) -> Result<u32> {
        let Some(offset) = self.file_offset() else {
            return dex_err!(SectionLifecycle {
                section: self.name,
                reason: "file offset not yet set",
            });
        };
        match offset.checked_add(relative) {
            Some(absolute) => Ok(absolute),
            None => dex_err!(OffsetOverflow {
                offset,
                size: relative,
                section: self.name,
            }),
        }
    }

    pub fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return dex_err!(SectionLifecycle {
                section: self.name,
                reason: "already prepared",
            });
        }
        self.content.prepare()?;
        self.prepared = true;
        Ok(())
    }

    /// Aligns `out` and writes the content at the cursor. A section that was
    /// never placed adopts the aligned cursor as its offset.
    pub fn write(&mut self, out: &mut ByteOutput) -> Result<()> {
        if !self.prepared {
            return dex_err!(SectionLifecycle {
                section: self.name,
                reason: "not prepared",
            });
        }

        out.align_to(self.alignment)?;
        let cursor = out.cursor()?;
        let offset = match self.placement {
            Placement::Unplaced => cursor,
            Placement::Placed(offset) if offset == cursor => offset,
            Placement::Placed(offset) => {
                return dex_err!(SectionOffsetMismatch {
                    section: self.name,
                    expected: offset,
                    actual: cursor,
                })
            }
            Placement::Written(_) => {
                return dex_err!(SectionLifecycle {
                    section: self.name,
                    reason: "already written",
                })
            }
        };

        let expected = self.write_size();
        self.content.write_to(out)?;
        let actual = out.cursor()? - cursor;
        if actual != expected {
            return dex_err!(SectionSizeMismatch {
                section: self.name,
                expected,
                actual,
            });
        }

        self.placement = Placement::Written(offset);
        Ok(())
    }
}

/// Object safe view on a [`Section`], used by [`super::DexLayout`] to drive
/// sections with different payloads in one pass.
pub trait DexSection {
    fn name(&self) -> &'static str;

    fn write_size(&self) -> u32;

    fn set_offset(&mut self, requested: u32) -> Result<u32>;

    fn prepare(&mut self) -> Result<()>;

    fn write(&mut self, out: &mut ByteOutput) -> Result<()>;
}

impl<C: SectionContent> DexSection for Section<C> {
    fn name(&self) -> &'static str {
        Section::name(self)
    }

    fn write_size(&self) -> u32 {
        Section::write_size(self)
    }

    fn set_offset(&mut self, requested: u32) -> Result<u32> {
        Section::set_offset(self, requested)
    }

    fn prepare(&mut self) -> Result<()> {
        Section::prepare(self)
    }

    fn write(&mut self, out: &mut ByteOutput) -> Result<()> {
        Section::write(self, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob(Vec<u8>);

    impl SectionContent for Blob {
        fn write_size(&self) -> u32 {
            self.0.len() as u32
        }

        fn write_to(&self, out: &mut ByteOutput) -> Result<()> {
            out.write_bytes(&self.0);
            Ok(())
        }
    }

    /// Claims one byte more than it writes.
    struct Liar;

    impl SectionContent for Liar {
        fn write_size(&self) -> u32 {
            2
        }

        fn write_to(&self, out: &mut ByteOutput) -> Result<()> {
            out.write_u8(0xff);
            Ok(())
        }
    }

    #[test]
    fn test_bad_alignment() {
        assert!(matches!(
            Section::new("blob", 3, Blob(vec![])),
            Err(DexError::BadSectionAlignment { alignment: 3, .. })
        ));
        assert!(Section::new("blob", 0, Blob(vec![])).is_err());
    }

    #[test]
    fn test_set_offset_rounds_up() {
        for alignment in [1, 2, 4, 8, 4096] {
            for requested in [0, 1, 3, 4, 5, 0x70, 0x1001] {
                let mut section = Section::new("blob", alignment, Blob(vec![])).unwrap();
                let assigned = section.set_offset(requested).unwrap();
                assert!(assigned >= requested);
                assert!(assigned <= requested + alignment - 1);
                assert_eq!(assigned % alignment, 0);
                assert_eq!(section.file_offset(), Some(assigned));
            }
        }
    }

    #[test]
    fn test_set_offset_twice() {
        let mut section = Section::new("blob", 4, Blob(vec![])).unwrap();
        assert_eq!(section.set_offset(5).unwrap(), 8);
        assert!(matches!(
            section.set_offset(8),
            Err(DexError::SectionLifecycle { .. })
        ));
        assert_eq!(section.file_offset(), Some(8));
    }

    #[test]
    fn test_set_offset_overflow() {
        let mut section = Section::new("blob", 16, Blob(vec![])).unwrap();
        assert!(matches!(
            section.set_offset(u32::MAX - 2),
            Err(DexError::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn test_absolute_offset_requires_placement() {
        let mut section = Section::new("blob", 4, Blob(vec![])).unwrap();
        assert!(matches!(
            section.absolute_offset(0),
            Err(DexError::SectionLifecycle { .. })
        ));
        section.set_offset(0x70).unwrap();
        assert_eq!(section.absolute_offset(0x10).unwrap(), 0x80);
    }

    #[test]
    fn test_prepare_twice() {
        let mut section = Section::new("blob", 1, Blob(vec![])).unwrap();
        section.prepare().unwrap();
        assert!(section.prepare().is_err());
    }

    #[test]
    fn test_write_at_placed_offset() {
        let mut section = Section::new("blob", 4, Blob(vec![1, 2, 3])).unwrap();
        section.set_offset(1).unwrap();
        section.prepare().unwrap();

        let mut out = ByteOutput::new();
        out.write_u8(0xaa);
        section.write(&mut out).unwrap();
        assert_eq!(out.data(), [0xaa, 0, 0, 0, 1, 2, 3]);
        assert_eq!(section.placement(), Placement::Written(4));

        assert!(matches!(
            section.write(&mut out),
            Err(DexError::SectionLifecycle { .. })
        ));
    }

    #[test]
    fn test_write_adopts_cursor() {
        let mut section = Section::new("blob", 2, Blob(vec![7])).unwrap();
        section.prepare().unwrap();

        let mut out = ByteOutput::new();
        out.write_bytes(&[0; 3]);
        section.write(&mut out).unwrap();
        assert_eq!(section.file_offset(), Some(4));
        assert_eq!(out.data(), [0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_write_cursor_mismatch() {
        let mut section = Section::new("blob", 1, Blob(vec![7])).unwrap();
        section.set_offset(2).unwrap();
        section.prepare().unwrap();

        let mut out = ByteOutput::new();
        assert!(matches!(
            section.write(&mut out),
            Err(DexError::SectionOffsetMismatch {
                expected: 2,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_write_requires_prepare() {
        let mut section = Section::new("blob", 1, Blob(vec![7])).unwrap();
        let mut out = ByteOutput::new();
        assert!(section.write(&mut out).is_err());
    }

    #[test]
    fn test_write_size_mismatch() {
        let mut section = Section::new("liar", 1, Liar).unwrap();
        section.prepare().unwrap();
        let mut out = ByteOutput::new();
        assert!(matches!(
            section.write(&mut out),
            Err(DexError::SectionSizeMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }
}
