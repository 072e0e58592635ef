use serde::{Deserialize, Serialize};

use crate::{dex_err, error::DexError, leb128, Result};

/// A human readable note attached to a byte range of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub offset: u32,
    pub len: u32,
    pub text: String,
}

// ----------------------------------------------------------------------------
// ByteOutput
// ----------------------------------------------------------------------------

/// Growable output buffer with an explicit write cursor. Annotations are only
/// recorded when enabled at construction time.
#[derive(Debug, Default)]
pub struct ByteOutput {
    data: Vec<u8>,
    annotations: Option<Vec<Annotation>>,
}

impl ByteOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotations(annotate: bool) -> Self {
        Self {
            data: Vec::new(),
            annotations: if annotate { Some(Vec::new()) } else { None },
        }
    }

    /// Current write position. Fails once the output outgrows the 32-bit
    /// offsets of the format.
    #[inline(always)]
    pub fn cursor(&self) -> Result<u32> {
        offset_of(self.data.len())
    }

    #[inline(always)]
    pub fn annotates(&self) -> bool {
        self.annotations.is_some()
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.annotations.as_deref().unwrap_or(&[])
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<Annotation>) {
        (self.data, self.annotations.unwrap_or_default())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Records `text` for the bytes written since `start`.
    pub fn annotate_from<F>(&mut self, start: u32, text: F) -> Result<()>
    where
        F: FnOnce() -> String,
    {
        let end = self.cursor()?;
        if let Some(annotations) = &mut self.annotations {
            annotations.push(Annotation {
                offset: start,
                len: end - start,
                text: text(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[inline]
    pub fn write_uleb128(&mut self, value: u32) -> usize {
        leb128::encode_uleb128(&mut self.data, value)
    }

    #[inline]
    pub fn write_sleb128(&mut self, value: i32) -> usize {
        leb128::encode_sleb128(&mut self.data, value)
    }

    #[inline]
    pub fn write_uleb128p1(&mut self, value: i32) -> Result<usize> {
        leb128::encode_uleb128p1(&mut self.data, value)
    }

    pub fn write_zeroes(&mut self, count: u32) {
        self.data.resize(self.data.len() + count as usize, 0);
    }

    /// Pads with zeroes until the cursor is a multiple of `alignment`, which
    /// must be a power of two.
    pub fn align_to(&mut self, alignment: u32) -> Result<()> {
        debug_assert!(alignment.is_power_of_two());
        let mask = alignment - 1;
        let cursor = self.cursor()?;
        let padding = ((cursor + mask) & !mask) - cursor;
        if padding != 0 {
            self.write_zeroes(padding);
            self.annotate_from(cursor, || format!("padding ({padding} bytes)"))?;
        }
        Ok(())
    }
}

pub(crate) fn offset_of(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(offset) => Ok(offset),
        Err(_) => dex_err!(OffsetOverflow {
            offset: u32::MAX,
            size: 0,
            section: "output",
        }),
    }
}
