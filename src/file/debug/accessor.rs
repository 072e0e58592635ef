use crate::{leb128::decode_uleb128p1_off, Result};

use super::{decoder::decode_header_off, DebugInfoDecoder, DecodedDebugInfo, MethodShape};

/// Lightweight view on a raw `debug_info_item`.
#[derive(Debug, Clone, Copy)]
pub struct DebugInfoAccessor<'a> {
    ptr: &'a [u8],
}

impl<'a> DebugInfoAccessor<'a> {
    pub fn new(ptr: &'a [u8]) -> Self {
        Self { ptr }
    }

    pub fn data(&self) -> &'a [u8] {
        self.ptr
    }

    pub fn line_start(&self) -> Result<u32> {
        let mut offset = 0;
        let (line, _) = decode_header_off(self.ptr, &mut offset)?;
        Ok(line)
    }

    pub fn parameters_size(&self) -> Result<u32> {
        let mut offset = 0;
        let (_, size) = decode_header_off(self.ptr, &mut offset)?;
        Ok(size)
    }

    /// Initial line and the name index of every parameter.
    pub fn header(&self) -> Result<(u32, Vec<i32>)> {
        let line_start = self.line_start()?;
        let names = self.parameter_names()?.collect::<Result<_>>()?;
        Ok((line_start, names))
    }

    pub fn parameter_names(&self) -> Result<DebugInfoParameterNamesIterator<'a>> {
        DebugInfoParameterNamesIterator::new(self.ptr)
    }

    pub fn visit_parameter_names<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(i32),
    {
        for name_index in self.parameter_names()? {
            visitor(name_index?);
        }
        Ok(())
    }

    pub fn decode(&self, method: &MethodShape, code_size: u32) -> Result<DecodedDebugInfo> {
        DebugInfoDecoder::new(self.ptr, method, code_size).decode()
    }
}

/// Yields the string index of every parameter name, `-1` for unnamed ones.
pub struct DebugInfoParameterNamesIterator<'a> {
    ptr: &'a [u8],
    offset: usize,
    idx: u32,
    size: u32,
}

impl<'a> DebugInfoParameterNamesIterator<'a> {
    pub fn new(ptr: &'a [u8]) -> Result<Self> {
        let mut offset = 0;
        let (_, size) = decode_header_off(ptr, &mut offset)?;
        Ok(Self {
            ptr,
            offset,
            idx: 0,
            size,
        })
    }
}

impl Iterator for DebugInfoParameterNamesIterator<'_> {
    type Item = Result<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.size {
            return None;
        }
        self.idx += 1;
        let item = decode_uleb128p1_off(self.ptr, &mut self.offset);
        if item.is_err() {
            // nothing sensible follows a broken entry
            self.idx = self.size;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((self.size - self.idx) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::debug::code::DBG_END_SEQUENCE;

    #[test]
    fn test_header() {
        let data = [0x90, 0x01, 3, 5, 0, 9, DBG_END_SEQUENCE];
        let accessor = DebugInfoAccessor::new(&data);
        assert_eq!(accessor.line_start().unwrap(), 144);
        assert_eq!(accessor.parameters_size().unwrap(), 3);

        let names: Vec<i32> = accessor
            .parameter_names()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names, [4, -1, 8]);

        let mut visited = Vec::new();
        accessor
            .visit_parameter_names(|idx| visited.push(idx))
            .unwrap();
        assert_eq!(visited, names);
        assert_eq!(accessor.header().unwrap(), (144, names));
    }

    #[test]
    fn test_truncated_names() {
        let data = [1, 3, 5, 0x80];
        let names: Vec<Result<i32>> = DebugInfoAccessor::new(&data)
            .parameter_names()
            .unwrap()
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].is_ok());
        assert!(names[1].is_err());
    }
}
