use serde::{Deserialize, Serialize};

use crate::{dex_err, desc_names::desc_word_size, error::DexError, Result};

pub mod accessor;
pub use accessor::*;
pub mod decoder;
pub use decoder::*;
pub mod encoder;
pub use encoder::*;
pub mod verifier;
pub use verifier::*;

/// Value used for string and type indices that are not present.
pub const NO_INDEX: i32 = -1;

#[rustfmt::skip]
pub mod code {
    pub const DBG_END_SEQUENCE: u8         = 0x00;
    pub const DBG_ADVANCE_PC: u8           = 0x01;
    pub const DBG_ADVANCE_LINE: u8         = 0x02;
    pub const DBG_START_LOCAL: u8          = 0x03;
    pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
    pub const DBG_END_LOCAL: u8            = 0x05;
    pub const DBG_RESTART_LOCAL: u8        = 0x06;
    pub const DBG_SET_PROLOGUE_END: u8     = 0x07;
    pub const DBG_SET_EPILOGUE_BEGIN: u8   = 0x08;
    pub const DBG_SET_FILE: u8             = 0x09;

    pub const DBG_FIRST_SPECIAL: u8        = 0x0a;
    pub const DBG_LINE_BASE: i32           = -4;
    pub const DBG_LINE_RANGE: i32          = 15;

    pub fn name(opcode: u8) -> &'static str {
        match opcode {
            DBG_END_SEQUENCE => "DBG_END_SEQUENCE",
            DBG_ADVANCE_PC => "DBG_ADVANCE_PC",
            DBG_ADVANCE_LINE => "DBG_ADVANCE_LINE",
            DBG_START_LOCAL => "DBG_START_LOCAL",
            DBG_START_LOCAL_EXTENDED => "DBG_START_LOCAL_EXTENDED",
            DBG_END_LOCAL => "DBG_END_LOCAL",
            DBG_RESTART_LOCAL => "DBG_RESTART_LOCAL",
            DBG_SET_PROLOGUE_END => "DBG_SET_PROLOGUE_END",
            DBG_SET_EPILOGUE_BEGIN => "DBG_SET_EPILOGUE_BEGIN",
            DBG_SET_FILE => "DBG_SET_FILE",
            _ => "DBG_SPECIAL",
        }
    }
}

/// Maps a code unit address to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub address: u32,
    pub line: u32,
}

impl PositionEntry {
    pub const fn new(address: u32, line: u32) -> Self {
        Self { address, line }
    }
}

/// One contiguous live range `[start, end)` of a local variable in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntry {
    pub start: u32,
    pub end: u32,
    pub register: u32,
    #[serde(default = "no_index")]
    pub name_index: i32,
    #[serde(default = "no_index")]
    pub type_index: i32,
    #[serde(default = "no_index")]
    pub signature_index: i32,
}

fn no_index() -> i32 {
    NO_INDEX
}

impl LocalEntry {
    /// End address of a range that has not been closed yet.
    pub const OPEN: u32 = u32::MAX;

    pub const fn new(start: u32, end: u32, register: u32, name_index: i32, type_index: i32) -> Self {
        Self {
            start,
            end,
            register,
            name_index,
            type_index,
            signature_index: NO_INDEX,
        }
    }

    pub const fn with_signature(mut self, signature_index: i32) -> Self {
        self.signature_index = signature_index;
        self
    }

    #[inline(always)]
    pub fn is_open(&self) -> bool {
        self.end == Self::OPEN
    }

    #[inline(always)]
    pub fn has_signature(&self) -> bool {
        self.signature_index != NO_INDEX
    }

    /// Name, type and signature are all the same.
    #[inline]
    pub fn same_variable(&self, other: &LocalEntry) -> bool {
        self.name_index == other.name_index
            && self.type_index == other.type_index
            && self.signature_index == other.signature_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterType {
    #[serde(default = "no_index")]
    pub type_index: i32,
    #[serde(default)]
    pub wide: bool,
}

impl ParameterType {
    pub const fn new(type_index: i32, wide: bool) -> Self {
        Self { type_index, wide }
    }

    pub fn from_descriptor(type_index: i32, desc: &str) -> Self {
        Self {
            type_index,
            wide: desc_word_size(desc) == 2,
        }
    }

    #[inline(always)]
    pub fn word_size(&self) -> u32 {
        if self.wide {
            2
        } else {
            1
        }
    }
}

/// What the codec needs to know about the method owning a debug info stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodShape {
    pub is_static: bool,
    pub registers_size: u32,
    #[serde(default)]
    pub parameters: Vec<ParameterType>,
    /// String index used for the implicit `this` local.
    #[serde(default = "no_index")]
    pub this_name_index: i32,
    #[serde(default = "no_index")]
    pub this_type_index: i32,
}

impl MethodShape {
    pub fn new(is_static: bool, registers_size: u32) -> Self {
        Self {
            is_static,
            registers_size,
            parameters: Vec::new(),
            this_name_index: NO_INDEX,
            this_type_index: NO_INDEX,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterType) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_this(mut self, name_index: i32, type_index: i32) -> Self {
        self.this_name_index = name_index;
        self.this_type_index = type_index;
        self
    }

    /// Registers used by the incoming arguments, `this` included.
    pub fn ins_size(&self) -> u32 {
        let words: u32 = self.parameters.iter().map(ParameterType::word_size).sum();
        words + u32::from(!self.is_static)
    }

    /// First register holding `this` or the first parameter.
    pub fn param_base(&self) -> Result<u32> {
        let ins_size = self.ins_size();
        match self.registers_size.checked_sub(ins_size) {
            Some(base) => Ok(base),
            None => dex_err!(InsufficientRegisters {
                ins_size,
                registers_size: self.registers_size
            }),
        }
    }

    pub(crate) fn check_register(&self, register: u32) -> Result<usize> {
        if register >= self.registers_size {
            return dex_err!(InvalidRegister {
                register,
                registers_size: self.registers_size
            });
        }
        Ok(register as usize)
    }
}

/// Complete input of one method's debug info, as the CLI loads it from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDebugInfo {
    pub method: MethodShape,
    pub code_size: u32,
    #[serde(default)]
    pub positions: Vec<PositionEntry>,
    #[serde(default)]
    pub locals: Vec<LocalEntry>,
}

impl MethodDebugInfo {
    pub fn encoder(&self) -> DebugInfoEncoder<'_> {
        DebugInfoEncoder::new(&self.method, self.code_size, &self.positions, &self.locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_base() {
        // void foo(long, int) on an instance: this + 2 + 1
        let method = MethodShape::new(false, 6)
            .with_parameter(ParameterType::from_descriptor(1, "J"))
            .with_parameter(ParameterType::from_descriptor(2, "I"));
        assert_eq!(method.ins_size(), 4);
        assert_eq!(method.param_base().unwrap(), 2);

        let method = MethodShape::new(true, 1).with_parameter(ParameterType::new(0, true));
        assert!(matches!(
            method.param_base(),
            Err(DexError::InsufficientRegisters {
                ins_size: 2,
                registers_size: 1
            })
        ));
    }

    #[test]
    fn test_method_json_defaults() {
        let info: MethodDebugInfo = serde_json::from_str(
            r#"{
                "method": { "is_static": true, "registers_size": 2 },
                "code_size": 4,
                "locals": [ { "start": 0, "end": 4, "register": 0, "name_index": 3 } ]
            }"#,
        )
        .unwrap();
        assert!(info.positions.is_empty());
        assert_eq!(info.locals[0], LocalEntry::new(0, 4, 0, 3, NO_INDEX));
        assert_eq!(info.method.this_name_index, NO_INDEX);
    }
}
