use std::fmt::Debug;

use thiserror::Error;

#[derive(Error)]
pub enum DexError {
    #[error("Malformed LEB128 value at offset {offset}")]
    MalformedVarint { offset: usize },

    #[error("Debug info stream ended at offset {offset} without DBG_END_SEQUENCE")]
    TruncatedStream { offset: usize },

    #[error("Invalid debug info opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("DBG_END_LOCAL for v{register} at address {address:#x} has no live local to end")]
    NoMatchingLocalStart { register: u32, address: u32 },

    #[error("Nonsensical DBG_RESTART_LOCAL on live register v{register} at address {address:#x}")]
    RestartOnLiveRegister { register: u32, address: u32 },

    #[error("DBG_RESTART_LOCAL on new register v{register} at address {address:#x}")]
    RestartOnUnknownRegister { register: u32, address: u32 },

    #[error("Mismatch between parameters_size({actual}) and prototype({expected})")]
    ParameterCountMismatch { actual: u32, expected: u32 },

    #[error("Position address {address:#x} is before the current address {current:#x}")]
    NonMonotonicAddress { address: u32, current: u32 },

    #[error("Debug info validation failed: {0}")]
    ValidationMismatch(String),

    #[error("Register v{register} is outside of the method frame (registers_size={registers_size})")]
    InvalidRegister { register: u32, registers_size: u32 },

    #[error("Local in v{register} has an empty or inverted range {start:#x}..{end:#x}")]
    InvalidLocalRange { register: u32, start: u32, end: u32 },

    #[error("Parameters need {ins_size} registers but the method only has {registers_size}")]
    InsufficientRegisters { ins_size: u32, registers_size: u32 },

    #[error("Index {value} can't be encoded as ULEB128p1")]
    NegativeIndex { value: i32 },

    #[error("Line register left the valid range ({line}) at address {address:#x}")]
    LineOutOfRange { line: i64, address: u32 },

    #[error("Address register overflowed at stream offset {offset}")]
    AddressOverflow { offset: usize },

    #[error("Alignment {alignment} of section {section} is not a power of two")]
    BadSectionAlignment { alignment: u32, section: &'static str },

    #[error("Section {section}: {reason}")]
    SectionLifecycle {
        section: &'static str,
        reason: &'static str,
    },

    #[error("Section {section} was placed at {expected:#x} but the writer is at {actual:#x}")]
    SectionOffsetMismatch {
        section: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Section {section} wrote {actual} bytes, expected {expected}")]
    SectionSizeMismatch {
        section: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("Item #{index} does not belong to section {section}")]
    ForeignSectionItem { index: usize, section: &'static str },

    #[error("Offset {offset:#x} + {size:#x} overflows the file for {section}")]
    OffsetOverflow {
        offset: u32,
        size: u32,
        section: &'static str,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err(DexError::$name)
    };
    ($name:ident, $arg1:literal, $($arg:tt)*) => {
        Err(DexError::$name(format!($arg1, $($arg)*)))
    };
    ($name:ident { $($arg:tt)* }) => {
        Err(DexError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err(DexError::$name($($arg)*))
    };
}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
