use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    dex_err,
    error::DexError,
    leb128::{decode_sleb128_off, decode_uleb128_off, decode_uleb128p1_off},
    Result,
};

use super::{code, LocalEntry, MethodShape, PositionEntry, NO_INDEX};

/// Tables recovered from a debug info stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecodedDebugInfo {
    pub line_start: u32,
    /// String index per declared parameter, `-1` if unnamed.
    pub parameter_names: Vec<i32>,
    pub positions: Vec<PositionEntry>,
    /// In the order the locals were introduced, parameters first.
    pub locals: Vec<LocalEntry>,
}

/// Reads the fixed part of the stream: the initial line and the number of
/// parameter names that follow.
pub(crate) fn decode_header_off(data: &[u8], pos: &mut usize) -> Result<(u32, u32)> {
    let line_start = decode_uleb128_off(data, pos)?;
    let parameters_size = decode_uleb128_off(data, pos)?;
    Ok((line_start, parameters_size))
}

/// Interprets a `debug_info_item` stream against the method it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct DebugInfoDecoder<'a> {
    data: &'a [u8],
    method: &'a MethodShape,
    code_size: u32,
}

impl<'a> DebugInfoDecoder<'a> {
    pub fn new(data: &'a [u8], method: &'a MethodShape, code_size: u32) -> Self {
        Self {
            data,
            method,
            code_size,
        }
    }

    pub fn decode(&self) -> Result<DecodedDebugInfo> {
        let mut state = DecoderState {
            data: self.data,
            method: self.method,
            pos: 0,
            address: 0,
            line: 0,
            positions: Vec::new(),
            locals: Vec::new(),
            last_entry_for_reg: vec![None; self.method.registers_size as usize],
        };

        let (line_start, parameter_names) = state.decode_header()?;
        state.decode_opcodes()?;

        let code_size = self.code_size;
        let locals: Vec<LocalEntry> = state
            .locals
            .into_iter()
            .flatten()
            .map(|mut local| {
                if local.is_open() {
                    local.end = code_size;
                }
                local
            })
            .collect();

        debug!(
            size = state.pos,
            positions = state.positions.len(),
            locals = locals.len(),
            "decoded debug info"
        );
        Ok(DecodedDebugInfo {
            line_start,
            parameter_names,
            positions: state.positions,
            locals,
        })
    }
}

// ----------------------------------------------------------------------------
// DecoderState
// ----------------------------------------------------------------------------
struct DecoderState<'a> {
    data: &'a [u8],
    method: &'a MethodShape,
    pos: usize,

    address: u32,
    line: i64,

    positions: Vec<PositionEntry>,
    // discarded entries leave a hole so indices stay stable
    locals: Vec<Option<LocalEntry>>,
    last_entry_for_reg: Vec<Option<usize>>,
}

impl DecoderState<'_> {
    #[inline]
    fn read_uleb128(&mut self) -> Result<u32> {
        decode_uleb128_off(self.data, &mut self.pos)
    }

    #[inline]
    fn read_uleb128p1(&mut self) -> Result<i32> {
        decode_uleb128p1_off(self.data, &mut self.pos)
    }

    #[inline]
    fn read_register(&mut self) -> Result<usize> {
        let register = self.read_uleb128()?;
        self.method.check_register(register)
    }

    fn push_local(&mut self, local: LocalEntry) {
        self.last_entry_for_reg[local.register as usize] = Some(self.locals.len());
        self.locals.push(Some(local));
    }

    fn decode_header(&mut self) -> Result<(u32, Vec<i32>)> {
        let (line_start, parameters_size) = decode_header_off(self.data, &mut self.pos)?;
        let expected = self.method.parameters.len() as u32;
        if parameters_size != expected {
            return dex_err!(ParameterCountMismatch {
                actual: parameters_size,
                expected
            });
        }
        self.line = line_start as i64;

        let method = self.method;
        let mut cur_reg = method.param_base()?;
        if !method.is_static {
            self.push_local(LocalEntry::new(
                0,
                LocalEntry::OPEN,
                cur_reg,
                method.this_name_index,
                method.this_type_index,
            ));
            cur_reg += 1;
        }

        let mut parameter_names = Vec::with_capacity(method.parameters.len());
        for parameter in &method.parameters {
            let name_index = self.read_uleb128p1()?;
            parameter_names.push(name_index);
            self.push_local(LocalEntry::new(
                0,
                LocalEntry::OPEN,
                cur_reg,
                name_index,
                parameter.type_index,
            ));
            cur_reg += parameter.word_size();
        }
        Ok((line_start, parameter_names))
    }

    fn decode_opcodes(&mut self) -> Result<()> {
        loop {
            let offset = self.pos;
            let Some(&opcode) = self.data.get(offset) else {
                return dex_err!(TruncatedStream { offset });
            };
            self.pos += 1;

            match opcode {
                code::DBG_END_SEQUENCE => break,
                code::DBG_ADVANCE_PC => {
                    let delta = self.read_uleb128()?;
                    self.address = match self.address.checked_add(delta) {
                        Some(address) => address,
                        None => return dex_err!(AddressOverflow { offset }),
                    };
                    trace!(address = self.address, "DBG_ADVANCE_PC");
                }
                code::DBG_ADVANCE_LINE => {
                    let delta = decode_sleb128_off(self.data, &mut self.pos)?;
                    self.line += delta as i64;
                    trace!(line = self.line, "DBG_ADVANCE_LINE");
                }
                code::DBG_START_LOCAL | code::DBG_START_LOCAL_EXTENDED => {
                    let extended = opcode == code::DBG_START_LOCAL_EXTENDED;
                    let register = self.read_register()?;
                    let name_index = self.read_uleb128p1()?;
                    let type_index = self.read_uleb128p1()?;
                    let signature_index = if extended {
                        self.read_uleb128p1()?
                    } else {
                        NO_INDEX
                    };
                    let local = LocalEntry::new(
                        self.address,
                        LocalEntry::OPEN,
                        register as u32,
                        name_index,
                        type_index,
                    )
                    .with_signature(signature_index);
                    self.start_local(register, local, extended);
                }
                code::DBG_RESTART_LOCAL => self.restart_local()?,
                code::DBG_END_LOCAL => self.end_local()?,
                code::DBG_SET_PROLOGUE_END | code::DBG_SET_EPILOGUE_BEGIN => {}
                code::DBG_SET_FILE => {
                    self.read_uleb128p1()?;
                }
                _ if opcode < code::DBG_FIRST_SPECIAL => {
                    return dex_err!(InvalidOpcode { opcode, offset });
                }
                _ => self.special(opcode, offset)?,
            }
        }
        Ok(())
    }

    fn start_local(&mut self, register: usize, local: LocalEntry, extended: bool) {
        if let Some(prev_idx) = self.last_entry_for_reg[register] {
            let address = self.address;
            let discard = match &mut self.locals[prev_idx] {
                // usually an implicit `this` declared again with a signature
                Some(prev) if prev.is_open() && extended && prev.start == address => true,
                Some(prev) if prev.is_open() => {
                    prev.end = address;
                    false
                }
                _ => false,
            };
            if discard {
                self.locals[prev_idx] = None;
            }
        }
        trace!(address = self.address, register, "start local");
        self.push_local(local);
    }

    fn restart_local(&mut self) -> Result<()> {
        let register = self.read_register()?;
        let address = self.address;
        let prev = self.last_entry_for_reg[register].and_then(|idx| self.locals[idx]);
        let Some(prev) = prev else {
            return dex_err!(RestartOnUnknownRegister {
                register: register as u32,
                address
            });
        };
        if prev.is_open() {
            return dex_err!(RestartOnLiveRegister {
                register: register as u32,
                address
            });
        }

        trace!(address, register, "restart local");
        self.push_local(LocalEntry::new(
            address,
            LocalEntry::OPEN,
            register as u32,
            prev.name_index,
            prev.type_index,
        ));
        Ok(())
    }

    fn end_local(&mut self) -> Result<()> {
        let register = self.read_register()? as u32;
        let address = self.address;
        let latest = self
            .locals
            .iter_mut()
            .rev()
            .flatten()
            .find(|local| local.register == register);

        match latest {
            Some(local) if local.is_open() => {
                trace!(address, register, "end local");
                local.end = address;
                Ok(())
            }
            _ => dex_err!(NoMatchingLocalStart { register, address }),
        }
    }

    fn special(&mut self, opcode: u8, offset: usize) -> Result<()> {
        let adjusted = (opcode - code::DBG_FIRST_SPECIAL) as i32;
        let address_delta = (adjusted / code::DBG_LINE_RANGE) as u32;
        self.address = match self.address.checked_add(address_delta) {
            Some(address) => address,
            None => return dex_err!(AddressOverflow { offset }),
        };
        self.line += (code::DBG_LINE_BASE + adjusted % code::DBG_LINE_RANGE) as i64;

        let Ok(line) = u32::try_from(self.line) else {
            return dex_err!(LineOutOfRange {
                line: self.line,
                address: self.address
            });
        };
        trace!(address = self.address, line, "position");
        self.positions.push(PositionEntry::new(self.address, line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::debug::{code::*, ParameterType};

    fn decode(data: &[u8], method: &MethodShape, code_size: u32) -> Result<DecodedDebugInfo> {
        DebugInfoDecoder::new(data, method, code_size).decode()
    }

    #[test]
    fn test_end_to_end_example() {
        let method = MethodShape::new(true, 1);
        let data = [
            1,
            0,
            DBG_SET_PROLOGUE_END,
            DBG_START_LOCAL,
            0,
            6,
            3,
            0x0e,
            0x0f + 60,
            0x0f + 60,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 10).unwrap();
        assert_eq!(decoded.line_start, 1);
        assert_eq!(
            decoded.positions,
            [
                PositionEntry::new(0, 1),
                PositionEntry::new(4, 2),
                PositionEntry::new(8, 3)
            ]
        );
        assert_eq!(decoded.locals, [LocalEntry::new(0, 10, 0, 5, 2)]);
    }

    #[test]
    fn test_truncated_before_end_sequence() {
        let method = MethodShape::new(true, 1);
        let data = [1, 0, DBG_SET_PROLOGUE_END, 0x0e, 0x0e];
        assert!(matches!(
            decode(&data, &method, 4),
            Err(DexError::TruncatedStream { offset: 5 })
        ));
        assert!(matches!(
            decode(&[], &method, 4),
            Err(DexError::TruncatedStream { offset: 0 })
        ));
    }

    #[test]
    fn test_parameters_and_this() {
        // instance method with (int, long, Object)
        let method = MethodShape::new(false, 8)
            .with_parameter(ParameterType::new(1, false))
            .with_parameter(ParameterType::new(2, true))
            .with_parameter(ParameterType::new(3, false))
            .with_this(9, 4);
        let data = [7, 3, 11, 0, 13, DBG_END_SEQUENCE];
        let decoded = decode(&data, &method, 12).unwrap();

        assert_eq!(decoded.parameter_names, [10, -1, 12]);
        assert_eq!(
            decoded.locals,
            [
                LocalEntry::new(0, 12, 3, 9, 4),
                LocalEntry::new(0, 12, 4, 10, 1),
                LocalEntry::new(0, 12, 5, NO_INDEX, 2),
                LocalEntry::new(0, 12, 7, 12, 3),
            ]
        );
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let method = MethodShape::new(true, 2).with_parameter(ParameterType::new(1, false));
        assert!(matches!(
            decode(&[1, 2, 0, 0, DBG_END_SEQUENCE], &method, 4),
            Err(DexError::ParameterCountMismatch {
                actual: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn test_extended_start_replaces_implicit_this() {
        let method = MethodShape::new(false, 1).with_this(9, 4);
        let data = [
            1,
            0,
            DBG_START_LOCAL_EXTENDED,
            0,
            10,
            5,
            31,
            DBG_SET_PROLOGUE_END,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 6).unwrap();
        assert_eq!(
            decoded.locals,
            [LocalEntry::new(0, 6, 0, 9, 4).with_signature(30)]
        );
    }

    #[test]
    fn test_start_closes_previous() {
        let method = MethodShape::new(true, 1);
        let data = [
            1,
            0,
            DBG_START_LOCAL,
            0,
            1,
            1,
            DBG_ADVANCE_PC,
            3,
            DBG_START_LOCAL,
            0,
            2,
            2,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 5).unwrap();
        assert_eq!(
            decoded.locals,
            [LocalEntry::new(0, 3, 0, 0, 0), LocalEntry::new(3, 5, 0, 1, 1)]
        );
    }

    #[test]
    fn test_restart_local() {
        let method = MethodShape::new(true, 1);
        let data = [
            1,
            0,
            DBG_START_LOCAL_EXTENDED,
            0,
            1,
            1,
            8,
            DBG_ADVANCE_PC,
            2,
            DBG_END_LOCAL,
            0,
            DBG_ADVANCE_PC,
            2,
            DBG_RESTART_LOCAL,
            0,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 6).unwrap();
        // the signature does not survive a restart
        assert_eq!(
            decoded.locals,
            [
                LocalEntry::new(0, 2, 0, 0, 0).with_signature(7),
                LocalEntry::new(4, 6, 0, 0, 0)
            ]
        );
    }

    #[test]
    fn test_restart_faults() {
        let method = MethodShape::new(true, 2);
        assert!(matches!(
            decode(&[1, 0, DBG_RESTART_LOCAL, 1, DBG_END_SEQUENCE], &method, 4),
            Err(DexError::RestartOnUnknownRegister { register: 1, .. })
        ));
        assert!(matches!(
            decode(
                &[1, 0, DBG_START_LOCAL, 1, 1, 1, DBG_RESTART_LOCAL, 1, DBG_END_SEQUENCE],
                &method,
                4
            ),
            Err(DexError::RestartOnLiveRegister { register: 1, .. })
        ));
    }

    #[test]
    fn test_end_local_without_start() {
        let method = MethodShape::new(true, 2);
        assert!(matches!(
            decode(&[1, 0, DBG_END_LOCAL, 0, DBG_END_SEQUENCE], &method, 4),
            Err(DexError::NoMatchingLocalStart { register: 0, .. })
        ));
        assert!(matches!(
            decode(
                &[1, 0, DBG_START_LOCAL, 0, 1, 1, DBG_END_LOCAL, 0, DBG_END_LOCAL, 0, DBG_END_SEQUENCE],
                &method,
                4
            ),
            Err(DexError::NoMatchingLocalStart { register: 0, .. })
        ));
    }

    #[test]
    fn test_register_out_of_frame() {
        let method = MethodShape::new(true, 2);
        assert!(matches!(
            decode(&[1, 0, DBG_START_LOCAL, 2, 1, 1, DBG_END_SEQUENCE], &method, 4),
            Err(DexError::InvalidRegister {
                register: 2,
                registers_size: 2
            })
        ));
    }

    #[test]
    fn test_metadata_opcodes_are_ignored() {
        let method = MethodShape::new(true, 0);
        let data = [
            5,
            0,
            DBG_SET_PROLOGUE_END,
            DBG_SET_FILE,
            4,
            DBG_SET_EPILOGUE_BEGIN,
            0x0e,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 2).unwrap();
        assert_eq!(decoded.positions, [PositionEntry::new(0, 5)]);
        assert!(decoded.locals.is_empty());
    }

    #[test]
    fn test_advance_line_and_pc() {
        let method = MethodShape::new(true, 0);
        // -5 doesn't fit a special opcode
        let data = [
            10,
            0,
            DBG_ADVANCE_LINE,
            0x7b,
            DBG_ADVANCE_PC,
            0x80,
            0x02,
            0x0e,
            DBG_END_SEQUENCE,
        ];
        let decoded = decode(&data, &method, 300).unwrap();
        assert_eq!(decoded.positions, [PositionEntry::new(256, 5)]);
    }

    #[test]
    fn test_line_underflow() {
        let method = MethodShape::new(true, 0);
        // line 1 + (-4)
        let data = [1, 0, 0x0a, DBG_END_SEQUENCE];
        assert!(matches!(
            decode(&data, &method, 2),
            Err(DexError::LineOutOfRange { line: -3, .. })
        ));
    }

    #[test]
    fn test_malformed_operand() {
        let method = MethodShape::new(true, 0);
        let data = [1, 0, DBG_ADVANCE_PC, 0x80, 0x80];
        assert!(matches!(
            decode(&data, &method, 2),
            Err(DexError::MalformedVarint { offset: 3 })
        ));
    }
}
