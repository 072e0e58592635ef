use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    dex_err,
    error::DexError,
    file::{Annotation, ByteOutput},
    Result,
};

use super::{
    code, verify_decoded, DebugInfoDecoder, LocalEntry, MethodShape, PositionEntry, NO_INDEX,
};

/// Output of [`DebugInfoEncoder::encode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedDebugInfo {
    pub bytes: Vec<u8>,
    /// Empty unless the encoder was asked to annotate.
    pub annotations: Vec<Annotation>,
}

/// Merges a method's position table and local variable table into a
/// `debug_info_item` byte stream.
#[derive(Debug, Clone)]
pub struct DebugInfoEncoder<'a> {
    method: &'a MethodShape,
    code_size: u32,
    positions: &'a [PositionEntry],
    locals: &'a [LocalEntry],
    annotate: bool,
    validate: bool,
}

impl<'a> DebugInfoEncoder<'a> {
    pub fn new(
        method: &'a MethodShape,
        code_size: u32,
        positions: &'a [PositionEntry],
        locals: &'a [LocalEntry],
    ) -> Self {
        Self {
            method,
            code_size,
            positions,
            locals,
            annotate: false,
            validate: false,
        }
    }

    /// Record a human readable trace next to the bytes.
    pub fn annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Decode the result again and compare it against the input tables.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn encode(&self) -> Result<EncodedDebugInfo> {
        let mut state = EncoderState::new(self)?;
        state.run()?;
        let (bytes, annotations) = state.out.into_parts();

        debug!(
            positions = self.positions.len(),
            locals = self.locals.len(),
            code_size = self.code_size,
            size = bytes.len(),
            "encoded debug info"
        );

        if self.validate {
            let decoded = DebugInfoDecoder::new(&bytes, self.method, self.code_size).decode()?;
            verify_decoded(&decoded, self.positions, self.locals, self.method)?;
        }
        Ok(EncodedDebugInfo { bytes, annotations })
    }
}

// ----------------------------------------------------------------------------
// EncoderState
// ----------------------------------------------------------------------------
struct EncoderState<'a> {
    method: &'a MethodShape,
    code_size: u32,
    locals: &'a [LocalEntry],

    positions: Vec<PositionEntry>,
    // indices into `locals`, ordered by start and by end address
    starts: Vec<usize>,
    ends: Vec<usize>,
    // locals describing `this` and the parameters, ordered by register
    params: Vec<usize>,
    param_base: u32,

    last_entry_for_reg: Vec<Option<usize>>,

    out: ByteOutput,
    line: u32,
    address: u32,
}

impl<'a> EncoderState<'a> {
    fn new(encoder: &DebugInfoEncoder<'a>) -> Result<Self> {
        let method = encoder.method;
        let locals = encoder.locals;
        let param_base = method.param_base()?;

        for local in locals {
            method.check_register(local.register)?;
            if local.end <= local.start {
                return dex_err!(InvalidLocalRange {
                    register: local.register,
                    start: local.start,
                    end: local.end
                });
            }
        }

        let mut positions = encoder.positions.to_vec();
        positions.sort_by_key(|entry| entry.address);

        let mut starts: Vec<usize> = (0..locals.len()).collect();
        starts.sort_by_key(|&idx| locals[idx].start);
        let mut ends = starts.clone();
        ends.sort_by_key(|&idx| locals[idx].end);

        // the earliest local in every register at or above the parameter base
        let mut seen = vec![false; (method.registers_size - param_base) as usize];
        let mut params = Vec::with_capacity(method.parameters.len() + 1);
        for &idx in &starts {
            let register = locals[idx].register;
            if register < param_base || seen[(register - param_base) as usize] {
                continue;
            }
            seen[(register - param_base) as usize] = true;
            params.push(idx);
        }
        params.sort_by_key(|&idx| locals[idx].register);

        Ok(Self {
            method,
            code_size: encoder.code_size,
            locals,
            positions,
            starts,
            ends,
            params,
            param_base,
            last_entry_for_reg: vec![None; method.registers_size as usize],
            out: ByteOutput::with_annotations(encoder.annotate),
            line: 1,
            address: 0,
        })
    }

    fn run(&mut self) -> Result<()> {
        self.emit_header()?;

        let start = self.out.cursor()?;
        self.out.write_u8(code::DBG_SET_PROLOGUE_END);
        self.out
            .annotate_from(start, || "DBG_SET_PROLOGUE_END".to_string())?;

        let mut pos_idx = 0;
        let mut start_idx = 0;
        let mut end_idx = 0;
        loop {
            end_idx = self.emit_local_ends(end_idx, start_idx)?;
            start_idx = self.emit_local_starts(start_idx)?;
            while pos_idx < self.positions.len() && self.positions[pos_idx].address == self.address
            {
                self.emit_position(self.positions[pos_idx])?;
                pos_idx += 1;
            }

            let next_pos = self.positions.get(pos_idx).map(|entry| entry.address);
            let next_start = self.starts.get(start_idx).map(|&idx| self.locals[idx].start);
            let next_end = self.ends.get(end_idx).map(|&idx| self.locals[idx].end);
            let Some(next) = [next_pos, next_start, next_end].into_iter().flatten().min() else {
                break;
            };

            // anything left at the end of the code is implied
            if next_pos.is_none() && next >= self.code_size {
                break;
            }

            if next_pos == Some(next) {
                // the special opcode moves the address register for free
                self.emit_position(self.positions[pos_idx])?;
                pos_idx += 1;
            } else {
                self.emit_advance_pc(next - self.address)?;
            }
        }

        let start = self.out.cursor()?;
        self.out.write_u8(code::DBG_END_SEQUENCE);
        self.out.annotate_from(start, || "DBG_END_SEQUENCE".to_string())?;
        Ok(())
    }

    fn tracked_param(&self, register: u32) -> Option<usize> {
        self.params
            .iter()
            .copied()
            .find(|&idx| self.locals[idx].register == register)
    }

    fn emit_header(&mut self) -> Result<()> {
        if let Some(first) = self.positions.first() {
            self.line = first.line;
        }

        let start = self.out.cursor()?;
        self.out.write_uleb128(self.line);
        let line = self.line;
        self.out.annotate_from(start, || format!("line_start: {line}"))?;

        let mut cur_reg = self.param_base;
        if !self.method.is_static {
            if let Some(idx) = self.tracked_param(cur_reg) {
                self.last_entry_for_reg[cur_reg as usize] = Some(idx);
            }
            cur_reg += 1;
        }

        let parameters_size = self.method.parameters.len() as u32;
        let start = self.out.cursor()?;
        self.out.write_uleb128(parameters_size);
        self.out
            .annotate_from(start, || format!("parameters_size: {parameters_size}"))?;

        for i in 0..self.method.parameters.len() {
            let found = self.tracked_param(cur_reg);
            let name_index = match found {
                // re-emitted in full right after the header
                Some(idx) if self.locals[idx].has_signature() => NO_INDEX,
                Some(idx) => self.locals[idx].name_index,
                None => NO_INDEX,
            };
            if let Some(idx) = found {
                self.last_entry_for_reg[cur_reg as usize] = Some(idx);
            }

            let start = self.out.cursor()?;
            self.out.write_uleb128p1(name_index)?;
            self.out
                .annotate_from(start, || format!("parameter_names[{i}]: string@{name_index}"))?;
            cur_reg += self.method.parameters[i].word_size();
        }

        for register in 0..self.last_entry_for_reg.len() {
            if let Some(idx) = self.last_entry_for_reg[register] {
                if self.locals[idx].has_signature() {
                    self.emit_local_start(idx)?;
                }
            }
        }
        Ok(())
    }

    fn has_start_at(&self, start_idx: usize, address: u32, register: u32) -> bool {
        self.starts[start_idx..]
            .iter()
            .map(|&idx| &self.locals[idx])
            .take_while(|local| local.start == address)
            .any(|local| local.register == register)
    }

    fn emit_local_ends(&mut self, mut end_idx: usize, start_idx: usize) -> Result<usize> {
        let address = self.address;
        while end_idx < self.ends.len() {
            let local = self.locals[self.ends[end_idx]];
            if local.end > address {
                break;
            }
            end_idx += 1;

            if address >= self.code_size {
                continue;
            }
            // a new local in the same register ends this one implicitly
            if self.has_start_at(start_idx, address, local.register) {
                continue;
            }
            self.emit_local_end(local.register)?;
        }
        Ok(end_idx)
    }

    fn emit_local_starts(&mut self, mut start_idx: usize) -> Result<usize> {
        let address = self.address;
        while start_idx < self.starts.len() {
            let idx = self.starts[start_idx];
            let local = self.locals[idx];
            if local.start > address {
                break;
            }
            start_idx += 1;

            if address >= self.code_size {
                continue;
            }

            let register = local.register as usize;
            let prev = self.last_entry_for_reg[register];
            if prev == Some(idx) {
                // parameters are already part of the header
                continue;
            }

            let restart = prev.map(|prev| self.locals[prev]).is_some_and(|prev| {
                prev.end < address && prev.same_variable(&local) && !local.has_signature()
            });
            if restart {
                self.emit_local_restart(local.register)?;
            } else {
                self.emit_local_start(idx)?;
            }
            self.last_entry_for_reg[register] = Some(idx);
        }
        Ok(start_idx)
    }

    fn emit_local_start(&mut self, idx: usize) -> Result<()> {
        let local = self.locals[idx];
        let address = self.address;
        let start = self.out.cursor()?;
        let opcode = if local.has_signature() {
            code::DBG_START_LOCAL_EXTENDED
        } else {
            code::DBG_START_LOCAL
        };

        self.out.write_u8(opcode);
        self.out.write_uleb128(local.register);
        self.out.write_uleb128p1(local.name_index)?;
        self.out.write_uleb128p1(local.type_index)?;
        if local.has_signature() {
            self.out.write_uleb128p1(local.signature_index)?;
        }

        trace!(address, register = local.register, "{}", code::name(opcode));
        self.out.annotate_from(start, || {
            let mut text = format!(
                "{address:04x}: {} v{} name@{} type@{}",
                code::name(opcode),
                local.register,
                local.name_index,
                local.type_index
            );
            if local.has_signature() {
                text.push_str(&format!(" sig@{}", local.signature_index));
            }
            text
        })?;
        Ok(())
    }

    fn emit_local_end(&mut self, register: u32) -> Result<()> {
        self.emit_register_op(code::DBG_END_LOCAL, register)
    }

    fn emit_local_restart(&mut self, register: u32) -> Result<()> {
        self.emit_register_op(code::DBG_RESTART_LOCAL, register)
    }

    fn emit_register_op(&mut self, opcode: u8, register: u32) -> Result<()> {
        let address = self.address;
        let start = self.out.cursor()?;
        self.out.write_u8(opcode);
        self.out.write_uleb128(register);

        trace!(address, register, "{}", code::name(opcode));
        self.out.annotate_from(start, || {
            format!("{address:04x}: {} v{register}", code::name(opcode))
        })
    }

    fn emit_advance_pc(&mut self, delta: u32) -> Result<()> {
        let start = self.out.cursor()?;
        self.out.write_u8(code::DBG_ADVANCE_PC);
        self.out.write_uleb128(delta);
        self.address += delta;

        let address = self.address;
        trace!(address, delta, "DBG_ADVANCE_PC");
        self.out
            .annotate_from(start, || format!("{address:04x}: DBG_ADVANCE_PC {delta}"))
    }

    fn emit_advance_line(&mut self, delta: i64) -> Result<()> {
        let Ok(delta32) = i32::try_from(delta) else {
            return dex_err!(LineOutOfRange {
                line: self.line as i64 + delta,
                address: self.address
            });
        };

        let start = self.out.cursor()?;
        self.out.write_u8(code::DBG_ADVANCE_LINE);
        self.out.write_sleb128(delta32);
        self.line = (self.line as i64 + delta) as u32;

        let (address, line) = (self.address, self.line);
        trace!(address, line, delta, "DBG_ADVANCE_LINE");
        self.out.annotate_from(start, || {
            format!("{address:04x}: DBG_ADVANCE_LINE {delta:+} (line {line})")
        })?;
        Ok(())
    }

    fn emit_position(&mut self, entry: PositionEntry) -> Result<()> {
        let Some(delta_addr) = entry.address.checked_sub(self.address) else {
            return dex_err!(NonMonotonicAddress {
                address: entry.address,
                current: self.address
            });
        };
        let mut delta_addr = delta_addr as i64;
        let mut delta_line = entry.line as i64 - self.line as i64;

        let line_base = code::DBG_LINE_BASE as i64;
        let line_range = code::DBG_LINE_RANGE as i64;
        if delta_line < line_base || delta_line > line_base + line_range - 1 {
            self.emit_advance_line(delta_line)?;
            delta_line = 0;
        }

        let mut opcode = special_opcode(delta_line, delta_addr);
        if opcode > 0xff {
            self.emit_advance_pc(delta_addr as u32)?;
            delta_addr = 0;
            opcode = special_opcode(delta_line, delta_addr);

            if opcode > 0xff {
                self.emit_advance_line(delta_line)?;
                delta_line = 0;
                opcode = special_opcode(delta_line, delta_addr);
            }
        }

        let start = self.out.cursor()?;
        self.out.write_u8(opcode as u8);
        self.address += delta_addr as u32;
        self.line = (self.line as i64 + delta_line) as u32;

        let (address, line) = (self.address, self.line);
        trace!(address, line, opcode, "special opcode");
        self.out.annotate_from(start, || {
            format!("{address:04x}: line {line} (special {opcode:#04x})")
        })?;
        Ok(())
    }
}

#[inline]
fn special_opcode(delta_line: i64, delta_addr: i64) -> i64 {
    (delta_line - code::DBG_LINE_BASE as i64)
        + code::DBG_LINE_RANGE as i64 * delta_addr
        + code::DBG_FIRST_SPECIAL as i64
}
