#![no_main]

use dexdbg::file::debug::{DebugInfoDecoder, MethodShape, ParameterType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let registers_size = u32::from(data[0] % 16) + 2;
    let method = MethodShape::new(data[1] & 1 == 0, registers_size)
        .with_parameter(ParameterType::new(0, data[1] & 2 != 0));
    if let Ok(decoded) = DebugInfoDecoder::new(&data[2..], &method, 0x400).decode() {
        for local in &decoded.locals {
            assert!(local.register < registers_size);
            assert!(!local.is_open());
        }
    }
});
