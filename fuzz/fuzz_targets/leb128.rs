#![no_main]

use dexdbg::leb128::{decode_sleb128, decode_uleb128, encode_sleb128, encode_uleb128};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((value, len)) = decode_uleb128(data) {
        assert!(len <= 5);
        let mut buf = Vec::new();
        encode_uleb128(&mut buf, value);
        assert_eq!(decode_uleb128(&buf).ok(), Some((value, buf.len())));
    }
    if let Ok((value, _)) = decode_sleb128(data) {
        let mut buf = Vec::new();
        encode_sleb128(&mut buf, value);
        assert_eq!(decode_sleb128(&buf).ok(), Some((value, buf.len())));
    }
});
