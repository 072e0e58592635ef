use criterion::{criterion_group, criterion_main, Criterion};
use dexdbg::file::debug::{
    DebugInfoDecoder, DebugInfoEncoder, LocalEntry, MethodShape, ParameterType, PositionEntry,
};

fn sample_method() -> (MethodShape, u32, Vec<PositionEntry>, Vec<LocalEntry>) {
    let method = MethodShape::new(false, 16)
        .with_parameter(ParameterType::new(1, false))
        .with_parameter(ParameterType::new(2, true))
        .with_this(3, 4);
    let code_size = 2000;
    let positions = (0..400)
        .map(|i| PositionEntry::new(i * 5, 10 + (i * 7) % 23))
        .collect();
    let locals = (0..60)
        .map(|i| LocalEntry::new(i * 30, i * 30 + 25, i % 12, i as i32, 5))
        .collect();
    (method, code_size, positions, locals)
}

fn encode_method(c: &mut Criterion) {
    let (method, code_size, positions, locals) = sample_method();
    c.bench_function("encode_method", |b| {
        b.iter(|| {
            let encoded = DebugInfoEncoder::new(&method, code_size, &positions, &locals)
                .encode()
                .unwrap();
            assert!(!encoded.bytes.is_empty());
        })
    });
}

fn decode_method(c: &mut Criterion) {
    let (method, code_size, positions, locals) = sample_method();
    let encoded = DebugInfoEncoder::new(&method, code_size, &positions, &locals)
        .encode()
        .unwrap();
    c.bench_function("decode_method", |b| {
        b.iter(|| {
            let decoded = DebugInfoDecoder::new(&encoded.bytes, &method, code_size)
                .decode()
                .unwrap();
            assert_eq!(decoded.positions.len(), positions.len());
        })
    });
}

criterion_group!(benches, encode_method, decode_method);
criterion_main!(benches);
