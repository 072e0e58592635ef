use dexdbg::file::debug::{
    DebugInfoAccessor, LocalEntry, MethodDebugInfo, MethodShape, ParameterType, PositionEntry,
};
use dexdbg::file::dump::{annotations_table, locals_table, positions_table};
use dexdbg::Result;

fn main() -> Result<()> {
    // instance method `void put(String key, long value)` with 6 registers,
    // so `this` lives in v2, `key` in v3 and `value` in v4/v5
    let method = MethodShape::new(false, 6)
        .with_parameter(ParameterType::from_descriptor(11, "Ljava/lang/String;"))
        .with_parameter(ParameterType::from_descriptor(12, "J"))
        .with_this(30, 10);

    let info = MethodDebugInfo {
        method,
        code_size: 24,
        positions: vec![
            PositionEntry::new(0, 42),
            PositionEntry::new(3, 43),
            PositionEntry::new(10, 45),
            PositionEntry::new(20, 47),
        ],
        locals: vec![
            LocalEntry::new(0, 24, 2, 30, 10),
            LocalEntry::new(0, 24, 3, 31, 11),
            LocalEntry::new(0, 24, 4, 32, 12),
            // a temporary that is only live in the middle of the method
            LocalEntry::new(3, 20, 0, 33, 13),
        ],
    };

    // annotate to get a human readable trace of every emitted byte,
    // validate to decode the stream again and compare it to the input
    let encoded = info.encoder().annotate(true).validate(true).encode()?;
    println!("{}", annotations_table(&encoded.bytes, &encoded.annotations));

    // the header can be inspected without running the state machine
    let accessor = DebugInfoAccessor::new(&encoded.bytes);
    let (line_start, names) = accessor.header()?;
    println!("\nline_start: {line_start}, parameter names: {names:?}");

    let decoded = accessor.decode(&info.method, info.code_size)?;
    println!("\n{}", positions_table(&decoded.positions));
    println!("\n{}", locals_table(&decoded.locals));
    Ok(())
}
