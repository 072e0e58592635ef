use std::{fs, path::Path};

use anyhow::Context;
use dexdbg::file::{
    debug::MethodDebugInfo,
    dump::{annotations_table, decoded_summary, locals_table, positions_table},
    ByteOutput, DebugInfoFile, DebugInfoSection, DexLayout, Section,
};
use tracing::info;

fn load_method(path: &Path) -> anyhow::Result<MethodDebugInfo> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid method description {}", path.display()))
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn encode(method: &Path, output: Option<&Path>, annotate: bool, validate: bool) -> anyhow::Result<()> {
    let info = load_method(method)?;
    let encoded = info
        .encoder()
        .annotate(annotate)
        .validate(validate)
        .encode()
        .with_context(|| format!("failed to encode {}", method.display()))?;

    match output {
        Some(path) => {
            fs::write(path, &encoded.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(size = encoded.bytes.len(), "wrote {}", path.display());
        }
        None if !annotate => println!("{}", hex(&encoded.bytes)),
        None => {}
    }
    if annotate {
        println!("{}", annotations_table(&encoded.bytes, &encoded.annotations));
    }
    Ok(())
}

pub fn decode(stream: &Path, method: &Path, offset: u32, json: bool) -> anyhow::Result<()> {
    let info = load_method(method)?;
    let file = DebugInfoFile::open(stream)
        .with_context(|| format!("failed to open {}", stream.display()))?;
    let decoded = file
        .debug_info_at(offset)?
        .decode(&info.method, info.code_size)
        .with_context(|| format!("failed to decode {}+{offset:#x}", file.location()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decoded)?);
        return Ok(());
    }
    println!("{}", decoded_summary(&decoded));
    println!("\npositions:\n{}", positions_table(&decoded.positions));
    println!("\nlocals:\n{}", locals_table(&decoded.locals));
    Ok(())
}

pub fn layout(methods: &[std::path::PathBuf], base: u32, alignment: u32, output: Option<&Path>) -> anyhow::Result<()> {
    let mut content = DebugInfoSection::new();
    let mut items = Vec::with_capacity(methods.len());
    for path in methods {
        let info = load_method(path)?;
        let encoded = info
            .encoder()
            .validate(true)
            .encode()
            .with_context(|| format!("failed to encode {}", path.display()))?;
        items.push((path, content.add(&encoded.bytes)?));
    }

    let mut section = Section::new("debug_info", alignment, content)?;
    let mut out = ByteOutput::new();
    out.write_zeroes(base);
    let end = DexLayout::new().add(&mut section).write(&mut out)?;

    for (path, item) in &items {
        let offset = section.absolute_offset(section.content().item_offset(*item)?)?;
        println!("{offset:#010x}  {}", path.display());
    }
    info!(end, items = section.content().len(), "laid out debug info section");

    if let Some(path) = output {
        fs::write(path, out.data()).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
