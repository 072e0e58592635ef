use comfy_table::{presets, CellAlignment, ContentArrangement, Table};

use super::{
    debug::{DecodedDebugInfo, LocalEntry, PositionEntry, NO_INDEX},
    Annotation,
};

fn new_table(columns: &[(&str, CellAlignment)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(|(name, _)| *name));

    let last = columns.len().saturating_sub(1);
    for (i, (_, align)) in columns.iter().enumerate() {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(*align);
            col.set_padding((if i == 0 { 0 } else { 1 }, if i == last { 0 } else { 1 }));
        }
    }
    table
}

fn index_cell(index: i32) -> String {
    if index == NO_INDEX {
        "-".to_string()
    } else {
        index.to_string()
    }
}

pub fn positions_table(positions: &[PositionEntry]) -> Table {
    let mut table = new_table(&[
        ("address", CellAlignment::Right),
        ("line", CellAlignment::Right),
    ]);
    for entry in positions {
        table.add_row(vec![format!("{:#06x}", entry.address), entry.line.to_string()]);
    }
    table
}

pub fn locals_table(locals: &[LocalEntry]) -> Table {
    let mut table = new_table(&[
        ("reg", CellAlignment::Right),
        ("start", CellAlignment::Right),
        ("end", CellAlignment::Right),
        ("name", CellAlignment::Right),
        ("type", CellAlignment::Right),
        ("signature", CellAlignment::Right),
    ]);
    for local in locals {
        let end = if local.is_open() {
            "open".to_string()
        } else {
            format!("{:#06x}", local.end)
        };
        table.add_row(vec![
            format!("v{}", local.register),
            format!("{:#06x}", local.start),
            end,
            index_cell(local.name_index),
            index_cell(local.type_index),
            index_cell(local.signature_index),
        ]);
    }
    table
}

/// Hex dump of `data` next to the annotation covering each range.
pub fn annotations_table(data: &[u8], annotations: &[Annotation]) -> Table {
    let mut table = new_table(&[
        ("offset", CellAlignment::Right),
        ("bytes", CellAlignment::Left),
        ("", CellAlignment::Left),
    ]);
    for annotation in annotations {
        let start = annotation.offset as usize;
        let end = (start + annotation.len as usize).min(data.len());
        let bytes = data
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        table.add_row(vec![
            format!("{:#06x}", annotation.offset),
            bytes,
            annotation.text.clone(),
        ]);
    }
    table
}

pub fn decoded_summary(decoded: &DecodedDebugInfo) -> String {
    let names = decoded
        .parameter_names
        .iter()
        .map(|idx| index_cell(*idx))
        .collect::<Vec<_>>()
        .join(", ");
    format!("line_start: {}\nparameters: [{names}]", decoded.line_start)
}
