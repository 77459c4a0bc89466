//! Human-readable dumps of rows and frame structs, for trace logs and
//! invariant-violation reports.

use std::fmt::Write;

use super::layout::{FrameLayout, FrameStruct};
use super::row::{FrameRow, RowTable};

pub fn dump_rows(rows: &RowTable) -> String {
    let mut out = String::new();
    for (id, row) in rows.iter() {
        let _ = writeln!(out, "row {}: {}", id.0, describe_row(row));
    }
    out
}

fn describe_row(row: &FrameRow) -> String {
    let mut out = format!(
        "{} {} size {} align {}",
        if row.is_stack_alloc { "buffer" } else { "value" },
        row.def,
        row.size,
        row.align
    );
    match row.offset() {
        Some(offset) => {
            let _ = write!(out, " offset {offset}");
        }
        None => out.push_str(" offset <flexible>"),
    }
    let suspends: Vec<String> = row.resides_in.iter().map(|s| s.0.to_string()).collect();
    let _ = write!(out, " resides in [{}]", suspends.join(", "));
    if row.force_spill_on_suspend {
        out.push_str(" +spill-on-suspend");
    }
    if row.force_reload_on_resume {
        out.push_str(" +reload-on-resume");
    }
    out
}

pub fn dump_struct(st: &FrameStruct, rows: &RowTable) -> String {
    let mut out = format!(
        "suspend {} ({} -> {}): {} bytes, align {}\n",
        st.suspend.0, st.suspend_block, st.resume_block, st.size, st.align
    );
    for (idx, field) in st.fields.iter().enumerate() {
        let row = rows.get(field.row);
        let usage = if !st.crosses(row.def) {
            "unused".to_string()
        } else if let Some(uses) = st.candidates.values.get(&row.def) {
            format!("crossing uses: {}", uses.len())
        } else {
            let aliases = st
                .candidates
                .allocas
                .iter()
                .find(|alloca| alloca.alloca == row.def)
                .map_or(0, |alloca| alloca.aliases.len());
            format!("aliases: {aliases}")
        };
        let _ = writeln!(
            out,
            "  field {idx}: row {} {} [{}, {}) align {} -- {usage}",
            field.row.0,
            row.def,
            field.offset,
            field.end(),
            field.align
        );
    }
    out
}

pub fn dump_layout(layout: &FrameLayout) -> String {
    let mut out = format!(
        "frame: {} bytes, align {}\n",
        layout.max_size, layout.max_align
    );
    out.push_str(&dump_rows(&layout.rows));
    for st in &layout.structs {
        out.push_str(&dump_struct(st, &layout.rows));
    }
    out
}

/// One character per 4 bytes of the struct: `+` when a row crossing the
/// suspend covers it, `_` otherwise, with a `|` every 32 bytes. For example
/// `[++__|+] (8 unused bytes)`.
pub fn occupancy(st: &FrameStruct, rows: &RowTable) -> String {
    let used: Vec<(u64, u64)> = st
        .fields
        .iter()
        .filter(|field| st.crosses(rows.get(field.row).def))
        .map(|field| (field.offset, field.end()))
        .collect();

    let mut out = String::from("[");
    let mut slot = 0;
    while slot < st.size {
        if slot != 0 && slot % 32 == 0 {
            out.push('|');
        }
        let covered = used
            .iter()
            .any(|&(start, end)| start < slot + 4 && slot < end);
        out.push(if covered { '+' } else { '_' });
        slot += 4;
    }

    let used_bytes: u64 = used.iter().map(|(start, end)| end - start).sum();
    let _ = write!(out, "] ({} unused bytes)", st.size - used_bytes);
    out
}

/// Bytes of resident rows that do not cross the suspend, as
/// `(buffers, values)`.
pub fn unused_bytes(st: &FrameStruct, rows: &RowTable) -> (u64, u64) {
    let mut buffers = 0;
    let mut values = 0;
    for (_, row) in rows.iter() {
        if !row.resides_in.contains(&st.suspend) || st.crosses(row.def) {
            continue;
        }
        if row.is_stack_alloc {
            buffers += row.size;
        } else {
            values += row.size;
        }
    }
    (buffers, values)
}

#[cfg(test)]
#[path = "../tests/contstate/t_dump.rs"]
mod tests;
