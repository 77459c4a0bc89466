//! Exhaustive layout checks, run in debug builds or when verification is
//! requested. Each returns a message describing the first violation.

use super::gaps::GapTracker;
use super::layout::{FrameField, FrameLayout, FrameStruct};
use super::row::RowTable;

/// Fields of one struct are sorted, aligned, disjoint, match their rows and
/// end at the struct size.
pub fn check_struct(rows: &RowTable, st: &FrameStruct) -> Result<(), String> {
    let suspend = st.suspend.0;
    let mut prev: Option<&FrameField> = None;
    for field in &st.fields {
        let row = rows.get(field.row);
        if row.offset() != Some(field.offset) {
            return Err(format!(
                "suspend {suspend}: field of {} at {} but row is at {:?}",
                row.def,
                field.offset,
                row.offset()
            ));
        }
        if !row.resides_in.contains(&st.suspend) {
            return Err(format!(
                "suspend {suspend}: {} is a field but does not reside here",
                row.def
            ));
        }
        if field.offset % field.align != 0 {
            return Err(format!(
                "suspend {suspend}: {} at {} is not aligned to {}",
                row.def, field.offset, field.align
            ));
        }
        if let Some(prev) = prev
            && prev.end() > field.offset
        {
            return Err(format!(
                "suspend {suspend}: {} overlaps {}",
                rows.get(prev.row).def,
                row.def
            ));
        }
        prev = Some(field);
    }

    let end = st.fields.last().map_or(0, FrameField::end);
    if end != st.size {
        return Err(format!(
            "suspend {suspend}: size {} but last field ends at {end}",
            st.size
        ));
    }
    Ok(())
}

/// Gaps are sorted, disjoint and free of fields.
pub fn check_gaps(gaps: &GapTracker, fields: &[FrameField]) -> Result<(), String> {
    let mut cursor = 0;
    for gap in gaps.gaps() {
        if gap.size == 0 {
            return Err(format!("empty gap at {}", gap.offset));
        }
        if gap.offset < cursor {
            return Err(format!("gap at {} overlaps the previous gap", gap.offset));
        }
        cursor = gap.end();
        if let Some(field) = fields
            .iter()
            .find(|field| field.offset < gap.end() && gap.offset < field.end())
        {
            return Err(format!(
                "gap [{}, {}) overlaps field at {}",
                gap.offset,
                gap.end(),
                field.offset
            ));
        }
    }
    Ok(())
}

/// Every resident row is placed and the frame covers every struct.
pub fn check_layout(layout: &FrameLayout) -> Result<(), String> {
    for (_, row) in layout.rows.iter() {
        if !row.resides_in.is_empty() && row.is_flexible() {
            return Err(format!("{} resides in a frame but was never placed", row.def));
        }
        if let Some(end) = row.end()
            && end > layout.max_size
        {
            return Err(format!(
                "{} ends at {end}, past the frame size {}",
                row.def, layout.max_size
            ));
        }
    }
    for st in &layout.structs {
        if st.size > layout.max_size || st.align > layout.max_align {
            return Err(format!(
                "suspend {} needs {} bytes align {}, frame has {} align {}",
                st.suspend.0, st.size, st.align, layout.max_size, layout.max_align
            ));
        }
    }
    Ok(())
}
