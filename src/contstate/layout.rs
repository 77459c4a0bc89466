//! Frame layout: one struct per suspend point, packed greedily into a single
//! byte array shared by every suspend.
//!
//! Rows are first collected for all suspends so residency is complete before
//! any offset is fixed. Structs are then laid out in suspend order. A row is
//! placed once, by the first struct it resides in, and registered as a field
//! of every struct it resides in; later structs see it as a fixed field and
//! only place their flexible rows around it.
//!
//! With eviction a struct holds only the rows crossing its suspend, so holes
//! between fixed fields become gaps that flexible rows may fill first-fit.
//! Without eviction rows are never dropped from later frames and new rows are
//! always appended.

use super::check;
use super::config::BuilderMode;
use super::conflict::{ConflictChecker, compute_interference};
use super::dump;
use super::error::FrameBuildError;
use super::gaps::{Gap, GapTracker};
use super::row::{RowId, RowTable};
use crate::analysis::{StackLifetime, SuspendCandidates};
use crate::ir::{BlockId, DefTable, IrTypeCache, SuspendId, SuspendPoint, ValueId, align_to};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameField {
    pub row: RowId,
    pub offset: u64,
    pub size: u64,
    pub align: u64,
}

impl FrameField {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// The frame as seen from one suspend point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStruct {
    pub suspend: SuspendId,
    pub suspend_block: BlockId,
    pub resume_block: BlockId,
    pub fields: Vec<FrameField>,
    pub size: u64,
    pub align: u64,
    pub candidates: SuspendCandidates,
}

impl FrameStruct {
    pub fn new(point: &SuspendPoint, candidates: SuspendCandidates) -> Self {
        Self {
            suspend: point.id,
            suspend_block: point.block,
            resume_block: point.resume,
            fields: Vec::new(),
            size: 0,
            align: 1,
            candidates,
        }
    }

    pub fn add_field(&mut self, field: FrameField) {
        self.size = self.size.max(field.end());
        self.align = self.align.max(field.align);
        self.fields.push(field);
    }

    pub fn sort_fields(&mut self) {
        self.fields.sort_by_key(|field| (field.offset, field.row));
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.fields.iter().any(|field| field.row == row)
    }

    /// `def` is live across this suspend, as opposed to merely resident.
    pub fn crosses(&self, def: ValueId) -> bool {
        self.candidates.values.contains_key(&def)
            || self.candidates.allocas.iter().any(|alloca| alloca.alloca == def)
    }
}

/// The finished layout: every row placed, one struct per suspend.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    pub rows: RowTable,
    pub structs: Vec<FrameStruct>,
    pub max_size: u64,
    pub max_align: u64,
}

impl FrameLayout {
    pub fn struct_for(&self, suspend: SuspendId) -> Option<&FrameStruct> {
        self.structs.iter().find(|st| st.suspend == suspend)
    }

    pub fn invariant(&self, message: impl Into<String>) -> FrameBuildError {
        FrameBuildError::InvariantViolation {
            message: message.into(),
            dump: dump::dump_layout(self),
        }
    }
}

pub struct LayoutDriver<'a> {
    mode: BuilderMode,
    checks: bool,
    lifetime: Option<&'a dyn StackLifetime>,
}

impl<'a> LayoutDriver<'a> {
    pub fn new(mode: BuilderMode, checks: bool, lifetime: Option<&'a dyn StackLifetime>) -> Self {
        Self {
            mode,
            checks,
            lifetime,
        }
    }

    /// Lays out the frame for `suspends`. `candidates[i]` belongs to
    /// `suspends[i]`.
    pub fn run(
        &self,
        defs: &DefTable,
        types: &mut IrTypeCache,
        suspends: &[SuspendPoint],
        candidates: Vec<SuspendCandidates>,
    ) -> Result<FrameLayout, FrameBuildError> {
        let mut layout = FrameLayout {
            rows: RowTable::new(),
            structs: suspends
                .iter()
                .zip(candidates)
                .map(|(point, candidates)| FrameStruct::new(point, candidates))
                .collect(),
            max_size: 0,
            max_align: 1,
        };

        for idx in 0..layout.structs.len() {
            self.collect_rows(&mut layout, defs, types, idx)?;
        }
        for idx in 0..layout.structs.len() {
            self.layout_struct(&mut layout, idx)?;
        }

        if self.checks {
            check::check_layout(&layout).map_err(|msg| layout.invariant(msg))?;
        }

        log::debug!(
            "frame layout: {} rows, {} bytes, align {}",
            layout.rows.len(),
            layout.max_size,
            layout.max_align
        );
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}", dump::dump_layout(&layout));
        }
        Ok(layout)
    }

    /// Creates rows for the crossing values and buffers of one suspend and
    /// records where they reside.
    fn collect_rows(
        &self,
        layout: &mut FrameLayout,
        defs: &DefTable,
        types: &mut IrTypeCache,
        idx: usize,
    ) -> Result<(), FrameBuildError> {
        let st = &layout.structs[idx];
        let suspend = st.suspend;
        let crossing_defs: Vec<ValueId> = st
            .candidates
            .values
            .keys()
            .copied()
            .chain(st.candidates.allocas.iter().map(|alloca| alloca.alloca))
            .collect();

        let mut crossing = Vec::with_capacity(crossing_defs.len());
        let mut new_bytes = 0;
        for def in crossing_defs {
            let known = layout.rows.len();
            let row = layout.rows.get_or_create_row(defs, types, def)?;
            if row.index() >= known {
                new_bytes += layout.rows.get(row).size;
            }
            crossing.push(row);
        }

        let resident: Vec<RowId> = if self.mode.evicts_unused() {
            crossing
        } else {
            layout.rows.ids().collect()
        };
        for &row in &resident {
            layout.rows.mark_resides_in(row, suspend);
        }

        log::debug!(
            "suspend {}: {} resident rows, {} new bytes",
            suspend.0,
            resident.len(),
            new_bytes
        );
        Ok(())
    }

    fn layout_struct(&self, layout: &mut FrameLayout, idx: usize) -> Result<(), FrameBuildError> {
        let suspend = layout.structs[idx].suspend;

        // Fixed fields were registered while laying out earlier structs.
        layout.structs[idx].sort_fields();
        let st = &layout.structs[idx];
        if st.fields.last().is_some_and(|field| field.end() != st.size) {
            return Err(layout.invariant(format!(
                "struct of suspend {} does not end at its last field",
                suspend.0
            )));
        }

        let mut gaps = if self.mode.evicts_unused() {
            GapTracker::between_fields(&st.fields)
        } else {
            GapTracker::default()
        };
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "suspend {} initial occupancy: {}",
                suspend.0,
                dump::occupancy(st, &layout.rows)
            );
        }

        let flexible: Vec<RowId> = layout
            .rows
            .iter()
            .filter(|(_, row)| row.is_flexible() && row.resides_in.contains(&suspend))
            .map(|(id, _)| id)
            .collect();

        for row in flexible {
            let offset = match self.find_gap_for_row(&layout.rows, row, &mut gaps) {
                Some(offset) => offset,
                None => self.append_offset(layout, row, suspend),
            };
            self.place(layout, row, offset)?;
        }

        if self.checks {
            check::check_gaps(&gaps, &layout.structs[idx].fields)
                .map_err(|msg| layout.invariant(msg))?;
        }

        self.finalize(layout, idx)?;

        if self.mode.evicts_unused() {
            let escalated = compute_interference(&mut layout.rows, &layout.structs[idx].fields);
            if escalated > 0 {
                log::debug!("suspend {}: {} interfering fields", suspend.0, escalated);
            }
        }
        Ok(())
    }

    /// First gap, in offset order, that can hold `row` without conflict.
    fn find_gap_for_row(&self, rows: &RowTable, row: RowId, gaps: &mut GapTracker) -> Option<u64> {
        let checker = ConflictChecker::new(rows, self.lifetime);
        let (index, offset) = gaps
            .gaps()
            .iter()
            .enumerate()
            .find_map(|(index, gap)| {
                try_fit_in_gap(&checker, rows, *gap, row).map(|offset| (index, offset))
            })?;
        gaps.split_around(index, offset, rows.get(row).size);
        Some(offset)
    }

    /// Offset past the end of every struct `row` resides in. Stack buffers are
    /// additionally moved past placed buffers they may be alive with.
    fn append_offset(&self, layout: &FrameLayout, row: RowId, suspend: SuspendId) -> u64 {
        let current = layout.rows.get(row);
        let end = layout
            .structs
            .iter()
            .filter(|st| st.suspend == suspend || current.resides_in.contains(&st.suspend))
            .map(|st| st.size)
            .max()
            .unwrap_or(0);
        let mut offset = align_to(end, current.align);

        if current.is_stack_alloc {
            let checker = ConflictChecker::new(&layout.rows, self.lifetime);
            let mut step = 0;
            while checker.has_stack_lifetime_conflict(offset, row, &mut step) {
                offset = align_to(offset + step.max(1), current.align);
                step = 0;
            }
        }
        offset
    }

    /// Fixes the offset of `row` and adds it to every struct it resides in.
    fn place(&self, layout: &mut FrameLayout, row: RowId, offset: u64) -> Result<(), FrameBuildError> {
        let current = layout.rows.get_mut(row);
        if !current.place(offset) {
            let def = current.def;
            return Err(layout.invariant(format!("{def} was placed twice")));
        }
        let field = FrameField {
            row,
            offset,
            size: current.size,
            align: current.align,
        };
        log::trace!(
            "{} at offset {} ({} bytes, align {})",
            current.def,
            offset,
            field.size,
            field.align
        );

        let resides_in = current.resides_in.clone();
        for st in &mut layout.structs {
            if resides_in.contains(&st.suspend) {
                st.add_field(field);
            }
        }
        Ok(())
    }

    fn finalize(&self, layout: &mut FrameLayout, idx: usize) -> Result<(), FrameBuildError> {
        let st = &mut layout.structs[idx];
        st.sort_fields();
        let (size, align, suspend) = (st.size, st.align, st.suspend);

        if self.checks {
            let st = &layout.structs[idx];
            check::check_struct(&layout.rows, st).map_err(|msg| layout.invariant(msg))?;
        }

        layout.max_size = layout.max_size.max(size);
        layout.max_align = layout.max_align.max(align);

        if log::log_enabled!(log::Level::Trace) {
            let st = &layout.structs[idx];
            let (unused_allocas, unused_values) = dump::unused_bytes(st, &layout.rows);
            log::trace!(
                "suspend {} final occupancy: {}",
                suspend.0,
                dump::occupancy(st, &layout.rows)
            );
            log::trace!(
                "suspend {} unused bytes: {} in buffers, {} in values",
                suspend.0,
                unused_allocas,
                unused_values
            );
        }
        log::debug!("suspend {}: {} bytes, align {}", suspend.0, size, align);
        Ok(())
    }
}

/// Scans `gap` for an aligned offset that holds `row` without conflict,
/// stepping over whatever is in the way.
fn try_fit_in_gap(checker: &ConflictChecker<'_>, rows: &RowTable, gap: Gap, row: RowId) -> Option<u64> {
    let current = rows.get(row);
    let mut gap = gap;
    while gap.size > 0 {
        let offset = align_to(gap.offset, current.align);
        let required = current.size + (offset - gap.offset);
        if required > gap.size {
            return None;
        }

        let mut next_step = required;
        if !checker.has_conflict(offset, row, &mut next_step) {
            return Some(offset);
        }
        gap.offset += next_step;
        gap.size = gap.size.saturating_sub(next_step);
    }
    None
}

#[cfg(test)]
#[path = "../tests/contstate/t_layout.rs"]
mod tests;
