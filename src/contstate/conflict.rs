//! Placement conflicts between frame rows, and the interference escalation
//! run after each struct is laid out when rows may share bytes.

use super::layout::FrameField;
use super::row::{RowId, RowTable};
use crate::analysis::StackLifetime;

/// Answers whether a candidate offset is safe for a flexible row.
pub struct ConflictChecker<'a> {
    rows: &'a RowTable,
    /// Without an analyzer every pair of stack allocations is assumed alive
    /// at the same time.
    lifetime: Option<&'a dyn StackLifetime>,
}

impl<'a> ConflictChecker<'a> {
    pub fn new(rows: &'a RowTable, lifetime: Option<&'a dyn StackLifetime>) -> Self {
        Self { rows, lifetime }
    }

    /// True if `[candidate, candidate + size)` cannot hold `row`. On a
    /// conflict `next_step` grows to at least the size of the row in the way.
    pub fn has_conflict(&self, candidate: u64, row: RowId, next_step: &mut u64) -> bool {
        if self.has_frame_struct_conflict(candidate, row, next_step) {
            return true;
        }
        if !self.rows.get(row).is_stack_alloc {
            return false;
        }
        self.has_stack_lifetime_conflict(candidate, row, next_step)
    }

    /// Another placed row shares a suspend frame with `row` and overlaps the
    /// candidate range.
    pub fn has_frame_struct_conflict(
        &self,
        candidate: u64,
        row: RowId,
        next_step: &mut u64,
    ) -> bool {
        let current = self.rows.get(row);
        for (other_id, other) in self.rows.iter() {
            if other_id == row || other.is_flexible() {
                continue;
            }
            if other.shares_suspend(current) && other.overlaps_range(candidate, current.size) {
                *next_step = (*next_step).max(other.size);
                return true;
            }
        }
        false
    }

    /// Another placed stack allocation overlaps the candidate range and is
    /// alive at the same time as `row`.
    pub fn has_stack_lifetime_conflict(
        &self,
        candidate: u64,
        row: RowId,
        next_step: &mut u64,
    ) -> bool {
        let current = self.rows.get(row);
        debug_assert!(current.is_stack_alloc);

        for (other_id, other) in self.rows.iter() {
            if other_id == row || !other.is_stack_alloc || other.is_flexible() {
                continue;
            }
            if !other.overlaps_range(candidate, current.size) {
                continue;
            }
            let alive_together = self
                .lifetime
                .is_none_or(|lifetime| lifetime.overlaps(current.def, other.def));
            if alive_together {
                *next_step = (*next_step).max(other.size);
                return true;
            }
        }
        false
    }
}

/// Escalates spill/reload timing for rows that share frame bytes with a field
/// of the struct just laid out. `fields` must be sorted by offset.
///
/// A plain value overlapping a stack allocation must be reloaded as soon as
/// its suspend resumes, before the buffer is written. Two overlapping plain
/// values force the field of the current struct to spill right before its
/// suspend and reload right after it.
pub fn compute_interference(rows: &mut RowTable, fields: &[FrameField]) -> usize {
    let mut escalated = 0;
    let placed: Vec<RowId> = rows
        .iter()
        .filter(|(_, row)| !row.is_flexible())
        .map(|(id, _)| id)
        .collect();

    for prev in placed {
        for field in fields {
            let cur = field.row;
            if cur == prev {
                continue;
            }
            let (prev_row, cur_row) = (rows.get(prev), rows.get(cur));
            if prev_row.is_stack_alloc && cur_row.is_stack_alloc {
                continue;
            }
            let Some(prev_offset) = prev_row.offset() else {
                continue;
            };
            if field.end() <= prev_offset {
                continue;
            }
            if field.offset >= prev_offset + prev_row.size {
                // Fields are sorted; nothing further can overlap.
                break;
            }

            match (prev_row.is_stack_alloc, cur_row.is_stack_alloc) {
                (false, true) => {
                    log::trace!("{} shares bytes with a buffer, reloading on resume", prev_row.def);
                    rows.get_mut(prev).force_reload_on_resume = true;
                }
                (true, false) => {
                    log::trace!("{} shares bytes with a buffer, reloading on resume", cur_row.def);
                    rows.get_mut(cur).force_reload_on_resume = true;
                }
                _ => {
                    log::trace!(
                        "{} shares bytes with {}, spilling on suspend",
                        cur_row.def,
                        prev_row.def
                    );
                    let cur_row = rows.get_mut(cur);
                    cur_row.force_spill_on_suspend = true;
                    cur_row.force_reload_on_resume = true;
                }
            }
            escalated += 1;
        }
    }
    escalated
}

#[cfg(test)]
#[path = "../tests/contstate/t_conflict.rs"]
mod tests;
