use std::fmt;

use super::config::InlineStorage;
use super::layout::FrameLayout;
use crate::ir::{Function, InstKind};

/// What one frame build produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_bytes: u64,
    pub frame_align: u64,
    pub field_count: usize,
    pub spill_count: usize,
    pub reload_count: usize,
    pub frame_addr_count: usize,
    /// The frame fits the storage provided by the caller, so no separate
    /// allocation is needed.
    pub inline_storage: bool,
}

impl FrameStats {
    pub fn collect(func: &Function, layout: &FrameLayout, inline: Option<InlineStorage>) -> Self {
        let mut stats = FrameStats {
            frame_bytes: layout.max_size,
            frame_align: layout.max_align,
            inline_storage: inline
                .is_some_and(|storage| storage.fits(layout.max_size, layout.max_align)),
            ..FrameStats::default()
        };
        for (_, row) in layout.rows.iter() {
            if row.is_flexible() {
                continue;
            }
            stats.field_count += 1;
            if !row.is_stack_alloc {
                stats.spill_count += row.spills.len();
                stats.reload_count += row.reloads.len();
            }
        }
        stats.frame_addr_count = func
            .blocks
            .iter()
            .flat_map(|block| &block.insts)
            .filter(|inst| matches!(inst.kind, InstKind::FrameAddr { .. }))
            .count();
        stats
    }

    /// Logs frame access counts, one line each.
    pub fn report_access_counts(&self, func_name: &str) {
        log::info!(
            "continuation state frame addresses of \"{func_name}\": {}",
            self.frame_addr_count
        );
        log::info!(
            "continuation state reloads of \"{func_name}\": {}",
            self.reload_count
        );
        log::info!(
            "continuation state spills of \"{func_name}\": {}",
            self.spill_count
        );
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} bytes (align {}), {} fields, {} spills, {} reloads, {} addresses",
            self.frame_bytes,
            self.frame_align,
            self.field_count,
            self.spill_count,
            self.reload_count,
            self.frame_addr_count
        )?;
        if self.inline_storage {
            write!(f, ", inline")?;
        }
        Ok(())
    }
}
