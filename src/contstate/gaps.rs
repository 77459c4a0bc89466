//! Free byte ranges inside a frame struct under construction.

use super::layout::FrameField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub offset: u64,
    pub size: u64,
}

impl Gap {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Sorted, non-overlapping holes between placed fields. Space after the last
/// field is not a gap; rows that fit no gap grow the struct instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapTracker {
    gaps: Vec<Gap>,
}

impl GapTracker {
    /// Gaps between consecutive fields. `fields` must be sorted by offset.
    pub fn between_fields(fields: &[FrameField]) -> Self {
        let mut gaps = Vec::new();
        let mut cursor = 0u64;
        for field in fields {
            if field.offset > cursor {
                gaps.push(Gap {
                    offset: cursor,
                    size: field.offset - cursor,
                });
            }
            cursor = cursor.max(field.end());
        }
        Self { gaps }
    }

    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.gaps.iter().map(|gap| gap.size).sum()
    }

    /// Carves `[offset, offset + size)` out of the gap at `index`, leaving
    /// zero, one or two smaller gaps behind.
    pub fn split_around(&mut self, index: usize, offset: u64, size: u64) {
        let gap = self.gaps.remove(index);
        debug_assert!(gap.offset <= offset && offset + size <= gap.end());

        if offset > gap.offset {
            self.gaps.push(Gap {
                offset: gap.offset,
                size: offset - gap.offset,
            });
        }
        if offset + size < gap.end() {
            self.gaps.push(Gap {
                offset: offset + size,
                size: gap.end() - (offset + size),
            });
        }
        self.gaps.sort_by_key(|gap| gap.offset);
    }
}

#[cfg(test)]
#[path = "../tests/contstate/t_gaps.rs"]
mod tests;
