//! Overlap of stack-buffer lifetimes, from `lifetime.start`/`lifetime.end`
//! markers.

use std::collections::HashMap;

use crate::analysis::cfg::Cfg;
use crate::analysis::dataflow::{DataflowGraph, solve_forward};
use crate::ir::{Function, InstKind, ValueId, pointer_aliases};

/// Answers whether two stack allocations may be alive at the same time.
pub trait StackLifetime {
    fn overlaps(&self, a: ValueId, b: ValueId) -> bool;
}

/// Marker-driven lifetimes. An allocation without any marker is alive
/// everywhere and overlaps every other allocation.
#[derive(Debug, Clone, Default)]
pub struct MarkerLifetime {
    slots: HashMap<ValueId, usize>,
    overlap: Vec<Vec<bool>>,
}

impl MarkerLifetime {
    pub fn analyze(func: &Function, cfg: &Cfg) -> Self {
        // Map every alias of a marked allocation to the allocation's slot.
        let mut slots = HashMap::new();
        let mut alias_slot: HashMap<ValueId, usize> = HashMap::new();
        for block in &func.blocks {
            for inst in &block.insts {
                let (InstKind::Alloca { .. }, Some(alloca)) = (&inst.kind, inst.result_id())
                else {
                    continue;
                };
                let aliases = pointer_aliases(func, alloca);
                if !has_markers(func, &aliases) {
                    continue;
                }
                let slot = slots.len();
                slots.insert(alloca, slot);
                for alias in aliases {
                    alias_slot.entry(alias).or_insert(slot);
                }
            }
        }

        let count = slots.len();
        let mut overlap = vec![vec![false; count]; count];
        if count == 0 {
            return Self { slots, overlap };
        }

        let step = |state: &mut Vec<bool>, kind: &InstKind| match kind {
            InstKind::LifetimeStart { ptr } => {
                if let Some(&slot) = alias_slot.get(ptr) {
                    state[slot] = true;
                }
            }
            InstKind::LifetimeEnd { ptr } => {
                if let Some(&slot) = alias_slot.get(ptr) {
                    state[slot] = false;
                }
            }
            _ => {}
        };

        let result = solve_forward(
            cfg,
            cfg.entry(),
            vec![false; count],
            vec![false; count],
            |states| {
                let mut out = vec![false; count];
                for state in states {
                    for (slot, alive) in state.iter().enumerate() {
                        out[slot] |= *alive;
                    }
                }
                out
            },
            |block, in_state| {
                let mut state = in_state.clone();
                for inst in &func.block(block).insts {
                    step(&mut state, &inst.kind);
                }
                state
            },
        );

        let mut record = |state: &[bool]| {
            let alive: Vec<usize> = (0..count).filter(|&slot| state[slot]).collect();
            for &a in &alive {
                for &b in &alive {
                    overlap[a][b] = true;
                }
            }
        };
        for block in &func.blocks {
            let mut state = result.in_map[cfg.index(block.id)].clone();
            record(&state);
            for inst in &block.insts {
                step(&mut state, &inst.kind);
                record(&state);
            }
        }

        Self { slots, overlap }
    }
}

impl StackLifetime for MarkerLifetime {
    fn overlaps(&self, a: ValueId, b: ValueId) -> bool {
        match (self.slots.get(&a), self.slots.get(&b)) {
            (Some(&a), Some(&b)) => self.overlap[a][b],
            _ => true,
        }
    }
}

fn has_markers(func: &Function, aliases: &[ValueId]) -> bool {
    func.blocks.iter().flat_map(|block| &block.insts).any(|inst| {
        matches!(
            &inst.kind,
            InstKind::LifetimeStart { ptr } | InstKind::LifetimeEnd { ptr } if aliases.contains(ptr)
        )
    })
}

#[cfg(test)]
#[path = "../tests/analysis/t_stack_lifetime.rs"]
mod tests;
