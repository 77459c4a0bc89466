//! SSA liveness analysis.

use std::collections::HashSet;

use crate::analysis::cfg::Cfg;
use crate::analysis::dataflow::{DataflowGraph, solve_backward};
use crate::ir::{Block, Function, Terminator, ValueId, for_each_inst_use, for_each_term_use};

#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    pub live_in: HashSet<ValueId>,
    pub live_out: HashSet<ValueId>,
}

pub type LiveMap = Vec<LiveSet>;

#[derive(Debug, Clone, Default)]
struct UseDef {
    use_set: HashSet<ValueId>,
    def_set: HashSet<ValueId>,
}

impl UseDef {
    fn add_use(&mut self, value: ValueId) {
        if !self.def_set.contains(&value) {
            self.use_set.insert(value);
        }
    }

    fn add_def(&mut self, value: ValueId) {
        self.def_set.insert(value);
    }
}

/// Compute liveness for a single SSA function. Block arguments are live out
/// of the branching block; block parameters are defined at the top of their
/// block.
pub fn analyze(func: &Function, cfg: &Cfg) -> LiveMap {
    let mut use_defs = Vec::with_capacity(func.blocks.len());
    let mut edge_uses = Vec::with_capacity(func.blocks.len());
    for block in &func.blocks {
        use_defs.push(block_use_def(block));
        edge_uses.push(block_edge_uses(block));
    }

    let empty = HashSet::new();
    let result = solve_backward(
        cfg,
        empty.clone(),
        empty,
        |states| {
            let mut out = HashSet::new();
            for state in states {
                out.extend(state.iter().copied());
            }
            out
        },
        |block_id, out_state| {
            let idx = cfg.index(block_id);
            let mut out_state = out_state.clone();
            out_state.extend(edge_uses[idx].iter().copied());

            let use_def = &use_defs[idx];
            let mut in_state: HashSet<_> =
                out_state.difference(&use_def.def_set).copied().collect();
            in_state.extend(use_def.use_set.iter().copied());
            in_state
        },
    );

    let mut out_map = result.out_map;
    for (idx, uses) in edge_uses.iter().enumerate() {
        out_map[idx].extend(uses.iter().copied());
    }

    result
        .in_map
        .into_iter()
        .zip(out_map)
        .map(|(live_in, live_out)| LiveSet { live_in, live_out })
        .collect()
}

fn block_use_def(block: &Block) -> UseDef {
    let mut use_def = UseDef::default();

    for value in block.param_ids() {
        use_def.add_def(value);
    }

    for inst in &block.insts {
        for_each_inst_use(&inst.kind, |value| use_def.add_use(value));
        if let Some(result) = &inst.result {
            use_def.add_def(result.id);
        }
    }

    for_each_term_use(&block.term, |value| use_def.add_use(value));

    use_def
}

fn block_edge_uses(block: &Block) -> HashSet<ValueId> {
    let mut uses = HashSet::new();
    match &block.term {
        Terminator::Br { args, .. } => {
            uses.extend(args.iter().copied());
        }
        Terminator::CondBr {
            then_args,
            else_args,
            ..
        } => {
            uses.extend(then_args.iter().copied());
            uses.extend(else_args.iter().copied());
        }
        Terminator::Switch {
            cases,
            default_args,
            ..
        } => {
            for case in cases {
                uses.extend(case.args.iter().copied());
            }
            uses.extend(default_args.iter().copied());
        }
        Terminator::Suspend { .. } | Terminator::Return { .. } | Terminator::Unreachable => {}
    }
    uses
}

#[cfg(test)]
#[path = "../tests/analysis/t_liveness.rs"]
mod tests;
