//! SSA reconstruction for a value with several definitions.
//!
//! Callers register the definitions available at the end of some blocks and
//! then ask for the value reaching the end of any other block. Merges get a
//! new block parameter, fed through the branch arguments of every incoming
//! edge. Parameters that end up with a single distinct incoming value are
//! removed again by `simplify`.

use std::collections::HashMap;

use crate::analysis::{Cfg, DomTree};
use crate::ir::{
    BlockId, BlockParam, Function, IdAllocator, IrTypeId, ValueDef, ValueId,
    replace_value_in_func,
};

pub struct SsaUpdater {
    ty: IrTypeId,
    /// Value reaching the end of a block, seeded with the available ones.
    resolved: HashMap<BlockId, ValueId>,
    /// Parameters created by this updater, in creation order.
    created: Vec<(BlockId, ValueId)>,
}

impl SsaUpdater {
    pub fn new(ty: IrTypeId) -> Self {
        Self {
            ty,
            resolved: HashMap::new(),
            created: Vec::new(),
        }
    }

    /// `value` is the definition live at the end of `block`.
    pub fn add_available_value(&mut self, block: BlockId, value: ValueId) {
        self.resolved.insert(block, value);
    }

    pub fn created_params(&self) -> &[(BlockId, ValueId)] {
        &self.created
    }

    /// The definition reaching the end of `block`, creating block parameters
    /// at merges on the way. `None` when some path from the entry reaches
    /// `block` without passing any available definition.
    pub fn value_at_end_of_block(
        &mut self,
        func: &mut Function,
        cfg: &Cfg,
        dom: &DomTree,
        ids: &mut IdAllocator,
        block: BlockId,
    ) -> Option<ValueId> {
        if let Some(&value) = self.resolved.get(&block) {
            return Some(value);
        }

        let reachable: Vec<BlockId> = cfg
            .preds(block)
            .iter()
            .copied()
            .filter(|&pred| dom.is_reachable(pred))
            .collect();

        match reachable.as_slice() {
            [] => None,
            [single] => {
                let value = self.value_at_end_of_block(func, cfg, dom, ids, *single)?;
                self.resolved.insert(block, value);
                Some(value)
            }
            _ => {
                // Register the parameter before recursing so loops resolve to it.
                let param = ids.value();
                func.block_mut(block).params.push(BlockParam {
                    value: ValueDef {
                        id: param,
                        ty: self.ty,
                    },
                });
                self.resolved.insert(block, param);
                self.created.push((block, param));

                for &pred in cfg.preds(block) {
                    let incoming = if dom.is_reachable(pred) {
                        self.value_at_end_of_block(func, cfg, dom, ids, pred)?
                    } else {
                        param
                    };
                    for args in func.block_mut(pred).term.edge_args_mut(block) {
                        args.push(incoming);
                    }
                }
                Some(param)
            }
        }
    }

    /// Removes created parameters whose incoming values are all the same
    /// value (or the parameter itself), replacing their uses with that value.
    /// Returns the number of parameters removed.
    pub fn simplify(&mut self, func: &mut Function, cfg: &Cfg) -> usize {
        let mut removed = 0;
        let mut changed = true;
        while changed {
            changed = false;
            let mut idx = 0;
            while idx < self.created.len() {
                let (block, param) = self.created[idx];
                let Some(same) = trivial_incoming(func, cfg, block, param) else {
                    idx += 1;
                    continue;
                };

                remove_param(func, cfg, block, param);
                replace_value_in_func(func, param, same, None);
                for value in self.resolved.values_mut() {
                    if *value == param {
                        *value = same;
                    }
                }
                self.created.remove(idx);
                removed += 1;
                changed = true;
            }
        }
        removed
    }
}

fn param_index(func: &Function, block: BlockId, param: ValueId) -> Option<usize> {
    func.block(block)
        .params
        .iter()
        .position(|p| p.value.id == param)
}

/// The single distinct incoming value of `param`, ignoring self references.
fn trivial_incoming(func: &Function, cfg: &Cfg, block: BlockId, param: ValueId) -> Option<ValueId> {
    let index = param_index(func, block, param)?;
    let mut same = None;
    for &pred in cfg.preds(block) {
        for args in func.block(pred).term.edge_args(block) {
            let incoming = *args.get(index)?;
            if incoming == param || Some(incoming) == same {
                continue;
            }
            if same.is_some() {
                return None;
            }
            same = Some(incoming);
        }
    }
    same
}

fn remove_param(func: &mut Function, cfg: &Cfg, block: BlockId, param: ValueId) {
    let Some(index) = param_index(func, block, param) else {
        return;
    };
    func.block_mut(block).params.remove(index);
    for &pred in cfg.preds(block) {
        for args in func.block_mut(pred).term.edge_args_mut(block) {
            if index < args.len() {
                args.remove(index);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/transform/t_ssa_update.rs"]
mod tests;
