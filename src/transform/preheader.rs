//! Loop pre-header insertion.

use crate::analysis::{Cfg, DomTree, LoopId, LoopInfo};
use crate::ir::{BlockId, BlockParam, Function, IdAllocator, Terminator, ValueDef};

/// Gives every loop a dedicated pre-header: a block outside the loop whose
/// only successor is the header and which is the header's only outside
/// predecessor. The new block forwards its parameters to the header. Loops
/// headed by the entry block are left alone. Returns the blocks created.
pub fn insert_missing_preheaders(func: &mut Function, ids: &mut IdAllocator) -> Vec<BlockId> {
    let mut created = Vec::new();
    loop {
        let cfg = Cfg::new(func);
        let dom = DomTree::new(&cfg);
        let loops = LoopInfo::new(&cfg, &dom);

        let missing = loops.loops().iter().enumerate().find_map(|(idx, lp)| {
            if lp.header == func.entry() || loops.preheader(&cfg, LoopId(idx as u32)).is_some() {
                return None;
            }
            let outside: Vec<BlockId> = cfg
                .preds(lp.header)
                .iter()
                .copied()
                .filter(|&pred| !lp.contains(pred))
                .collect();
            (!outside.is_empty()).then_some((lp.header, outside))
        });
        let Some((header, outside)) = missing else {
            break;
        };

        let params: Vec<BlockParam> = func
            .block(header)
            .params
            .iter()
            .map(|param| BlockParam {
                value: ValueDef {
                    id: ids.value(),
                    ty: param.value.ty,
                },
            })
            .collect();
        let args = params.iter().map(|param| param.value.id).collect();
        let preheader = func.push_block(params);
        func.block_mut(preheader).term = Terminator::Br {
            target: header,
            args,
        };
        for pred in outside {
            func.block_mut(pred).term.retarget(header, preheader);
        }

        log::debug!(
            "inserted pre-header bb{} for loop header bb{}",
            preheader.0,
            header.0
        );
        created.push(preheader);
    }
    created
}

#[cfg(test)]
#[path = "../tests/transform/t_preheader.rs"]
mod tests;
