//! Rewires uses of spilled values to the definition or reload reaching them.

use super::error::FrameBuildError;
use super::layout::FrameLayout;
use crate::analysis::{Cfg, DomTree};
use crate::ir::{
    DefTable, Function, IdAllocator, UseSite, User, ValueId, replace_value_in_inst,
    replace_value_in_term, uses_of,
};
use crate::transform::SsaUpdater;

/// For every plain row with reloads, resolves each use of the original
/// definition (other than the row's own spills) against the definition and
/// the reloads, adding block parameters where they merge. Uses in
/// unreachable blocks are left alone. Returns the number of rewritten users.
pub fn repair_uses(
    func: &mut Function,
    layout: &FrameLayout,
    ids: &mut IdAllocator,
) -> Result<usize, FrameBuildError> {
    let cfg = Cfg::new(func);
    let dom = DomTree::new(&cfg);
    let defs = DefTable::build(func);

    let mut rewritten = 0;
    for (_, row) in layout.rows.iter() {
        if row.is_stack_alloc || row.reloads.is_empty() {
            continue;
        }

        let def_block = defs
            .block_of(row.def)
            .ok_or_else(|| layout.invariant(format!("{} has no definition", row.def)))?;
        let mut updater = SsaUpdater::new(row.ty);
        updater.add_available_value(def_block, row.def);
        for &reload in &row.reloads {
            let block = defs
                .block_of(reload)
                .ok_or_else(|| layout.invariant(format!("reload {reload} is not in the function")))?;
            updater.add_available_value(block, reload);
        }

        // Uses in unreachable blocks keep the original definition.
        let sites: Vec<UseSite> = uses_of(func, row.def)
            .into_iter()
            .filter(|site| dom.is_reachable(site.block))
            .filter(|site| !matches!(site.user, User::Inst(inst) if row.spills.contains(&inst)))
            .collect();

        for site in sites {
            let reaching = updater
                .value_at_end_of_block(func, &cfg, &dom, ids, site.block)
                .ok_or(FrameBuildError::AmbiguousUseDef {
                    value: row.def,
                    block: site.block,
                })?;
            if reaching == row.def {
                continue;
            }
            rewrite_use(func, site, row.def, reaching);
            rewritten += 1;
        }

        let removed = updater.simplify(func, &cfg);
        log::trace!(
            "{}: {} reloads, {} merge params ({} trivial)",
            row.def,
            row.reloads.len(),
            updater.created_params().len() + removed,
            removed
        );
    }

    log::debug!("use-def repair rewrote {rewritten} users");
    Ok(rewritten)
}

fn rewrite_use(func: &mut Function, site: UseSite, from: ValueId, to: ValueId) {
    let block = func.block_mut(site.block);
    match site.user {
        User::Inst(id) => {
            if let Some(inst) = block.insts.iter_mut().find(|inst| inst.id == id) {
                replace_value_in_inst(&mut inst.kind, from, to);
            }
        }
        User::Term => replace_value_in_term(&mut block.term, from, to),
    }
}

#[cfg(test)]
#[path = "../tests/contstate/t_repair.rs"]
mod tests;
