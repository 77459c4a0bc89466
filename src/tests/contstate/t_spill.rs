use std::collections::BTreeSet;

use crate::analysis::{Cfg, CrossingOracle, DomTree, LivenessCrossing, LoopInfo};
use crate::contstate::spill::{SpillContext, insert_reloads, insert_spills};
use crate::contstate::{BuilderMode, FrameBuildError, FrameLayout, LayoutDriver, RowId};
use crate::ir::{
    AllocaLen, BinOp, BlockId, DefTable, Function, FunctionBuilder, IdAllocator, InstKind,
    IrTypeCache, Terminator, ValueId, format_func,
};
use indoc::indoc;

include!("../ir_test_utils.rs");

struct Inserted {
    layout: FrameLayout,
    reloads: usize,
    spills: Result<usize, FrameBuildError>,
}

/// Lays out `func` and inserts reloads and spills through the first free
/// value id. `escalate` runs on the layout before insertion.
fn insert_with(
    func: &mut Function,
    types: &mut IrTypeCache,
    mode: BuilderMode,
    escalate: impl FnOnce(&mut FrameLayout),
) -> Inserted {
    let suspends = func.suspends();
    let candidates = LivenessCrossing.candidates(func, &suspends);
    let defs = DefTable::build(func);
    let mut layout = LayoutDriver::new(mode, true, None)
        .run(&defs, types, &suspends, candidates)
        .unwrap();
    escalate(&mut layout);

    let mut ids = IdAllocator::for_function(func);
    let placeholder = ids.value();
    let cfg = Cfg::new(func);
    let dom = DomTree::new(&cfg);
    let loops = LoopInfo::new(&cfg, &dom);
    let cx = SpillContext {
        cfg: &cfg,
        dom: &dom,
        loops: &loops,
        defs: &defs,
        mode,
        placeholder,
    };
    let reloads = insert_reloads(func, &mut layout, &mut ids, &cx);
    let spills = insert_spills(func, &mut layout, &mut ids, &cx);
    Inserted {
        layout,
        reloads,
        spills,
    }
}

fn insert(func: &mut Function, types: &mut IrTypeCache, mode: BuilderMode) -> Inserted {
    insert_with(func, types, mode, |_| {})
}

fn row_of(layout: &FrameLayout, def: u32) -> RowId {
    layout.rows.row_for(ValueId(def)).unwrap()
}

// %v1 = %v0 + %v0 is used after the suspend; `calls` run before it.
fn def_then_calls(types: &mut IrTypeCache, calls: &[&str]) -> Function {
    let u32_ty = u32_ty(types);
    let unit = unit_ty(types);

    let mut builder = FunctionBuilder::new("def", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let x = builder.add_block_param(entry, u32_ty);
    let y = builder.binop(entry, BinOp::Add, x, x, u32_ty);
    for callee in calls {
        builder.call(entry, callee, vec![], None);
    }
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![y], None);
    builder.set_terminator(resume, ret());
    builder.finish()
}

#[test]
fn test_spill_on_def_follows_definition() {
    let mut types = IrTypeCache::new();
    let mut func = def_then_calls(&mut types, &["work", "continuation.save"]);

    let inserted = insert(&mut func, &mut types, BuilderMode::ContOpt);

    assert_eq!(inserted.reloads, 1);
    assert_eq!(inserted.spills, Ok(1));
    assert!(inserted.layout.rows.get(row_of(&inserted.layout, 1)).spilled_on_def);
    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn def(u32) -> () {
              bb0(%v0: u32):
                %v1: u32 = add %v0, %v0
                store %v2, %v1
                call @work()
                call @continuation.save()

                suspend bb1

              bb1():
                %v3: u32 = load %v2
                call @use(%v1)

                ret
            }
        "},
    );
}

#[test]
fn test_spill_on_suspend_stays_below_pinned_calls() {
    let mut types = IrTypeCache::new();
    let mut func = def_then_calls(&mut types, &["work", "continuation.save"]);

    let inserted = insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    assert_eq!(inserted.spills, Ok(1));
    assert!(!inserted.layout.rows.get(row_of(&inserted.layout, 1)).spilled_on_def);
    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn def(u32) -> () {
              bb0(%v0: u32):
                %v1: u32 = add %v0, %v0
                call @work()
                call @continuation.save()
                store %v2, %v1

                suspend bb1

              bb1():
                %v3: u32 = load %v2
                call @use(%v1)

                ret
            }
        "},
    );
}

#[test]
fn test_spill_on_suspend_moves_up_to_definition() {
    let mut types = IrTypeCache::new();
    let mut func = def_then_calls(&mut types, &["work"]);

    insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    let entry = func.block(BlockId(0));
    assert_eq!(entry.insts.len(), 3);
    assert_eq!(entry.insts[1].result_id(), None);
    assert!(matches!(
        entry.insts[1].kind,
        InstKind::Store {
            value: ValueId(1),
            ..
        }
    ));
}

// bb0(%v0: bool, %v1: u32) suspends into bb1, which uses %v1 twice and may
// branch to bb2, which uses it again.
fn uses_in_two_blocks(types: &mut IrTypeCache) -> Function {
    let bool_ty = bool_ty(types);
    let u32_ty = u32_ty(types);
    let unit = unit_ty(types);

    let mut builder = FunctionBuilder::new("uses", sig(vec![bool_ty, u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let then_bb = builder.add_block();
    let exit = builder.add_block();
    let cond = builder.add_block_param(entry, bool_ty);
    let x = builder.add_block_param(entry, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![x], None);
    builder.call(resume, "use", vec![x], None);
    builder.set_terminator(
        resume,
        Terminator::CondBr {
            cond,
            then_bb,
            then_args: vec![],
            else_bb: exit,
            else_args: vec![],
        },
    );
    builder.call(then_bb, "use", vec![x], None);
    builder.set_terminator(then_bb, br(exit));
    builder.set_terminator(exit, ret());
    builder.finish()
}

#[test]
fn test_reload_on_use_once_per_block() {
    let mut types = IrTypeCache::new();
    let mut func = uses_in_two_blocks(&mut types);

    let inserted = insert(&mut func, &mut types, BuilderMode::ContOpt);

    let x = inserted.layout.rows.get(row_of(&inserted.layout, 1));
    assert_eq!(x.reloads.len(), 2);
    assert_eq!(x.reloaded_in, BTreeSet::from([BlockId(1), BlockId(2)]));
    let cond = inserted.layout.rows.get(row_of(&inserted.layout, 0));
    assert_eq!(cond.reloaded_in, BTreeSet::from([BlockId(1)]));
    assert_eq!(inserted.reloads, 3);
}

#[test]
fn test_reload_on_resume_once() {
    let mut types = IrTypeCache::new();
    let mut func = uses_in_two_blocks(&mut types);

    let inserted = insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    let x = inserted.layout.rows.get(row_of(&inserted.layout, 1));
    assert_eq!(x.reloaded_in, BTreeSet::from([BlockId(1)]));
    assert_eq!(inserted.reloads, 2);
    assert_eq!(func.block(BlockId(2)).insts.len(), 1);
}

#[test]
fn test_spill_hoisted_to_loop_preheader() {
    let mut types = IrTypeCache::new();
    let bool_ty = bool_ty(&mut types);
    let u64_ty = u64_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("looped", sig(vec![bool_ty, u64_ty], unit));
    let entry = builder.add_block();
    let header = builder.add_block();
    let resume = builder.add_block();
    let exit = builder.add_block();
    let cond = builder.add_block_param(entry, bool_ty);
    let x = builder.add_block_param(entry, u64_ty);
    builder.set_terminator(entry, br(header));
    builder.set_terminator(header, suspend(resume));
    builder.call(resume, "use", vec![x], None);
    builder.set_terminator(
        resume,
        Terminator::CondBr {
            cond,
            then_bb: header,
            then_args: vec![],
            else_bb: exit,
            else_args: vec![],
        },
    );
    builder.set_terminator(exit, ret());
    let mut func = builder.finish();

    let inserted = insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    assert_eq!(inserted.spills, Ok(2));
    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn looped(bool, u64) -> () {
              bb0(%v0: bool, %v1: u64):
                store %v2, %v0
                store %v2, %v1

                br bb1

              bb1():
                suspend bb2

              bb2():
                %v4: bool = load %v2
                %v3: u64 = load %v2
                call @use(%v1)

                cbr %v0, bb1, bb3

              bb3():
                ret
            }
        "},
    );
}

#[test]
fn test_dominating_suspend_spill_is_reused() {
    let mut types = IrTypeCache::new();
    let u64_ty = u64_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("twice", sig(vec![u64_ty], unit));
    let entry = builder.add_block();
    let first = builder.add_block();
    let second = builder.add_block();
    let x = builder.add_block_param(entry, u64_ty);
    builder.set_terminator(entry, suspend(first));
    builder.call(first, "use", vec![x], None);
    builder.set_terminator(first, suspend(second));
    builder.call(second, "use", vec![x], None);
    builder.set_terminator(second, ret());
    let mut func = builder.finish();

    let inserted = insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    assert_eq!(inserted.spills, Ok(1));
    assert_eq!(inserted.reloads, 2);
    let row = inserted.layout.rows.get(row_of(&inserted.layout, 0));
    assert_eq!(row.spilled_in, BTreeSet::from([BlockId(0)]));
    assert_eq!(row.reloaded_in, BTreeSet::from([BlockId(1), BlockId(2)]));
    assert!(
        !func
            .block(BlockId(1))
            .insts
            .iter()
            .any(|inst| matches!(inst.kind, InstKind::Store { .. }))
    );
}

#[test]
fn test_spill_on_suspend_requires_reload_on_resume() {
    let mut types = IrTypeCache::new();
    let mut func = def_then_calls(&mut types, &[]);

    let inserted = insert_with(&mut func, &mut types, BuilderMode::ContOpt, |layout| {
        let row = layout.rows.row_for(ValueId(1)).unwrap();
        layout.rows.get_mut(row).force_spill_on_suspend = true;
    });

    let err = inserted.spills.unwrap_err();
    assert!(matches!(err, FrameBuildError::InvariantViolation { .. }));
    assert!(err.to_string().contains("not reloaded on resume"));
    assert!(err.dump().is_some_and(|dump| dump.starts_with("frame: 4 bytes")));
}

#[test]
fn test_spill_on_suspend_without_definition() {
    let mut types = IrTypeCache::new();
    let mut func = def_then_calls(&mut types, &[]);
    let mode = BuilderMode::SimVgprEx;
    let suspends = func.suspends();
    let candidates = LivenessCrossing.candidates(&func, &suspends);
    let mut layout = LayoutDriver::new(mode, true, None)
        .run(&DefTable::build(&func), &mut types, &suspends, candidates)
        .unwrap();

    let mut ids = IdAllocator::for_function(&func);
    let placeholder = ids.value();
    let cfg = Cfg::new(&func);
    let dom = DomTree::new(&cfg);
    let loops = LoopInfo::new(&cfg, &dom);
    let defs = DefTable::default();
    let cx = SpillContext {
        cfg: &cfg,
        dom: &dom,
        loops: &loops,
        defs: &defs,
        mode,
        placeholder,
    };

    let err = insert_spills(&mut func, &mut layout, &mut ids, &cx).unwrap_err();
    assert!(matches!(err, FrameBuildError::InvariantViolation { .. }));
    assert!(err.to_string().contains("%v1 has no definition"));
}

#[test]
fn test_buffers_are_not_spilled() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);
    let ptr_u32 = ptr_ty(&mut types, u32_ty);

    let mut builder = FunctionBuilder::new("buf", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let x = builder.add_block_param(entry, u32_ty);
    let buf = builder.alloca(entry, u32_ty, AllocaLen::Static(1), None, ptr_u32);
    builder.store(entry, buf, x);
    builder.set_terminator(entry, suspend(resume));
    let value = builder.load(resume, buf, u32_ty);
    builder.call(resume, "use", vec![value], None);
    builder.set_terminator(resume, ret());
    let mut func = builder.finish();
    let before = func.clone();

    let inserted = insert(&mut func, &mut types, BuilderMode::SimVgprEx);

    assert_eq!(inserted.reloads, 0);
    assert_eq!(inserted.spills, Ok(0));
    assert_eq!(func, before);
}
