use crate::analysis::{CrossingOracle, LivenessCrossing};
use crate::contstate::dump::{dump_layout, dump_rows, dump_struct, occupancy, unused_bytes};
use crate::contstate::{BuilderMode, FrameLayout, LayoutDriver, RowTable};
use crate::ir::{AllocaLen, DefTable, Function, FunctionBuilder, IrTypeCache, ValueId};

include!("../ir_test_utils.rs");

fn lay_out(func: &Function, types: &mut IrTypeCache, mode: BuilderMode) -> FrameLayout {
    let suspends = func.suspends();
    let candidates = LivenessCrossing.candidates(func, &suspends);
    let defs = DefTable::build(func);
    LayoutDriver::new(mode, true, None)
        .run(&defs, types, &suspends, candidates)
        .unwrap()
}

// `count` u64 parameters, all used after a single suspend.
fn wide(types: &mut IrTypeCache, count: usize) -> Function {
    let u64_ty = u64_ty(types);
    let unit = unit_ty(types);

    let mut builder = FunctionBuilder::new("wide", sig(vec![u64_ty; count], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let params: Vec<ValueId> = (0..count)
        .map(|_| builder.add_block_param(entry, u64_ty))
        .collect();
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", params, None);
    builder.set_terminator(resume, ret());
    builder.finish()
}

// %v0 crosses only the first suspend; %v1 both; %v2 only the second.
fn two_suspends(types: &mut IrTypeCache) -> Function {
    let u64_ty = u64_ty(types);
    let unit = unit_ty(types);

    let mut builder = FunctionBuilder::new("two", sig(vec![u64_ty, u64_ty], unit));
    let entry = builder.add_block();
    let first = builder.add_block();
    let second = builder.add_block();
    let a = builder.add_block_param(entry, u64_ty);
    let b = builder.add_block_param(entry, u64_ty);
    builder.set_terminator(entry, suspend(first));
    builder.call(first, "use", vec![a], None);
    let c = builder.call(first, "make", vec![], Some(u64_ty)).unwrap();
    builder.set_terminator(first, suspend(second));
    builder.call(second, "use", vec![b, c], None);
    builder.set_terminator(second, ret());
    builder.finish()
}

#[test]
fn test_dump_flexible_row() {
    let mut types = IrTypeCache::new();
    let func = wide(&mut types, 1);
    let defs = DefTable::build(&func);
    let mut rows = RowTable::new();
    rows.get_or_create_row(&defs, &mut types, ValueId(0)).unwrap();

    assert_eq!(
        dump_rows(&rows),
        "row 0: value %v0 size 8 align 8 offset <flexible> resides in []\n"
    );
}

#[test]
fn test_dump_layout_with_unused_field() {
    let mut types = IrTypeCache::new();
    let func = two_suspends(&mut types);
    let layout = lay_out(&func, &mut types, BuilderMode::ContOpt);

    let st = &layout.structs[1];
    assert_eq!(
        dump_struct(st, &layout.rows),
        concat!(
            "suspend 1 (bb1 -> bb2): 24 bytes, align 8\n",
            "  field 0: row 0 %v0 [0, 8) align 8 -- unused\n",
            "  field 1: row 1 %v1 [8, 16) align 8 -- crossing uses: 1\n",
            "  field 2: row 2 %v2 [16, 24) align 8 -- crossing uses: 1\n",
        )
    );
    assert_eq!(occupancy(st, &layout.rows), "[__++++] (8 unused bytes)");
    assert_eq!(unused_bytes(st, &layout.rows), (0, 8));
    assert_eq!(unused_bytes(&layout.structs[0], &layout.rows), (0, 0));

    let dump = dump_layout(&layout);
    assert!(dump.starts_with("frame: 24 bytes, align 8\nrow 0: value %v0"));
    assert!(dump.contains("row 2: value %v2 size 8 align 8 offset 16 resides in [1]\n"));
    assert!(dump.contains("suspend 0 (bb0 -> bb1): 16 bytes, align 8\n"));
}

#[test]
fn test_dump_escalated_rows() {
    let mut types = IrTypeCache::new();
    let func = two_suspends(&mut types);
    let layout = lay_out(&func, &mut types, BuilderMode::SimVgprEx);

    assert_eq!(
        dump_rows(&layout.rows),
        concat!(
            "row 0: value %v0 size 8 align 8 offset 0 resides in [0]\n",
            "row 1: value %v1 size 8 align 8 offset 8 resides in [0, 1]\n",
            "row 2: value %v2 size 8 align 8 offset 0 resides in [1] +spill-on-suspend +reload-on-resume\n",
        )
    );
}

#[test]
fn test_dump_buffer_field() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);
    let ptr_u32 = ptr_ty(&mut types, u32_ty);

    let mut builder = FunctionBuilder::new("buf", sig(vec![], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let buf = builder.alloca(entry, u32_ty, AllocaLen::Static(2), None, ptr_u32);
    builder.set_terminator(entry, suspend(resume));
    let value = builder.load(resume, buf, u32_ty);
    builder.call(resume, "use", vec![value], None);
    builder.set_terminator(resume, ret());
    let func = builder.finish();
    let layout = lay_out(&func, &mut types, BuilderMode::ContOpt);

    assert_eq!(
        dump_rows(&layout.rows),
        "row 0: buffer %v0 size 8 align 4 offset 0 resides in [0]\n"
    );
    assert_eq!(
        dump_struct(&layout.structs[0], &layout.rows),
        concat!(
            "suspend 0 (bb0 -> bb1): 8 bytes, align 4\n",
            "  field 0: row 0 %v0 [0, 8) align 4 -- aliases: 1\n",
        )
    );
}

#[test]
fn test_occupancy_marks_every_32_bytes() {
    let mut types = IrTypeCache::new();
    let func = wide(&mut types, 5);
    let layout = lay_out(&func, &mut types, BuilderMode::ContOpt);

    assert_eq!(
        occupancy(&layout.structs[0], &layout.rows),
        "[++++++++|++] (0 unused bytes)"
    );
}
