use crate::analysis::{ConstMaterializable, Materializable};
use crate::ir::{BinOp, FunctionBuilder, IdAllocator, Instruction, IrTypeCache, format_func};
use crate::transform::rematerialize;
use indoc::indoc;

include!("../ir_test_utils.rs");

struct Everything;

impl Materializable for Everything {
    fn is_materializable(&self, _inst: &Instruction) -> bool {
        true
    }
}

#[test]
fn test_remat_constant_in_each_use_block() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("remat", sig(vec![], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let tail = builder.add_block();
    let k = builder.const_int(entry, 7, false, 32, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![k], None);
    builder.set_terminator(resume, br(tail));
    builder.call(tail, "use", vec![k], None);
    builder.set_terminator(tail, ret());
    let mut func = builder.finish();
    let mut ids = IdAllocator::for_function(&func);
    let suspends = func.suspends();

    let cloned = rematerialize(&mut func, &mut ids, &suspends, &ConstMaterializable);

    assert_eq!(cloned, 2);
    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn remat() -> () {
              bb0():
                %v0: u32 = const 7

                suspend bb1

              bb1():
                %v1: u32 = const 7
                call @use(%v1)

                br bb2

              bb2():
                %v2: u32 = const 7
                call @use(%v2)

                ret
            }
        "},
    );
}

#[test]
fn test_remat_skips_instructions_with_operands() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("ops", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let arg = builder.add_block_param(entry, u32_ty);
    let sum = builder.binop(entry, BinOp::Add, arg, arg, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![sum], None);
    builder.set_terminator(resume, ret());
    let mut func = builder.finish();
    let before = func.clone();
    let mut ids = IdAllocator::for_function(&func);
    let suspends = func.suspends();

    assert_eq!(rematerialize(&mut func, &mut ids, &suspends, &Everything), 0);
    assert_eq!(func, before);
}
