use crate::ir::{
    AllocaLen, BinOp, FunctionBuilder, InstId, InstKind, Instruction, IrTypeCache, IrTypeKind,
    Terminator, ValueDef, ValueId, format_func, format_type,
};
use indoc::indoc;

include!("../ir_test_utils.rs");

#[test]
fn test_format_suspend_and_resume() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let unit = unit_ty(&mut types);

    let mut builder = FunctionBuilder::new("f", sig(vec![u32_ty], unit));
    let entry = builder.add_block();
    let resume = builder.add_block();
    let arg = builder.add_block_param(entry, u32_ty);
    let four = builder.const_int(entry, 4, false, 32, u32_ty);
    let sum = builder.binop(entry, BinOp::Add, arg, four, u32_ty);
    builder.set_terminator(entry, suspend(resume));
    builder.call(resume, "use", vec![sum], None);
    builder.set_terminator(resume, ret());
    let func = builder.finish();

    let text = format_func(&func, &types);
    let expected = indoc! {"
        fn f(u32) -> () {
          bb0(%v0: u32):
            %v1: u32 = const 4
            %v2: u32 = add %v0, %v1

            suspend bb1

          bb1():
            call @use(%v2)

            ret
        }
    "};
    assert_eq!(text, expected);
}

#[test]
fn test_format_memory_ops() {
    let mut types = IrTypeCache::new();
    let u32_ty = u32_ty(&mut types);
    let u8_ty = u8_ty(&mut types);
    let unit = unit_ty(&mut types);
    let ptr_u32 = ptr_ty(&mut types, u32_ty);
    let ptr_u8 = ptr_ty(&mut types, u8_ty);

    let mut builder = FunctionBuilder::new("mem", sig(vec![], unit));
    let entry = builder.add_block();
    let buf = builder.alloca(entry, u32_ty, AllocaLen::Static(4), Some(16), ptr_u32);
    builder.lifetime_start(entry, buf);
    let value = builder.load(entry, buf, u32_ty);
    builder.store(entry, buf, value);
    builder.lifetime_end(entry, buf);
    builder.set_terminator(entry, ret());
    let mut func = builder.finish();

    // Frame instructions are only created by the builder passes.
    func.block_mut(entry).insts.insert(
        0,
        Instruction::new(
            InstId(10),
            Some(ValueDef {
                id: ValueId(10),
                ty: ptr_u8,
            }),
            InstKind::FrameAlloc { ty: u8_ty },
        ),
    );
    func.block_mut(entry).insts.insert(
        1,
        Instruction::new(
            InstId(11),
            Some(ValueDef {
                id: ValueId(11),
                ty: ptr_u8,
            }),
            InstKind::FrameAddr {
                frame: ValueId(10),
                offset: 24,
            },
        ),
    );

    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn mem() -> () {
              bb0():
                %v10: ptr<u8> = frame_alloc u8
                %v11: ptr<u8> = frame_addr %v10, 24
                %v0: ptr<u32> = alloca u32, 4, align 16
                lifetime.start %v0
                %v1: u32 = load %v0
                store %v0, %v1
                lifetime.end %v0

                ret
            }
        "},
    );
}

#[test]
fn test_format_branch_args() {
    let mut types = IrTypeCache::new();
    let bool_ty = bool_ty(&mut types);
    let u64_ty = u64_ty(&mut types);

    let mut builder = FunctionBuilder::new("pick", sig(vec![bool_ty], u64_ty));
    let entry = builder.add_block();
    let join = builder.add_block();
    let cond = builder.add_block_param(entry, bool_ty);
    let one = builder.const_int(entry, 1, false, 64, u64_ty);
    let two = builder.const_int(entry, 2, false, 64, u64_ty);
    builder.set_terminator(
        entry,
        Terminator::CondBr {
            cond,
            then_bb: join,
            then_args: vec![one],
            else_bb: join,
            else_args: vec![two],
        },
    );
    let merged = builder.add_block_param(join, u64_ty);
    builder.set_terminator(join, Terminator::Return { value: Some(merged) });
    let func = builder.finish();

    assert_ir_eq(
        format_func(&func, &types),
        indoc! {"
            fn pick(bool) -> u64 {
              bb0(%v0: bool):
                %v1: u64 = const 1
                %v2: u64 = const 2

                cbr %v0, bb1(%v1), bb1(%v2)

              bb1(%v3: u64):
                ret %v3
            }
        "},
    );
}

#[test]
fn test_format_named_and_aggregate_types() {
    let mut types = IrTypeCache::new();
    let u8_ty = u8_ty(&mut types);
    let bytes = types.intern(IrTypeKind::Array {
        elem: u8_ty,
        len: 16,
    });
    let blob = types.intern(IrTypeKind::Blob { size: 0, align: 8 });
    let named = types.add_named(
        IrTypeKind::Struct { fields: vec![] },
        "f.Frame".to_string(),
    );

    assert_eq!(format_type(bytes, &types), "u8[16]");
    assert_eq!(format_type(blob, &types), "blob<0, align=8>");
    assert_eq!(format_type(named, &types), "f.Frame");
}
