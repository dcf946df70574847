//! Tests for AST to SysLang IR lowering.

use crate::errors::Diagnostic;
use crate::ir::ir::*;
use crate::ir::lower_program;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn lower(source: &str) -> (IrModule, Vec<Diagnostic>) {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    assert!(
        parser.errors().is_empty(),
        "parse errors: {:?}",
        parser.errors()
    );
    lower_program(&program, Architecture::X64, OutputFormat::Elf)
}

fn lower_ok(source: &str) -> IrModule {
    let (module, errors) = lower(source);
    assert!(errors.is_empty(), "lowering errors: {:?}", errors);
    module
}

fn func<'a>(module: &'a IrModule, name: &str) -> &'a IrFunction {
    module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function '{}'", name))
}

/// Every block must end with exactly one terminator, and contain no
/// terminator anywhere else.
fn assert_well_formed(module: &IrModule) {
    for f in &module.functions {
        for block in &f.blocks {
            assert!(
                block.terminator().is_some(),
                "block '{}' in '{}' lacks a terminator",
                block.name,
                f.name
            );
            let inner_terminators = block.insts[..block.insts.len() - 1]
                .iter()
                .filter(|inst| inst.is_terminator())
                .count();
            assert_eq!(
                inner_terminators, 0,
                "block '{}' in '{}' has an interior terminator",
                block.name, f.name
            );
        }
    }
}

#[test]
fn test_empty_source_is_empty_module() {
    let (module, errors) = lower("");
    assert!(module.functions.is_empty());
    assert!(errors.is_empty());
}

#[test]
fn test_return_zero() {
    let module = lower_ok("fn main() -> i32 { return 0; }");
    let main = func(&module, "main");
    assert_eq!(main.blocks.len(), 1);
    assert_eq!(main.blocks[0].name, "entry");
    assert_eq!(main.blocks[0].insts.len(), 1);

    let ret = &main.blocks[0].insts[0];
    assert_eq!(ret.op, Opcode::Ret);
    assert_eq!(ret.operands, vec![IrValue::Int(0, IrType::I32)]);
}

#[test]
fn test_add_params() {
    let module = lower_ok("fn add(a: i32, b: i32) -> i32 { return a + b; }");
    let add = func(&module, "add");
    assert_eq!(add.params, vec![(IrType::I32, "a".to_string()), (IrType::I32, "b".to_string())]);

    let insts = &add.blocks[0].insts;
    let loads: Vec<_> = insts.iter().filter(|i| i.op == Opcode::Load).collect();
    assert_eq!(loads.len(), 2, "expected loads of both parameter slots");
    assert_eq!(loads[0].operands[0].to_string(), "%a");
    assert_eq!(loads[1].operands[0].to_string(), "%b");

    let adds: Vec<_> = insts.iter().filter(|i| i.op == Opcode::Add).collect();
    assert_eq!(adds.len(), 1);

    let ret = insts.last().unwrap();
    assert_eq!(ret.op, Opcode::Ret);
    assert!(matches!(ret.operands[0], IrValue::Var(_)));
}

#[test]
fn test_let_allocates_and_stores() {
    let module = lower_ok("fn f() -> i32 { let x: i32 = 1 + 2; return x; }");
    let f = func(&module, "f");
    let insts = &f.blocks[0].insts;

    let alloca = &insts[0];
    assert_eq!(alloca.op, Opcode::Alloca);
    assert_eq!(alloca.result.as_ref().unwrap().name, "x");
    assert_eq!(alloca.result.as_ref().unwrap().ty, IrType::Pointer);
    assert_eq!(alloca.operands[0], IrValue::Int(4, IrType::I64));

    assert!(insts.iter().any(|i| i.op == Opcode::Add));
    assert!(insts
        .iter()
        .any(|i| i.op == Opcode::Store && i.operands[1].to_string() == "%x"));
    assert_eq!(f.stack_size, 4);
}

#[test]
fn test_stack_size_sums_locals() {
    let module = lower_ok(
        "fn f() -> i64 { let a: i32 = 1; let b: i64 = 2; let c: u8 = 3; return b; }",
    );
    assert_eq!(func(&module, "f").stack_size, 4 + 8 + 1);
}

#[test]
fn test_while_loop_shape() {
    let module = lower_ok(
        "fn g(n: i32) -> i32 { let mut s: i32 = 0; let mut i: i32 = 0; while (i < n) { s = s + i; i = i + 1; } return s; }",
    );
    assert_well_formed(&module);
    let g = func(&module, "g");

    let names: Vec<_> = g.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["entry", "while.cond0", "while.body1", "while.exit2"]);

    // Header: comparison plus conditional branch to body or exit.
    let header = &g.blocks[1];
    assert!(header.insts.iter().any(|i| i.op == Opcode::Lt));
    let condbr = header.terminator().unwrap();
    assert_eq!(condbr.op, Opcode::CondBr);
    assert_eq!(condbr.targets, vec!["while.body1", "while.exit2"]);

    // Body: two stores and the back-edge to the header.
    let body = &g.blocks[2];
    let stores = body.insts.iter().filter(|i| i.op == Opcode::Store).count();
    assert_eq!(stores, 2);
    let back = body.terminator().unwrap();
    assert_eq!(back.op, Opcode::Br);
    assert_eq!(back.targets, vec!["while.cond0"]);

    // Exit is only targeted from the header.
    for block in &g.blocks {
        if block.name != "while.cond0" {
            assert!(block
                .terminator()
                .map(|t| !t.targets.contains(&"while.exit2".to_string()))
                .unwrap_or(true));
        }
    }
}

#[test]
fn test_for_loop_has_update_block() {
    let module = lower_ok(
        "fn f(n: i32) -> i32 { let mut s: i32 = 0; for (let mut i: i32 = 0; i < n; i = i + 1) { s = s + i; } return s; }",
    );
    assert_well_formed(&module);
    let f = func(&module, "f");
    let names: Vec<_> = f.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(
        names,
        ["entry", "for.cond0", "for.body1", "for.update2", "for.exit3"]
    );

    // The body branches to the update block, which branches back to
    // the condition.
    assert_eq!(f.blocks[2].terminator().unwrap().targets, vec!["for.update2"]);
    assert_eq!(f.blocks[3].terminator().unwrap().targets, vec!["for.cond0"]);
}

#[test]
fn test_if_without_else_reaches_merge_both_ways() {
    let module = lower_ok("fn f(x: i32) -> i32 { if (x > 0) { x = 1; } return x; }");
    assert_well_formed(&module);
    let f = func(&module, "f");

    let condbr = f.blocks[0].terminator().unwrap();
    assert_eq!(condbr.op, Opcode::CondBr);
    let then_label = &condbr.targets[0];
    let merge_label = &condbr.targets[1];

    let then_block = f.blocks.iter().find(|b| &b.name == then_label).unwrap();
    assert_eq!(
        then_block.terminator().unwrap().targets,
        vec![merge_label.clone()]
    );
}

#[test]
fn test_if_else_shape() {
    let module = lower_ok(
        "fn f(x: i32) -> i32 { if (x > 0) { return 1; } else { return 2; } }",
    );
    assert_well_formed(&module);
    let f = func(&module, "f");
    let names: Vec<_> = f.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["entry", "then0", "else1", "merge2"]);

    // Both arms return, so they do not branch to the merge block.
    assert_eq!(f.blocks[1].terminator().unwrap().op, Opcode::Ret);
    assert_eq!(f.blocks[2].terminator().unwrap().op, Opcode::Ret);
}

#[test]
fn test_statements_after_return_not_lowered() {
    let module = lower_ok("fn f() -> i32 { return 1; return 2; }");
    let f = func(&module, "f");
    assert_eq!(f.blocks.len(), 1);
    let rets = f.blocks[0]
        .insts
        .iter()
        .filter(|i| i.op == Opcode::Ret)
        .count();
    assert_eq!(rets, 1);
}

#[test]
fn test_short_circuit_and() {
    let module = lower_ok("fn f(a: bool, b: bool) -> bool { return a && b; }");
    assert_well_formed(&module);
    let f = func(&module, "f");

    let names: Vec<_> = f.blocks.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"and.rhs0"), "blocks: {:?}", names);
    assert!(names.contains(&"and.end1"), "blocks: {:?}", names);

    // Entry evaluates only the LHS and skips the RHS when false.
    let condbr = f.blocks[0].terminator().unwrap();
    assert_eq!(condbr.op, Opcode::CondBr);
    assert_eq!(condbr.targets, vec!["and.rhs0", "and.end1"]);
}

#[test]
fn test_short_circuit_or_skips_rhs_when_true() {
    let module = lower_ok("fn f(a: bool, b: bool) -> bool { return a || b; }");
    let f = func(&module, "f");
    let condbr = f.blocks[0].terminator().unwrap();
    assert_eq!(condbr.targets, vec!["or.end1", "or.rhs0"]);
}

#[test]
fn test_extern_function_has_no_blocks() {
    let module = lower_ok("fn print_int(n: i32) -> void extern");
    let f = func(&module, "print_int");
    assert!(f.is_extern());
    assert!(f.blocks.is_empty());
}

#[test]
fn test_call_lowering() {
    let module = lower_ok(
        "fn print_int(n: i32) -> void extern\nfn helper(x: i32) -> i32 { return x * 2; }\nfn main() -> i32 { print_int(7); return helper(3); }",
    );
    let main = func(&module, "main");
    let insts = &main.blocks[0].insts;

    let calls: Vec<_> = insts.iter().filter(|i| i.op == Opcode::Call).collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].operands[0].to_string(), "@print_int");
    assert!(calls[0].result.is_none(), "void call has no result");
    assert_eq!(calls[1].operands[0].to_string(), "@helper");
    assert!(calls[1].result.is_some());
}

#[test]
fn test_call_arity_mismatch_is_error_but_continues() {
    let (module, errors) = lower(
        "fn helper(x: i32) -> i32 { return x; }\nfn main() -> i32 { return helper(1, 2); }",
    );
    assert!(errors.iter().any(|e| e.message.contains("expects 1 arguments")));
    // Lowering still produced both functions.
    assert_eq!(module.functions.len(), 2);
}

#[test]
fn test_undefined_variable_substitutes_zero() {
    let (module, errors) = lower("fn f() -> i32 { return nope; }");
    assert!(errors.iter().any(|e| e.message.contains("Undefined variable")));
    let f = func(&module, "f");
    let ret = f.blocks[0].terminator().unwrap();
    assert_eq!(ret.operands[0], IrValue::Int(0, IrType::I32));
}

#[test]
fn test_implicit_widening_inserts_sext() {
    let module = lower_ok("fn f(a: i32, b: i64) -> i64 { return a + b; }");
    let f = func(&module, "f");
    assert!(f.blocks[0].insts.iter().any(|i| i.op == Opcode::SExt));
}

#[test]
fn test_int_to_float_conversion() {
    let module = lower_ok("fn f(a: i32, x: f64) -> f64 { return a + x; }");
    let f = func(&module, "f");
    assert!(f.blocks[0].insts.iter().any(|i| i.op == Opcode::SiToFp));
}

#[test]
fn test_explicit_casts_choose_opcodes() {
    let module = lower_ok(
        "fn f(a: i32, u: u32, x: f64) -> i32 { let w: i64 = i64(a); let n: i8 = i8(a); let g: f64 = f64(a); let q: i32 = i32(x); let z: u64 = u64(u); return n; }",
    );
    let f = func(&module, "f");
    let ops: Vec<Opcode> = f.blocks[0].insts.iter().map(|i| i.op).collect();
    assert!(ops.contains(&Opcode::SExt), "i32 -> i64 sign extends");
    assert!(ops.contains(&Opcode::Trunc), "i32 -> i8 truncates");
    assert!(ops.contains(&Opcode::SiToFp), "i32 -> f64 converts");
    assert!(ops.contains(&Opcode::FpToSi), "f64 -> i32 converts");
    assert!(ops.contains(&Opcode::ZExt), "u32 -> u64 zero extends");
}

#[test]
fn test_constant_cast_folds_at_compile_time() {
    let module = lower_ok("fn f() -> i64 { return i64(1); }");
    let f = func(&module, "f");
    // No conversion instruction; the constant was re-typed.
    assert_eq!(f.blocks[0].insts.len(), 1);
    assert_eq!(
        f.blocks[0].insts[0].operands[0],
        IrValue::Int(1, IrType::I64)
    );
}

#[test]
fn test_member_access_uses_field_offset() {
    let module = lower_ok(
        "struct Point { x: i32; y: i32; } fn f() -> i32 { let p: Point = null; return p.y; }",
    );
    let f = func(&module, "f");
    let load = f.blocks[0]
        .insts
        .iter()
        .filter(|i| i.op == Opcode::Load)
        .last()
        .unwrap();
    assert_eq!(load.operands.len(), 2);
    assert_eq!(load.operands[1], IrValue::Int(4, IrType::I64), "offset of y");
    assert_eq!(load.result.as_ref().unwrap().ty, IrType::I32);
}

#[test]
fn test_array_index_scales_by_element_size() {
    let module = lower_ok("fn f() -> i32 { let a: i32[8] = null; return a[2]; }");
    let f = func(&module, "f");
    let load = f.blocks[0]
        .insts
        .iter()
        .filter(|i| i.op == Opcode::Load)
        .last()
        .unwrap();
    assert_eq!(load.operands[1], IrValue::Int(8, IrType::I64));
}

#[test]
fn test_dynamic_index_emits_multiply() {
    let module = lower_ok("fn f(i: i32) -> i32 { let a: i32[8] = null; return a[i]; }");
    let f = func(&module, "f");
    assert!(f.blocks[0].insts.iter().any(|inst| {
        inst.op == Opcode::Mul && inst.operands[1] == IrValue::Int(4, IrType::I64)
    }));
}

#[test]
fn test_enum_variants_are_constants() {
    let module = lower_ok("enum Color { RED, GREEN = 5, BLUE } fn f() -> i32 { return BLUE; }");
    let f = func(&module, "f");
    let ret = f.blocks[0].terminator().unwrap();
    assert_eq!(ret.operands[0], IrValue::Int(6, IrType::I32));
}

#[test]
fn test_division_by_zero_constant_is_emitted_unfolded() {
    let module = lower_ok("fn main() -> i32 { return 1 / 0; }");
    let main = func(&module, "main");
    let div = main.blocks[0]
        .insts
        .iter()
        .find(|i| i.op == Opcode::Div)
        .expect("div instruction present");
    assert_eq!(div.operands[1], IrValue::Int(0, IrType::I32));
}

#[test]
fn test_cjk_program_lowers_like_ascii() {
    let ascii = lower_ok("fn main() -> i32 { return 0; }");
    let cjk = lower_ok("计算 主函数() -> 整数 { 返回 0; }");

    let a = func(&ascii, "main");
    let b = func(&cjk, "主函数");
    assert_eq!(a.return_type, b.return_type);
    assert_eq!(a.blocks.len(), b.blocks.len());
    assert_eq!(a.blocks[0].insts, b.blocks[0].insts);
}

#[test]
fn test_string_literals_are_interned() {
    let module = lower_ok(
        "fn print_string(p: string) -> void extern\nfn main() -> i32 { print_string(\"hi\"); print_string(\"hi\"); return 0; }",
    );
    assert_eq!(module.strings, vec!["hi".to_string()]);
}

#[test]
fn test_inline_asm_instruction() {
    let module = lower_ok(r#"fn f() -> void { asm volatile { "nop", "rax" }; }"#);
    let f = func(&module, "f");
    let asm = f.blocks[0]
        .insts
        .iter()
        .find(|i| i.op == Opcode::Asm)
        .expect("asm instruction");
    let payload = asm.asm.as_ref().unwrap();
    assert_eq!(payload.text, "nop");
    assert!(payload.volatile);
    assert_eq!(payload.clobbers, vec!["rax".to_string()]);
}

#[test]
fn test_shadowed_locals_get_distinct_slots() {
    let module = lower_ok(
        "fn f() -> i32 { let x: i32 = 1; { let x: i32 = 2; x = 3; } return x; }",
    );
    let f = func(&module, "f");
    let allocas: Vec<_> = f.blocks[0]
        .insts
        .iter()
        .filter(|i| i.op == Opcode::Alloca)
        .map(|i| i.result.as_ref().unwrap().name.clone())
        .collect();
    assert_eq!(allocas, vec!["x".to_string(), "x.1".to_string()]);
}

#[test]
fn test_void_function_gets_implicit_return() {
    let module = lower_ok("fn f() -> void { let x: i32 = 1; }");
    let f = func(&module, "f");
    let ret = f.blocks[0].terminator().unwrap();
    assert_eq!(ret.op, Opcode::Ret);
    assert!(ret.operands.is_empty());
}
