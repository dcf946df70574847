//! IR optimisation passes.
//!
//! `optimize` runs in-place over a module at the requested level:
//! level 0 is a no-op, level 1 runs constant folding and dead-code
//! elimination, level 2 adds common-subexpression elimination and
//! loop-header identification, level 3 is reserved and currently
//! behaves like level 2. Observable side effects (stores, calls,
//! returns, inline asm) are always preserved.

use std::collections::{HashMap, HashSet};

use crate::ir::{IrBlock, IrFunction, IrModule, IrValue, Opcode};

/// Counters reported back to the driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptStats {
    pub folded: usize,
    pub eliminated: usize,
    pub merged: usize,
    pub loop_headers: usize,
}

/// Optimise a module in place at the given level.
pub fn optimize(module: &mut IrModule, level: u8) -> OptStats {
    let mut stats = OptStats::default();
    if level == 0 {
        return stats;
    }

    for func in &mut module.functions {
        for block in &mut func.blocks {
            stats.folded += fold_constants(block);
        }
        for block in &mut func.blocks {
            stats.eliminated += eliminate_dead_code(block);
        }

        if level >= 2 {
            for block in &mut func.blocks {
                stats.merged += eliminate_common_subexpressions(block);
            }
            stats.loop_headers += loop_headers(func).len();
        }
    }

    stats
}

/// Block names that head a loop. Identification hook only; no loop
/// transformation is applied.
pub fn loop_headers(func: &IrFunction) -> Vec<&str> {
    func.blocks
        .iter()
        .map(|block| block.name.as_str())
        .filter(|name| name.starts_with("while.cond") || name.starts_with("for.cond"))
        .collect()
}

/// Replace instructions whose operands are all constants with a load of
/// the evaluated constant. Division and remainder by a zero constant
/// are left untouched.
fn fold_constants(block: &mut IrBlock) -> usize {
    let mut folded = 0;
    for inst in &mut block.insts {
        if inst.result.is_none() || !inst.operands.iter().all(IrValue::is_const) {
            continue;
        }

        let value = match inst.operands.as_slice() {
            [a, b] => fold_binary(inst.op, a, b),
            [a] => fold_unary(inst.op, a, inst.result.as_ref().map(|r| r.ty)),
            _ => None,
        };

        if let Some(value) = value {
            inst.op = Opcode::Load;
            inst.operands = vec![value];
            folded += 1;
        }
    }
    folded
}

fn fold_binary(op: Opcode, a: &IrValue, b: &IrValue) -> Option<IrValue> {
    match (a, b) {
        (IrValue::Int(x, ty), IrValue::Int(y, _)) => {
            let (x, y, ty) = (*x, *y, *ty);
            let value = match op {
                Opcode::Add => IrValue::Int(x.wrapping_add(y), ty),
                Opcode::Sub => IrValue::Int(x.wrapping_sub(y), ty),
                Opcode::Mul => IrValue::Int(x.wrapping_mul(y), ty),
                Opcode::Div if y != 0 => IrValue::Int(x.wrapping_div(y), ty),
                Opcode::Mod if y != 0 => IrValue::Int(x.wrapping_rem(y), ty),
                Opcode::And => IrValue::Int(x & y, ty),
                Opcode::Or => IrValue::Int(x | y, ty),
                Opcode::Xor => IrValue::Int(x ^ y, ty),
                Opcode::Shl => IrValue::Int(x.wrapping_shl(y as u32), ty),
                Opcode::Shr => IrValue::Int(x.wrapping_shr(y as u32), ty),
                Opcode::Eq => IrValue::Bool(x == y),
                Opcode::Ne => IrValue::Bool(x != y),
                Opcode::Lt => IrValue::Bool(x < y),
                Opcode::Gt => IrValue::Bool(x > y),
                Opcode::Le => IrValue::Bool(x <= y),
                Opcode::Ge => IrValue::Bool(x >= y),
                _ => return None,
            };
            Some(value)
        }
        (IrValue::Uint(x, ty), IrValue::Uint(y, _)) => {
            let (x, y, ty) = (*x, *y, *ty);
            let value = match op {
                Opcode::Add => IrValue::Uint(x.wrapping_add(y), ty),
                Opcode::Sub => IrValue::Uint(x.wrapping_sub(y), ty),
                Opcode::Mul => IrValue::Uint(x.wrapping_mul(y), ty),
                Opcode::Div if y != 0 => IrValue::Uint(x / y, ty),
                Opcode::Mod if y != 0 => IrValue::Uint(x % y, ty),
                Opcode::And => IrValue::Uint(x & y, ty),
                Opcode::Or => IrValue::Uint(x | y, ty),
                Opcode::Xor => IrValue::Uint(x ^ y, ty),
                Opcode::Shl => IrValue::Uint(x.wrapping_shl(y as u32), ty),
                Opcode::Shr => IrValue::Uint(x.wrapping_shr(y as u32), ty),
                Opcode::Eq => IrValue::Bool(x == y),
                Opcode::Ne => IrValue::Bool(x != y),
                Opcode::Lt => IrValue::Bool(x < y),
                Opcode::Gt => IrValue::Bool(x > y),
                Opcode::Le => IrValue::Bool(x <= y),
                Opcode::Ge => IrValue::Bool(x >= y),
                _ => return None,
            };
            Some(value)
        }
        (IrValue::Float(x, ty), IrValue::Float(y, _)) => {
            let (x, y, ty) = (*x, *y, *ty);
            let value = match op {
                Opcode::Add => IrValue::Float(x + y, ty),
                Opcode::Sub => IrValue::Float(x - y, ty),
                Opcode::Mul => IrValue::Float(x * y, ty),
                Opcode::Eq => IrValue::Bool(x == y),
                Opcode::Ne => IrValue::Bool(x != y),
                Opcode::Lt => IrValue::Bool(x < y),
                Opcode::Gt => IrValue::Bool(x > y),
                Opcode::Le => IrValue::Bool(x <= y),
                Opcode::Ge => IrValue::Bool(x >= y),
                // Float division by zero stays a runtime operation.
                Opcode::Div if y != 0.0 => IrValue::Float(x / y, ty),
                _ => return None,
            };
            Some(value)
        }
        (IrValue::Bool(x), IrValue::Bool(y)) => {
            let (x, y) = (*x, *y);
            let value = match op {
                Opcode::And => IrValue::Bool(x & y),
                Opcode::Or => IrValue::Bool(x | y),
                Opcode::Xor => IrValue::Bool(x ^ y),
                Opcode::Eq => IrValue::Bool(x == y),
                Opcode::Ne => IrValue::Bool(x != y),
                _ => return None,
            };
            Some(value)
        }
        _ => None,
    }
}

fn fold_unary(op: Opcode, a: &IrValue, result_ty: Option<crate::ir::IrType>) -> Option<IrValue> {
    match op {
        Opcode::Neg => match a {
            IrValue::Int(x, ty) => Some(IrValue::Int(x.wrapping_neg(), *ty)),
            IrValue::Float(x, ty) => Some(IrValue::Float(-x, *ty)),
            _ => None,
        },
        Opcode::Not => match a {
            IrValue::Bool(x) => Some(IrValue::Bool(!x)),
            IrValue::Int(x, _) => Some(IrValue::Bool(*x == 0)),
            IrValue::Uint(x, _) => Some(IrValue::Bool(*x == 0)),
            _ => None,
        },
        Opcode::BitNot => match a {
            IrValue::Int(x, ty) => Some(IrValue::Int(!x, *ty)),
            IrValue::Uint(x, ty) => Some(IrValue::Uint(!x, *ty)),
            _ => None,
        },
        Opcode::Trunc
        | Opcode::ZExt
        | Opcode::SExt
        | Opcode::FpToUi
        | Opcode::FpToSi
        | Opcode::UiToFp
        | Opcode::SiToFp
        | Opcode::Bitcast => a.convert_to(result_ty?),
        _ => None,
    }
}

/// Remove instructions whose results feed nothing observable. Liveness
/// is per block and transitive: terminators, stores, calls and inline
/// asm are roots, and any instruction whose result is an operand of a
/// live instruction is live.
fn eliminate_dead_code(block: &mut IrBlock) -> usize {
    let mut live: HashSet<String> = HashSet::new();
    let mut keep = vec![false; block.insts.len()];

    for (i, inst) in block.insts.iter().enumerate().rev() {
        let used = inst
            .result
            .as_ref()
            .is_some_and(|result| live.contains(&result.name));
        if inst.has_side_effect() || used {
            keep[i] = true;
            for operand in &inst.operands {
                if let IrValue::Var(var) = operand {
                    live.insert(var.name.clone());
                }
            }
        }
    }

    let before = block.insts.len();
    let mut index = 0;
    block.insts.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
    before - block.insts.len()
}

/// Merge repeated pure computations within a block. The first
/// occurrence's result is reused and the duplicate removed; later uses
/// are renamed. Loads, stores, calls and allocas are not eligible.
fn eliminate_common_subexpressions(block: &mut IrBlock) -> usize {
    let mut available: HashMap<String, IrValue> = HashMap::new();
    let mut rename: HashMap<String, IrValue> = HashMap::new();
    let mut merged = 0;

    let insts = std::mem::take(&mut block.insts);
    for mut inst in insts {
        for operand in &mut inst.operands {
            if let IrValue::Var(var) = operand {
                if let Some(replacement) = rename.get(&var.name) {
                    *operand = replacement.clone();
                }
            }
        }

        if cse_eligible(inst.op) {
            if let Some(result) = &inst.result {
                let key = expression_key(&inst.op, &inst.operands);
                if let Some(cached) = available.get(&key) {
                    rename.insert(result.name.clone(), cached.clone());
                    merged += 1;
                    continue;
                }
                available.insert(key, IrValue::Var(result.clone()));
            }
        }

        block.insts.push(inst);
    }

    merged
}

fn cse_eligible(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Neg
            | Opcode::Not
            | Opcode::BitNot
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Trunc
            | Opcode::ZExt
            | Opcode::SExt
            | Opcode::FpToUi
            | Opcode::FpToSi
            | Opcode::UiToFp
            | Opcode::SiToFp
            | Opcode::Bitcast
    )
}

fn expression_key(op: &Opcode, operands: &[IrValue]) -> String {
    let mut key = op.as_str().to_string();
    for operand in operands {
        key.push(':');
        key.push_str(&operand.to_string());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{lower_program, Architecture, IrModule, OutputFormat};
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower(source: &str) -> IrModule {
        let tokens = Lexer::new(source).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        let (module, errors) = lower_program(&program, Architecture::X64, OutputFormat::Elf);
        assert!(errors.is_empty(), "{:?}", errors);
        module
    }

    fn count_ops(module: &IrModule, op: Opcode) -> usize {
        module
            .functions
            .iter()
            .flat_map(|f| &f.blocks)
            .flat_map(|b| &b.insts)
            .filter(|i| i.op == op)
            .count()
    }

    #[test]
    fn test_level_zero_is_noop() {
        let mut module = lower("fn f() -> i32 { let x: i32 = 1 + 2; return x; }");
        let before = module.dump();
        let stats = optimize(&mut module, 0);
        assert_eq!(module.dump(), before);
        assert_eq!(stats, OptStats::default());
    }

    #[test]
    fn test_constant_folding_replaces_add_with_load() {
        let mut module = lower("fn f() -> i32 { let x: i32 = 1 + 2; return x; }");
        optimize(&mut module, 1);

        assert_eq!(count_ops(&module, Opcode::Add), 0);
        // The store now receives the folded constant through its load.
        let f = &module.functions[0];
        let load = f.blocks[0]
            .insts
            .iter()
            .find(|i| i.op == Opcode::Load && i.operands[0].is_const())
            .expect("folded constant load");
        assert_eq!(load.operands[0], IrValue::Int(3, crate::ir::IrType::I32));
    }

    #[test]
    fn test_fold_matches_interpretation() {
        use crate::ir::IrType;
        let cases: &[(Opcode, i64, i64, i64)] = &[
            (Opcode::Add, 7, 5, 12),
            (Opcode::Sub, 7, 5, 2),
            (Opcode::Mul, 7, 5, 35),
            (Opcode::Div, 7, 5, 1),
            (Opcode::Mod, 7, 5, 2),
            (Opcode::And, 6, 3, 2),
            (Opcode::Or, 6, 3, 7),
            (Opcode::Xor, 6, 3, 5),
            (Opcode::Shl, 3, 2, 12),
            (Opcode::Shr, 12, 2, 3),
        ];
        for (op, x, y, expected) in cases {
            let folded = fold_binary(
                *op,
                &IrValue::Int(*x, IrType::I32),
                &IrValue::Int(*y, IrType::I32),
            );
            assert_eq!(
                folded,
                Some(IrValue::Int(*expected, IrType::I32)),
                "{:?}",
                op
            );
        }

        assert_eq!(
            fold_binary(
                Opcode::Lt,
                &IrValue::Int(1, IrType::I32),
                &IrValue::Int(2, IrType::I32)
            ),
            Some(IrValue::Bool(true))
        );
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        let mut module = lower("fn main() -> i32 { return 1 / 0; }");
        let stats = optimize(&mut module, 1);
        assert_eq!(stats.folded, 0);
        assert_eq!(count_ops(&module, Opcode::Div), 1);

        let mut module = lower("fn main() -> i32 { return 1 % 0; }");
        optimize(&mut module, 1);
        assert_eq!(count_ops(&module, Opcode::Mod), 1);
    }

    #[test]
    fn test_dce_removes_unused_computation() {
        let mut module = lower("fn f(a: i32) -> i32 { a + 1; return a; }");
        let before_adds = count_ops(&module, Opcode::Add);
        assert_eq!(before_adds, 1);

        optimize(&mut module, 1);
        assert_eq!(count_ops(&module, Opcode::Add), 0);
    }

    #[test]
    fn test_dce_keeps_transitive_chain_feeding_store() {
        let mut module = lower(
            "fn f(a: i32) -> i32 { let b: i32 = (a + 1) * 3; return b; }",
        );
        optimize(&mut module, 1);
        // Both the add and the mul feed the store through the chain.
        assert_eq!(count_ops(&module, Opcode::Add), 1);
        assert_eq!(count_ops(&module, Opcode::Mul), 1);
    }

    #[test]
    fn test_dce_preserves_side_effects() {
        let source = "fn print_int(n: i32) -> void extern\nfn f(a: i32) -> i32 { print_int(a); a + 1; return a; }";
        let mut module = lower(source);
        let stores_before = count_ops(&module, Opcode::Store);
        let calls_before = count_ops(&module, Opcode::Call);
        let rets_before = count_ops(&module, Opcode::Ret);

        optimize(&mut module, 2);

        assert_eq!(count_ops(&module, Opcode::Store), stores_before);
        assert_eq!(count_ops(&module, Opcode::Call), calls_before);
        assert_eq!(count_ops(&module, Opcode::Ret), rets_before);
    }

    #[test]
    fn test_cse_merges_duplicate_expressions() {
        use crate::ir::{IrBlock, IrInst, IrType, IrVar};

        let a = || IrValue::Var(IrVar::new("a", IrType::I32));
        let b = || IrValue::Var(IrVar::new("b", IrType::I32));
        let mut block = IrBlock {
            name: "entry".to_string(),
            insts: vec![
                IrInst::binary(Opcode::Add, IrVar::new("t0", IrType::I32), a(), b()),
                IrInst::binary(Opcode::Add, IrVar::new("t1", IrType::I32), a(), b()),
                IrInst::binary(
                    Opcode::Mul,
                    IrVar::new("t2", IrType::I32),
                    IrValue::Var(IrVar::new("t0", IrType::I32)),
                    IrValue::Var(IrVar::new("t1", IrType::I32)),
                ),
                IrInst::ret(Some(IrValue::Var(IrVar::new("t2", IrType::I32)))),
            ],
        };

        let merged = eliminate_common_subexpressions(&mut block);
        assert_eq!(merged, 1);
        assert_eq!(block.insts.len(), 3);

        // The duplicate add is gone and the multiply now reads the
        // first result twice.
        let mul = &block.insts[1];
        assert_eq!(mul.operands[0].to_string(), "%t0");
        assert_eq!(mul.operands[1].to_string(), "%t0");
    }

    #[test]
    fn test_cse_does_not_merge_loads() {
        // Loads may alias stores, so both must survive.
        let mut module = lower(
            "fn f(a: i32) -> i32 { let x: i32 = a; let y: i32 = a; return x + y; }",
        );
        let loads_before = count_ops(&module, Opcode::Load);
        optimize(&mut module, 2);
        assert_eq!(count_ops(&module, Opcode::Load), loads_before);
    }

    #[test]
    fn test_loop_header_identification() {
        let module = lower(
            "fn f(n: i32) -> i32 { let mut i: i32 = 0; while (i < n) { i = i + 1; } for (; i > 0; i = i - 1) { } return i; }",
        );
        let headers = loop_headers(&module.functions[0]);
        assert_eq!(headers.len(), 2);
        assert!(headers[0].starts_with("while.cond"));
        assert!(headers[1].starts_with("for.cond"));
    }

    #[test]
    fn test_optimize_is_idempotent() {
        for level in [1, 2] {
            let mut module = lower(
                "fn g(n: i32) -> i32 { let mut s: i32 = 0; let x: i32 = 2 + 3; while (s < n) { s = s + x; } n + 1; return s; }",
            );
            optimize(&mut module, level);
            let once = module.dump();
            optimize(&mut module, level);
            assert_eq!(module.dump(), once, "level {} not idempotent", level);
        }
    }
}
