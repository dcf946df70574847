//! AArch64 backend. AAPCS calling convention.
//!
//! x16/x17 are the intra-procedure-call scratch registers, d0/d1 carry
//! float operands, and the temporary pool is x9..x15. Stack slots are
//! addressed sp-relative so loads stay in the scaled-immediate range.

use super::regs::{Loc, RegInfo};
use super::{block_label, Frame, Isa, Operand};
use crate::ir::{IrFunction, IrInst, IrModule, IrType, IrValue, Opcode, OutputFormat};

pub struct Arm64;

/// Register description table.
#[allow(dead_code)]
pub(crate) const REGISTERS: &[RegInfo] = &[
    RegInfo { name: "x0", caller_save: true, size: 8 },
    RegInfo { name: "x1", caller_save: true, size: 8 },
    RegInfo { name: "x2", caller_save: true, size: 8 },
    RegInfo { name: "x3", caller_save: true, size: 8 },
    RegInfo { name: "x4", caller_save: true, size: 8 },
    RegInfo { name: "x5", caller_save: true, size: 8 },
    RegInfo { name: "x6", caller_save: true, size: 8 },
    RegInfo { name: "x7", caller_save: true, size: 8 },
    RegInfo { name: "x9", caller_save: true, size: 8 },
    RegInfo { name: "x10", caller_save: true, size: 8 },
    RegInfo { name: "x11", caller_save: true, size: 8 },
    RegInfo { name: "x12", caller_save: true, size: 8 },
    RegInfo { name: "x13", caller_save: true, size: 8 },
    RegInfo { name: "x14", caller_save: true, size: 8 },
    RegInfo { name: "x15", caller_save: true, size: 8 },
    RegInfo { name: "x16", caller_save: true, size: 8 },
    RegInfo { name: "x17", caller_save: true, size: 8 },
    RegInfo { name: "x19", caller_save: false, size: 8 },
    RegInfo { name: "x20", caller_save: false, size: 8 },
    RegInfo { name: "x29", caller_save: false, size: 8 },
    RegInfo { name: "x30", caller_save: false, size: 8 },
];

/// Caller-save registers handed to temporaries, in allocation order.
const POOL: &[usize] = &[9, 10, 11, 12, 13, 14, 15];

impl Isa for Arm64 {
    const TEMP_POOL: usize = POOL.len();
    const MAX_REG_ARGS: usize = 8;

    fn file_header(module: &IrModule, out: &mut String) {
        out.push_str(&format!(
            "// target: {} ({})\n\n",
            module.arch.triple(),
            format_name(module.format)
        ));
    }

    fn data_sections(module: &IrModule, out: &mut String) {
        if !module.strings.is_empty() {
            out.push_str(".section .rodata\n");
            for (i, s) in module.strings.iter().enumerate() {
                out.push_str(&format!(".str{}:\n    .asciz \"{}\"\n", i, s));
            }
        }
        if !module.globals.is_empty() {
            out.push_str(".data\n");
            for global in &module.globals {
                out.push_str(&format!(
                    "{}:\n    .zero {}\n",
                    global.name,
                    global.ty.size().max(1)
                ));
            }
        }
        out.push_str(".text\n");
    }

    fn prologue(func: &IrFunction, frame: &Frame, out: &mut String) {
        out.push_str(&format!(".globl {}\n{}:\n", func.name, func.name));
        out.push_str("    stp x29, x30, [sp, #-16]!\n    mov x29, sp\n");
        if frame.frame_size > 0 {
            out.push_str(&format!("    sub sp, sp, #{}\n", frame.frame_size));
        }
        for (i, (ty, name)) in func.params.iter().enumerate() {
            if let Some(slot) = frame.slot(name) {
                let size = ty.size().max(1);
                let pos = frame.frame_size - slot.offset;
                out.push_str(&format!(
                    "    {} {}, [sp, #{}]\n",
                    store_mnemonic(size),
                    reg(i, size),
                    pos
                ));
            }
        }
    }

    fn emit_inst(
        func: &IrFunction,
        frame: &mut Frame,
        inst: &IrInst,
        out: &mut String,
    ) -> Result<(), String> {
        emit(func, frame, inst, out)
    }
}

fn format_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Elf => "elf",
        OutputFormat::Pe => "pe",
        OutputFormat::Efi => "efi",
        OutputFormat::Raw => "raw",
    }
}

/// Sized name of a general-purpose register.
fn reg(number: usize, size: usize) -> String {
    if size <= 4 {
        format!("w{}", number)
    } else {
        format!("x{}", number)
    }
}

fn pool_reg(index: usize, size: usize) -> String {
    reg(POOL[index], size)
}

fn load_mnemonic(size: usize, signed: bool, to: usize) -> &'static str {
    match (size, signed) {
        (1, true) => "ldrsb",
        (1, false) => "ldrb",
        (2, true) => "ldrsh",
        (2, false) => "ldrh",
        (4, true) if to == 8 => "ldrsw",
        _ => "ldr",
    }
}

fn store_mnemonic(size: usize) -> &'static str {
    match size {
        1 => "strb",
        2 => "strh",
        _ => "str",
    }
}

/// Operation width: byte and word values compute at 32 bits.
fn op_size(ty: IrType) -> usize {
    ty.size().clamp(4, 8)
}

/// sp-relative position of a frame offset.
fn pos(frame: &Frame, offset: i64) -> i64 {
    frame.frame_size - offset
}

/// Materialise an operand into scratch register `n` (or return the
/// pool register already holding it). Returns the sized name.
fn load_gp(
    frame: &Frame,
    n: usize,
    op: &Operand,
    size: usize,
    signed: bool,
    out: &mut String,
) -> Result<String, String> {
    match op {
        Operand::Reg(index, _) => Ok(pool_reg(*index, size)),
        _ => move_gp(frame, n, op, size, signed, out),
    }
}

/// Materialise an operand into register `n` unconditionally.
fn move_gp(
    frame: &Frame,
    n: usize,
    op: &Operand,
    size: usize,
    signed: bool,
    out: &mut String,
) -> Result<String, String> {
    let dst = reg(n, size);
    match op {
        Operand::Imm(v) => {
            if (0..=65535).contains(v) || (-65536..0).contains(v) {
                out.push_str(&format!("    mov {}, #{}\n", dst, v));
            } else {
                out.push_str(&format!("    ldr {}, ={}\n", reg(n, 8), v));
            }
        }
        Operand::Reg(index, rsize) => {
            if *rsize < size && signed {
                let widen = match *rsize {
                    1 => "sxtb",
                    2 => "sxth",
                    _ => "sxtw",
                };
                out.push_str(&format!("    {} {}, {}\n", widen, dst, pool_reg(*index, 4)));
            } else {
                out.push_str(&format!("    mov {}, {}\n", dst, pool_reg(*index, size)));
            }
        }
        Operand::Mem(offset, msize) => {
            let mnemonic = load_mnemonic((*msize).min(size), signed, size);
            out.push_str(&format!(
                "    {} {}, [sp, #{}]\n",
                mnemonic,
                dst,
                pos(frame, *offset)
            ));
        }
        Operand::Sym(name) => {
            let wide = reg(n, 8);
            out.push_str(&format!(
                "    adrp {}, {}\n    add {}, {}, :lo12:{}\n",
                wide, name, wide, wide, name
            ));
        }
        Operand::FloatBits(_, _) => {
            return Err("float value in integer context".to_string());
        }
    }
    Ok(dst)
}

/// Materialise a float operand into FP register `d<n>`/`s<n>`.
fn load_f(
    frame: &Frame,
    n: usize,
    op: &Operand,
    ty: IrType,
    out: &mut String,
) -> Result<String, String> {
    let dst = if ty == IrType::F32 {
        format!("s{}", n)
    } else {
        format!("d{}", n)
    };
    match op {
        Operand::Mem(offset, _) => {
            out.push_str(&format!("    ldr {}, [sp, #{}]\n", dst, pos(frame, *offset)));
        }
        Operand::FloatBits(bits, _) => {
            if ty == IrType::F32 {
                out.push_str(&format!("    ldr w16, ={}\n    fmov {}, w16\n", bits, dst));
            } else {
                out.push_str(&format!("    ldr x16, ={}\n    fmov {}, x16\n", bits, dst));
            }
        }
        Operand::Imm(v) => {
            out.push_str(&format!("    ldr x16, ={}\n    scvtf {}, x16\n", v, dst));
        }
        _ => return Err("unsupported float operand".to_string()),
    }
    Ok(dst)
}

/// Store the value in register `src` to a destination location.
fn finish(frame: &Frame, src: &str, dst: &Loc, size: usize, out: &mut String) {
    if let Loc::Stack(offset) = dst {
        out.push_str(&format!(
            "    {} {}, [sp, #{}]\n",
            store_mnemonic(size),
            src,
            pos(frame, *offset)
        ));
    }
}

/// The register a destination computes in: its pool register, or x16
/// when spilled.
fn work_reg(dst: &Loc, size: usize) -> String {
    match dst {
        Loc::Reg(index) => pool_reg(*index, size),
        Loc::Stack(_) => reg(16, size),
    }
}

fn float_suffixed(ty: IrType, n: usize) -> String {
    if ty == IrType::F32 {
        format!("s{}", n)
    } else {
        format!("d{}", n)
    }
}

fn emit(
    func: &IrFunction,
    frame: &mut Frame,
    inst: &IrInst,
    out: &mut String,
) -> Result<(), String> {
    match inst.op {
        Opcode::Alloca => Ok(()),

        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Shr => emit_alu(frame, inst, out),
        Opcode::Mod => emit_mod(frame, inst, out),
        Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => {
            emit_compare(frame, inst, out)
        }
        Opcode::Neg | Opcode::Not | Opcode::BitNot => emit_unary(frame, inst, out),
        Opcode::Load => emit_load(frame, inst, out),
        Opcode::Store => emit_store(frame, inst, out),
        Opcode::Br => {
            out.push_str(&format!(
                "    b {}\n",
                block_label(&func.name, &inst.targets[0])
            ));
            Ok(())
        }
        Opcode::CondBr => {
            let cond = frame.operand(&inst.operands[0])?;
            let cond_reg = move_gp(frame, 16, &cond, 4, false, out)?;
            out.push_str(&format!(
                "    cbnz {}, {}\n    b {}\n",
                cond_reg,
                block_label(&func.name, &inst.targets[0]),
                block_label(&func.name, &inst.targets[1])
            ));
            Ok(())
        }
        Opcode::Call => emit_call(frame, inst, out),
        Opcode::Ret => {
            if let Some(value) = inst.operands.first() {
                let ty = value.ty();
                let op = frame.operand(value)?;
                if ty.is_float() {
                    let src = load_f(frame, 2, &op, ty, out)?;
                    out.push_str(&format!("    fmov {}, {}\n", float_suffixed(ty, 0), src));
                } else {
                    move_gp(frame, 0, &op, op_size(ty), ty.is_signed(), out)?;
                }
            }
            out.push_str("    mov sp, x29\n    ldp x29, x30, [sp], #16\n    ret\n");
            Ok(())
        }
        Opcode::Trunc
        | Opcode::ZExt
        | Opcode::SExt
        | Opcode::FpToUi
        | Opcode::FpToSi
        | Opcode::UiToFp
        | Opcode::SiToFp
        | Opcode::Bitcast => emit_conversion(frame, inst, out),
        Opcode::Asm => {
            let asm = inst.asm.as_ref().ok_or("asm instruction without payload")?;
            out.push_str("    // inline asm\n");
            if asm.volatile {
                out.push_str("    // volatile\n");
            }
            for line in asm.text.lines() {
                out.push_str(&format!("    {}\n", line));
            }
            if !asm.clobbers.is_empty() {
                out.push_str(&format!("    // clobbers: {}\n", asm.clobbers.join(", ")));
            }
            out.push_str("    // end inline asm\n");
            Ok(())
        }
        Opcode::Phi => Err("phi is not supported by the arm64 backend".to_string()),
    }
}

fn emit_alu(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("alu without result")?;

    if result.ty.is_float() {
        return emit_float_alu(frame, inst, out);
    }

    let size = op_size(result.ty);
    let signed = result.ty.is_signed();
    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;
    let dst = frame.dest(result);
    let work = work_reg(&dst, size);

    let a = load_gp(frame, 16, &lhs, size, signed, out)?;

    let mnemonic = match inst.op {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div if signed => "sdiv",
        Opcode::Div => "udiv",
        Opcode::And => "and",
        Opcode::Or => "orr",
        Opcode::Xor => "eor",
        Opcode::Shl => "lsl",
        Opcode::Shr if signed => "asr",
        Opcode::Shr => "lsr",
        _ => unreachable!(),
    };

    // Small immediates render as #imm for add/sub.
    if let (Operand::Imm(v), "add" | "sub") = (&rhs, mnemonic) {
        if (0..=4095).contains(v) {
            out.push_str(&format!("    {} {}, {}, #{}\n", mnemonic, work, a, v));
            finish(frame, &work, &dst, size, out);
            return Ok(());
        }
    }

    let b = load_gp(frame, 17, &rhs, size, signed, out)?;
    out.push_str(&format!("    {} {}, {}, {}\n", mnemonic, work, a, b));
    finish(frame, &work, &dst, size, out);
    Ok(())
}

fn emit_float_alu(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("alu without result")?;
    let ty = result.ty;

    let mnemonic = match inst.op {
        Opcode::Add => "fadd",
        Opcode::Sub => "fsub",
        Opcode::Mul => "fmul",
        Opcode::Div => "fdiv",
        _ => return Err("float remainder is not encodable".to_string()),
    };

    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;
    let a = load_f(frame, 0, &lhs, ty, out)?;
    let b = load_f(frame, 1, &rhs, ty, out)?;
    out.push_str(&format!("    {} {}, {}, {}\n", mnemonic, a, a, b));

    let Loc::Stack(offset) = frame.dest(result) else {
        return Err("float temporary not in a frame slot".to_string());
    };
    out.push_str(&format!("    str {}, [sp, #{}]\n", a, pos(frame, offset)));
    Ok(())
}

/// Remainder: a - (a / b) * b, computed in the scratch registers.
fn emit_mod(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("mod without result")?;
    if result.ty.is_float() {
        return Err("float remainder is not encodable".to_string());
    }

    let size = op_size(result.ty);
    let signed = result.ty.is_signed();
    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;
    let dst = frame.dest(result);
    let work = work_reg(&dst, size);

    let a = move_gp(frame, 16, &lhs, size, signed, out)?;
    let b = move_gp(frame, 17, &rhs, size, signed, out)?;
    let div = if signed { "sdiv" } else { "udiv" };
    out.push_str(&format!("    {} {}, {}, {}\n", div, a, a, b));
    out.push_str(&format!("    mul {}, {}, {}\n", a, a, b));
    let a2 = move_gp(frame, 17, &lhs, size, signed, out)?;
    // x17 now holds the dividend again; x16 holds (a / b) * b.
    out.push_str(&format!("    sub {}, {}, {}\n", work, a2, a));
    finish(frame, &work, &dst, size, out);
    Ok(())
}

fn emit_compare(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("comparison without result")?;
    let ty = inst.operands[0].ty();

    let cc = if ty.is_float() || ty.is_signed() {
        match inst.op {
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            _ => unreachable!(),
        }
    } else {
        match inst.op {
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lo",
            Opcode::Gt => "hi",
            Opcode::Le => "ls",
            Opcode::Ge => "hs",
            _ => unreachable!(),
        }
    };

    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;

    if ty.is_float() {
        let a = load_f(frame, 0, &lhs, ty, out)?;
        let b = load_f(frame, 1, &rhs, ty, out)?;
        out.push_str(&format!("    fcmp {}, {}\n", a, b));
    } else {
        let size = op_size(ty);
        let a = load_gp(frame, 16, &lhs, size, ty.is_signed(), out)?;
        if let Operand::Imm(v) = &rhs {
            if (0..=4095).contains(v) {
                out.push_str(&format!("    cmp {}, #{}\n", a, v));
                let dst = frame.dest(result);
                let work = work_reg(&dst, 4);
                out.push_str(&format!("    cset {}, {}\n", work, cc));
                finish(frame, &work, &dst, 1, out);
                return Ok(());
            }
        }
        let b = load_gp(frame, 17, &rhs, size, ty.is_signed(), out)?;
        out.push_str(&format!("    cmp {}, {}\n", a, b));
    }

    let dst = frame.dest(result);
    let work = work_reg(&dst, 4);
    out.push_str(&format!("    cset {}, {}\n", work, cc));
    finish(frame, &work, &dst, 1, out);
    Ok(())
}

fn emit_unary(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("unary without result")?;
    let src_ty = inst.operands[0].ty();
    let src = frame.operand(&inst.operands[0])?;

    if result.ty.is_float() && inst.op == Opcode::Neg {
        let a = load_f(frame, 0, &src, result.ty, out)?;
        out.push_str(&format!("    fneg {}, {}\n", a, a));
        let Loc::Stack(offset) = frame.dest(result) else {
            return Err("float temporary not in a frame slot".to_string());
        };
        out.push_str(&format!("    str {}, [sp, #{}]\n", a, pos(frame, offset)));
        return Ok(());
    }

    let dst = frame.dest(result);

    match inst.op {
        Opcode::Neg | Opcode::BitNot => {
            let size = op_size(result.ty);
            let work = work_reg(&dst, size);
            let a = load_gp(frame, 16, &src, size, result.ty.is_signed(), out)?;
            let mnemonic = if inst.op == Opcode::Neg { "neg" } else { "mvn" };
            out.push_str(&format!("    {} {}, {}\n", mnemonic, work, a));
            finish(frame, &work, &dst, size, out);
        }
        Opcode::Not => {
            let size = op_size(src_ty);
            let work = work_reg(&dst, 4);
            let a = load_gp(frame, 16, &src, size, src_ty.is_signed(), out)?;
            out.push_str(&format!("    cmp {}, #0\n", a));
            out.push_str(&format!("    cset {}, eq\n", work));
            finish(frame, &work, &dst, 1, out);
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn emit_load(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("load without result")?;
    let ty = result.ty;

    // Folded constant: the single operand is the value itself.
    if inst.operands.len() == 1 && inst.operands[0].is_const() {
        let op = frame.operand(&inst.operands[0])?;
        if ty.is_float() {
            let a = load_f(frame, 0, &op, ty, out)?;
            let Loc::Stack(offset) = frame.dest(result) else {
                return Err("float temporary not in a frame slot".to_string());
            };
            out.push_str(&format!("    str {}, [sp, #{}]\n", a, pos(frame, offset)));
        } else {
            let dst = frame.dest(result);
            let work = work_reg(&dst, op_size(ty));
            let loaded = move_gp(frame, 16, &op, op_size(ty), ty.is_signed(), out)?;
            if loaded != work {
                out.push_str(&format!("    mov {}, {}\n", work, loaded));
            }
            finish(frame, &work, &dst, op_size(ty), out);
        }
        return Ok(());
    }

    let IrValue::Var(slot_var) = &inst.operands[0] else {
        if let IrValue::Global(var) = &inst.operands[0] {
            let dst = frame.dest(result);
            let work = work_reg(&dst, 8);
            out.push_str(&format!(
                "    adrp {}, {}\n    add {}, {}, :lo12:{}\n",
                work, var.name, work, work, var.name
            ));
            if ty != IrType::Pointer {
                out.push_str(&format!(
                    "    {} {}, [{}]\n",
                    load_mnemonic(ty.size().max(1), ty.is_signed(), op_size(ty)),
                    work_reg(&dst, op_size(ty)),
                    work
                ));
            }
            finish(frame, &work_reg(&dst, op_size(ty)), &dst, op_size(ty), out);
            return Ok(());
        }
        return Err("load from a non-slot operand".to_string());
    };

    let slot = frame
        .slot(&slot_var.name)
        .ok_or_else(|| format!("load from unknown slot '%{}'", slot_var.name))?;

    match inst.operands.get(1) {
        // Plain slot load.
        None => {
            if ty.is_float() {
                let a = float_suffixed(ty, 0);
                out.push_str(&format!(
                    "    ldr {}, [sp, #{}]\n",
                    a,
                    pos(frame, slot.offset)
                ));
                let Loc::Stack(offset) = frame.dest(result) else {
                    return Err("float temporary not in a frame slot".to_string());
                };
                out.push_str(&format!("    str {}, [sp, #{}]\n", a, pos(frame, offset)));
            } else {
                let dst = frame.dest(result);
                let work = work_reg(&dst, op_size(ty));
                out.push_str(&format!(
                    "    {} {}, [sp, #{}]\n",
                    load_mnemonic(ty.size().max(1), ty.is_signed(), op_size(ty)),
                    work,
                    pos(frame, slot.offset)
                ));
                finish(frame, &work, &dst, op_size(ty), out);
            }
            Ok(())
        }
        // Indexed load: base slot plus byte offset.
        Some(offset_value) => {
            let offset = frame.operand(offset_value)?;
            element_address(frame, slot.offset, &offset, out)?;
            if ty.is_float() {
                let a = float_suffixed(ty, 0);
                out.push_str(&format!("    ldr {}, [x16]\n", a));
                let Loc::Stack(spill) = frame.dest(result) else {
                    return Err("float temporary not in a frame slot".to_string());
                };
                out.push_str(&format!("    str {}, [sp, #{}]\n", a, pos(frame, spill)));
            } else {
                let dst = frame.dest(result);
                let work = work_reg(&dst, op_size(ty));
                out.push_str(&format!(
                    "    {} {}, [x16]\n",
                    load_mnemonic(ty.size().max(1), ty.is_signed(), op_size(ty)),
                    work
                ));
                finish(frame, &work, &dst, op_size(ty), out);
            }
            Ok(())
        }
    }
}

/// Leave the address of an indexed slot element in x16.
fn element_address(
    frame: &Frame,
    slot_offset: i64,
    offset: &Operand,
    out: &mut String,
) -> Result<(), String> {
    out.push_str(&format!("    add x16, sp, #{}\n", pos(frame, slot_offset)));
    match offset {
        Operand::Imm(v) if *v == 0 => {}
        Operand::Imm(v) if (0..=4095).contains(v) => {
            out.push_str(&format!("    add x16, x16, #{}\n", v));
        }
        other => {
            move_gp(frame, 17, other, 8, false, out)?;
            out.push_str("    add x16, x16, x17\n");
        }
    }
    Ok(())
}

fn emit_store(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let value = &inst.operands[0];
    let ty = value.ty();
    let size = ty.size().max(1);

    let IrValue::Var(slot_var) = &inst.operands[1] else {
        return Err("store to a non-slot operand".to_string());
    };
    let slot = frame
        .slot(&slot_var.name)
        .ok_or_else(|| format!("store to unknown slot '%{}'", slot_var.name))?;

    let op = frame.operand(value)?;

    match inst.operands.get(2) {
        None => {
            if ty.is_float() {
                let a = load_f(frame, 0, &op, ty, out)?;
                out.push_str(&format!(
                    "    str {}, [sp, #{}]\n",
                    a,
                    pos(frame, slot.offset)
                ));
            } else {
                let src = load_gp(frame, 16, &op, size.max(4), ty.is_signed(), out)?;
                // Narrow stores need the 32-bit register name.
                let src = if size <= 4 { demote(&src) } else { src };
                out.push_str(&format!(
                    "    {} {}, [sp, #{}]\n",
                    store_mnemonic(size),
                    src,
                    pos(frame, slot.offset)
                ));
            }
            Ok(())
        }
        Some(offset_value) => {
            let offset = frame.operand(offset_value)?;
            if ty.is_float() {
                // Value into d0 first; its load scratches x16, which
                // the address computation then claims.
                let a = load_f(frame, 0, &op, ty, out)?;
                element_address(frame, slot.offset, &offset, out)?;
                out.push_str(&format!("    str {}, [x16]\n", a));
            } else {
                // Address first (x16, scratching x17), then the value
                // goes through the freed x17.
                element_address(frame, slot.offset, &offset, out)?;
                let src = move_gp(frame, 17, &op, size.max(4), ty.is_signed(), out)?;
                let src = if size <= 4 { demote(&src) } else { src };
                out.push_str(&format!("    {} {}, [x16]\n", store_mnemonic(size), src));
            }
            Ok(())
        }
    }
}

/// 32-bit name of a register already named at some width.
fn demote(name: &str) -> String {
    name.replacen('x', "w", 1)
}

fn emit_call(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let IrValue::Global(callee) = &inst.operands[0] else {
        return Err("indirect calls are not supported".to_string());
    };

    let mut int_index = 0;
    let mut float_index = 0;
    for arg in &inst.operands[1..] {
        let ty = arg.ty();
        let op = frame.operand(arg)?;
        if ty.is_float() {
            if float_index >= 8 {
                return Err("more than 8 float arguments are not supported".to_string());
            }
            let src = load_f(frame, 2, &op, ty, out)?;
            out.push_str(&format!(
                "    fmov {}, {}\n",
                float_suffixed(ty, float_index),
                src
            ));
            float_index += 1;
        } else {
            if int_index >= 8 {
                return Err("more than 8 integer arguments are not supported".to_string());
            }
            move_gp(frame, int_index, &op, op_size(ty), ty.is_signed(), out)?;
            int_index += 1;
        }
    }

    out.push_str(&format!("    bl {}\n", callee.name));

    if let Some(result) = &inst.result {
        let ty = result.ty;
        if ty.is_float() {
            let Loc::Stack(offset) = frame.dest(result) else {
                return Err("float temporary not in a frame slot".to_string());
            };
            out.push_str(&format!(
                "    str {}, [sp, #{}]\n",
                float_suffixed(ty, 0),
                pos(frame, offset)
            ));
        } else {
            let dst = frame.dest(result);
            let size = op_size(ty);
            let work = work_reg(&dst, size);
            out.push_str(&format!("    mov {}, {}\n", work, reg(0, size)));
            finish(frame, &work, &dst, size, out);
        }
    }
    Ok(())
}

fn emit_conversion(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("conversion without result")?;
    let to = result.ty;
    let from = inst.operands[0].ty();
    let src = frame.operand(&inst.operands[0])?;

    if to.is_float() {
        let Loc::Stack(offset) = frame.dest(result) else {
            return Err("float temporary not in a frame slot".to_string());
        };
        let dst_f = float_suffixed(to, 0);

        if from.is_float() {
            let a = load_f(frame, 1, &src, from, out)?;
            if from != to {
                // fcvt converts between the two float widths.
                out.push_str(&format!("    fcvt {}, {}\n", dst_f, a));
            } else {
                out.push_str(&format!("    fmov {}, {}\n", dst_f, a));
            }
        } else {
            let signed = matches!(inst.op, Opcode::SiToFp) || from.is_signed();
            let wide = move_gp(frame, 16, &src, 8, signed, out)?;
            let convert = if signed { "scvtf" } else { "ucvtf" };
            out.push_str(&format!("    {} {}, {}\n", convert, dst_f, wide));
        }
        out.push_str(&format!("    str {}, [sp, #{}]\n", dst_f, pos(frame, offset)));
        return Ok(());
    }

    let dst = frame.dest(result);
    let size = op_size(to);
    let work = work_reg(&dst, size);

    if from.is_float() {
        let a = load_f(frame, 0, &src, from, out)?;
        let convert = if matches!(inst.op, Opcode::FpToUi) {
            "fcvtzu"
        } else {
            "fcvtzs"
        };
        out.push_str(&format!("    {} {}, {}\n", convert, work, a));
        finish(frame, &work, &dst, size, out);
        return Ok(());
    }

    let signed = matches!(inst.op, Opcode::SExt);
    let loaded = move_gp(frame, 16, &src, size, signed, out)?;
    if loaded != work {
        out.push_str(&format!("    mov {}, {}\n", work, loaded));
    }
    finish(frame, &work, &dst, size, out);
    Ok(())
}
