//! x86-64 backend. System-V calling convention, Intel syntax.
//!
//! rax/rdx serve division, rcx shifts, r10/r11 are scratch and xmm0/xmm1
//! carry float operands, so the temporary pool is the remaining
//! caller-save registers.

use super::regs::{Loc, RegInfo};
use super::{block_label, Frame, Isa, Operand};
use crate::ir::{IrFunction, IrInst, IrModule, IrType, IrValue, Opcode, OutputFormat};

pub struct X64;

/// Register description table.
#[allow(dead_code)]
pub(crate) const REGISTERS: &[RegInfo] = &[
    RegInfo { name: "rax", caller_save: true, size: 8 },
    RegInfo { name: "rbx", caller_save: false, size: 8 },
    RegInfo { name: "rcx", caller_save: true, size: 8 },
    RegInfo { name: "rdx", caller_save: true, size: 8 },
    RegInfo { name: "rsi", caller_save: true, size: 8 },
    RegInfo { name: "rdi", caller_save: true, size: 8 },
    RegInfo { name: "rbp", caller_save: false, size: 8 },
    RegInfo { name: "rsp", caller_save: false, size: 8 },
    RegInfo { name: "r8", caller_save: true, size: 8 },
    RegInfo { name: "r9", caller_save: true, size: 8 },
    RegInfo { name: "r10", caller_save: true, size: 8 },
    RegInfo { name: "r11", caller_save: true, size: 8 },
    RegInfo { name: "r12", caller_save: false, size: 8 },
    RegInfo { name: "r13", caller_save: false, size: 8 },
    RegInfo { name: "r14", caller_save: false, size: 8 },
    RegInfo { name: "r15", caller_save: false, size: 8 },
];

/// Caller-save registers handed to temporaries, in allocation order.
const POOL: &[&str] = &["r8", "r9", "rsi", "rdi"];

const ARG_REGS: &[&str] = &["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

impl Isa for X64 {
    const TEMP_POOL: usize = POOL.len();
    const MAX_REG_ARGS: usize = ARG_REGS.len();

    fn file_header(module: &IrModule, out: &mut String) {
        out.push_str(".intel_syntax noprefix\n");
        out.push_str(&format!(
            "# target: {} ({})\n\n",
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
        out.push_str("    push rbp\n    mov rbp, rsp\n");
        if frame.frame_size > 0 {
            out.push_str(&format!("    sub rsp, {}\n", frame.frame_size));
        }
        for (i, (ty, name)) in func.params.iter().enumerate() {
            if let Some(slot) = frame.slot(name) {
                let size = ty.size().max(1);
                out.push_str(&format!(
                    "    mov {}, {}\n",
                    mem(slot.offset, size),
                    sized(ARG_REGS[i], size)
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
fn sized(base: &str, size: usize) -> &'static str {
    let table: [(&str, [&str; 4]); 10] = [
        ("rax", ["rax", "eax", "ax", "al"]),
        ("rcx", ["rcx", "ecx", "cx", "cl"]),
        ("rdx", ["rdx", "edx", "dx", "dl"]),
        ("rsi", ["rsi", "esi", "si", "sil"]),
        ("rdi", ["rdi", "edi", "di", "dil"]),
        ("r8", ["r8", "r8d", "r8w", "r8b"]),
        ("r9", ["r9", "r9d", "r9w", "r9b"]),
        ("r10", ["r10", "r10d", "r10w", "r10b"]),
        ("r11", ["r11", "r11d", "r11w", "r11b"]),
        ("rbp", ["rbp", "ebp", "bp", "bpl"]),
    ];
    let index = match size {
        8 => 0,
        4 => 1,
        2 => 2,
        _ => 3,
    };
    for (name, names) in table {
        if name == base {
            return names[index];
        }
    }
    "rax"
}

fn ptr_word(size: usize) -> &'static str {
    match size {
        8 => "qword",
        4 => "dword",
        2 => "word",
        _ => "byte",
    }
}

fn mem(offset: i64, size: usize) -> String {
    format!("{} ptr [rbp - {}]", ptr_word(size), offset)
}

/// Operation width: byte and word values compute at dword width.
fn op_size(ty: IrType) -> usize {
    ty.size().clamp(4, 8)
}

/// Render an operand usable directly in an ALU instruction, or `None`
/// when it must be materialised into a register first.
fn direct(op: &Operand, size: usize) -> Option<String> {
    match op {
        Operand::Imm(v) => {
            if size == 8 && i32::try_from(*v).is_err() {
                None
            } else {
                Some(v.to_string())
            }
        }
        Operand::Reg(index, _) => Some(sized(POOL[*index], size).to_string()),
        // Narrower memory operands need a widening load first.
        Operand::Mem(offset, msize) if *msize >= size => Some(mem(*offset, size)),
        _ => None,
    }
}

/// Materialise an operand into `base`, widening as needed. Returns the
/// sized register name holding the value.
fn load_gp(
    base: &str,
    op: &Operand,
    size: usize,
    signed: bool,
    out: &mut String,
) -> Result<String, String> {
    let dst = sized(base, size);
    match op {
        Operand::Imm(v) => {
            if size == 8 && i32::try_from(*v).is_err() {
                out.push_str(&format!("    movabs {}, {}\n", sized(base, 8), v));
            } else {
                out.push_str(&format!("    mov {}, {}\n", dst, v));
            }
        }
        Operand::Reg(index, rsize) => {
            let src = sized(POOL[*index], (*rsize).max(1));
            if *rsize < size {
                extend(base, &src, *rsize, size, signed, out);
            } else {
                out.push_str(&format!("    mov {}, {}\n", dst, sized(POOL[*index], size)));
            }
        }
        Operand::Mem(offset, msize) => {
            if *msize < size {
                extend(base, &mem(*offset, *msize), *msize, size, signed, out);
            } else {
                out.push_str(&format!("    mov {}, {}\n", dst, mem(*offset, size)));
            }
        }
        Operand::Sym(name) => {
            out.push_str(&format!("    lea {}, [rip + {}]\n", sized(base, 8), name));
        }
        Operand::FloatBits(_, _) => {
            return Err("float value in integer context".to_string());
        }
    }
    Ok(dst.to_string())
}

/// Widen `src` (a register name or memory reference) into `base`.
fn extend(base: &str, src: &str, from: usize, to: usize, signed: bool, out: &mut String) {
    let dst = sized(base, to);
    match (from, to, signed) {
        (4, 8, true) => out.push_str(&format!("    movsxd {}, {}\n", dst, src)),
        // A 32-bit move zeroes the upper half.
        (4, 8, false) => out.push_str(&format!("    mov {}, {}\n", sized(base, 4), src)),
        (_, _, true) => out.push_str(&format!("    movsx {}, {}\n", dst, src)),
        (_, _, false) => out.push_str(&format!("    movzx {}, {}\n", dst, src)),
    }
}

/// Materialise a float operand into an xmm register.
fn load_f(xmm: &str, op: &Operand, ty: IrType, out: &mut String) -> Result<(), String> {
    let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
    match op {
        Operand::Mem(offset, _) => {
            out.push_str(&format!(
                "    mov{} {}, {}\n",
                suffix,
                xmm,
                mem(*offset, ty.size())
            ));
        }
        Operand::FloatBits(bits, _) => {
            if ty == IrType::F32 {
                out.push_str(&format!("    mov r10d, {}\n    movd {}, r10d\n", bits, xmm));
            } else {
                out.push_str(&format!("    movabs r10, {}\n    movq {}, r10\n", bits, xmm));
            }
        }
        Operand::Imm(v) => {
            out.push_str(&format!(
                "    mov r10, {}\n    cvtsi2{} {}, r10\n",
                v, suffix, xmm
            ));
        }
        _ => return Err("unsupported float operand".to_string()),
    }
    Ok(())
}

/// Move a computed value (in `src`, a sized register of `base`) into
/// the destination location.
fn finish(base: &str, dst: &Loc, size: usize, out: &mut String) {
    if let Loc::Stack(offset) = dst {
        out.push_str(&format!(
            "    mov {}, {}\n",
            mem(*offset, size),
            sized(base, size)
        ));
    }
}

/// The register a destination computes in: its own pool register, or
/// r11 when spilled.
fn work_base(dst: &Loc) -> &'static str {
    match dst {
        Loc::Reg(index) => POOL[*index],
        Loc::Stack(_) => "r11",
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
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor => emit_alu(frame, inst, out),
        Opcode::Div | Opcode::Mod => emit_div(frame, inst, out),
        Opcode::Shl | Opcode::Shr => emit_shift(frame, inst, out),
        Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => {
            emit_compare(frame, inst, out)
        }
        Opcode::Neg | Opcode::Not | Opcode::BitNot => emit_unary(frame, inst, out),
        Opcode::Load => emit_load(frame, inst, out),
        Opcode::Store => emit_store(frame, inst, out),
        Opcode::Br => {
            out.push_str(&format!(
                "    jmp {}\n",
                block_label(&func.name, &inst.targets[0])
            ));
            Ok(())
        }
        Opcode::CondBr => {
            let cond = frame.operand(&inst.operands[0])?;
            load_gp("r10", &cond, 4, false, out)?;
            out.push_str("    cmp r10d, 0\n");
            out.push_str(&format!(
                "    jne {}\n    jmp {}\n",
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
                    load_f("xmm0", &op, ty, out)?;
                } else {
                    load_gp("rax", &op, op_size(ty), ty.is_signed(), out)?;
                }
            }
            out.push_str("    mov rsp, rbp\n    pop rbp\n    ret\n");
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
            out.push_str("    # inline asm\n");
            if asm.volatile {
                out.push_str("    # volatile\n");
            }
            for line in asm.text.lines() {
                out.push_str(&format!("    {}\n", line));
            }
            if !asm.clobbers.is_empty() {
                out.push_str(&format!("    # clobbers: {}\n", asm.clobbers.join(", ")));
            }
            out.push_str("    # end inline asm\n");
            Ok(())
        }
        Opcode::Phi => Err("phi is not supported by the x64 backend".to_string()),
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
    let base = work_base(&dst);

    let work = load_gp(base, &lhs, size, signed, out)?;
    let mnemonic = match inst.op {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "imul",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        _ => unreachable!(),
    };
    let rhs_text = match direct(&rhs, size) {
        Some(text) => text,
        None => load_gp("r10", &rhs, size, signed, out)?,
    };
    out.push_str(&format!("    {} {}, {}\n", mnemonic, work, rhs_text));
    finish(base, &dst, size, out);
    Ok(())
}

fn emit_float_alu(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("alu without result")?;
    let ty = result.ty;
    let suffix = if ty == IrType::F32 { "ss" } else { "sd" };

    let mnemonic = match inst.op {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div => "div",
        _ => return Err("float remainder is not encodable".to_string()),
    };

    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;
    load_f("xmm0", &lhs, ty, out)?;
    load_f("xmm1", &rhs, ty, out)?;
    out.push_str(&format!("    {}{} xmm0, xmm1\n", mnemonic, suffix));

    let dst = frame.dest(result);
    let Loc::Stack(offset) = dst else {
        return Err("float temporary not in a frame slot".to_string());
    };
    out.push_str(&format!(
        "    mov{} {}, xmm0\n",
        suffix,
        mem(offset, ty.size())
    ));
    Ok(())
}

fn emit_div(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("div without result")?;
    if result.ty.is_float() {
        return emit_float_alu(frame, inst, out);
    }

    let size = op_size(result.ty);
    let signed = result.ty.is_signed();
    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;

    load_gp("rax", &lhs, size, signed, out)?;
    if signed {
        out.push_str(if size == 8 { "    cqo\n" } else { "    cdq\n" });
    } else {
        out.push_str("    xor edx, edx\n");
    }
    let divisor = load_gp("r10", &rhs, size, signed, out)?;
    out.push_str(&format!(
        "    {} {}\n",
        if signed { "idiv" } else { "div" },
        divisor
    ));

    let dst = frame.dest(result);
    let base = work_base(&dst);
    let source = if inst.op == Opcode::Div { "rax" } else { "rdx" };
    out.push_str(&format!(
        "    mov {}, {}\n",
        sized(base, size),
        sized(source, size)
    ));
    finish(base, &dst, size, out);
    Ok(())
}

fn emit_shift(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("shift without result")?;
    let size = op_size(result.ty);
    let signed = result.ty.is_signed();
    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;
    let dst = frame.dest(result);
    let base = work_base(&dst);

    let work = load_gp(base, &lhs, size, signed, out)?;
    let mnemonic = match inst.op {
        Opcode::Shl => "shl",
        _ if signed => "sar",
        _ => "shr",
    };
    match rhs {
        Operand::Imm(v) => out.push_str(&format!("    {} {}, {}\n", mnemonic, work, v)),
        other => {
            load_gp("rcx", &other, 4, false, out)?;
            out.push_str(&format!("    {} {}, cl\n", mnemonic, work));
        }
    }
    finish(base, &dst, size, out);
    Ok(())
}

fn emit_compare(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("comparison without result")?;
    let ty = inst.operands[0].ty();

    let cc = if ty.is_float() {
        match inst.op {
            Opcode::Eq => "e",
            Opcode::Ne => "ne",
            Opcode::Lt => "b",
            Opcode::Gt => "a",
            Opcode::Le => "be",
            Opcode::Ge => "ae",
            _ => unreachable!(),
        }
    } else if ty.is_signed() {
        match inst.op {
            Opcode::Eq => "e",
            Opcode::Ne => "ne",
            Opcode::Lt => "l",
            Opcode::Gt => "g",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            _ => unreachable!(),
        }
    } else {
        match inst.op {
            Opcode::Eq => "e",
            Opcode::Ne => "ne",
            Opcode::Lt => "b",
            Opcode::Gt => "a",
            Opcode::Le => "be",
            Opcode::Ge => "ae",
            _ => unreachable!(),
        }
    };

    let lhs = frame.operand(&inst.operands[0])?;
    let rhs = frame.operand(&inst.operands[1])?;

    if ty.is_float() {
        let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
        load_f("xmm0", &lhs, ty, out)?;
        load_f("xmm1", &rhs, ty, out)?;
        out.push_str(&format!("    ucomi{} xmm0, xmm1\n", suffix));
    } else {
        let size = op_size(ty);
        let left = load_gp("r10", &lhs, size, ty.is_signed(), out)?;
        let rhs_text = match direct(&rhs, size) {
            Some(text) => text,
            None => load_gp("r11", &rhs, size, ty.is_signed(), out)?,
        };
        out.push_str(&format!("    cmp {}, {}\n", left, rhs_text));
    }

    let dst = frame.dest(result);
    let base = work_base(&dst);
    out.push_str(&format!("    set{} r10b\n", cc));
    out.push_str(&format!("    movzx {}, r10b\n", sized(base, 4)));
    finish(base, &dst, 1, out);
    Ok(())
}

fn emit_unary(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("unary without result")?;
    let src_ty = inst.operands[0].ty();
    let src = frame.operand(&inst.operands[0])?;

    if result.ty.is_float() && inst.op == Opcode::Neg {
        let suffix = if result.ty == IrType::F32 { "ss" } else { "sd" };
        load_f("xmm0", &src, result.ty, out)?;
        out.push_str("    pxor xmm1, xmm1\n");
        out.push_str(&format!("    sub{} xmm1, xmm0\n", suffix));
        let Loc::Stack(offset) = frame.dest(result) else {
            return Err("float temporary not in a frame slot".to_string());
        };
        out.push_str(&format!(
            "    mov{} {}, xmm1\n",
            suffix,
            mem(offset, result.ty.size())
        ));
        return Ok(());
    }

    let dst = frame.dest(result);
    let base = work_base(&dst);

    match inst.op {
        Opcode::Neg | Opcode::BitNot => {
            let size = op_size(result.ty);
            let work = load_gp(base, &src, size, result.ty.is_signed(), out)?;
            let mnemonic = if inst.op == Opcode::Neg { "neg" } else { "not" };
            out.push_str(&format!("    {} {}\n", mnemonic, work));
            finish(base, &dst, size, out);
        }
        Opcode::Not => {
            load_gp("r10", &src, op_size(src_ty), src_ty.is_signed(), out)?;
            out.push_str(&format!("    cmp {}, 0\n", sized("r10", op_size(src_ty))));
            out.push_str("    sete r10b\n");
            out.push_str(&format!("    movzx {}, r10b\n", sized(base, 4)));
            finish(base, &dst, 1, out);
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
            load_f("xmm0", &op, ty, out)?;
            let Loc::Stack(offset) = frame.dest(result) else {
                return Err("float temporary not in a frame slot".to_string());
            };
            let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
            out.push_str(&format!("    mov{} {}, xmm0\n", suffix, mem(offset, ty.size())));
        } else {
            let dst = frame.dest(result);
            let base = work_base(&dst);
            load_gp(base, &op, op_size(ty), ty.is_signed(), out)?;
            finish(base, &dst, op_size(ty), out);
        }
        return Ok(());
    }

    let IrValue::Var(slot_var) = &inst.operands[0] else {
        // Load through a global symbol.
        if let IrValue::Global(var) = &inst.operands[0] {
            let dst = frame.dest(result);
            let base = work_base(&dst);
            if ty == IrType::Pointer {
                out.push_str(&format!("    lea {}, [rip + {}]\n", sized(base, 8), var.name));
            } else {
                out.push_str(&format!(
                    "    mov {}, {} ptr [rip + {}]\n",
                    sized(base, op_size(ty)),
                    ptr_word(ty.size().max(1)),
                    var.name
                ));
            }
            finish(base, &dst, op_size(ty), out);
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
                let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
                out.push_str(&format!(
                    "    mov{} xmm0, {}\n",
                    suffix,
                    mem(slot.offset, ty.size())
                ));
                let Loc::Stack(offset) = frame.dest(result) else {
                    return Err("float temporary not in a frame slot".to_string());
                };
                out.push_str(&format!("    mov{} {}, xmm0\n", suffix, mem(offset, ty.size())));
            } else {
                let dst = frame.dest(result);
                let base = work_base(&dst);
                let source = Operand::Mem(slot.offset, ty.size().max(1));
                load_gp(base, &source, op_size(ty), ty.is_signed(), out)?;
                finish(base, &dst, op_size(ty), out);
            }
            Ok(())
        }
        // Indexed load: base slot plus byte offset.
        Some(offset_value) => {
            let offset = frame.operand(offset_value)?;
            let address = element_address(slot.offset, &offset, out)?;
            if ty.is_float() {
                let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
                out.push_str(&format!("    mov{} xmm0, [{}]\n", suffix, address));
                let Loc::Stack(spill) = frame.dest(result) else {
                    return Err("float temporary not in a frame slot".to_string());
                };
                out.push_str(&format!("    mov{} {}, xmm0\n", suffix, mem(spill, ty.size())));
            } else {
                let size = ty.size().max(1);
                let dst = frame.dest(result);
                let base = work_base(&dst);
                if size < 4 {
                    let mnemonic = if ty.is_signed() { "movsx" } else { "movzx" };
                    out.push_str(&format!(
                        "    {} {}, {} ptr [{}]\n",
                        mnemonic,
                        sized(base, 4),
                        ptr_word(size),
                        address
                    ));
                } else {
                    out.push_str(&format!(
                        "    mov {}, {} ptr [{}]\n",
                        sized(base, size),
                        ptr_word(size),
                        address
                    ));
                }
                finish(base, &dst, op_size(ty), out);
            }
            Ok(())
        }
    }
}

/// Compute the address of an indexed slot element; returns the operand
/// text naming it.
fn element_address(
    slot_offset: i64,
    offset: &Operand,
    out: &mut String,
) -> Result<String, String> {
    match offset {
        Operand::Imm(v) => {
            let displacement = slot_offset - v;
            if displacement >= 0 {
                Ok(format!("rbp - {}", displacement))
            } else {
                Ok(format!("rbp + {}", -displacement))
            }
        }
        other => {
            load_gp("r10", other, 8, false, out)?;
            out.push_str(&format!("    lea r11, [rbp - {}]\n", slot_offset));
            out.push_str("    add r11, r10\n");
            Ok("r11".to_string())
        }
    }
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

    let destination = match inst.operands.get(2) {
        None => format!("rbp - {}", slot.offset),
        Some(offset_value) => {
            let offset = frame.operand(offset_value)?;
            element_address(slot.offset, &offset, out)?
        }
    };

    let op = frame.operand(value)?;
    if ty.is_float() {
        let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
        load_f("xmm0", &op, ty, out)?;
        out.push_str(&format!(
            "    mov{} {} ptr [{}], xmm0\n",
            suffix,
            ptr_word(size),
            destination
        ));
        return Ok(());
    }

    match op {
        Operand::Imm(v) if i32::try_from(v).is_ok() => {
            out.push_str(&format!(
                "    mov {} ptr [{}], {}\n",
                ptr_word(size),
                destination,
                v
            ));
        }
        Operand::Reg(index, _) => {
            out.push_str(&format!(
                "    mov {} ptr [{}], {}\n",
                ptr_word(size),
                destination,
                sized(POOL[index], size)
            ));
        }
        other => {
            load_gp("rax", &other, size.max(4), ty.is_signed(), out)?;
            out.push_str(&format!(
                "    mov {} ptr [{}], {}\n",
                ptr_word(size),
                destination,
                sized("rax", size)
            ));
        }
    }
    Ok(())
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
            load_f(&format!("xmm{}", float_index), &op, ty, out)?;
            float_index += 1;
        } else {
            if int_index >= ARG_REGS.len() {
                return Err(format!(
                    "more than {} integer arguments are not supported",
                    ARG_REGS.len()
                ));
            }
            load_gp(ARG_REGS[int_index], &op, op_size(ty), ty.is_signed(), out)?;
            int_index += 1;
        }
    }

    out.push_str(&format!("    call {}\n", callee.name));

    if let Some(result) = &inst.result {
        let ty = result.ty;
        if ty.is_float() {
            let Loc::Stack(offset) = frame.dest(result) else {
                return Err("float temporary not in a frame slot".to_string());
            };
            let suffix = if ty == IrType::F32 { "ss" } else { "sd" };
            out.push_str(&format!("    mov{} {}, xmm0\n", suffix, mem(offset, ty.size())));
        } else {
            let dst = frame.dest(result);
            let base = work_base(&dst);
            let size = op_size(ty);
            out.push_str(&format!(
                "    mov {}, {}\n",
                sized(base, size),
                sized("rax", size)
            ));
            finish(base, &dst, size, out);
        }
    }
    Ok(())
}

fn emit_conversion(frame: &mut Frame, inst: &IrInst, out: &mut String) -> Result<(), String> {
    let result = inst.result.as_ref().ok_or("conversion without result")?;
    let to = result.ty;
    let from = inst.operands[0].ty();
    let src = frame.operand(&inst.operands[0])?;

    // Float destination.
    if to.is_float() {
        let suffix = if to == IrType::F32 { "ss" } else { "sd" };
        let Loc::Stack(offset) = frame.dest(result) else {
            return Err("float temporary not in a frame slot".to_string());
        };

        if from.is_float() {
            // f32 <-> f64 re-interpretation converts the value.
            let from_suffix = if from == IrType::F32 { "ss" } else { "sd" };
            load_f("xmm0", &src, from, out)?;
            if from != to {
                out.push_str(&format!("    cvt{}2{} xmm0, xmm0\n", from_suffix, suffix));
            }
        } else {
            let signed = matches!(inst.op, Opcode::SiToFp) || from.is_signed();
            let wide = load_gp("r10", &src, 8, signed, out)?;
            out.push_str(&format!("    cvtsi2{} xmm0, {}\n", suffix, wide));
        }
        out.push_str(&format!("    mov{} {}, xmm0\n", suffix, mem(offset, to.size())));
        return Ok(());
    }

    let dst = frame.dest(result);
    let base = work_base(&dst);

    if from.is_float() {
        let suffix = if from == IrType::F32 { "ss" } else { "sd" };
        load_f("xmm0", &src, from, out)?;
        out.push_str(&format!(
            "    cvtt{}2si {}, xmm0\n",
            suffix,
            sized(base, op_size(to))
        ));
        finish(base, &dst, op_size(to), out);
        return Ok(());
    }

    match inst.op {
        Opcode::Trunc | Opcode::Bitcast => {
            load_gp(base, &src, op_size(from).min(op_size(to)), to.is_signed(), out)?;
        }
        Opcode::ZExt => {
            load_gp(base, &src, op_size(to), false, out)?;
        }
        Opcode::SExt => {
            load_gp(base, &src, op_size(to), true, out)?;
        }
        _ => {
            load_gp(base, &src, op_size(to), to.is_signed(), out)?;
        }
    }
    finish(base, &dst, op_size(to), out);
    Ok(())
}
