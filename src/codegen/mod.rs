//! Code generation: lower the optimised IR into assembly text.
//!
//! Both backends share this skeleton: frame layout, the linear-scan
//! temporary allocator, and the function emission loop (label, prologue,
//! blocks, epilogue at returns). The per-instruction templates and the
//! register tables live in the architecture modules.

mod arm64;
mod regs;
mod x64;

use std::collections::HashMap;

use crate::errors::Diagnostic;
use crate::ir::{Architecture, IrFunction, IrInst, IrModule, IrType, IrValue, IrVar, Opcode};
use regs::{Allocator, Loc};

pub use arm64::Arm64;
pub use x64::X64;

/// Emit assembly for a module on its target architecture. Failing
/// functions are replaced by a comment; emission continues.
pub fn emit(module: &IrModule) -> (String, Vec<Diagnostic>) {
    match module.arch {
        Architecture::X64 => emit_module::<X64>(module),
        Architecture::Arm64 => emit_module::<Arm64>(module),
    }
}

/// A stack slot for a parameter or local.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    /// Bytes below the frame base.
    pub offset: i64,
    pub size: usize,
}

/// Per-function emission state.
pub(crate) struct Frame {
    slots: HashMap<String, Slot>,
    temps: Allocator,
    pub frame_size: i64,
}

impl Frame {
    /// Lay out parameter and alloca slots, then reserve spill space for
    /// the worst case of every temporary spilling.
    fn layout(func: &IrFunction, pool_size: usize) -> Frame {
        fn place(offset: &mut i64, slots: &mut HashMap<String, Slot>, name: &str, size: usize) {
            let size = size.max(1);
            *offset += size as i64;
            *offset = align_to(*offset, size.min(8) as i64);
            slots.insert(name.to_string(), Slot { offset: *offset, size });
        }

        let mut slots = HashMap::new();
        let mut offset: i64 = 0;

        for (ty, name) in &func.params {
            place(&mut offset, &mut slots, name, ty.size());
        }
        let mut temp_count = 0;
        for block in &func.blocks {
            for inst in &block.insts {
                if inst.op == Opcode::Alloca {
                    if let (Some(result), Some(IrValue::Int(size, _))) =
                        (&inst.result, inst.operands.first())
                    {
                        place(&mut offset, &mut slots, &result.name, *size as usize);
                    }
                } else if let Some(result) = &inst.result {
                    if !slots.contains_key(&result.name) {
                        temp_count += 1;
                    }
                }
            }
        }

        let locals_size = align_to(offset, 8);
        let spill_area = temp_count as i64 * 8;
        let frame_size = align_to(locals_size + spill_area, 16);

        Frame {
            slots,
            temps: Allocator::new(pool_size, locals_size),
            frame_size,
        }
    }

    pub(crate) fn slot(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    /// Location of an already-placed temporary.
    pub(crate) fn temp(&self, name: &str) -> Option<Loc> {
        self.temps.get(name)
    }

    /// Location for an instruction result. Float temporaries are pinned
    /// to frame slots so they flow through the scratch FP registers.
    pub(crate) fn dest(&mut self, var: &IrVar) -> Loc {
        self.temps.assign(&var.name, var.ty.is_float())
    }
}

pub(crate) fn align_to(value: i64, alignment: i64) -> i64 {
    (value + alignment - 1) / alignment * alignment
}

/// Assembler-local label for a block.
pub(crate) fn block_label(func: &str, block: &str) -> String {
    format!(".L{}.{}", func, block)
}

/// The architecture-specific half of the code generator.
pub(crate) trait Isa {
    /// Size of the caller-save pool used for temporaries.
    const TEMP_POOL: usize;
    /// How many arguments the calling convention passes in registers.
    const MAX_REG_ARGS: usize;

    fn file_header(module: &IrModule, out: &mut String);
    fn data_sections(module: &IrModule, out: &mut String);
    fn prologue(func: &IrFunction, frame: &Frame, out: &mut String);
    fn emit_inst(
        func: &IrFunction,
        frame: &mut Frame,
        inst: &IrInst,
        out: &mut String,
    ) -> Result<(), String>;
}

fn emit_module<I: Isa>(module: &IrModule) -> (String, Vec<Diagnostic>) {
    let mut out = String::new();
    let mut diagnostics = Vec::new();

    I::file_header(module, &mut out);
    I::data_sections(module, &mut out);

    for func in &module.functions {
        if func.is_extern() {
            continue;
        }

        match emit_function::<I>(func) {
            Ok(body) => {
                out.push_str(&body);
                out.push('\n');
            }
            Err(message) => {
                diagnostics.push(Diagnostic::error(
                    format!("cannot compile function '{}': {}", func.name, message),
                    0,
                    0,
                    (0, 0),
                ));
                out.push_str(&format!(
                    "# function '{}' not emitted: {}\n\n",
                    func.name, message
                ));
            }
        }
    }

    (out, diagnostics)
}

fn emit_function<I: Isa>(func: &IrFunction) -> Result<String, String> {
    if func.params.len() > I::MAX_REG_ARGS {
        return Err(format!(
            "more than {} parameters are not supported",
            I::MAX_REG_ARGS
        ));
    }

    let mut frame = Frame::layout(func, I::TEMP_POOL);
    let mut body = String::new();
    I::prologue(func, &frame, &mut body);

    for block in &func.blocks {
        body.push_str(&format!("{}:\n", block_label(&func.name, &block.name)));
        for inst in &block.insts {
            I::emit_inst(func, &mut frame, inst, &mut body)?;
        }
    }

    Ok(body)
}

/// Operand classification shared by the instruction templates.
pub(crate) enum Operand {
    Imm(i64),
    /// Raw bit pattern of a float constant, with its type.
    FloatBits(u64, IrType),
    /// A frame slot or spilled temporary.
    Mem(i64, usize),
    /// Index into the backend's temporary pool.
    Reg(usize, usize),
    /// A global symbol (string literals, functions).
    Sym(String),
}

impl Frame {
    /// Classify a value for reading.
    pub(crate) fn operand(&mut self, value: &IrValue) -> Result<Operand, String> {
        match value {
            IrValue::Int(v, _) => Ok(Operand::Imm(*v)),
            IrValue::Uint(v, _) => Ok(Operand::Imm(*v as i64)),
            IrValue::Bool(v) => Ok(Operand::Imm(*v as i64)),
            IrValue::Float(v, ty) => {
                let bits = if *ty == IrType::F32 {
                    (*v as f32).to_bits() as u64
                } else {
                    v.to_bits()
                };
                Ok(Operand::FloatBits(bits, *ty))
            }
            IrValue::Global(var) => Ok(Operand::Sym(var.name.clone())),
            IrValue::Var(var) => {
                let size = var.ty.size().max(1);
                if let Some(slot) = self.slot(&var.name) {
                    return Ok(Operand::Mem(slot.offset, slot.size.min(8)));
                }
                match self.temp(&var.name) {
                    Some(Loc::Reg(index)) => Ok(Operand::Reg(index, size)),
                    Some(Loc::Stack(offset)) => Ok(Operand::Mem(offset, size)),
                    None => Err(format!("use of undefined temporary '%{}'", var.name)),
                }
            }
        }
    }
}
