//! SysLang IR definitions: module, function, basic block, instruction
//! and value types, plus the stable textual dump.

use std::fmt;

/// Target instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X64,
    Arm64,
}

impl Architecture {
    /// The target triple for this architecture on the host platform.
    pub fn triple(self) -> &'static str {
        if cfg!(target_os = "windows") {
            match self {
                Architecture::X64 => "x86_64-pc-windows-msvc",
                Architecture::Arm64 => "unknown",
            }
        } else if cfg!(target_os = "macos") {
            match self {
                Architecture::X64 => "x86_64-apple-darwin",
                Architecture::Arm64 => "arm64-apple-darwin",
            }
        } else if cfg!(target_os = "freebsd") {
            match self {
                Architecture::X64 => "x86_64-unknown-freebsd",
                Architecture::Arm64 => "aarch64-unknown-freebsd",
            }
        } else if cfg!(target_os = "openbsd") {
            match self {
                Architecture::X64 => "x86_64-unknown-openbsd",
                Architecture::Arm64 => "unknown",
            }
        } else if cfg!(target_os = "netbsd") {
            match self {
                Architecture::X64 => "x86_64-unknown-netbsd",
                Architecture::Arm64 => "unknown",
            }
        } else {
            match self {
                Architecture::X64 => "x86_64-unknown-linux-gnu",
                Architecture::Arm64 => "aarch64-unknown-linux-gnu",
            }
        }
    }
}

/// Requested object container format. Carried through to the backends,
/// which only vary their comment header by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Elf,
    Pe,
    Efi,
    Raw,
}

/// IR value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
    Pointer,
}

impl IrType {
    pub fn size(self) -> usize {
        match self {
            IrType::I8 | IrType::U8 | IrType::Bool => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 | IrType::F32 => 4,
            IrType::I64 | IrType::U64 | IrType::F64 | IrType::Pointer => 8,
            IrType::Void => 0,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IrType::I8 => "i8",
            IrType::I16 => "i16",
            IrType::I32 => "i32",
            IrType::I64 => "i64",
            IrType::U8 => "u8",
            IrType::U16 => "u16",
            IrType::U32 => "u32",
            IrType::U64 => "u64",
            IrType::F32 => "f32",
            IrType::F64 => "f64",
            IrType::Bool => "bool",
            IrType::Void => "void",
            IrType::Pointer => "ptr",
        };
        f.write_str(name)
    }
}

/// A named IR variable: an SSA-style temporary, a stack slot, or a
/// global. Referenced by name; the enclosing function owns the storage.
#[derive(Debug, Clone, PartialEq)]
pub struct IrVar {
    pub name: String,
    pub ty: IrType,
}

impl IrVar {
    pub fn new(name: impl Into<String>, ty: IrType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An IR value: a constant or a variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum IrValue {
    Int(i64, IrType),
    Uint(u64, IrType),
    Float(f64, IrType),
    Bool(bool),
    Var(IrVar),
    Global(IrVar),
}

impl IrValue {
    pub fn ty(&self) -> IrType {
        match self {
            IrValue::Int(_, ty) | IrValue::Uint(_, ty) | IrValue::Float(_, ty) => *ty,
            IrValue::Bool(_) => IrType::Bool,
            IrValue::Var(var) | IrValue::Global(var) => var.ty,
        }
    }

    pub fn is_const(&self) -> bool {
        !matches!(self, IrValue::Var(_) | IrValue::Global(_))
    }

    /// The referenced variable name, if this is a variable.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            IrValue::Var(var) => Some(&var.name),
            _ => None,
        }
    }

    /// Convert a constant to another type at compile time. Returns
    /// `None` for non-constants and void targets.
    pub fn convert_to(&self, to: IrType) -> Option<IrValue> {
        let as_i64 = match self {
            IrValue::Int(v, _) => *v,
            IrValue::Uint(v, _) => *v as i64,
            IrValue::Bool(v) => *v as i64,
            IrValue::Float(v, _) => *v as i64,
            _ => return None,
        };
        let as_f64 = match self {
            IrValue::Float(v, _) => *v,
            _ => as_i64 as f64,
        };

        let converted = match to {
            IrType::F32 | IrType::F64 => IrValue::Float(as_f64, to),
            IrType::Bool => IrValue::Bool(as_i64 != 0),
            IrType::I8 => IrValue::Int(as_i64 as i8 as i64, to),
            IrType::I16 => IrValue::Int(as_i64 as i16 as i64, to),
            IrType::I32 => IrValue::Int(as_i64 as i32 as i64, to),
            IrType::I64 => IrValue::Int(as_i64, to),
            IrType::U8 => IrValue::Uint(as_i64 as u8 as u64, to),
            IrType::U16 => IrValue::Uint(as_i64 as u16 as u64, to),
            IrType::U32 => IrValue::Uint(as_i64 as u32 as u64, to),
            IrType::U64 => IrValue::Uint(as_i64 as u64, to),
            IrType::Pointer => IrValue::Int(as_i64, to),
            IrType::Void => return None,
        };
        Some(converted)
    }

    /// Typed zero, the best-effort substitute after a lowering error.
    pub fn zero(ty: IrType) -> Self {
        match ty {
            IrType::F32 | IrType::F64 => IrValue::Float(0.0, ty),
            IrType::Bool => IrValue::Bool(false),
            IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64 => IrValue::Uint(0, ty),
            _ => IrValue::Int(0, ty),
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Int(value, _) => write!(f, "{}", value),
            IrValue::Uint(value, _) => write!(f, "{}", value),
            IrValue::Float(value, _) => write!(f, "{}", value),
            IrValue::Bool(value) => write!(f, "{}", value),
            IrValue::Var(var) => write!(f, "%{}", var.name),
            IrValue::Global(var) => write!(f, "@{}", var.name),
        }
    }
}

/// The fixed opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Binary
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    // Unary
    Neg,
    Not,
    BitNot,
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    // Memory
    Load,
    Store,
    Alloca,
    // Control flow
    Br,
    CondBr,
    Call,
    Ret,
    Phi,
    // Conversions
    Trunc,
    ZExt,
    SExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    Bitcast,
    // Inline assembly placeholder
    Asm,
}

impl Opcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::BitNot => "bit_not",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Alloca => "alloca",
            Opcode::Br => "br",
            Opcode::CondBr => "condbr",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Phi => "phi",
            Opcode::Trunc => "trunc",
            Opcode::ZExt => "zext",
            Opcode::SExt => "sext",
            Opcode::FpToUi => "fptoui",
            Opcode::FpToSi => "fptosi",
            Opcode::UiToFp => "uitofp",
            Opcode::SiToFp => "sitofp",
            Opcode::Bitcast => "bitcast",
            Opcode::Asm => "asm",
        }
    }

    /// Terminators transfer control out of their basic block.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Br | Opcode::CondBr | Opcode::Ret)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge
        )
    }
}

/// Inline-assembly payload carried by `Opcode::Asm` instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineAsm {
    pub text: String,
    pub volatile: bool,
    pub clobbers: Vec<String>,
}

/// A single IR instruction.
///
/// Branch targets are carried as block names, never as immediates.
#[derive(Debug, Clone, PartialEq)]
pub struct IrInst {
    pub op: Opcode,
    pub result: Option<IrVar>,
    pub operands: Vec<IrValue>,
    pub targets: Vec<String>,
    pub asm: Option<InlineAsm>,
}

impl IrInst {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            result: None,
            operands: Vec::new(),
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn binary(op: Opcode, result: IrVar, left: IrValue, right: IrValue) -> Self {
        Self {
            op,
            result: Some(result),
            operands: vec![left, right],
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn unary(op: Opcode, result: IrVar, operand: IrValue) -> Self {
        Self {
            op,
            result: Some(result),
            operands: vec![operand],
            targets: Vec::new(),
            asm: None,
        }
    }

    /// Stack allocation of `size` bytes; the result is the slot pointer.
    pub fn alloca(result: IrVar, size: usize) -> Self {
        Self {
            op: Opcode::Alloca,
            result: Some(result),
            operands: vec![IrValue::Int(size as i64, IrType::I64)],
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn load(result: IrVar, operands: Vec<IrValue>) -> Self {
        Self {
            op: Opcode::Load,
            result: Some(result),
            operands,
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn store(operands: Vec<IrValue>) -> Self {
        Self {
            op: Opcode::Store,
            result: None,
            operands,
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn br(target: impl Into<String>) -> Self {
        Self {
            op: Opcode::Br,
            result: None,
            operands: Vec::new(),
            targets: vec![target.into()],
            asm: None,
        }
    }

    pub fn condbr(cond: IrValue, then_to: impl Into<String>, else_to: impl Into<String>) -> Self {
        Self {
            op: Opcode::CondBr,
            result: None,
            operands: vec![cond],
            targets: vec![then_to.into(), else_to.into()],
            asm: None,
        }
    }

    pub fn ret(value: Option<IrValue>) -> Self {
        Self {
            op: Opcode::Ret,
            result: None,
            operands: value.into_iter().collect(),
            targets: Vec::new(),
            asm: None,
        }
    }

    pub fn inline_asm(asm: InlineAsm) -> Self {
        Self {
            op: Opcode::Asm,
            result: None,
            operands: Vec::new(),
            targets: Vec::new(),
            asm: Some(asm),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Whether the instruction has an observable side effect and must
    /// survive dead-code elimination.
    pub fn has_side_effect(&self) -> bool {
        self.is_terminator()
            || matches!(self.op, Opcode::Store | Opcode::Call | Opcode::Asm)
    }
}

impl fmt::Display for IrInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "%{} = ", result.name)?;
        }
        write!(f, "{}", self.op.as_str())?;

        if let Some(asm) = &self.asm {
            write!(f, " \"{}\"", asm.text)?;
            if asm.volatile {
                write!(f, " volatile")?;
            }
            return Ok(());
        }

        let mut first = true;
        for operand in &self.operands {
            if first {
                write!(f, " {}", operand)?;
                first = false;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        for target in &self.targets {
            if first {
                write!(f, " {}", target)?;
                first = false;
            } else {
                write!(f, ", {}", target)?;
            }
        }
        Ok(())
    }
}

/// A basic block: a label and a straight-line run of instructions
/// ending in a terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub name: String,
    pub insts: Vec<IrInst>,
}

impl IrBlock {
    pub fn terminator(&self) -> Option<&IrInst> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }
}

/// An IR function. Extern functions have no blocks.
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<(IrType, String)>,
    pub return_type: IrType,
    pub blocks: Vec<IrBlock>,
    pub stack_size: usize,
    pub is_variadic: bool,
}

impl IrFunction {
    pub fn is_extern(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A module-level variable.
#[derive(Debug, Clone)]
pub struct IrGlobal {
    pub name: String,
    pub ty: IrType,
}

/// A compilation unit.
#[derive(Debug, Clone)]
pub struct IrModule {
    pub name: String,
    pub functions: Vec<IrFunction>,
    pub globals: Vec<IrGlobal>,
    /// Interned string literals, addressed as `@.str<N>`.
    pub strings: Vec<String>,
    pub arch: Architecture,
    pub format: OutputFormat,
}

impl IrModule {
    pub fn new(name: impl Into<String>, arch: Architecture, format: OutputFormat) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            strings: Vec::new(),
            arch,
            format,
        }
    }

    /// The stable textual dump emitted by `--ir`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("target triple = \"{}\"\n\n", self.arch.triple()));

        for global in &self.globals {
            out.push_str(&format!(
                "@{} = global {} zeroinitializer\n",
                global.name, global.ty
            ));
        }
        for (i, string) in self.strings.iter().enumerate() {
            out.push_str(&format!("@.str{} = global string \"{}\"\n", i, string));
        }
        if !self.globals.is_empty() || !self.strings.is_empty() {
            out.push('\n');
        }

        for func in &self.functions {
            if func.is_extern() {
                let params = func
                    .params
                    .iter()
                    .map(|(ty, name)| format!("{} %{}", ty, name))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("declare {}({})\n\n", func.name, params));
                continue;
            }

            let params = func
                .params
                .iter()
                .map(|(ty, name)| format!("{} %{}", ty, name))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("define {}({}) {{\n", func.name, params));
            for block in &func.blocks {
                out.push_str(&format!("{}:\n", block.name));
                for inst in &block.insts {
                    out.push_str(&format!("  {}\n", inst));
                }
            }
            out.push_str("}\n\n");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_rendering() {
        assert_eq!(IrValue::Int(42, IrType::I32).to_string(), "42");
        assert_eq!(IrValue::Bool(true).to_string(), "true");
        assert_eq!(
            IrValue::Var(IrVar::new("t0", IrType::I32)).to_string(),
            "%t0"
        );
        assert_eq!(
            IrValue::Global(IrVar::new("counter", IrType::I64)).to_string(),
            "@counter"
        );
    }

    #[test]
    fn test_instruction_rendering() {
        let add = IrInst::binary(
            Opcode::Add,
            IrVar::new("t2", IrType::I32),
            IrValue::Var(IrVar::new("t0", IrType::I32)),
            IrValue::Var(IrVar::new("t1", IrType::I32)),
        );
        assert_eq!(add.to_string(), "%t2 = add %t0, %t1");

        let branch = IrInst::condbr(
            IrValue::Var(IrVar::new("t0", IrType::Bool)),
            "then0",
            "merge2",
        );
        assert_eq!(branch.to_string(), "condbr %t0, then0, merge2");

        assert_eq!(
            IrInst::ret(Some(IrValue::Int(0, IrType::I32))).to_string(),
            "ret 0"
        );
    }

    #[test]
    fn test_type_sizes() {
        assert_eq!(IrType::I8.size(), 1);
        assert_eq!(IrType::U16.size(), 2);
        assert_eq!(IrType::F32.size(), 4);
        assert_eq!(IrType::Pointer.size(), 8);
        assert_eq!(IrType::Void.size(), 0);
    }

    #[test]
    fn test_terminator_classification() {
        assert!(Opcode::Br.is_terminator());
        assert!(Opcode::CondBr.is_terminator());
        assert!(Opcode::Ret.is_terminator());
        assert!(!Opcode::Add.is_terminator());
        assert!(!Opcode::Call.is_terminator());
    }

    #[test]
    fn test_dump_shape() {
        let mut module = IrModule::new("m", Architecture::X64, OutputFormat::Elf);
        module.globals.push(IrGlobal {
            name: "g".to_string(),
            ty: IrType::I32,
        });
        module.functions.push(IrFunction {
            name: "main".to_string(),
            params: Vec::new(),
            return_type: IrType::I32,
            blocks: vec![IrBlock {
                name: "entry".to_string(),
                insts: vec![IrInst::ret(Some(IrValue::Int(0, IrType::I32)))],
            }],
            stack_size: 0,
            is_variadic: false,
        });

        let dump = module.dump();
        assert!(dump.starts_with("target triple = \""));
        assert!(dump.contains("@g = global i32 zeroinitializer"));
        assert!(dump.contains("define main() {"));
        assert!(dump.contains("entry:\n  ret 0\n}"));
    }
}
