//! Lowering from AST to SysLang IR.
//!
//! Two passes over the program: the first registers function signatures,
//! struct layouts and enum constants so forward references resolve; the
//! second lowers function bodies into basic blocks.

mod expr;
mod stmt;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::Diagnostic;
use crate::ir::ir::*;
use crate::lexer::Token;
use crate::parser as ast;
use crate::parser::Type;
use crate::symtab::{SymbolInfo, SymbolTable};

/// Lower a program AST to an IR module. Always returns a module;
/// lowering errors are accumulated alongside.
pub fn lower_program(
    program: &ast::Program,
    arch: Architecture,
    format: OutputFormat,
) -> (IrModule, Vec<Diagnostic>) {
    let mut gen = IrGen::new(arch);
    let module = gen.lower(program, format);
    (module, gen.errors)
}

/// A registered function signature.
#[derive(Clone)]
pub(super) struct FnSig {
    pub(super) params: Vec<Rc<Type>>,
    pub(super) ret: Rc<Type>,
    pub(super) is_variadic: bool,
}

/// Byte layout of a struct: fields with their offsets, and total size.
pub(super) struct StructLayout {
    pub(super) fields: Vec<(String, Rc<Type>, usize)>,
    pub(super) size: usize,
}

pub(super) struct IrGen {
    arch: Architecture,
    pub(super) symbols: SymbolTable,
    pub(super) structs: HashMap<String, StructLayout>,
    enum_names: Vec<String>,
    pub(super) functions: HashMap<String, FnSig>,
    pub(super) strings: Vec<String>,
    pub(super) errors: Vec<Diagnostic>,

    // Per-function state.
    pub(super) blocks: Vec<IrBlock>,
    pub(super) cur_label: String,
    pub(super) cur_insts: Vec<IrInst>,
    pub(super) terminated: bool,
    pub(super) stack_size: usize,
    pub(super) ret_type: Rc<Type>,
    temp_counter: usize,
    label_counter: usize,
    slot_names: HashMap<String, usize>,
}

impl IrGen {
    fn new(arch: Architecture) -> Self {
        Self {
            arch,
            symbols: SymbolTable::new(),
            structs: HashMap::new(),
            enum_names: Vec::new(),
            functions: HashMap::new(),
            strings: Vec::new(),
            errors: Vec::new(),
            blocks: Vec::new(),
            cur_label: String::new(),
            cur_insts: Vec::new(),
            terminated: false,
            stack_size: 0,
            ret_type: Rc::new(Type::Void),
            temp_counter: 0,
            label_counter: 0,
            slot_names: HashMap::new(),
        }
    }

    fn lower(&mut self, program: &ast::Program, format: OutputFormat) -> IrModule {
        let mut module = IrModule::new("module", self.arch, format);

        // First pass: signatures, layouts, enum constants.
        for decl in &program.decls {
            match decl {
                ast::Decl::Function(f) => self.register_function(f),
                ast::Decl::Struct(s) => self.register_struct(s),
                ast::Decl::Enum(e) => self.register_enum(e),
            }
        }

        // Second pass: function bodies.
        for decl in &program.decls {
            if let ast::Decl::Function(f) = decl {
                let func = self.lower_function(f);
                module.functions.push(func);
            }
        }

        module.strings = std::mem::take(&mut self.strings);
        module
    }

    fn register_function(&mut self, f: &ast::FunctionDecl) {
        let sig = FnSig {
            params: f.params.iter().map(|p| p.ty.clone()).collect(),
            ret: f.return_type.clone(),
            is_variadic: f.is_variadic,
        };
        self.functions.insert(f.name.clone(), sig);
        self.symbols
            .define(f.name.clone(), SymbolInfo::function(Rc::new(Type::Function)));
    }

    fn register_struct(&mut self, s: &ast::StructDecl) {
        let mut fields = Vec::new();
        let mut offset = 0;
        for field in &s.fields {
            let size = self.type_size(&field.ty);
            fields.push((field.name.clone(), field.ty.clone(), offset));
            offset += size;
        }
        self.structs.insert(
            s.name.clone(),
            StructLayout {
                fields,
                size: offset,
            },
        );
        self.symbols.define(
            s.name.clone(),
            SymbolInfo::type_name(Rc::new(Type::Named(s.name.clone()))),
        );
    }

    fn register_enum(&mut self, e: &ast::EnumDecl) {
        self.enum_names.push(e.name.clone());
        self.symbols.define(
            e.name.clone(),
            SymbolInfo::type_name(Rc::new(Type::Named(e.name.clone()))),
        );
        for (variant, value) in &e.variants {
            self.symbols
                .define(variant.clone(), SymbolInfo::constant(Rc::new(Type::I32), *value));
        }
    }

    fn lower_function(&mut self, f: &ast::FunctionDecl) -> IrFunction {
        let params: Vec<(IrType, String)> = f
            .params
            .iter()
            .map(|p| (self.ir_type(&p.ty), p.name.clone()))
            .collect();
        let return_type = self.ir_type(&f.return_type);

        if f.is_extern || f.body.is_none() {
            return IrFunction {
                name: f.name.clone(),
                params,
                return_type,
                blocks: Vec::new(),
                stack_size: 0,
                is_variadic: f.is_variadic,
            };
        }

        self.blocks.clear();
        self.cur_insts.clear();
        self.cur_label = "entry".to_string();
        self.terminated = false;
        self.stack_size = 0;
        self.temp_counter = 0;
        self.label_counter = 0;
        self.slot_names.clear();
        self.ret_type = f.return_type.clone();

        self.symbols.enter_scope(f.name.clone());
        for param in &f.params {
            self.slot_names.insert(param.name.clone(), 0);
            self.symbols.define(
                param.name.clone(),
                SymbolInfo::variable(param.ty.clone(), param.name.clone()),
            );
        }

        if let Some(body) = &f.body {
            self.lower_stmt(body);
        }

        // Fall-through return.
        if !self.terminated {
            let ret_ty = self.ret_type.clone();
            let value = match &*ret_ty {
                Type::Void => None,
                _ => Some(IrValue::zero(self.ir_type(&ret_ty))),
            };
            self.emit(IrInst::ret(value));
        }
        self.seal_block();

        self.symbols.exit_scope();

        IrFunction {
            name: f.name.clone(),
            params,
            return_type,
            blocks: std::mem::take(&mut self.blocks),
            stack_size: self.stack_size,
            is_variadic: f.is_variadic,
        }
    }

    // Block machinery

    /// Append an instruction to the current block. Instructions after a
    /// terminator are dropped; the block is already closed.
    pub(super) fn emit(&mut self, inst: IrInst) {
        if self.terminated {
            return;
        }
        let terminates = inst.is_terminator();
        self.cur_insts.push(inst);
        if terminates {
            self.terminated = true;
        }
    }

    /// Close the current block with `term` unless it already terminated,
    /// then push it.
    pub(super) fn close_with(&mut self, term: IrInst) {
        self.emit(term);
        self.seal_block();
    }

    fn seal_block(&mut self) {
        let block = IrBlock {
            name: std::mem::take(&mut self.cur_label),
            insts: std::mem::take(&mut self.cur_insts),
        };
        self.blocks.push(block);
    }

    pub(super) fn start_block(&mut self, label: String) {
        self.cur_label = label;
        self.terminated = false;
    }

    // Name generation

    pub(super) fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub(super) fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// A stack slot name for a local, made unique across shadowing.
    pub(super) fn new_slot(&mut self, base: &str) -> String {
        match self.slot_names.get_mut(base) {
            Some(count) => {
                *count += 1;
                format!("{}.{}", base, count)
            }
            None => {
                self.slot_names.insert(base.to_string(), 0);
                base.to_string()
            }
        }
    }

    // Types

    pub(super) fn ir_type(&self, ty: &Rc<Type>) -> IrType {
        match &**ty {
            Type::I8 => IrType::I8,
            Type::I16 => IrType::I16,
            Type::I32 => IrType::I32,
            Type::I64 => IrType::I64,
            Type::U8 => IrType::U8,
            Type::U16 => IrType::U16,
            Type::U32 => IrType::U32,
            Type::U64 => IrType::U64,
            Type::F32 => IrType::F32,
            Type::F64 => IrType::F64,
            Type::Bool => IrType::Bool,
            Type::Void => IrType::Void,
            Type::Char => IrType::I8,
            Type::Str => IrType::Pointer,
            Type::Pointer(_) | Type::Array(_, _) | Type::Function => IrType::Pointer,
            Type::Named(name) => {
                if self.enum_names.iter().any(|e| e == name) {
                    IrType::I32
                } else {
                    IrType::Pointer
                }
            }
        }
    }

    /// Byte size of a type, resolving named structs against their
    /// layouts. Enums occupy four bytes.
    pub(super) fn type_size(&self, ty: &Rc<Type>) -> usize {
        match &**ty {
            Type::Named(name) => {
                if let Some(layout) = self.structs.get(name) {
                    layout.size
                } else if self.enum_names.iter().any(|e| e == name) {
                    4
                } else {
                    8
                }
            }
            Type::Array(inner, len) => self.type_size(inner) * len,
            other => other.size_in_bytes(),
        }
    }

    // Diagnostics

    pub(super) fn error_at(&mut self, token: &Token, message: impl Into<String>) {
        self.errors.push(Diagnostic::error(
            message,
            token.line,
            token.column,
            (token.span.start, token.span.end),
        ));
    }
}
