//! Abstract Syntax Tree definitions for SysLang.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::lexer::{Token, TokenKind};

/// A complete SysLang program.
#[derive(Debug, Clone)]
pub struct Program {
    pub decls: Vec<Decl>,
}

/// Top-level declarations.
#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
}

/// A function declaration, either with a body or `extern`.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Rc<Type>,
    pub body: Option<Stmt>,
    pub is_extern: bool,
    pub is_variadic: bool,
    pub token: Token,
}

/// A function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Rc<Type>,
}

/// A struct declaration.
#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub token: Token,
}

/// A struct field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Rc<Type>,
}

/// An enum declaration with explicit or auto-incremented values.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<(String, i64)>,
    pub token: Token,
}

/// Type descriptors. Shared by `Rc`; comparison is structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
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
    Char,
    Str,
    Pointer(Rc<Type>),
    Array(Rc<Type>, usize),
    /// A user-defined struct or enum, resolved during lowering.
    Named(String),
    Function,
}

impl Type {
    /// Size in bytes. Named types are resolved against struct layouts
    /// during lowering; here they size as a pointer does.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Type::I8 | Type::U8 | Type::Bool | Type::Char => 1,
            Type::I16 | Type::U16 => 2,
            Type::I32 | Type::U32 | Type::F32 => 4,
            Type::I64 | Type::U64 | Type::F64 => 8,
            Type::Void => 0,
            Type::Str | Type::Pointer(_) | Type::Named(_) | Type::Function => 8,
            Type::Array(inner, len) => inner.size_in_bytes() * len,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::Char
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Char => write!(f, "char"),
            Type::Str => write!(f, "string"),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(inner, len) => write!(f, "{}[{}]", inner, len),
            Type::Named(name) => write!(f, "{}", name),
            Type::Function => write!(f, "fn"),
        }
    }
}

/// An expression node: a tagged kind on a common envelope.
///
/// The envelope carries the token that begins the expression, for
/// diagnostics, and the resolved type slot filled in by the IR
/// generator.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub token: Token,
    pub ty: RefCell<Option<Rc<Type>>>,
}

impl Expr {
    pub fn new(kind: ExprKind, token: Token) -> Self {
        Self {
            kind,
            token,
            ty: RefCell::new(None),
        }
    }
}

/// Expression variants.
#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    CharLit(char),
    StrLit(String),
    NullLit,
    Ident(String),
    Binary {
        op: TokenKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: TokenKind,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Cast {
        target: Rc<Type>,
        operand: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
    },
    InlineAsm {
        text: String,
        volatile: bool,
        clobbers: Vec<String>,
    },
}

/// Statement variants.
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Let {
        name: String,
        ty: Option<Rc<Type>>,
        init: Option<Expr>,
        mutable: bool,
        token: Token,
    },
    Expr(Expr),
    Return {
        value: Option<Expr>,
        token: Token,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
}
