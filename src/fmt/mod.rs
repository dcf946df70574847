//! SysLang pretty-printer.
//!
//! Renders an AST back to source text. Binary and unary expressions are
//! printed fully parenthesised, so re-parsing the output reconstructs
//! the same tree shape regardless of the original spelling.

#![allow(dead_code)]

use crate::parser::{Decl, EnumDecl, Expr, ExprKind, FunctionDecl, Program, Stmt, StructDecl};

/// The printer takes a parsed program and produces source code.
pub struct Printer {
    output: String,
    indent: usize,
}

/// Pretty-print a whole program.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::new();
    printer.print(program)
}

impl Printer {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn print(&mut self, program: &Program) -> String {
        self.output.clear();
        for (i, decl) in program.decls.iter().enumerate() {
            if i > 0 {
                self.output.push('\n');
            }
            self.print_decl(decl);
        }
        std::mem::take(&mut self.output)
    }

    fn print_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Function(f) => self.print_function(f),
            Decl::Struct(s) => self.print_struct(s),
            Decl::Enum(e) => self.print_enum(e),
        }
    }

    fn print_function(&mut self, f: &FunctionDecl) {
        self.output.push_str("fn ");
        self.output.push_str(&f.name);
        self.output.push('(');
        for (i, param) in f.params.iter().enumerate() {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.output.push_str(&param.name);
            self.output.push_str(": ");
            self.output.push_str(&param.ty.to_string());
        }
        self.output.push_str(") -> ");
        self.output.push_str(&f.return_type.to_string());

        if f.is_extern {
            self.output.push_str(" extern\n");
            return;
        }

        self.output.push(' ');
        match &f.body {
            Some(body) => self.print_stmt(body),
            None => self.output.push_str("{ }\n"),
        }
    }

    fn print_struct(&mut self, s: &StructDecl) {
        self.output.push_str("struct ");
        self.output.push_str(&s.name);
        self.output.push_str(" {\n");
        for field in &s.fields {
            self.output.push_str("    ");
            self.output.push_str(&field.name);
            self.output.push_str(": ");
            self.output.push_str(&field.ty.to_string());
            self.output.push_str(";\n");
        }
        self.output.push_str("}\n");
    }

    fn print_enum(&mut self, e: &EnumDecl) {
        self.output.push_str("enum ");
        self.output.push_str(&e.name);
        self.output.push_str(" {\n");
        for (name, value) in &e.variants {
            self.output.push_str("    ");
            self.output.push_str(name);
            self.output.push_str(&format!(" = {},\n", value));
        }
        self.output.push_str("}\n");
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
    }

    fn print_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.output.push_str("{\n");
                self.indent += 1;
                for stmt in stmts {
                    self.write_indent();
                    self.print_stmt(stmt);
                }
                self.indent -= 1;
                self.write_indent();
                self.output.push_str("}\n");
            }
            Stmt::Let {
                name,
                ty,
                init,
                mutable,
                ..
            } => {
                self.output.push_str("let ");
                if *mutable {
                    self.output.push_str("mut ");
                }
                self.output.push_str(name);
                if let Some(ty) = ty {
                    self.output.push_str(": ");
                    self.output.push_str(&ty.to_string());
                }
                if let Some(init) = init {
                    self.output.push_str(" = ");
                    self.print_expr(init);
                }
                self.output.push_str(";\n");
            }
            Stmt::Expr(expr) => {
                self.print_expr(expr);
                self.output.push_str(";\n");
            }
            Stmt::Return { value, .. } => {
                self.output.push_str("return");
                if let Some(value) = value {
                    self.output.push(' ');
                    self.print_expr(value);
                }
                self.output.push_str(";\n");
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.output.push_str("if (");
                self.print_expr(cond);
                self.output.push_str(") ");
                self.print_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.write_indent();
                    self.output.push_str("else ");
                    self.print_stmt(else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.output.push_str("while (");
                self.print_expr(cond);
                self.output.push_str(") ");
                self.print_stmt(body);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.output.push_str("for (");
                match init {
                    Some(init) => {
                        // The init statement carries its own semicolon.
                        let saved = self.indent;
                        self.indent = 0;
                        self.print_stmt(init);
                        self.indent = saved;
                        // Drop the newline the statement printer added.
                        while self.output.ends_with('\n') {
                            self.output.pop();
                        }
                        self.output.push(' ');
                    }
                    None => self.output.push_str("; "),
                }
                if let Some(cond) = cond {
                    self.print_expr(cond);
                }
                self.output.push_str("; ");
                if let Some(update) = update {
                    self.print_expr(update);
                }
                self.output.push_str(") ");
                self.print_stmt(body);
            }
        }
    }

    fn print_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit(value) => self.output.push_str(&value.to_string()),
            ExprKind::FloatLit(value) => {
                let text = format!("{}", value);
                self.output.push_str(&text);
                if !text.contains('.') {
                    self.output.push_str(".0");
                }
            }
            ExprKind::BoolLit(value) => self.output.push_str(if *value { "true" } else { "false" }),
            ExprKind::CharLit(value) => {
                let escaped = match value {
                    '\n' => "\\n".to_string(),
                    '\t' => "\\t".to_string(),
                    '\r' => "\\r".to_string(),
                    '\0' => "\\0".to_string(),
                    '\'' => "\\'".to_string(),
                    '\\' => "\\\\".to_string(),
                    c => c.to_string(),
                };
                self.output.push('\'');
                self.output.push_str(&escaped);
                self.output.push('\'');
            }
            ExprKind::StrLit(value) => {
                self.output.push('"');
                self.output.push_str(value);
                self.output.push('"');
            }
            ExprKind::NullLit => self.output.push_str("null"),
            ExprKind::Ident(name) => self.output.push_str(name),
            ExprKind::Binary { op, left, right } => {
                self.output.push('(');
                self.print_expr(left);
                self.output.push(' ');
                self.output.push_str(&op.to_string());
                self.output.push(' ');
                self.print_expr(right);
                self.output.push(')');
            }
            ExprKind::Unary { op, operand } => {
                self.output.push('(');
                self.output.push_str(&op.to_string());
                self.print_expr(operand);
                self.output.push(')');
            }
            ExprKind::Call { callee, args } => {
                self.print_expr(callee);
                self.output.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.print_expr(arg);
                }
                self.output.push(')');
            }
            ExprKind::Cast { target, operand } => {
                self.output.push_str(&target.to_string());
                self.output.push('(');
                self.print_expr(operand);
                self.output.push(')');
            }
            ExprKind::Index { base, index } => {
                self.print_expr(base);
                self.output.push('[');
                self.print_expr(index);
                self.output.push(']');
            }
            ExprKind::Member { base, field } => {
                self.print_expr(base);
                self.output.push('.');
                self.output.push_str(field);
            }
            ExprKind::InlineAsm {
                text,
                volatile,
                clobbers,
            } => {
                self.output.push_str("asm ");
                if *volatile {
                    self.output.push_str("volatile ");
                }
                self.output.push_str("{ \"");
                self.output.push_str(text);
                self.output.push('"');
                for clobber in clobbers {
                    self.output.push_str(", \"");
                    self.output.push_str(clobber);
                    self.output.push('"');
                }
                self.output.push_str(" }");
            }
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}
