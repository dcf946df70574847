//! Recursive descent parser for SysLang.
//!
//! Declarations and statements are parsed by straight recursive descent;
//! binary expressions use precedence climbing over a binding-power table.
//! Errors are accumulated and recovery skips to a synchronising token, so
//! one bad construct does not abort the parse.

use std::rc::Rc;

use super::ast::*;
use crate::errors::Diagnostic;
use crate::lexer::{Token, TokenKind};

/// The SysLang parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
}

impl Parser {
    /// Create a parser over a token stream. The stream must end with an
    /// end-of-input token, as produced by `Lexer::tokenize`.
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens = if tokens.is_empty() {
            vec![Token::new(TokenKind::Eof, "", 1, 1, crate::lexer::Span::new(0, 0))]
        } else {
            tokens
        };
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole program. Always returns a (possibly partial)
    /// program; check [`Parser::errors`] afterwards.
    pub fn parse(&mut self) -> Program {
        let mut decls = Vec::new();
        while !self.at_end() {
            if let Some(decl) = self.parse_declaration() {
                decls.push(decl);
            }
        }
        Program { decls }
    }

    /// The diagnostics accumulated so far.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    // Declarations

    fn parse_declaration(&mut self) -> Option<Decl> {
        let token = self.current().clone();

        if self.eat(TokenKind::Fn) {
            return self.parse_function(token).map(Decl::Function);
        }
        if self.eat(TokenKind::Struct) {
            return self.parse_struct(token).map(Decl::Struct);
        }
        if self.eat(TokenKind::Enum) {
            return self.parse_enum(token).map(Decl::Enum);
        }

        self.error("Expected function, struct, or enum declaration");
        self.advance();
        None
    }

    fn parse_function(&mut self, token: Token) -> Option<FunctionDecl> {
        let name = match self.expect_ident("Expected function name") {
            Some(name) => name,
            None => {
                self.recover_to(&[TokenKind::RBrace, TokenKind::Semicolon]);
                return None;
            }
        };

        self.expect(TokenKind::LParen, "Expected '('");

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                match self.parse_param() {
                    Some(param) => params.push(param),
                    None => {
                        // Skip to the next parameter or the end of the list.
                        self.recover_to(&[TokenKind::Comma, TokenKind::RParen]);
                    }
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')'");

        let return_type = if self.expect(TokenKind::Arrow, "Expected '->'") {
            self.parse_type().unwrap_or_else(|| Rc::new(Type::Void))
        } else {
            self.recover_to(&[TokenKind::LBrace, TokenKind::Extern]);
            Rc::new(Type::Void)
        };

        if self.eat(TokenKind::Extern) {
            self.eat(TokenKind::Semicolon);
            return Some(FunctionDecl {
                name,
                params,
                return_type,
                body: None,
                is_extern: true,
                is_variadic: false,
                token,
            });
        }

        let body = self.parse_block();
        Some(FunctionDecl {
            name,
            params,
            return_type,
            body,
            is_extern: false,
            is_variadic: false,
            token,
        })
    }

    fn parse_param(&mut self) -> Option<Param> {
        let name = self.expect_ident("Expected parameter name")?;
        if !self.expect(TokenKind::Colon, "Expected ':'") {
            return None;
        }
        let ty = self.parse_type()?;
        Some(Param { name, ty })
    }

    fn parse_struct(&mut self, token: Token) -> Option<StructDecl> {
        let name = self.expect_ident("Expected struct name")?;
        self.expect(TokenKind::LBrace, "Expected '{'");

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            match self.parse_field() {
                Some(field) => fields.push(field),
                None => {
                    self.recover_to(&[TokenKind::Semicolon, TokenKind::RBrace]);
                    self.eat(TokenKind::Semicolon);
                }
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");

        Some(StructDecl { name, fields, token })
    }

    fn parse_field(&mut self) -> Option<Field> {
        let name = self.expect_ident("Expected field name")?;
        if !self.expect(TokenKind::Colon, "Expected ':'") {
            return None;
        }
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semicolon, "Expected ';'");
        Some(Field { name, ty })
    }

    fn parse_enum(&mut self, token: Token) -> Option<EnumDecl> {
        let name = self.expect_ident("Expected enum name")?;
        self.expect(TokenKind::LBrace, "Expected '{'");

        let mut variants = Vec::new();
        let mut value: i64 = 0;
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            let variant = match self.expect_ident("Expected variant name") {
                Some(variant) => variant,
                None => {
                    self.recover_to(&[TokenKind::Comma, TokenKind::RBrace]);
                    if self.eat(TokenKind::Comma) {
                        continue;
                    }
                    break;
                }
            };

            if self.eat(TokenKind::Eq) {
                let literal = self.current().lexeme.clone();
                if self.expect(TokenKind::Int, "Expected enum value") {
                    value = literal.parse().unwrap_or(value);
                }
            }

            variants.push((variant, value));
            value += 1;

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");

        Some(EnumDecl { name, variants, token })
    }

    // Types

    fn parse_type(&mut self) -> Option<Rc<Type>> {
        let base = match self.peek_kind() {
            TokenKind::I8 => Type::I8,
            TokenKind::I16 => Type::I16,
            TokenKind::I32 => Type::I32,
            TokenKind::I64 => Type::I64,
            TokenKind::U8 => Type::U8,
            TokenKind::U16 => Type::U16,
            TokenKind::U32 => Type::U32,
            TokenKind::U64 => Type::U64,
            TokenKind::F32 => Type::F32,
            TokenKind::F64 => Type::F64,
            TokenKind::Bool => Type::Bool,
            TokenKind::Void => Type::Void,
            TokenKind::Char => Type::Char,
            TokenKind::Str => Type::Str,
            TokenKind::Ident => Type::Named(self.current().lexeme.clone()),
            _ => {
                self.error("Expected type");
                self.advance();
                return None;
            }
        };
        self.advance();

        let mut ty = Rc::new(base);
        loop {
            if self.eat(TokenKind::Star) {
                ty = Rc::new(Type::Pointer(ty));
            } else if self.check(TokenKind::LBracket)
                && self.peek_ahead(1) == TokenKind::Int
                && self.peek_ahead(2) == TokenKind::RBracket
            {
                self.advance();
                let len = self.current().lexeme.parse().unwrap_or(0);
                self.advance();
                self.advance();
                ty = Rc::new(Type::Array(ty, len));
            } else {
                break;
            }
        }
        Some(ty)
    }

    // Statements

    fn parse_statement(&mut self) -> Option<Stmt> {
        let token = self.current().clone();

        if self.eat(TokenKind::Let) {
            return self.parse_let(token);
        }
        if self.eat(TokenKind::If) {
            return self.parse_if();
        }
        if self.eat(TokenKind::While) {
            return self.parse_while();
        }
        if self.eat(TokenKind::For) {
            return self.parse_for();
        }
        if self.eat(TokenKind::Return) {
            return self.parse_return(token);
        }
        if self.check(TokenKind::LBrace) {
            return self.parse_block();
        }

        // Expression statement.
        match self.parse_expression() {
            Some(expr) => {
                self.expect(TokenKind::Semicolon, "Expected ';'");
                Some(Stmt::Expr(expr))
            }
            None => {
                self.recover_to(&[TokenKind::Semicolon, TokenKind::RBrace]);
                self.eat(TokenKind::Semicolon);
                None
            }
        }
    }

    fn parse_block(&mut self) -> Option<Stmt> {
        if !self.expect(TokenKind::LBrace, "Expected '{'") {
            self.recover_to(&[TokenKind::RBrace]);
            self.eat(TokenKind::RBrace);
            return None;
        }

        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");

        Some(Stmt::Block(statements))
    }

    fn parse_let(&mut self, token: Token) -> Option<Stmt> {
        let mutable = self.eat(TokenKind::Mut);

        let name = match self.expect_ident("Expected variable name") {
            Some(name) => name,
            None => {
                self.recover_to(&[TokenKind::Semicolon, TokenKind::RBrace]);
                self.eat(TokenKind::Semicolon);
                return None;
            }
        };

        let ty = if self.eat(TokenKind::Colon) {
            self.parse_type()
        } else {
            None
        };

        let init = if self.eat(TokenKind::Eq) {
            self.parse_expression()
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "Expected ';'");
        Some(Stmt::Let {
            name,
            ty,
            init,
            mutable,
            token,
        })
    }

    fn parse_return(&mut self, token: Token) -> Option<Stmt> {
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::Semicolon, "Expected ';'");
        Some(Stmt::Return { value, token })
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        self.expect(TokenKind::LParen, "Expected '('");
        let cond = self.parse_expression().unwrap_or_else(|| self.error_expr());
        self.expect(TokenKind::RParen, "Expected ')'");

        let then_branch = Box::new(self.parse_statement().unwrap_or(Stmt::Block(Vec::new())));
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(
                self.parse_statement().unwrap_or(Stmt::Block(Vec::new())),
            ))
        } else {
            None
        };

        Some(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        self.expect(TokenKind::LParen, "Expected '('");
        let cond = self.parse_expression().unwrap_or_else(|| self.error_expr());
        self.expect(TokenKind::RParen, "Expected ')'");
        let body = Box::new(self.parse_statement().unwrap_or(Stmt::Block(Vec::new())));
        Some(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        self.expect(TokenKind::LParen, "Expected '('");

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else {
            self.parse_statement().map(Box::new)
        };

        let cond = if self.eat(TokenKind::Semicolon) {
            None
        } else {
            let cond = self.parse_expression();
            self.expect(TokenKind::Semicolon, "Expected ';'");
            cond
        };

        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            self.parse_expression()
        };
        self.expect(TokenKind::RParen, "Expected ')'");

        let body = Box::new(self.parse_statement().unwrap_or(Stmt::Block(Vec::new())));
        Some(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    // Expressions

    fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        let left = self.parse_binary(1)?;

        if self.peek_kind().is_assignment() {
            let token = self.advance();
            // Right-associative: a = b = c parses as a = (b = c).
            let right = match self.parse_assignment() {
                Some(right) => right,
                None => return Some(left),
            };
            let op = token.kind;
            return Some(Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                token,
            ));
        }

        Some(left)
    }

    /// Precedence climbing over the binding-power table. All levels are
    /// left-associative.
    fn parse_binary(&mut self, min_bp: u8) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while let Some(bp) = binding_power(self.peek_kind()) {
            if bp < min_bp {
                break;
            }
            let token = self.advance();
            let right = match self.parse_binary(bp + 1) {
                Some(right) => right,
                None => break,
            };
            let op = token.kind;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                token,
            );
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.peek_kind() {
            TokenKind::Minus | TokenKind::Not | TokenKind::Tilde => {
                let token = self.advance();
                let operand = self.parse_prefix()?;
                let op = token.kind;
                Some(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    token,
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(TokenKind::LParen) {
                let token = self.advance();
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        match self.parse_expression() {
                            Some(arg) => args.push(arg),
                            None => break,
                        }
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "Expected ')'");
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    token,
                );
            } else if self.check(TokenKind::LBracket) {
                let token = self.advance();
                let index = self.parse_expression().unwrap_or_else(|| self.error_expr());
                self.expect(TokenKind::RBracket, "Expected ']'");
                expr = Expr::new(
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    token,
                );
            } else if self.check(TokenKind::Dot) {
                let token = self.advance();
                let field = self
                    .expect_ident("Expected member name")
                    .unwrap_or_default();
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        field,
                    },
                    token,
                );
            } else {
                break;
            }
        }

        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.current().clone();

        match token.kind {
            TokenKind::Int => {
                self.advance();
                let value = match token.lexeme.parse() {
                    Ok(value) => value,
                    Err(_) => {
                        self.errors.push(Diagnostic::error(
                            "Integer literal out of range",
                            token.line,
                            token.column,
                            (token.span.start, token.span.end),
                        ));
                        0
                    }
                };
                Some(Expr::new(ExprKind::IntLit(value), token))
            }
            TokenKind::Float => {
                self.advance();
                let value = token.lexeme.parse().unwrap_or(0.0);
                Some(Expr::new(ExprKind::FloatLit(value), token))
            }
            TokenKind::StringLit => {
                self.advance();
                let value = token.lexeme.clone();
                Some(Expr::new(ExprKind::StrLit(value), token))
            }
            TokenKind::CharLit => {
                self.advance();
                let value = decode_char(&token.lexeme);
                Some(Expr::new(ExprKind::CharLit(value), token))
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::new(ExprKind::BoolLit(true), token))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::new(ExprKind::BoolLit(false), token))
            }
            TokenKind::Null => {
                self.advance();
                Some(Expr::new(ExprKind::NullLit, token))
            }
            TokenKind::Ident => {
                self.advance();
                let name = token.lexeme.clone();
                Some(Expr::new(ExprKind::Ident(name), token))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression();
                self.expect(TokenKind::RParen, "Expected ')'");
                expr
            }
            TokenKind::Asm => {
                self.advance();
                self.parse_asm(token)
            }
            kind if kind.is_type_name() => self.parse_cast(token),
            _ => {
                self.error("Expected expression");
                self.advance();
                None
            }
        }
    }

    /// Conversion expression: a type name applied like a call,
    /// `i64(x)` or `u8*(p)`.
    fn parse_cast(&mut self, token: Token) -> Option<Expr> {
        let target = self.parse_type()?;
        self.expect(TokenKind::LParen, "Expected '('");
        let operand = self.parse_expression().unwrap_or_else(|| self.error_expr());
        self.expect(TokenKind::RParen, "Expected ')'");
        Some(Expr::new(
            ExprKind::Cast {
                target,
                operand: Box::new(operand),
            },
            token,
        ))
    }

    /// Inline assembly: `asm [volatile] { "template", "clobber", … }`.
    fn parse_asm(&mut self, token: Token) -> Option<Expr> {
        let volatile = self.eat(TokenKind::Volatile);
        self.expect(TokenKind::LBrace, "Expected '{'");

        let text = self.current().lexeme.clone();
        if !self.expect(TokenKind::StringLit, "Expected assembly string") {
            self.recover_to(&[TokenKind::RBrace, TokenKind::Semicolon]);
            self.eat(TokenKind::RBrace);
            return None;
        }

        let mut clobbers = Vec::new();
        while self.eat(TokenKind::Comma) {
            let clobber = self.current().lexeme.clone();
            if !self.expect(TokenKind::StringLit, "Expected clobbered register name") {
                break;
            }
            clobbers.push(clobber);
        }
        self.expect(TokenKind::RBrace, "Expected '}'");

        Some(Expr::new(
            ExprKind::InlineAsm {
                text,
                volatile,
                clobbers,
            },
            token,
        ))
    }

    // Helpers

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_ahead(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(message);
            false
        }
    }

    fn expect_ident(&mut self, message: &str) -> Option<String> {
        if self.check(TokenKind::Ident) {
            Some(self.advance().lexeme)
        } else {
            self.error(message);
            None
        }
    }

    fn error(&mut self, message: &str) {
        let token = self.current();
        self.errors.push(Diagnostic::error(
            format!("{}, found {}", message, token),
            token.line,
            token.column,
            (token.span.start, token.span.end),
        ));
    }

    /// Placeholder expression used to keep parsing after a failure.
    fn error_expr(&self) -> Expr {
        Expr::new(ExprKind::IntLit(0), self.current().clone())
    }

    /// Skip tokens until one of `kinds` or end of input. Guarantees at
    /// least one token is consumed when none of `kinds` is current, so
    /// recovery can never loop.
    fn recover_to(&mut self, kinds: &[TokenKind]) {
        while !self.at_end() && !kinds.contains(&self.peek_kind()) {
            self.advance();
        }
    }

    fn at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }
}

/// Binding power for binary operators, from logical-or up to the
/// multiplicative level. Assignment and unary operators sit outside
/// this table.
fn binding_power(kind: TokenKind) -> Option<u8> {
    let bp = match kind {
        TokenKind::OrOr => 1,
        TokenKind::AndAnd => 2,
        TokenKind::Pipe => 3,
        TokenKind::Caret => 4,
        TokenKind::Amp => 5,
        TokenKind::EqEq | TokenKind::NotEq => 6,
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => 7,
        TokenKind::Shl | TokenKind::Shr => 8,
        TokenKind::Plus | TokenKind::Minus => 9,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 10,
        _ => return None,
    };
    Some(bp)
}

/// Decode a char literal lexeme (escapes are stored verbatim).
fn decode_char(lexeme: &str) -> char {
    let mut chars = lexeme.chars();
    match (chars.next(), chars.next()) {
        (Some('\\'), Some('n')) => '\n',
        (Some('\\'), Some('t')) => '\t',
        (Some('\\'), Some('r')) => '\r',
        (Some('\\'), Some('0')) => '\0',
        (Some('\\'), Some(other)) => other,
        (Some(c), _) => c,
        (None, _) => '\0',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> (Program, Vec<Diagnostic>) {
        let tokens = Lexer::new(source).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        let errors = parser.take_errors();
        (program, errors)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        program
    }

    #[test]
    fn test_empty_source() {
        let program = parse_ok("");
        assert!(program.decls.is_empty());
    }

    #[test]
    fn test_parse_simple_function() {
        let program = parse_ok("fn main() -> i32 { return 0; }");
        assert_eq!(program.decls.len(), 1);

        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        assert_eq!(f.name, "main");
        assert!(f.params.is_empty());
        assert_eq!(*f.return_type, Type::I32);
        assert!(!f.is_extern);
        assert!(f.body.is_some());
    }

    #[test]
    fn test_parse_params() {
        let program = parse_ok("fn add(a: i32, b: i32) -> i32 { return a + b; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].name, "a");
        assert_eq!(*f.params[1].ty, Type::I32);
    }

    #[test]
    fn test_parse_extern_function() {
        let program = parse_ok("fn print_int(n: i32) -> void extern");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        assert!(f.is_extern);
        assert!(f.body.is_none());
    }

    #[test]
    fn test_parse_struct() {
        let program = parse_ok("struct Point { x: i32; y: i32; }");
        let Decl::Struct(s) = &program.decls[0] else {
            panic!("Expected struct");
        };
        assert_eq!(s.name, "Point");
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.fields[1].name, "y");
    }

    #[test]
    fn test_parse_enum_values() {
        let program = parse_ok("enum Color { RED, GREEN = 5, BLUE }");
        let Decl::Enum(e) = &program.decls[0] else {
            panic!("Expected enum");
        };
        assert_eq!(
            e.variants,
            vec![
                ("RED".to_string(), 0),
                ("GREEN".to_string(), 5),
                ("BLUE".to_string(), 6),
            ]
        );
    }

    #[test]
    fn test_pointer_and_array_types() {
        let program = parse_ok("fn f(p: i32*, buf: u8[16]) -> i32* { return p; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        assert_eq!(*f.params[0].ty, Type::Pointer(Rc::new(Type::I32)));
        assert_eq!(*f.params[1].ty, Type::Array(Rc::new(Type::U8), 16));
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("fn f() -> i32 { return 1 + 2 * 3; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block body");
        };
        let Stmt::Return {
            value: Some(expr), ..
        } = &stmts[0]
        else {
            panic!("Expected return with value");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("Expected binary expression");
        };
        assert_eq!(*op, TokenKind::Plus);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: TokenKind::Star,
                ..
            }
        ));
    }

    #[test]
    fn test_comparison_binds_looser_than_shift() {
        let program = parse_ok("fn f(a: i32) -> bool { return a << 1 < 16; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::Return {
            value: Some(expr), ..
        } = &stmts[0]
        else {
            panic!("Expected return");
        };
        assert!(matches!(
            &expr.kind,
            ExprKind::Binary {
                op: TokenKind::Lt,
                ..
            }
        ));
    }

    #[test]
    fn test_assignment_right_associative() {
        let program = parse_ok("fn f() -> void { a = b = 1; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::Expr(expr) = &stmts[0] else {
            panic!("Expected expression statement");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("Expected assignment");
        };
        assert_eq!(*op, TokenKind::Eq);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: TokenKind::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let program = parse_ok("fn f() -> i32 { return p.items[2].value; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::Return {
            value: Some(expr), ..
        } = &stmts[0]
        else {
            panic!("Expected return");
        };
        let ExprKind::Member { base, field } = &expr.kind else {
            panic!("Expected member access");
        };
        assert_eq!(field, "value");
        assert!(matches!(base.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn test_cast_expression() {
        let program = parse_ok("fn f(x: i32) -> i64 { return i64(x); }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::Return {
            value: Some(expr), ..
        } = &stmts[0]
        else {
            panic!("Expected return");
        };
        let ExprKind::Cast { target, .. } = &expr.kind else {
            panic!("Expected cast");
        };
        assert_eq!(**target, Type::I64);
    }

    #[test]
    fn test_inline_asm() {
        let program = parse_ok(r#"fn f() -> void { asm volatile { "nop", "rax" }; }"#);
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::Expr(expr) = &stmts[0] else {
            panic!("Expected expression statement");
        };
        let ExprKind::InlineAsm {
            text,
            volatile,
            clobbers,
        } = &expr.kind
        else {
            panic!("Expected inline asm");
        };
        assert_eq!(text, "nop");
        assert!(volatile);
        assert_eq!(clobbers, &["rax".to_string()]);
    }

    #[test]
    fn test_for_loop_full_header() {
        let program = parse_ok(
            "fn f(n: i32) -> i32 { let mut s: i32 = 0; for (let mut i: i32 = 0; i < n; i = i + 1) { s = s + i; } return s; }",
        );
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        let Some(Stmt::Block(stmts)) = &f.body else {
            panic!("Expected block");
        };
        let Stmt::For {
            init, cond, update, ..
        } = &stmts[1]
        else {
            panic!("Expected for statement");
        };
        assert!(init.is_some());
        assert!(cond.is_some());
        assert!(update.is_some());
    }

    #[test]
    fn test_cjk_program_parses_like_ascii() {
        let program = parse_ok("计算 主函数() -> 整数 { 返回 0; }");
        let Decl::Function(f) = &program.decls[0] else {
            panic!("Expected function");
        };
        assert_eq!(f.name, "主函数");
        assert_eq!(*f.return_type, Type::I32);
    }

    #[test]
    fn test_error_recovery_continues_parsing() {
        let (program, errors) = parse("fn bad(x) -> i32 { return 0; } fn good() -> i32 { return 1; }");
        assert!(!errors.is_empty());
        // The second function must still have been parsed.
        assert!(program
            .decls
            .iter()
            .any(|d| matches!(d, Decl::Function(f) if f.name == "good")));
    }

    #[test]
    fn test_error_format() {
        let (_, errors) = parse("fn f() -> i32 { return 1 }");
        assert!(!errors.is_empty());
        let text = errors[0].to_string();
        assert!(
            text.starts_with("Error at line 1, column "),
            "got: {}",
            text
        );
    }

    #[test]
    fn test_missing_semicolon_recovery_does_not_loop() {
        // A pathological input; parsing must terminate.
        let (_, errors) = parse("fn f() -> i32 { let = ; + }");
        assert!(!errors.is_empty());
    }
}
