//! Tests for the SysLang lexer.

#[cfg(test)]
mod tests {
    use crate::lexer::chinese;
    use crate::lexer::lexer::Lexer;
    use crate::lexer::token::TokenKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("let x = 5;"),
            vec![
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_always_ends_with_eof() {
        for source in ["", "   ", "// comment only", "fn main", "@#$"] {
            let tokens = Lexer::new(source).tokenize();
            assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof, "for {:?}", source);
        }
    }

    #[test]
    fn test_function_header() {
        assert_eq!(
            kinds("fn add(a: i32, b: i32) -> i32"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::I32,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::I32,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::I32,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_maximal_munch() {
        assert_eq!(
            kinds("== != <= >= << >> && || ++ -- += -= *= /= %= -> => ::"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::PercentEq,
                TokenKind::Arrow,
                TokenKind::FatArrow,
                TokenKind::ColonColon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        let tokens = Lexer::new("42 3.25 7.").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[1].lexeme, "3.25");
        // A trailing dot is not part of the number.
        assert_eq!(tokens[2].kind, TokenKind::Int);
        assert_eq!(tokens[3].kind, TokenKind::Dot);
    }

    #[test]
    fn test_string_escape_passthrough() {
        let tokens = Lexer::new(r#""a\"b\n""#).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
        assert_eq!(tokens[0].lexeme, r#"a\"b\n"#);
    }

    #[test]
    fn test_char_literal() {
        let tokens = Lexer::new(r"'x' '\n'").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::CharLit);
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[1].kind, TokenKind::CharLit);
        assert_eq!(tokens[1].lexeme, r"\n");
    }

    #[test]
    fn test_comments_discarded() {
        assert_eq!(
            kinds("1 // line\n2 /* block\nspanning */ 3"),
            vec![TokenKind::Int, TokenKind::Int, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn test_comment_annotation_attaches_to_next_token() {
        let tokens = Lexer::new("// [主函数入口]\nfn main").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Fn);
        assert_eq!(tokens[0].annotation.as_deref(), Some("主函数入口"));
        assert_eq!(tokens[1].annotation, None);
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("fn\n  main").tokenize();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn test_unknown_byte_does_not_halt() {
        let tokens = Lexer::new("a @ b").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[1].lexeme, "@");
        assert_eq!(tokens[2].kind, TokenKind::Ident);
    }

    #[test]
    fn test_cjk_keywords() {
        assert_eq!(
            kinds("计算 主函数() -> 整数 { 返回 0; }"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::I32,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unmapped_cjk_word_is_identifier() {
        let tokens = Lexer::new("龙珠").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].lexeme, "龙珠");
    }

    #[test]
    fn test_mixed_cjk_ascii_identifier() {
        let tokens = Lexer::new("count计数").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].lexeme, "count计数");
    }

    #[test]
    fn test_fullwidth_punctuation_normalised() {
        let wide = "计算 主函数（） -> 整数 ｛ 返回 0； ｝";
        let narrow = "计算 主函数() -> 整数 { 返回 0; }";
        assert_eq!(kinds(wide), kinds(narrow));

        let tokens = Lexer::new(wide).tokenize();
        assert_eq!(tokens[2].kind, TokenKind::LParen);
        assert_eq!(tokens[2].lexeme, "(");
    }

    #[test]
    fn test_fullwidth_matches_normalised_source() {
        let wide = "如果（x ＜ 10）｛ y = 1； ｝";
        let normalised = chinese::normalize(wide);
        let a: Vec<_> = Lexer::new(wide)
            .tokenize()
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect();
        let b: Vec<_> = Lexer::new(&normalised)
            .tokenize()
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lexeme_round_trip() {
        let source = "fn f(a: i32) -> i32 { let x = a * 2 + 1; return x; }";
        let first = Lexer::new(source).tokenize();
        let rejoined = first
            .iter()
            .map(|t| t.lexeme.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let second = Lexer::new(&rejoined).tokenize();
        let a: Vec<_> = first.iter().map(|t| t.kind).collect();
        let b: Vec<_> = second.iter().map(|t| t.kind).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_peek_token_does_not_consume() {
        let lexer = Lexer::new("fn main()");
        assert_eq!(lexer.peek_token(0).kind, TokenKind::Fn);
        assert_eq!(lexer.peek_token(1).kind, TokenKind::Ident);
        assert_eq!(lexer.peek_token(2).kind, TokenKind::LParen);
        // The cursor has not moved.
        assert_eq!(lexer.peek_token(0).kind, TokenKind::Fn);
    }
}
