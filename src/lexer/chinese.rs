//! CJK keyword aliases and full-width punctuation handling.
//!
//! SysLang programs may be written with Chinese keywords and full-width
//! punctuation. A purely-CJK word that matches the alias table lexes to
//! the equivalent ASCII keyword kind; full-width punctuation is mapped to
//! its ASCII counterpart before tokenisation.

use super::token::TokenKind;

/// Whether a code point lies in the CJK Unified Ideographs block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Look up a purely-CJK word in the keyword alias table.
pub fn cjk_keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "计算" | "函数" | "功能" => TokenKind::Fn,
        "如果" | "若" => TokenKind::If,
        "否则" | "其它" => TokenKind::Else,
        "循环" | "当" => TokenKind::While,
        "遍历" | "针对" => TokenKind::For,
        "返回" | "回传" => TokenKind::Return,
        "变量" | "设" => TokenKind::Let,
        "可变" => TokenKind::Mut,
        "常量" => TokenKind::Const,
        "结构" | "类" => TokenKind::Struct,
        "枚举" => TokenKind::Enum,
        "联合" => TokenKind::Union,
        "特性" | "接口" => TokenKind::Trait,
        "实现" => TokenKind::Impl,
        "真" => TokenKind::True,
        "假" => TokenKind::False,
        "空" => TokenKind::Null,
        "异步" => TokenKind::Async,
        "等待" => TokenKind::Await,
        "匹配" | "模式" => TokenKind::Match,
        "整数" => TokenKind::I32,
        "浮点" => TokenKind::F64,
        "字符" => TokenKind::Char,
        "字符串" => TokenKind::Str,
        "布尔" => TokenKind::Bool,
        "无值" => TokenKind::Void,
        "加" => TokenKind::Plus,
        "减" => TokenKind::Minus,
        "乘" => TokenKind::Star,
        "除" => TokenKind::Slash,
        "模" => TokenKind::Percent,
        _ => return None,
    };
    Some(kind)
}

/// Map full-width punctuation to its ASCII counterpart.
///
/// Characters outside the table are returned unchanged.
pub fn normalize_punctuation(c: char) -> char {
    match c {
        '。' => '.',
        '，' | '、' => ',',
        '：' => ':',
        '；' => ';',
        '！' => '!',
        '？' => '?',
        '（' => '(',
        '）' => ')',
        '［' => '[',
        '］' => ']',
        '｛' => '{',
        '｝' => '}',
        '＜' => '<',
        '＞' => '>',
        '「' | '」' => '"',
        _ => c,
    }
}

/// Normalise every full-width punctuation character in a string.
pub fn normalize(source: &str) -> String {
    source.chars().map(normalize_punctuation).collect()
}

/// Extract a bracketed CJK description from a comment body.
///
/// The convention is `[描述]`; the description must contain at least one
/// CJK character to count.
pub fn comment_description(comment: &str) -> Option<String> {
    let start = comment.find('[')?;
    let end = comment[start..].find(']')? + start;
    let desc = &comment[start + 1..end];
    if desc.chars().any(is_cjk) {
        Some(desc.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_aliases() {
        assert_eq!(cjk_keyword("计算"), Some(TokenKind::Fn));
        assert_eq!(cjk_keyword("返回"), Some(TokenKind::Return));
        assert_eq!(cjk_keyword("整数"), Some(TokenKind::I32));
        assert_eq!(cjk_keyword("加"), Some(TokenKind::Plus));
        assert_eq!(cjk_keyword("主函数"), None);
    }

    #[test]
    fn test_punctuation_normalisation() {
        assert_eq!(normalize("（）｛｝，。：；！？＜＞"), "(){},.:;!?<>");
        assert_eq!(normalize_punctuation('a'), 'a');
    }

    #[test]
    fn test_comment_description() {
        assert_eq!(
            comment_description("// [计算两数之和]"),
            Some("计算两数之和".to_string())
        );
        assert_eq!(comment_description("// [ascii only]"), None);
        assert_eq!(comment_description("// no brackets"), None);
    }
}
