//! 规则文本分词器
//!
//! 按空白与符号 `( ) AND OR > < >= <= = !=` 切分规则文本，
//! 每个记号携带其在原文中的字节偏移，供语法错误定位。

use crate::error::{Result, RuleError};
use crate::operators::Comparator;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d*)?$").expect("valid number pattern"));

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid identifier pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Comparator(Comparator),
    Identifier(String),
    Number(f64),
    Str(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Comparator(c) => write!(f, "比较运算符 '{}'", c),
            Self::Identifier(name) => write!(f, "标识符 '{}'", name),
            Self::Number(n) => write!(f, "数字 {}", n),
            Self::Str(s) => write!(f, "字符串 '{}'", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 记号在原文中的字节偏移
    pub position: usize,
}

fn is_comparator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!')
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"') || is_comparator_char(c)
}

/// 将规则文本切分为记号序列
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '\'' | '"' => {
                chars.next();
                TokenKind::Str(read_quoted(&mut chars, c, start)?)
            }
            c if is_comparator_char(c) => {
                let mut symbol = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_comparator_char(c) {
                        break;
                    }
                    symbol.push(c);
                    chars.next();
                }
                let comparator = Comparator::from_symbol(&symbol).ok_or_else(|| {
                    RuleError::syntax(start, format!("未知的比较运算符 '{}'", symbol))
                })?;
                TokenKind::Comparator(comparator)
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if is_word_boundary(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                classify_word(&word, start)?
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

/// 读取引号内的字符串，反斜杠转义下一个字符
fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String> {
    let mut content = String::new();

    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => content.push(escaped),
                None => break,
            },
            c if c == quote => return Ok(content),
            c => content.push(c),
        }
    }

    Err(RuleError::syntax(start, "字符串未闭合"))
}

/// 是否为合法的属性名（关键字除外）
pub(crate) fn is_identifier(word: &str) -> bool {
    !matches!(word, "AND" | "OR") && IDENTIFIER_PATTERN.is_match(word)
}

fn classify_word(word: &str, start: usize) -> Result<TokenKind> {
    match word {
        "AND" => return Ok(TokenKind::And),
        "OR" => return Ok(TokenKind::Or),
        _ => {}
    }

    if NUMBER_PATTERN.is_match(word) {
        let value = word
            .parse::<f64>()
            .map_err(|e| RuleError::syntax(start, format!("无效的数字 '{}': {}", word, e)))?;
        if !value.is_finite() {
            return Err(RuleError::syntax(
                start,
                format!("数字超出可表示范围: {}", word),
            ));
        }
        return Ok(TokenKind::Number(value));
    }

    if IDENTIFIER_PATTERN.is_match(word) {
        return Ok(TokenKind::Identifier(word.to_string()));
    }

    Err(RuleError::syntax(
        start,
        format!("无法识别的记号 '{}'", word),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_simple_comparison() {
        assert_eq!(
            kinds("age >= 30"),
            vec![
                TokenKind::Identifier("age".to_string()),
                TokenKind::Comparator(Comparator::Gte),
                TokenKind::Number(30.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_without_spaces() {
        assert_eq!(
            kinds("(age>-5)AND(name!='x y')"),
            vec![
                TokenKind::LParen,
                TokenKind::Identifier("age".to_string()),
                TokenKind::Comparator(Comparator::Gt),
                TokenKind::Number(-5.0),
                TokenKind::RParen,
                TokenKind::And,
                TokenKind::LParen,
                TokenKind::Identifier("name".to_string()),
                TokenKind::Comparator(Comparator::Neq),
                TokenKind::Str("x y".to_string()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_quoted_strings() {
        assert_eq!(
            kinds(r#"a = "Sales" OR b = 'it\'s'"#),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Comparator(Comparator::Eq),
                TokenKind::Str("Sales".to_string()),
                TokenKind::Or,
                TokenKind::Identifier("b".to_string()),
                TokenKind::Comparator(Comparator::Eq),
                TokenKind::Str("it's".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("age  > 30").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 5, 7]);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Number(1.5)]);
        assert_eq!(kinds("+7"), vec![TokenKind::Number(7.0)]);
        assert_eq!(kinds("30."), vec![TokenKind::Number(30.0)]);
        assert!(tokenize("1.2.3").is_err());
        assert!(tokenize("1e5").is_err());
    }

    #[test]
    fn test_number_out_of_range() {
        let huge = format!("1{}", "0".repeat(400));
        let err = tokenize(&format!("age < {}", huge)).unwrap_err();
        assert_eq!(err.position(), Some(6));

        // 309 位以内仍可表示
        let large = format!("1{}", "0".repeat(300));
        assert_eq!(kinds(&large), vec![TokenKind::Number(1e300)]);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("employee.age"));
        assert!(is_identifier("_flag"));
        assert!(!is_identifier("first name"));
        assert!(!is_identifier("AND"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(kinds("and"), vec![TokenKind::Identifier("and".to_string())]);
        assert_eq!(kinds("OR"), vec![TokenKind::Or]);
    }

    #[test]
    fn test_unknown_comparator() {
        let err = tokenize("age >> 30").unwrap_err();
        assert_eq!(err.position(), Some(4));
        assert!(err.to_string().contains(">>"));

        assert!(tokenize("age == 30").is_err());
        assert!(tokenize("age ! 30").is_err());
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("name = 'Sales").unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.position(), Some(7));
    }

    #[test]
    fn test_unrecognized_token() {
        let err = tokenize("age > 30 & x").unwrap_err();
        assert_eq!(err.position(), Some(9));
    }
}
