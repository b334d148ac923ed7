//! 规则表达式解析器
//!
//! 递归下降实现运算符优先级：
//!
//! ```text
//! or_expr    := and_expr ("OR" and_expr)*
//! and_expr   := term ("AND" term)*
//! term       := "(" or_expr ")" | comparison
//! comparison := IDENTIFIER COMPARATOR literal
//! ```
//!
//! AND 优先于 OR，同级左结合，括号优先。任何错误都直接返回，不产生部分语法树。
//! 树高与括号嵌套层数都不能超过 `max_depth`，默认为 [`DEFAULT_MAX_DEPTH`]。

use crate::error::{Result, RuleError};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::models::{Comparison, DEFAULT_MAX_DEPTH, Literal, Node};
use crate::operators::Connective;

/// 解析规则文本为语法树
pub fn parse(input: &str) -> Result<Node> {
    parse_with_max_depth(input, DEFAULT_MAX_DEPTH)
}

/// 解析规则文本，树高或括号嵌套超过 `max_depth` 时返回语法错误
pub fn parse_with_max_depth(input: &str, max_depth: usize) -> Result<Node> {
    let mut parser = Parser::new(input, max_depth)?;

    if parser.tokens.is_empty() {
        return Err(RuleError::syntax(0, "规则为空"));
    }

    let (node, _) = parser.parse_or()?;
    parser.expect_end()?;
    Ok(node)
}

/// 解析单个比较谓词（如 "age > 30"）
pub fn parse_comparison(input: &str) -> Result<Comparison> {
    let mut parser = Parser::new(input, DEFAULT_MAX_DEPTH)?;
    let comparison = parser.parse_comparison()?;
    parser.expect_end()?;
    Ok(comparison)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    input_len: usize,
    max_depth: usize,
    /// 当前所在的括号层数
    nesting: usize,
}

impl Parser {
    fn new(input: &str, max_depth: usize) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            input_len: input.len(),
            max_depth,
            nesting: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_connective(&self) -> Option<Connective> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::And) => Some(Connective::And),
            Some(TokenKind::Or) => Some(Connective::Or),
            _ => None,
        }
    }

    /// 以 `connective` 连接两棵子树，返回新树及其树高
    fn join(
        &self,
        connective: Connective,
        (left, left_depth): (Node, usize),
        (right, right_depth): (Node, usize),
        position: usize,
    ) -> Result<(Node, usize)> {
        let depth = left_depth.max(right_depth) + 1;
        if depth > self.max_depth {
            return Err(RuleError::syntax(
                position,
                format!("规则树深度超过上限 {}", self.max_depth),
            ));
        }
        Ok((Node::operator(connective, left, right), depth))
    }

    fn parse_or(&mut self) -> Result<(Node, usize)> {
        let mut left = self.parse_and()?;

        while self.peek_connective() == Some(Connective::Or) {
            let position = self.advance().map_or(self.input_len, |t| t.position);
            let right = self.parse_and()?;
            left = self.join(Connective::Or, left, right, position)?;
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<(Node, usize)> {
        let mut left = self.parse_term()?;

        while self.peek_connective() == Some(Connective::And) {
            let position = self.advance().map_or(self.input_len, |t| t.position);
            let right = self.parse_term()?;
            left = self.join(Connective::And, left, right, position)?;
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> Result<(Node, usize)> {
        let Some(token) = self.peek().cloned() else {
            return Err(RuleError::syntax(
                self.input_len,
                "规则意外结束，缺少比较表达式",
            ));
        };

        match token.kind {
            TokenKind::LParen => {
                if self.nesting >= self.max_depth {
                    return Err(RuleError::syntax(
                        token.position,
                        format!("括号嵌套超过上限 {}", self.max_depth),
                    ));
                }
                self.advance();
                self.nesting += 1;
                let inner = self.parse_or()?;
                self.nesting -= 1;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(RuleError::syntax(
                        other.position,
                        format!("期望 ')'，实际为 {}", other.kind),
                    )),
                    None => Err(RuleError::syntax(token.position, "左括号未闭合")),
                }
            }
            TokenKind::Identifier(_) => Ok((Node::Operand(self.parse_comparison()?), 1)),
            TokenKind::And | TokenKind::Or => Err(RuleError::syntax(
                token.position,
                format!("连接词 {} 缺少左侧操作数", token.kind),
            )),
            TokenKind::RParen => Err(RuleError::syntax(
                token.position,
                "意外的 ')'，括号内缺少比较表达式",
            )),
            TokenKind::Comparator(_) => Err(RuleError::syntax(
                token.position,
                format!("{} 缺少属性名", token.kind),
            )),
            TokenKind::Number(_) | TokenKind::Str(_) => Err(RuleError::syntax(
                token.position,
                format!("比较表达式必须以属性名开头，实际为 {}", token.kind),
            )),
        }
    }

    fn parse_comparison(&mut self) -> Result<Comparison> {
        let attribute = match self.advance() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) => name,
            Some(other) => {
                return Err(RuleError::syntax(
                    other.position,
                    format!("期望属性名，实际为 {}", other.kind),
                ));
            }
            None => return Err(RuleError::syntax(self.input_len, "缺少比较表达式")),
        };

        let comparator = match self.advance() {
            Some(Token {
                kind: TokenKind::Comparator(comparator),
                ..
            }) => comparator,
            Some(other) => {
                let message = match other.kind {
                    TokenKind::Identifier(_) => format!("两个标识符相邻: {}", other.kind),
                    _ => format!(
                        "属性 '{}' 之后期望比较运算符，实际为 {}",
                        attribute, other.kind
                    ),
                };
                return Err(RuleError::syntax(other.position, message));
            }
            None => {
                return Err(RuleError::syntax(
                    self.input_len,
                    format!("属性 '{}' 之后缺少比较运算符", attribute),
                ));
            }
        };

        let literal = match self.advance() {
            Some(Token {
                kind: TokenKind::Number(n),
                ..
            }) => Literal::Number(n),
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Literal::String(s),
            Some(other) => {
                return Err(RuleError::syntax(
                    other.position,
                    format!(
                        "字面量必须是数字或带引号的字符串，实际为 {}",
                        other.kind
                    ),
                ));
            }
            None => {
                return Err(RuleError::syntax(
                    self.input_len,
                    format!("'{} {}' 之后缺少字面量", attribute, comparator),
                ));
            }
        };

        Ok(Comparison {
            attribute,
            comparator,
            literal,
        })
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => {
                let message = match token.kind {
                    TokenKind::RParen => "多余的 ')'，没有匹配的左括号".to_string(),
                    TokenKind::Number(_) | TokenKind::Str(_) => {
                        format!("两个字面量相邻: {}", token.kind)
                    }
                    _ => format!("意外的 {}，期望 AND、OR 或结束", token.kind),
                };
                Err(RuleError::syntax(token.position, message))
            }
        }
    }
}
