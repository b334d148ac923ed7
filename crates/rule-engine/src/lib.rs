//! 统一规则引擎
//!
//! 提供资格规则表达式的解析、合并与评估能力，支持：
//! - 规则文本解析为语法树（AND 优先于 OR，括号优先）
//! - 多条规则按 AND / OR 策略合并
//! - 短路求值执行与评估追踪
//! - 语法树的 JSON 序列化与规范文本渲染
//! - 线程安全的内存规则目录

pub mod cli;
pub mod combiner;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod models;
pub mod operators;
pub mod parser;
pub mod service;
pub mod store;

pub use combiner::{Combiner, combine};
pub use error::{EvaluationError, Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::{RuleExecutor, evaluate};
pub use models::{
    AttributeValue, Attributes, Branch, Comparison, DEFAULT_MAX_DEPTH, EvaluationResult, Literal,
    Node,
};
pub use operators::{Comparator, Connective};
pub use parser::{parse, parse_comparison, parse_with_max_depth};
pub use service::{RuleEngineService, RuleTarget};
pub use store::{RuleStore, RuleStoreStats, StoredRule};
