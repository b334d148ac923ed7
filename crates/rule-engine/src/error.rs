//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("语法错误 (位置 {position}): {message}")]
    Syntax { position: usize, message: String },

    #[error("参数无效: {0}")]
    Value(String),

    #[error("规则评估失败: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// 评估阶段的错误：规则本身合法，但数据无法套用
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("属性不存在: {attribute}")]
    MissingAttribute { attribute: String },

    #[error("类型不匹配: {attribute} {comparator} 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        attribute: String,
        comparator: String,
        expected: String,
        actual: String,
    },
}

impl RuleError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }

    /// 错误发生的位置（仅语法错误）
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
