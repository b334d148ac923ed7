//! 条件评估器
//!
//! 将单个比较谓词套用到属性值上。数值比较要求两侧都是数字，
//! 相等比较对跨类型的值总是返回不相等，而不是报错。

use crate::error::{EvaluationError, Result};
use crate::models::{AttributeValue, Comparison, Literal};
use crate::operators::Comparator;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从属性集合中查到的值，`None` 表示属性不存在
    /// * `cond` - 规则中的比较谓词
    pub fn evaluate(field_value: Option<&AttributeValue>, cond: &Comparison) -> Result<bool> {
        let field_value = field_value.ok_or_else(|| EvaluationError::MissingAttribute {
            attribute: cond.attribute.clone(),
        })?;

        match cond.comparator {
            Comparator::Eq => Ok(Self::eq(field_value, &cond.literal)),
            Comparator::Neq => Ok(!Self::eq(field_value, &cond.literal)),
            Comparator::Gt => Self::compare(field_value, cond, |a, b| a > b),
            Comparator::Gte => Self::compare(field_value, cond, |a, b| a >= b),
            Comparator::Lt => Self::compare(field_value, cond, |a, b| a < b),
            Comparator::Lte => Self::compare(field_value, cond, |a, b| a <= b),
        }
    }

    /// 相等比较
    fn eq(field: &AttributeValue, expected: &Literal) -> bool {
        match (field, expected) {
            (AttributeValue::Number(a), Literal::Number(b)) => a == b,
            (AttributeValue::String(a), Literal::String(b)) => a == b,
            _ => false,
        }
    }

    /// 数值比较
    fn compare<F>(field: &AttributeValue, cond: &Comparison, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let mismatch = |actual: &str| EvaluationError::TypeMismatch {
            attribute: cond.attribute.clone(),
            comparator: cond.comparator.to_string(),
            expected: "number".to_string(),
            actual: actual.to_string(),
        };

        let field_num = match field {
            AttributeValue::Number(n) => *n,
            other => return Err(mismatch(other.type_name()).into()),
        };

        let expected_num = match &cond.literal {
            Literal::Number(n) => *n,
            Literal::String(_) => return Err(mismatch("string literal").into()),
        };

        Ok(cmp(field_num, expected_num))
    }
}
