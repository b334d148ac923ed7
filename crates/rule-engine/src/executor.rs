//! 规则执行器
//!
//! 实现规则树的短路求值执行，可选返回评估追踪信息。

use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::{Attributes, Comparison, EvaluationResult, Node};
use crate::operators::Connective;
use std::time::Instant;

/// 评估规则树，不记录追踪
pub fn evaluate(root: &Node, attributes: &Attributes) -> Result<bool> {
    RuleExecutor::new().evaluate(root, attributes)
}

/// 规则执行器
///
/// 执行过程不修改规则树，也不持有可变状态，同一棵树可被多个线程同时评估。
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 评估规则树，只返回布尔结论
    pub fn evaluate(&self, root: &Node, attributes: &Attributes) -> Result<bool> {
        let mut result = EvaluationResult::default();
        self.evaluate_node(root, attributes, &mut result, "root")
    }

    /// 执行规则评估，返回结论与追踪信息
    pub fn execute(&self, root: &Node, attributes: &Attributes) -> Result<EvaluationResult> {
        let start = Instant::now();

        let mut result = EvaluationResult::default();
        let matched = self.evaluate_node(root, attributes, &mut result, "root")?;

        result.matched = matched;
        result.evaluation_time_us = start.elapsed().as_micros() as i64;

        Ok(result)
    }

    /// 递归评估规则节点
    fn evaluate_node(
        &self,
        node: &Node,
        attributes: &Attributes,
        result: &mut EvaluationResult,
        path: &str,
    ) -> Result<bool> {
        match node {
            Node::Operand(cond) => self.evaluate_condition(cond, attributes, result, path),
            Node::Operator {
                connective,
                left,
                right,
            } => self.evaluate_operator(*connective, left, right, attributes, result, path),
        }
    }

    /// 评估条件节点
    fn evaluate_condition(
        &self,
        cond: &Comparison,
        attributes: &Attributes,
        result: &mut EvaluationResult,
        path: &str,
    ) -> Result<bool> {
        let field_value = attributes.get(&cond.attribute);

        let matched = ConditionEvaluator::evaluate(field_value, cond)?;

        if self.trace_enabled {
            result.evaluation_trace.push(format!(
                "{}: {} => {}",
                path,
                cond,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));

            if matched {
                result.matched_conditions.push(format!("{}: {}", path, cond));
            }
        }

        Ok(matched)
    }

    /// 评估操作符节点（短路求值）
    fn evaluate_operator(
        &self,
        connective: Connective,
        left: &Node,
        right: &Node,
        attributes: &Attributes,
        result: &mut EvaluationResult,
        path: &str,
    ) -> Result<bool> {
        let (left_path, right_path) = if self.trace_enabled {
            (format!("{}.left", path), format!("{}.right", path))
        } else {
            (String::new(), String::new())
        };

        let left_matched = self.evaluate_node(left, attributes, result, &left_path)?;

        // AND 遇到 false、OR 遇到 true 时结果已确定，右子树不再评估
        let short_circuit = match connective {
            Connective::And => !left_matched,
            Connective::Or => left_matched,
        };

        if short_circuit {
            if self.trace_enabled {
                result.evaluation_trace.push(format!(
                    "{}: {} 短路 - 左子树为 {}",
                    path, connective, left_matched
                ));
            }
            return Ok(left_matched);
        }

        self.evaluate_node(right, attributes, result, &right_path)
    }
}
