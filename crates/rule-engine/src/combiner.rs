//! 规则合并器
//!
//! 将有序的多条规则按合并策略（AND / OR）折叠为一棵树。
//! 折叠方向固定为左倾：`[r1, r2, r3]` 得到 `(r1 P r2) P r3`，
//! 因此合并 n 条规则至少得到 n 层深的树，超过 `max_depth` 时报错。

use crate::error::{Result, RuleError};
use crate::models::{DEFAULT_MAX_DEPTH, Node};
use crate::operators::Connective;
use crate::parser::parse_with_max_depth;
use tracing::debug;

/// 解析并合并多条规则
pub fn combine<S: AsRef<str>>(rules: &[S], policy: Connective) -> Result<Node> {
    Combiner::new(policy).combine(rules)
}

/// 规则合并器
#[derive(Debug, Clone, Copy)]
pub struct Combiner {
    policy: Connective,
    /// 合并前丢弃与前面某条结构完全相同的规则
    dedup: bool,
    max_depth: usize,
}

impl Default for Combiner {
    fn default() -> Self {
        Self::new(Connective::default())
    }
}

impl Combiner {
    pub fn new(policy: Connective) -> Self {
        Self {
            policy,
            dedup: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// 设置解析与合并结果允许的最大树高
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 启用结构去重
    pub fn with_dedup(mut self) -> Self {
        self.dedup = true;
        self
    }

    pub fn policy(&self) -> Connective {
        self.policy
    }

    /// 解析每条规则后合并，任意一条解析失败则整体失败
    pub fn combine<S: AsRef<str>>(&self, rules: &[S]) -> Result<Node> {
        if rules.is_empty() {
            return Err(RuleError::Value("待合并的规则列表不能为空".to_string()));
        }

        let nodes = rules
            .iter()
            .map(|rule| parse_with_max_depth(rule.as_ref(), self.max_depth))
            .collect::<Result<Vec<_>>>()?;

        self.combine_nodes(nodes)
    }

    /// 合并已构建的规则树
    pub fn combine_nodes(&self, nodes: Vec<Node>) -> Result<Node> {
        let input_count = nodes.len();
        let nodes = if self.dedup {
            Self::dedup(nodes)
        } else {
            nodes
        };

        let mut iter = nodes.into_iter();
        let mut combined = iter
            .next()
            .ok_or_else(|| RuleError::Value("待合并的规则列表不能为空".to_string()))?;
        let mut depth = combined.check_depth(self.max_depth)?;

        for node in iter {
            depth = depth.max(node.check_depth(self.max_depth)?) + 1;
            if depth > self.max_depth {
                return Err(RuleError::Value(format!(
                    "合并后的规则树深度超过上限 {}",
                    self.max_depth
                )));
            }
            combined = Node::operator(self.policy, combined, node);
        }

        debug!(
            policy = %self.policy,
            input_count,
            node_count = combined.size(),
            "规则合并完成"
        );

        Ok(combined)
    }

    /// 保留每棵结构相同的树的第一次出现，顺序不变
    fn dedup(nodes: Vec<Node>) -> Vec<Node> {
        let mut unique: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        unique
    }
}
