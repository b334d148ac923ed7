//! 规则引擎服务门面
//!
//! 为请求处理层提供三个逻辑操作：创建规则、合并规则、评估规则。
//! 每个操作都是对解析器、合并器、执行器的薄封装。

use crate::combiner::Combiner;
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::models::{Attributes, EvaluationResult, Node};
use crate::parser::parse_with_max_depth;
use crate::store::{RuleStore, StoredRule};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// 评估目标：直接给出的规则树，或目录中的规则 ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Tree(Node),
    Reference(String),
}

/// 规则引擎服务
#[derive(Clone, Default)]
pub struct RuleEngineService {
    store: RuleStore,
    combiner: Combiner,
    executor: RuleExecutor,
}

impl RuleEngineService {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store,
            combiner: Combiner::default(),
            executor: RuleExecutor::new(),
        }
    }

    /// 指定合并策略与去重选项
    pub fn with_combiner(mut self, combiner: Combiner) -> Self {
        self.combiner = combiner;
        self
    }

    /// 指定执行器（例如启用追踪）
    pub fn with_executor(mut self, executor: RuleExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// CreateRule：解析规则文本
    #[instrument(skip(self))]
    pub fn create_rule(&self, text: &str) -> Result<Node> {
        let node = parse_with_max_depth(text, self.combiner.max_depth())?;
        debug!(node_count = node.size(), "规则解析完成");
        Ok(node)
    }

    /// 解析规则并登记到目录，之后可按 ID 引用
    pub fn register_rule(&self, name: &str, text: &str) -> Result<StoredRule> {
        self.store.create(name, text)
    }

    /// CombineRules：按服务配置的策略合并规则文本
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub fn combine_rules<S: AsRef<str>>(&self, texts: &[S]) -> Result<Node> {
        self.combiner.combine(texts)
    }

    /// EvaluateRule：评估规则树或已登记的规则
    pub fn evaluate_rule(&self, target: &RuleTarget, attributes: &Attributes) -> Result<bool> {
        self.with_root(target, |root| self.executor.evaluate(root, attributes))
    }

    /// 评估并返回追踪信息（追踪是否记录取决于执行器配置）
    pub fn explain_rule(
        &self,
        target: &RuleTarget,
        attributes: &Attributes,
    ) -> Result<EvaluationResult> {
        self.with_root(target, |root| self.executor.execute(root, attributes))
    }

    fn with_root<T, F>(&self, target: &RuleTarget, f: F) -> Result<T>
    where
        F: FnOnce(&Node) -> Result<T>,
    {
        match target {
            RuleTarget::Tree(node) => f(node),
            RuleTarget::Reference(rule_id) => {
                let root = self.store.root(rule_id)?;
                f(root.as_ref())
            }
        }
    }
}
