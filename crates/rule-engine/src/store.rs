//! 规则目录
//!
//! 使用 DashMap 提供线程安全的规则缓存，支持按 ID 创建、读取、更新、删除规则，
//! 以及按 ID 合并与评估。规则树以 `Arc<Node>` 发布，更新时整体替换，
//! 读者只会看到替换前或替换后的完整树。

use crate::combiner::Combiner;
use crate::error::{Result, RuleError};
use crate::executor::RuleExecutor;
use crate::models::{Attributes, Branch, DEFAULT_MAX_DEPTH, Node};
use crate::parser::parse;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 目录中的一条规则
#[derive(Debug, Clone, Serialize)]
pub struct StoredRule {
    pub id: String,
    pub name: String,
    /// 规则文本（修改子树后为规范化渲染结果）
    pub text: String,
    pub root: Arc<Node>,
    /// 规则中引用的属性
    pub attributes: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRule {
    fn new(id: String, name: String, text: String, root: Node) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            text,
            attributes: root.attributes(),
            root: Arc::new(root),
            created_at: now,
            updated_at: now,
        }
    }

    /// 以新树替换当前树，保留 ID、名称与创建时间
    fn revise(&self, text: String, root: Node) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            text,
            attributes: root.attributes(),
            root: Arc::new(root),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// 规则存储
#[derive(Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
        }
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 解析并登记规则，返回分配了 ID 的规则
    #[instrument(skip(self, text))]
    pub fn create(&self, name: &str, text: &str) -> Result<StoredRule> {
        let root = parse(text)?;
        let rule = StoredRule::new(
            Uuid::new_v4().to_string(),
            name.to_string(),
            text.to_string(),
            root,
        );

        self.rules.insert(rule.id.clone(), rule.clone());

        info!(rule_id = %rule.id, "规则已创建");
        Ok(rule)
    }

    /// 获取规则
    pub fn get(&self, rule_id: &str) -> Option<StoredRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    /// 获取规则树
    pub fn root(&self, rule_id: &str) -> Result<Arc<Node>> {
        self.rules
            .get(rule_id)
            .map(|r| Arc::clone(&r.root))
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }

    /// 以新的规则文本整体替换规则
    #[instrument(skip(self, text))]
    pub fn update(&self, rule_id: &str, text: &str) -> Result<StoredRule> {
        let root = parse(text)?;
        self.revise(rule_id, |_| Ok((text.to_string(), root)))
    }

    /// 将规则中 `path` 处的子树替换为 `text` 解析得到的树
    #[instrument(skip(self, text))]
    pub fn modify(&self, rule_id: &str, path: &[Branch], text: &str) -> Result<StoredRule> {
        let subtree = parse(text)?;
        self.revise(rule_id, |current| {
            let root = current.root.replace(path, subtree)?;
            root.check_depth(DEFAULT_MAX_DEPTH)?;
            Ok((root.to_string(), root))
        })
    }

    /// 在条目锁内构建新版本并整体替换
    fn revise<F>(&self, rule_id: &str, build: F) -> Result<StoredRule>
    where
        F: FnOnce(&StoredRule) -> Result<(String, Node)>,
    {
        let Some(mut entry) = self.rules.get_mut(rule_id) else {
            warn!("更新不存在的规则: {}", rule_id);
            return Err(RuleError::RuleNotFound(rule_id.to_string()));
        };

        let (text, root) = build(entry.value())?;
        let revised = entry.revise(text, root);
        *entry = revised.clone();

        info!(rule_id = %rule_id, "规则已更新");
        Ok(revised)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 获取所有规则 ID
    pub fn list_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.key().clone()).collect()
    }

    /// 按给定顺序合并多条已登记的规则
    pub fn combine(&self, rule_ids: &[&str], combiner: Combiner) -> Result<Node> {
        if rule_ids.is_empty() {
            return Err(RuleError::Value("待合并的规则列表不能为空".to_string()));
        }

        let nodes = rule_ids
            .iter()
            .map(|id| self.root(id).map(Arc::unwrap_or_clone))
            .collect::<Result<Vec<_>>>()?;

        combiner.combine_nodes(nodes)
    }

    /// 按 ID 评估规则
    pub fn evaluate(&self, rule_id: &str, attributes: &Attributes) -> Result<bool> {
        let root = self.root(rule_id)?;
        RuleExecutor::new().evaluate(&root, attributes)
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rules_count = self.rules.len();
        let (total_nodes, total_attributes) = self
            .rules
            .iter()
            .fold((0, 0), |(nodes, attributes), r| {
                (nodes + r.root.size(), attributes + r.attributes.len())
            });

        RuleStoreStats {
            rules_count,
            total_nodes,
            avg_attributes_per_rule: if rules_count > 0 {
                total_attributes as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 所有规则树的节点总数
    pub total_nodes: usize,
    /// 平均每条规则引用的属性数
    pub avg_attributes_per_rule: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::operators::Connective;

    #[test]
    fn test_create_rule() {
        let store = RuleStore::new();
        let rule = store
            .create("senior_sales", "age > 30 AND department = 'Sales'")
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains(&rule.id));
        assert_eq!(rule.name, "senior_sales");
        assert_eq!(
            rule.attributes.iter().cloned().collect::<Vec<_>>(),
            vec!["age".to_string(), "department".to_string()]
        );
    }

    #[test]
    fn test_create_invalid_rule_is_not_stored() {
        let store = RuleStore::new();
        let err = store.create("broken", "age >> 30").unwrap_err();

        assert!(err.is_syntax());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_nonexistent_rule() {
        let store = RuleStore::new();
        assert!(store.get("nonexistent").is_none());
        assert!(matches!(
            store.root("nonexistent"),
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_update_rule() {
        let store = RuleStore::new();
        let rule = store.create("test", "age > 30").unwrap();
        let before = store.root(&rule.id).unwrap();

        let updated = store.update(&rule.id, "age > 40").unwrap();

        assert_eq!(updated.id, rule.id);
        assert_eq!(updated.created_at, rule.created_at);
        assert_eq!(updated.text, "age > 40");
        // 已发布的旧树不受影响
        assert_eq!(before.to_string(), "age > 30");
        assert_eq!(store.root(&rule.id).unwrap().to_string(), "age > 40");
    }

    #[test]
    fn test_update_nonexistent_rule() {
        let store = RuleStore::new();
        assert!(matches!(
            store.update("nonexistent", "a = 1"),
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_update_with_invalid_text_keeps_old_rule() {
        let store = RuleStore::new();
        let rule = store.create("test", "age > 30").unwrap();

        assert!(store.update(&rule.id, "age >").is_err());
        assert_eq!(store.get(&rule.id).unwrap().text, "age > 30");
    }

    #[test]
    fn test_modify_subtree() {
        let store = RuleStore::new();
        let rule = store
            .create("test", "age > 30 AND department = 'Sales'")
            .unwrap();

        let modified = store
            .modify(&rule.id, &[Branch::Right], "department = 'Marketing' OR salary > 5000")
            .unwrap();

        assert_eq!(
            modified.text,
            "age > 30 AND (department = 'Marketing' OR salary > 5000)"
        );
        assert!(modified.attributes.contains("salary"));

        let err = store
            .modify(&rule.id, &[Branch::Left, Branch::Left], "a = 1")
            .unwrap_err();
        assert!(matches!(err, RuleError::Value(_)));
    }

    #[test]
    fn test_modify_rejects_tree_deeper_than_limit() {
        let store = RuleStore::new();
        let flat = |count: usize| {
            (0..count)
                .map(|i| format!("a = {}", i))
                .collect::<Vec<_>>()
                .join(" OR ")
        };
        let rule = store.create("long", &flat(200)).unwrap();

        // 最左侧的叶子位于第 200 层
        let leftmost = vec![Branch::Left; 199];
        let err = store.modify(&rule.id, &leftmost, &flat(100)).unwrap_err();
        assert!(matches!(err, RuleError::Value(_)));
        assert_eq!(store.root(&rule.id).unwrap().depth(), 200);

        let modified = store.modify(&rule.id, &leftmost, &flat(57)).unwrap();
        assert_eq!(modified.root.depth(), DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_delete_rule() {
        let store = RuleStore::new();
        let rule = store.create("test", "a = 1").unwrap();

        store.delete(&rule.id).unwrap();

        assert!(!store.contains(&rule.id));
        assert!(store.delete(&rule.id).is_err());
    }

    #[test]
    fn test_list_ids() {
        let store = RuleStore::new();
        let first = store.create("test1", "a = 1").unwrap();
        let second = store.create("test2", "b = 2").unwrap();

        let ids = store.list_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }

    #[test]
    fn test_combine_by_id() {
        let store = RuleStore::new();
        let age = store.create("age", "age > 30").unwrap();
        let salary = store.create("salary", "salary > 50000").unwrap();

        let combined = store
            .combine(&[age.id.as_str(), salary.id.as_str()], Combiner::new(Connective::Or))
            .unwrap();
        assert_eq!(combined.to_string(), "age > 30 OR salary > 50000");

        assert!(matches!(
            store.combine(&[age.id.as_str(), "missing"], Combiner::default()),
            Err(RuleError::RuleNotFound(_))
        ));
        assert!(store.combine(&[], Combiner::default()).is_err());
    }

    #[test]
    fn test_evaluate_by_id() {
        let store = RuleStore::new();
        let rule = store.create("test", "age > 30").unwrap();

        assert!(
            store
                .evaluate(&rule.id, &Attributes::new().with("age", 35))
                .unwrap()
        );

        let err = store.evaluate(&rule.id, &Attributes::new()).unwrap_err();
        assert!(matches!(
            err,
            RuleError::Evaluation(EvaluationError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_clear_and_stats() {
        let store = RuleStore::new();
        store.create("test1", "a = 1 AND b = 2").unwrap();
        store.create("test2", "a = 1").unwrap();

        let stats = store.stats();
        assert_eq!(stats.rules_count, 2);
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.avg_attributes_per_rule, 1.5);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats().avg_attributes_per_rule, 0.0);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let shared = store.create("shared", "age > 30").unwrap();
        let store_clone = store.clone();
        let shared_id = shared.id.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone
                    .create(&format!("rule-{}", i), &format!("age > {}", i))
                    .unwrap();
                store_clone
                    .evaluate(&shared_id, &Attributes::new().with("age", 35))
                    .unwrap();
            }
        });

        for i in 100..200 {
            store
                .create(&format!("rule-{}", i), &format!("age > {}", i))
                .unwrap();
            store
                .update(&shared.id, &format!("age > {}", i % 30))
                .unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 201);
    }
}
