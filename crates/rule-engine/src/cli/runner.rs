//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑，返回需要打印到标准输出的文本。

use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use rule_shared::config::EngineConfig;

use crate::cli::commands::Commands;
use crate::combiner::Combiner;
use crate::executor::RuleExecutor;
use crate::models::{Attributes, Node};
use crate::operators::Connective;
use crate::parser::parse_with_max_depth;

/// 命令执行器
///
/// 持有引擎配置，命令行参数优先于配置项。
pub struct CommandRunner {
    config: EngineConfig,
}

impl CommandRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// 分发并执行子命令
    pub fn run(&self, command: Commands) -> Result<String> {
        match command {
            Commands::Parse { rule, pretty } => self.run_parse(&rule, pretty),
            Commands::Combine {
                rules,
                policy,
                dedup,
                pretty,
            } => self.run_combine(&rules, policy.as_deref(), dedup, pretty),
            Commands::Evaluate {
                rule,
                tree,
                attributes,
                trace,
            } => self.run_evaluate(rule.as_deref(), tree.as_deref(), &attributes, trace),
            Commands::Render { tree } => self.run_render(&tree),
        }
    }

    /// 执行 parse 命令
    pub fn run_parse(&self, rule: &str, pretty: bool) -> Result<String> {
        let node = parse_with_max_depth(rule, self.config.max_depth)?;
        info!(node_count = node.size(), depth = node.depth(), "规则解析完成");
        to_json(&node, pretty)
    }

    /// 执行 combine 命令
    pub fn run_combine(
        &self,
        rules: &[String],
        policy: Option<&str>,
        dedup: bool,
        pretty: bool,
    ) -> Result<String> {
        let policy: Connective = policy
            .unwrap_or(self.config.default_policy.as_str())
            .parse()
            .context("无效的合并策略")?;

        let mut combiner = Combiner::new(policy).with_max_depth(self.config.max_depth);
        if dedup || self.config.dedup {
            combiner = combiner.with_dedup();
        }

        let node = combiner.combine(rules)?;
        to_json(&node, pretty)
    }

    /// 执行 evaluate 命令
    ///
    /// 不带追踪时输出 `true` / `false`，带追踪时输出完整评估结果 JSON。
    pub fn run_evaluate(
        &self,
        rule: Option<&str>,
        tree: Option<&str>,
        attributes: &str,
        trace: bool,
    ) -> Result<String> {
        let root = match (rule, tree) {
            (Some(text), _) => parse_with_max_depth(text, self.config.max_depth)?,
            (None, Some(tree)) => read_tree(tree, self.config.max_depth)?,
            (None, None) => anyhow::bail!("必须提供 --rule 或 --tree"),
        };

        let attributes =
            Attributes::from_json(&read_input(attributes)?).context("属性集合解析失败")?;
        debug!(attribute_count = attributes.len(), "属性加载完成");

        if trace || self.config.trace {
            let result = RuleExecutor::new().with_trace().execute(&root, &attributes)?;
            return to_json(&result, true);
        }

        let matched = RuleExecutor::new().evaluate(&root, &attributes)?;
        Ok(matched.to_string())
    }

    /// 执行 render 命令
    pub fn run_render(&self, tree: &str) -> Result<String> {
        Ok(read_tree(tree, self.config.max_depth)?.to_string())
    }
}

/// 读取参数内容，`@path` 形式从文件读取
fn read_input(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("无法读取文件: {}", path))
        }
        None => Ok(arg.to_string()),
    }
}

fn read_tree(arg: &str, max_depth: usize) -> Result<Node> {
    let json = read_input(arg)?;
    Node::from_json_with_max_depth(&json, max_depth).context("规则树 JSON 无效")
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn runner() -> CommandRunner {
        CommandRunner::new(EngineConfig::default())
    }

    #[test]
    fn test_run_parse() {
        let output = runner().run_parse("age > 30", false).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["type"], "operand");
        assert_eq!(value["value"]["attribute"], "age");
        assert_eq!(value["value"]["comparator"], ">");
    }

    #[test]
    fn test_run_parse_syntax_error() {
        let err = runner().run_parse("age >> 30", false).unwrap_err();
        assert!(err.to_string().contains("位置 4"));
    }

    #[test]
    fn test_run_combine_uses_configured_policy() {
        let config = EngineConfig {
            default_policy: "and".to_string(),
            ..EngineConfig::default()
        };
        let output = CommandRunner::new(config)
            .run_combine(&["a = 1".to_string(), "b = 2".to_string()], None, false, false)
            .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["type"], "operator");
        assert_eq!(value["value"], "AND");
    }

    #[test]
    fn test_run_combine_policy_override_and_invalid() {
        let rules = vec!["a = 1".to_string(), "b = 2".to_string()];

        let output = runner().run_combine(&rules, Some("AND"), false, false).unwrap();
        let node: Node = serde_json::from_str(&output).unwrap();
        assert_eq!(node.to_string(), "a = 1 AND b = 2");

        assert!(runner().run_combine(&rules, Some("xor"), false, false).is_err());
    }

    #[test]
    fn test_run_evaluate_rule_text() {
        let output = runner()
            .run_evaluate(
                Some("age > 30 AND department = 'Sales'"),
                None,
                r#"{"age": 35, "department": "Sales"}"#,
                false,
            )
            .unwrap();
        assert_eq!(output, "true");
    }

    #[test]
    fn test_run_evaluate_tree_with_trace() {
        let tree = json!({
            "type": "operator",
            "value": "OR",
            "left": {"type": "operand", "value": "age > 30"},
            "right": {"type": "operand", "value": "salary > 50000"}
        })
        .to_string();

        let output = runner()
            .run_evaluate(None, Some(&tree), r#"{"age": 40}"#, true)
            .unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["matched"], true);
        assert_eq!(value["matched_conditions"][0], "root.left: age > 30");
    }

    #[test]
    fn test_run_evaluate_missing_attribute() {
        let err = runner()
            .run_evaluate(Some("age > 30"), None, "{}", false)
            .unwrap_err();
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn test_run_render_from_file() {
        let path = std::env::temp_dir().join(format!("rule-engine-render-{}.json", std::process::id()));
        let tree = runner()
            .run_parse("(a = 1 OR b = 2) AND c = 'x'", false)
            .unwrap();
        fs::write(&path, tree).unwrap();

        let output = runner()
            .run_render(&format!("@{}", path.display()))
            .unwrap();
        assert_eq!(output, "(a = 1 OR b = 2) AND c = 'x'");

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_input_missing_file() {
        assert!(read_input("@/nonexistent/rule-engine/input.json").is_err());
    }

    #[test]
    fn test_parse_output_feeds_evaluate_for_long_rules() {
        let rule = (0..200)
            .map(|i| format!("a = {}", i))
            .collect::<Vec<_>>()
            .join(" OR ");
        let tree = runner().run_parse(&rule, false).unwrap();

        let output = runner()
            .run_evaluate(None, Some(&tree), r#"{"a": 199}"#, false)
            .unwrap();
        assert_eq!(output, "true");
        let rendered = runner().run_render(&tree).unwrap();
        assert_eq!(rendered.split(" OR ").count(), 200);
    }

    #[test]
    fn test_configured_max_depth_applies_to_all_commands() {
        let config = EngineConfig {
            max_depth: 2,
            ..EngineConfig::default()
        };
        let runner = CommandRunner::new(config);

        assert!(runner.run_parse("a = 1 AND b = 2 AND c = 3", false).is_err());
        assert!(
            runner
                .run_combine(
                    &["a = 1".to_string(), "b = 2".to_string(), "c = 3".to_string()],
                    None,
                    false,
                    false
                )
                .is_err()
        );

        let deep_tree = CommandRunner::new(EngineConfig::default())
            .run_parse("a = 1 AND b = 2 AND c = 3", false)
            .unwrap();
        assert!(runner.run_render(&deep_tree).is_err());
    }
}
