//! CLI 模块
//!
//! 提供命令行接口，支持以下功能：
//!
//! - `parse` - 解析规则文本并输出 JSON 语法树
//! - `combine` - 合并多条规则并输出 JSON 语法树
//! - `evaluate` - 使用属性集合评估规则
//! - `render` - 将 JSON 语法树渲染回规则文本
//!
//! # 使用示例
//!
//! ```bash
//! # 解析规则
//! rule-engine parse "age > 30 AND department = 'Sales'" --pretty
//!
//! # 合并规则
//! rule-engine combine "age > 30" "salary > 50000" --policy or
//!
//! # 评估规则
//! rule-engine evaluate -r "age > 30" -a '{"age": 35}'
//!
//! # 从文件读取语法树并评估
//! rule-engine evaluate -t @tree.json -a @employee.json --trace
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
