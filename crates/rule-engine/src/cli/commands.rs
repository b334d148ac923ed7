//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。
//! 接受 JSON 的参数既可以直接给出内容，也可以用 `@path` 从文件读取。

use clap::{Parser, Subcommand};

/// 规则引擎命令行工具
#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "资格规则表达式引擎")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 解析规则文本，输出 JSON 语法树
    Parse {
        /// 规则文本，如 "age > 30 AND department = 'Sales'"
        rule: String,

        /// 格式化输出 JSON
        #[arg(long)]
        pretty: bool,
    },

    /// 合并多条规则，输出 JSON 语法树
    ///
    /// 按输入顺序左倾折叠：(r1 P r2) P r3
    Combine {
        /// 规则文本列表
        #[arg(required = true)]
        rules: Vec<String>,

        /// 合并策略 (and, or)，默认取配置 engine.default_policy
        #[arg(short, long)]
        policy: Option<String>,

        /// 去除结构相同的规则
        #[arg(long)]
        dedup: bool,

        /// 格式化输出 JSON
        #[arg(long)]
        pretty: bool,
    },

    /// 使用属性集合评估规则，输出 true / false
    Evaluate {
        /// 规则文本
        #[arg(short, long, conflicts_with = "tree", required_unless_present = "tree")]
        rule: Option<String>,

        /// JSON 语法树（或 @文件路径）
        #[arg(short, long)]
        tree: Option<String>,

        /// 属性 JSON 对象（或 @文件路径）
        #[arg(short, long)]
        attributes: String,

        /// 输出包含评估追踪的 JSON 结果
        #[arg(long)]
        trace: bool,
    },

    /// 将 JSON 语法树渲染为规则文本
    Render {
        /// JSON 语法树（或 @文件路径）
        #[arg(short, long)]
        tree: String,
    },
}
