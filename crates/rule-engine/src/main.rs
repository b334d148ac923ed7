//! 规则引擎命令行入口
//!
//! 解析、合并、评估与渲染资格规则。

use anyhow::Result;
use clap::Parser;
use rule_engine::cli::{Cli, CommandRunner};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 配置缺失或损坏时退回默认值，不影响命令执行
    let mut config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    observability::init(&config.service_name, &config.observability)?;
    debug!(environment = %config.environment, "rule-engine 启动");

    let output = CommandRunner::new(config.engine).run(cli.command)?;
    println!("{}", output);

    Ok(())
}
