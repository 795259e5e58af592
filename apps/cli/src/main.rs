//! # Looper CLI
//!
//! 机器人控制循环的仿真与配置工具。
//!
//! ```bash
//! # 用默认配置跑一段 自动 -> 手动 -> 禁用 的仿真
//! looper-cli simulate --script "disabled:0.5,auto:2,teleop:3,disabled:1"
//!
//! # 以 JSON 输出
//! looper-cli simulate --config robot.toml --json
//!
//! # 查看默认配置 / 检查配置文件
//! looper-cli config show
//! looper-cli config check robot.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod script;
mod sim;

use commands::{ConfigCommand, SimulateCommand};

/// Looper CLI - 控制循环仿真工具
#[derive(Parser, Debug)]
#[command(name = "looper-cli")]
#[command(about = "Simulator and configuration tool for looper robots", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在 mock 硬件上运行整机控制循环
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 初始化日志（RUST_LOG 覆盖默认级别）
    looper_sdk::logging::init_with_default("warn,looper_cli=info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "looper-cli",
            "simulate",
            "--script",
            "teleop:1",
            "--forward",
            "-0.3",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate { args } => {
                assert_eq!(args.script, "teleop:1");
                assert_eq!(args.forward, -0.3);
                assert!(args.json);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
