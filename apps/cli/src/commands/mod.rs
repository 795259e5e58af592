//! 命令定义和实现

pub mod config;
pub mod simulate;

pub use config::ConfigCommand;
pub use simulate::SimulateCommand;

use anyhow::{Context, Result};
use looper_control::RobotConfig;
use std::path::Path;

/// 读取配置文件；未指定时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<RobotConfig> {
    match path {
        Some(path) => RobotConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(RobotConfig::default()),
    }
}
