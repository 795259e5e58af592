//! 配置管理命令

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

use super::load_config;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show {
        /// 配置文件（缺省为内置默认值）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 检查配置文件
    Check {
        /// 配置文件路径
        file: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show { config } => Self::show(config),
            ConfigCommand::Check { file } => Self::check(file),
        }
    }

    fn show(path: Option<PathBuf>) -> Result<()> {
        let config = load_config(path.as_deref())?;
        let rendered = config
            .to_toml_string()
            .context("Failed to render configuration")?;
        print!("{}", rendered);
        Ok(())
    }

    fn check(file: PathBuf) -> Result<()> {
        let config = load_config(Some(&file))?;
        config
            .validate()
            .with_context(|| format!("{} is invalid", file.display()))?;
        println!("✅ {} is valid", file.display());
        Ok(())
    }
}
