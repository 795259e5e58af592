//! SDK 层错误类型

use looper_control::ConfigError;
use looper_core::SchedulerError;
use thiserror::Error;

/// 组装和运行整机时可能出现的错误
#[derive(Error, Debug)]
pub enum RobotError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
