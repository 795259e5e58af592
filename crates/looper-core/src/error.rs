//! 调度层错误类型定义

use looper_hal::HalError;
use thiserror::Error;

/// 生命周期回调返回的错误
///
/// 调度器只记录这些错误，不会向上传播，也不会影响同一 tick 中的其他循环。
#[derive(Error, Debug)]
pub enum LoopError {
    /// 硬件层错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 输入数据过期（传感器断开等）
    #[error("Stale input: {0}")]
    Stale(&'static str),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 调度器配置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// 调度器已启动过任一模式，不再接受注册
    #[error("Cannot register loop '{name}': scheduler has already started a mode")]
    RegistrationClosed { name: String },

    /// 循环名重复
    #[error("Loop '{name}' is already registered")]
    DuplicateLoop { name: String },

    /// 注册时未指定任何模式
    #[error("Loop '{name}' must be tagged with at least one mode")]
    NoModes { name: String },

    /// 运行参数非法
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
