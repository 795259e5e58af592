//! 调度层模块
//!
//! 本模块提供按模式分组的协作式循环调度，包括：
//! - 运行模式（Disabled / Autonomous / Teleop / Test）
//! - 四阶段生命周期的 [`Loop`] trait
//! - [`LoopScheduler`]：注册、按模式启停、按注册顺序 tick、故障隔离
//! - [`runner`]：固定频率控制线程，串行化来自其他线程的模式事件
//!
//! # 使用场景
//!
//! 具体的子系统控制循环位于 `looper-control`，
//! 大多数用户应该使用 `looper-sdk` 提供的 `RobotContainer` 一次性组装整台机器人。

mod error;
pub mod lifecycle;
pub mod mode;
pub mod runner;
pub mod scheduler;

pub use error::{LoopError, SchedulerError};
pub use lifecycle::{Loop, LoopPhase, LoopState};
pub use mode::{AtomicMode, Mode, ParseModeError};
pub use runner::{ControlTarget, RunnerConfig, RunnerStats, run_scheduler};
pub use scheduler::{LoopId, LoopScheduler, LoopStatus, ModeTags, TickReport};

// 重新导出 HAL 错误，方便循环实现者使用 `?`
pub use looper_hal::HalError;
