//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use looper_sdk::prelude::*;
//! ```

// 整机
pub use crate::container::{RobotContainer, RobotHardware, RobotTelemetry, TelemetryProbe};
pub use crate::mode_controller::ModeController;

// 调度层
pub use looper_core::{Loop, LoopError, LoopScheduler, Mode};

// 子系统句柄
pub use looper_control::{
    AimHandle, CollisionHandle, DriveCommand, DriveHandle, IndexerHandle, OdometryHandle, Pose,
    RobotConfig,
};

// 错误类型
pub use crate::error::RobotError;
pub use looper_core::HalError;
