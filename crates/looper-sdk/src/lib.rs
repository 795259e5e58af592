//! Looper SDK - 按模式调度的机器人控制循环
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **硬件层** (`looper-hal`): 电机、IMU、编码器、视觉、操作手输入的 trait 与 mock 设备
//! - **调度层** (`looper-core`): 运行模式、四阶段生命周期、调度器、固定频率 runner
//! - **控制层** (`looper-control`): 底盘、碰撞检测、里程计、瞄准、理球五个控制循环
//! - **整机层** (本 crate): 声明式模式表、模式控制器、按键绑定、日志初始化
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use looper_sdk::prelude::*;
//!
//! looper_sdk::logging::init();
//! let mut robot = RobotContainer::build(RobotConfig::default(), hardware)?;
//! let (tx, rx) = crossbeam_channel::unbounded();
//! tx.send(Mode::Teleop)?;
//! robot.run(&rx, &shutdown, None)?;
//! ```

pub mod bindings;
pub mod container;
mod error;
pub mod logging;
pub mod mode_controller;

pub mod prelude;

pub use bindings::OperatorBindingsLoop;
pub use container::{RobotContainer, RobotHardware, RobotTelemetry, TelemetryProbe};
pub use error::RobotError;
pub use mode_controller::ModeController;

// 下层 crate 通过模块路径访问
pub use looper_control as control;
pub use looper_core as scheduler;
pub use looper_hal as hal;
