//! 子系统控制循环
//!
//! 每个子系统是一个实现了 [`looper_core::Loop`] 的结构体，外加一个可克隆的句柄
//! （`*Handle`），供其他循环、操作员绑定和遥测读取或修改共享状态：
//!
//! | 循环 | 句柄 | 作用 |
//! |------|------|------|
//! | [`DriveControlLoop`] | [`DriveHandle`] | 差速底盘混控（arcade / cheesy）、限速、反向 |
//! | [`CollisionDetectionLoop`] | [`CollisionHandle`] | 加速度 jerk 碰撞检测 |
//! | [`OdometryLoop`] | [`OdometryHandle`] | 编码器 + 陀螺仪位姿积分 |
//! | [`AutoAimLoop`] | [`AimHandle`] | 视觉闭环炮塔瞄准与限位归零 |
//! | [`AutoIndexingLoop`] | [`IndexerHandle`] | 断束计数理球 |
//!
//! 句柄内部只有一把 `parking_lot::Mutex`，跨线程读取是安全的。

pub mod aim;
pub mod collision;
pub mod config;
pub mod drive;
pub mod geometry;
pub mod indexer;
pub mod odometry;
pub mod units;

pub use aim::{AimHandle, AimState, AimStatus, AutoAimLoop};
pub use collision::{CollisionDetectionLoop, CollisionHandle, CollisionStatus};
pub use config::{
    AimConfig, BindingsConfig, CollisionConfig, ConfigError, DriveConfig, IndexerConfig,
    OdometryConfig, RobotConfig, RunnerSettings,
};
pub use drive::{DriveCommand, DriveControlLoop, DriveHandle, DriveStatus, MixMode};
pub use geometry::{Pose, WheelCommand, WheelSpeeds};
pub use indexer::{AutoIndexingLoop, BALL_CAPACITY, IndexerHandle, IndexerStatus};
pub use odometry::{OdometryHandle, OdometryLoop, OdometryStatus};
pub use units::{Deg, Rad, TickScale};
