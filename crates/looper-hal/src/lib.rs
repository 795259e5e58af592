//! # Looper HAL
//!
//! 硬件抽象层：把电机控制器、IMU、编码器、断束传感器、限位开关、视觉相机和
//! 操作手输入统一成一组最小 trait。
//!
//! 控制循环只依赖这里的 trait，不直接接触任何驱动；真实硬件驱动和
//! [`mock`] 模块中的内存设备都实现同一组接口。
//!
//! # 设计约束
//!
//! - **非阻塞**: 所有读取都是快照读取（snapshot），必须在一个 tick 内返回
//! - **共享句柄**: 所有方法都取 `&self`，设备以 `Arc<dyn Trait>` 形式在多个循环间共享，
//!   实现方自行负责内部可变性
//! - **`Send + Sync`**: 控制线程与遥测线程可以同时持有同一设备

use std::fmt;
use thiserror::Error;

#[cfg(feature = "mock")]
pub mod mock;

/// 硬件层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HalError {
    /// 设备未连接（CAN 掉线、传感器拔出等）
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// 设备报告的故障
    #[error("Device fault: {0}")]
    Fault(String),

    /// 非法的控制量（NaN / 无穷大）
    #[error("Invalid demand: {0}")]
    InvalidDemand(ControlDemand),
}

impl HalError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }
}

/// 差速底盘的左右两侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Left,
    Right,
}

/// IMU 世界坐标系下的水平轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// 手柄上的摇杆
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stick {
    Left,
    Right,
}

/// 摇杆轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StickAxis {
    X,
    Y,
}

/// 限位开关方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

/// 按键边沿
///
/// 每次读取消费一次边沿；没有边沿时返回 [`ButtonEdge::Unchanged`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonEdge {
    Pressed,
    Released,
    #[default]
    Unchanged,
}

/// 控制量的种类（对应电机控制器的闭环模式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DemandKind {
    PercentOutput,
    Voltage,
    Velocity,
    Position,
}

/// 发送给电机控制器的控制量
///
/// - `PercentOutput`: 开环占空比，范围 [-1, 1]
/// - `Voltage`: 电压（V）
/// - `Velocity`: 控制器内部闭环速度（控制器原生单位）
/// - `Position`: 控制器内部闭环位置（编码器 tick）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlDemand {
    PercentOutput(f64),
    Voltage(f64),
    Velocity(f64),
    Position(f64),
}

impl ControlDemand {
    /// 安全停止量
    pub const NEUTRAL: Self = ControlDemand::PercentOutput(0.0);

    pub fn kind(&self) -> DemandKind {
        match self {
            ControlDemand::PercentOutput(_) => DemandKind::PercentOutput,
            ControlDemand::Voltage(_) => DemandKind::Voltage,
            ControlDemand::Velocity(_) => DemandKind::Velocity,
            ControlDemand::Position(_) => DemandKind::Position,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            ControlDemand::PercentOutput(v)
            | ControlDemand::Voltage(v)
            | ControlDemand::Velocity(v)
            | ControlDemand::Position(v) => v,
        }
    }

    /// 是否为零开环输出
    pub fn is_neutral(&self) -> bool {
        matches!(self, ControlDemand::PercentOutput(v) if *v == 0.0)
    }

    /// 校验控制量是否为有限值
    pub fn validate(self) -> Result<Self, HalError> {
        if self.value().is_finite() {
            Ok(self)
        } else {
            Err(HalError::InvalidDemand(self))
        }
    }
}

impl fmt::Display for ControlDemand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:.4})", self.kind(), self.value())
    }
}

/// 电机控制器
pub trait Motor: Send + Sync {
    /// 下发控制量
    fn set(&self, demand: ControlDemand) -> Result<(), HalError>;

    /// 停止电机（默认实现：零开环输出）
    fn stop(&self) -> Result<(), HalError> {
        self.set(ControlDemand::NEUTRAL)
    }
}

/// 带编码器反馈的电机控制器
pub trait EncodedMotor: Motor {
    /// 当前编码器读数（tick，相对上电时刻）
    fn position_ticks(&self) -> f64;
}

/// 惯性测量单元（NavX 一类的 AHRS）
pub trait Imu: Send + Sync {
    fn is_connected(&self) -> bool;

    /// 航向角（度）
    fn heading(&self) -> f64;

    /// 世界坐标系线加速度（g）
    fn world_linear_accel(&self, axis: Axis) -> f64;

    /// 完全重置（校准状态、积分器等）
    fn reset(&self) {}

    /// 把当前航向记为零
    fn zero_yaw(&self) {}
}

/// 底盘左右编码器
pub trait DriveEncoders: Send + Sync {
    /// 轮速（m/s）
    fn rate(&self, side: Side) -> f64;
}

/// 断束传感器
pub trait BreakBeam: Send + Sync {
    /// 光路当前是否被遮挡
    fn is_triggered(&self) -> bool;
}

/// 限位开关
pub trait LimitSwitch: Send + Sync {
    fn is_pressed(&self, direction: Direction) -> bool;
}

/// 视觉相机（只暴露水平偏移这一个标量）
pub trait VisionCamera: Send + Sync {
    fn is_connected(&self) -> bool;

    fn is_target_found(&self) -> bool;

    /// 目标水平偏移（度，右为正）
    fn horizontal_offset(&self) -> f64;
}

/// 操作手输入
pub trait OperatorInput: Send + Sync {
    /// 摇杆轴，范围 [-1, 1]
    fn axis(&self, stick: Stick, axis: StickAxis) -> f64;

    /// 读取并消费一个按键边沿
    ///
    /// `name` 是逻辑按键名；按键名到物理按键的映射不在本层处理。
    fn button_edge(&self, name: &str) -> ButtonEdge;
}
