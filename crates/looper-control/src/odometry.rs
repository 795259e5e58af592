//! 里程计循环
//!
//! 差速底盘里程计：每个 tick 用左右轮线速度和航向变化量，按圆弧（指数映射）
//! 积分出新的位姿。
//!
//! # 航向来源
//!
//! - 陀螺仪（默认）：相邻两次读数之差作为 `Δθ`，可以配置反向
//! - 编码器：`Δθ = (v_r − v_l)·dt / track_width`
//!
//! # 陀螺仪断开
//!
//! 保持最后一个有效位姿并置 `stale` 标志，不再积分，避免位姿悄悄发散。
//! 重新连接后以当前读数为新基准继续积分，`stale` 清除。
//!
//! # 顺序
//!
//! 必须注册在底盘循环之后，读取的是本 tick 已经锁存的编码器和陀螺仪数据。

use crate::config::OdometryConfig;
use crate::geometry::{Pose, WheelSpeeds};
use crate::units::{Deg, Rad};
use looper_core::{Loop, LoopError};
use looper_hal::{DriveEncoders, Imu, Side};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 里程计状态快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OdometryStatus {
    pub pose: Pose,
    pub speeds: WheelSpeeds,
    /// 航向数据不可用，`pose` 为最后一个有效值
    pub stale: bool,
    /// 已完成的积分次数
    pub updates: u64,
}

#[derive(Debug, Default)]
struct OdometryState {
    status: OdometryStatus,
    pending_reset: Option<Pose>,
}

/// 里程计共享状态句柄
#[derive(Debug, Clone, Default)]
pub struct OdometryHandle {
    state: Arc<Mutex<OdometryState>>,
}

impl OdometryHandle {
    pub fn pose(&self) -> Pose {
        self.state.lock().status.pose
    }

    pub fn is_stale(&self) -> bool {
        self.state.lock().status.stale
    }

    /// 请求重置位姿，在里程计下一个 tick 开始时生效
    pub fn reset_pose(&self, pose: Pose) {
        self.state.lock().pending_reset = Some(pose);
    }

    pub fn status(&self) -> OdometryStatus {
        self.state.lock().status
    }
}

/// 航向读数来源
enum HeadingSource {
    Gyro { imu: Arc<dyn Imu>, invert: bool },
    Encoders,
}

/// 里程计循环
pub struct OdometryLoop {
    encoders: Arc<dyn DriveEncoders>,
    heading: HeadingSource,
    track_width: f64,
    max_dt: Duration,
    last_timestamp: Option<Duration>,
    last_gyro: Option<Rad>,
    handle: OdometryHandle,
}

impl OdometryLoop {
    /// 创建里程计
    ///
    /// `config.use_gyro` 为 true 时必须提供 `imu`；否则退回编码器航向并记录错误。
    pub fn new(
        encoders: Arc<dyn DriveEncoders>,
        imu: Option<Arc<dyn Imu>>,
        config: OdometryConfig,
    ) -> Self {
        let heading = match (config.use_gyro, imu) {
            (true, Some(imu)) => HeadingSource::Gyro {
                imu,
                invert: config.invert_gyro,
            },
            (true, None) => {
                tracing::error!("Odometry configured for gyro heading but no IMU is present, using encoders");
                HeadingSource::Encoders
            },
            (false, _) => HeadingSource::Encoders,
        };

        Self {
            encoders,
            heading,
            track_width: config.track_width_m,
            max_dt: Duration::from_secs_f64(config.max_dt_s),
            last_timestamp: None,
            last_gyro: None,
            handle: OdometryHandle::default(),
        }
    }

    pub fn handle(&self) -> OdometryHandle {
        self.handle.clone()
    }

    pub fn uses_gyro(&self) -> bool {
        matches!(self.heading, HeadingSource::Gyro { .. })
    }

    /// 读取陀螺仪航向（弧度，逆时针为正）
    fn read_gyro(imu: &dyn Imu, invert: bool) -> Option<Rad> {
        if !imu.is_connected() {
            return None;
        }
        let heading = imu.heading();
        if !heading.is_finite() {
            return None;
        }
        let rad = Deg(heading).to_rad();
        Some(if invert { -rad } else { rad })
    }
}

impl Loop for OdometryLoop {
    fn name(&self) -> &str {
        "odometry"
    }

    fn on_first_start(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        if let HeadingSource::Gyro { imu, .. } = &self.heading {
            imu.reset();
            tracing::debug!("IMU reset");
        }
        Ok(())
    }

    fn on_start(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        if let HeadingSource::Gyro { imu, .. } = &self.heading {
            imu.zero_yaw();
        }
        self.last_timestamp = None;
        self.last_gyro = None;
        tracing::debug!(
            pose = %self.handle.pose(),
            "Odometry started at {:.3}s",
            timestamp.as_secs_f64()
        );
        Ok(())
    }

    fn on_loop(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        // 先读设备，锁只在写状态时持有
        let speeds = WheelSpeeds::new(
            self.encoders.rate(Side::Left),
            self.encoders.rate(Side::Right),
        );
        let gyro = match &self.heading {
            HeadingSource::Gyro { imu, invert } => Some(Self::read_gyro(imu.as_ref(), *invert)),
            HeadingSource::Encoders => None,
        };

        let dt = match self.last_timestamp.replace(timestamp) {
            Some(last) => {
                let dt = timestamp.saturating_sub(last);
                if dt > self.max_dt {
                    tracing::debug!(
                        dt_ms = dt.as_millis() as u64,
                        "Odometry time jump, clamping dt"
                    );
                    self.max_dt
                } else {
                    dt
                }
            },
            None => Duration::ZERO,
        };
        let dt = dt.as_secs_f64();

        let mut state = self.handle.state.lock();
        if let Some(pose) = state.pending_reset.take() {
            state.status.pose = pose;
            tracing::info!(%pose, "Pose reset");
        }

        if !speeds.left.is_finite() || !speeds.right.is_finite() {
            return Err(LoopError::Stale("non-finite encoder rate"));
        }
        state.status.speeds = speeds;

        let dtheta = match gyro {
            Some(Some(current)) => {
                let previous = self.last_gyro.replace(current);
                if state.status.stale {
                    tracing::info!("Heading sensor restored, resuming odometry");
                    state.status.stale = false;
                }
                match previous {
                    Some(previous) => (current - previous).normalize(),
                    // 新基准：本 tick 不积分
                    None => return Ok(()),
                }
            },
            Some(None) => {
                if !state.status.stale {
                    tracing::warn!(
                        pose = %state.status.pose,
                        "Heading sensor unavailable, holding last pose"
                    );
                    state.status.stale = true;
                }
                self.last_gyro = None;
                return Ok(());
            },
            None => Rad(speeds.angular(self.track_width) * dt),
        };

        let pose = state.status.pose.exp(speeds.linear() * dt, dtheta);
        state.status.pose = pose;
        state.status.updates += 1;
        tracing::trace!(%pose, "odometry update");
        Ok(())
    }
}
