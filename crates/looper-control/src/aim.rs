//! 自动瞄准循环（炮塔）
//!
//! # 状态机
//!
//! ```text
//!        toggle              toggle
//! Idle ─────────► Aiming ─────────► Idle
//!   │
//!   │ start_zeroing     反向限位触发
//!   └────────────► Zeroing ───────────► reset(zero_angle) ─► Idle
//! ```
//!
//! - `Idle`: 不做任何事
//! - `Aiming`: 视觉可见目标时，把水平偏差当作增量修正，
//!   位置闭环目标为 `当前角度 + 偏差`；不可见时跳过本 tick（保持上一次指令）
//! - `Zeroing`: 以固定占空比驶向反向限位开关，触发后把编码器映射重置到已知角度
//!
//! # 角度与刻度
//!
//! 编码器刻度与炮塔角度之间只有一个固定换算 `ticks_per_rev × reduction`，
//! 外加一个由 [`AimHandle::reset`] 设定的零点偏移。所有角度都相对于上一次重置。

use crate::config::AimConfig;
use crate::units::{Deg, TickScale};
use looper_core::{Loop, LoopError};
use looper_hal::{ControlDemand, Direction, EncodedMotor, LimitSwitch, VisionCamera};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 瞄准状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AimState {
    #[default]
    Idle,
    Aiming,
    Zeroing,
}

/// 瞄准状态快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AimStatus {
    pub state: AimState,
    pub angle: Deg,
    pub setpoint: Deg,
    pub error: Deg,
    pub on_target: bool,
    pub target_visible: bool,
    pub camera_connected: bool,
}

#[derive(Debug)]
struct AimShared {
    state: AimState,
    setpoint: Deg,
    error: Deg,
    on_target: bool,
    target_visible: bool,
    camera_connected: bool,
    /// 角度零点对应的原始编码器刻度
    zero_ticks: f64,
}

/// 炮塔共享状态句柄
#[derive(Clone)]
pub struct AimHandle {
    shared: Arc<Mutex<AimShared>>,
    motor: Arc<dyn EncodedMotor>,
    scale: TickScale,
    can_zero: bool,
}

impl AimHandle {
    /// 当前炮塔角度（相对上一次重置）
    pub fn angle(&self) -> Deg {
        let zero = self.shared.lock().zero_ticks;
        self.scale.to_angle(self.motor.position_ticks() - zero)
    }

    /// 把当前位置定义为 `angle`
    pub fn reset(&self, angle: Deg) {
        let ticks = self.motor.position_ticks();
        let mut shared = self.shared.lock();
        shared.zero_ticks = ticks - self.scale.to_ticks(angle);
        shared.setpoint = angle;
        shared.error = Deg::ZERO;
        tracing::debug!(%angle, "Turret angle reset");
    }

    pub fn state(&self) -> AimState {
        self.shared.lock().state
    }

    /// 切换 Idle/Aiming，返回切换后是否在瞄准；归零中忽略
    pub fn toggle_aiming(&self) -> bool {
        let mut shared = self.shared.lock();
        shared.state = match shared.state {
            AimState::Idle => AimState::Aiming,
            AimState::Aiming => AimState::Idle,
            AimState::Zeroing => {
                tracing::warn!("Turret is zeroing, ignoring aim toggle");
                AimState::Zeroing
            },
        };
        shared.state == AimState::Aiming
    }

    pub fn set_aiming(&self, aiming: bool) {
        let mut shared = self.shared.lock();
        if shared.state == AimState::Zeroing {
            tracing::warn!("Turret is zeroing, ignoring aim request");
            return;
        }
        shared.state = if aiming {
            AimState::Aiming
        } else {
            AimState::Idle
        };
    }

    /// 开始归零；没有限位开关时拒绝
    pub fn start_zeroing(&self) -> bool {
        if !self.can_zero {
            tracing::error!("Turret zeroing requested but no limit switch is configured");
            return false;
        }
        self.reset(Deg::ZERO);
        self.shared.lock().state = AimState::Zeroing;
        tracing::info!("Turret zeroing started");
        true
    }

    pub fn setpoint(&self) -> Deg {
        self.shared.lock().setpoint
    }

    pub fn is_on_target(&self) -> bool {
        self.shared.lock().on_target
    }

    /// 刻度分辨率（角度量化误差上界）
    pub fn resolution(&self) -> Deg {
        self.scale.resolution()
    }

    pub fn status(&self) -> AimStatus {
        let angle = self.angle();
        let shared = self.shared.lock();
        AimStatus {
            state: shared.state,
            angle,
            setpoint: shared.setpoint,
            error: shared.error,
            on_target: shared.on_target,
            target_visible: shared.target_visible,
            camera_connected: shared.camera_connected,
        }
    }
}

impl std::fmt::Debug for AimHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AimHandle")
            .field("scale", &self.scale)
            .field("can_zero", &self.can_zero)
            .finish_non_exhaustive()
    }
}

/// 自动瞄准循环
pub struct AutoAimLoop {
    motor: Arc<dyn EncodedMotor>,
    camera: Arc<dyn VisionCamera>,
    limit: Option<Arc<dyn LimitSwitch>>,
    config: AimConfig,
    handle: AimHandle,
}

impl AutoAimLoop {
    pub fn new(
        motor: Arc<dyn EncodedMotor>,
        camera: Arc<dyn VisionCamera>,
        limit: Option<Arc<dyn LimitSwitch>>,
        config: AimConfig,
    ) -> Self {
        let handle = AimHandle {
            shared: Arc::new(Mutex::new(AimShared {
                state: AimState::Idle,
                setpoint: Deg::ZERO,
                error: Deg::ZERO,
                on_target: false,
                target_visible: false,
                camera_connected: false,
                zero_ticks: motor.position_ticks(),
            })),
            motor: motor.clone(),
            scale: TickScale::new(config.ticks_per_rev, config.reduction),
            can_zero: limit.is_some(),
        };

        Self {
            motor,
            camera,
            limit,
            config,
            handle,
        }
    }

    pub fn handle(&self) -> AimHandle {
        self.handle.clone()
    }

    fn aim(&self) -> Result<(), LoopError> {
        let connected = self.camera.is_connected();
        let visible = connected && self.camera.is_target_found();
        {
            let mut shared = self.handle.shared.lock();
            if shared.camera_connected && !connected {
                tracing::warn!("Vision camera disconnected, holding turret command");
            }
            shared.camera_connected = connected;
            shared.target_visible = visible;
            // 看不到目标时不报告已对准，设定点保持不变
            if !visible {
                shared.on_target = false;
            }
        }
        if !visible {
            return Ok(());
        }

        let offset = self.camera.horizontal_offset();
        if !offset.is_finite() {
            return Err(LoopError::Stale("non-finite vision offset"));
        }
        let offset = Deg(offset);

        let current = self.handle.angle();
        let setpoint = current + offset;
        let target_ticks = {
            let mut shared = self.handle.shared.lock();
            shared.setpoint = setpoint;
            shared.error = offset;
            shared.on_target = offset.abs().0 < self.config.tolerance_deg;
            shared.zero_ticks + self.handle.scale.to_ticks(setpoint)
        };

        self.motor.set(ControlDemand::Position(target_ticks))?;
        Ok(())
    }

    fn zero(&self, limit: &dyn LimitSwitch) -> Result<(), LoopError> {
        if limit.is_pressed(Direction::Reverse) {
            self.motor.stop()?;
            self.handle.reset(Deg(self.config.zero_angle_deg));
            self.handle.shared.lock().state = AimState::Idle;
            tracing::info!(angle = self.config.zero_angle_deg, "Turret zeroed at reverse limit");
            return Ok(());
        }
        self.motor
            .set(ControlDemand::PercentOutput(self.config.zeroing_output))?;
        Ok(())
    }
}

impl Loop for AutoAimLoop {
    fn name(&self) -> &str {
        "auto_aim"
    }

    fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        match self.handle.state() {
            AimState::Idle => Ok(()),
            AimState::Aiming => self.aim(),
            AimState::Zeroing => match &self.limit {
                Some(limit) => self.zero(limit.as_ref()),
                None => {
                    self.handle.shared.lock().state = AimState::Idle;
                    Err(LoopError::Other("zeroing without a limit switch".to_string()))
                },
            },
        }
    }

    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        {
            let mut shared = self.handle.shared.lock();
            shared.state = AimState::Idle;
            shared.on_target = false;
        }
        self.motor.stop()?;
        Ok(())
    }
}
