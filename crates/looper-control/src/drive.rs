//! 底盘控制循环
//!
//! 把操作手的两个摇杆轴（或外部给定的前进/转向指令）混控成左右两侧的占空比。
//!
//! # 混控
//!
//! - **Arcade**: `left = f·h − r`, `right = f·h + r`，`h` 在车头反转时为 −1
//! - **Cheesy**: 转向量先经过正弦曲线整形，再乘以随前进速度递减的增益，
//!   低速时转向灵敏、高速时转向平缓；最后按比例去饱和
//!
//! 混控结果逐侧限幅到 [-1, 1]，再乘以限速系数。
//!
//! # 共享状态
//!
//! 限速、车头反转、混控方式、外部指令和最近一次输出都保存在同一把
//! `parking_lot::Mutex` 里，通过 [`DriveHandle`] 在其他循环和遥测线程中读写。

use crate::config::DriveConfig;
use crate::geometry::WheelCommand;
use looper_core::{Loop, LoopError};
use looper_hal::{ControlDemand, Motor, OperatorInput};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::Duration;

/// 外部给定的底盘指令（自动阶段使用），优先于操作手输入
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveCommand {
    pub forward: f64,
    pub rotation: f64,
}

impl DriveCommand {
    pub fn new(forward: f64, rotation: f64) -> Self {
        Self { forward, rotation }
    }
}

/// 混控方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixMode {
    Arcade,
    Cheesy,
}

/// 底盘状态快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveStatus {
    pub mix: MixMode,
    pub heading_inverted: bool,
    pub reduced: bool,
    /// 当前生效的限速系数
    pub limiter: f64,
    pub command: Option<DriveCommand>,
    pub last: WheelCommand,
}

#[derive(Debug)]
struct DriveState {
    speed_limit: f64,
    reduced: bool,
    heading_inverted: bool,
    cheesy: bool,
    command: Option<DriveCommand>,
    last: WheelCommand,
}

/// Arcade 混控
pub fn arcade_mix(forward: f64, rotation: f64, heading_inverted: bool) -> WheelCommand {
    let f = if heading_inverted { -forward } else { forward };
    WheelCommand::new(f - rotation, f + rotation).clamped()
}

/// Cheesy 混控
///
/// - 转向为 0 时左右相等（不论前进速度）
/// - 前进为 0、转向满量程时为原地满速旋转
pub fn cheesy_mix(
    forward: f64,
    rotation: f64,
    heading_inverted: bool,
    nonlinearity: f64,
    high_speed_turn_gain: f64,
) -> WheelCommand {
    let f = if heading_inverted { -forward } else { forward };
    let shaped = (FRAC_PI_2 * nonlinearity * rotation).sin() / (FRAC_PI_2 * nonlinearity).sin();
    let gain = 1.0 - (1.0 - high_speed_turn_gain) * forward.abs().min(1.0);
    let turn = shaped * gain;
    WheelCommand::new(f - turn, f + turn).desaturated().clamped()
}

/// 带重新缩放的死区：死区外的输入线性映射回 [0, 1]
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if value.abs() < deadband {
        0.0
    } else {
        value.signum() * (value.abs() - deadband) / (1.0 - deadband)
    }
}

/// 底盘共享状态句柄
#[derive(Debug, Clone)]
pub struct DriveHandle {
    state: Arc<Mutex<DriveState>>,
    reduced_speed_limit: f64,
}

impl DriveHandle {
    fn new(config: &DriveConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(DriveState {
                speed_limit: config.speed_limit,
                reduced: false,
                heading_inverted: config.invert_heading,
                cheesy: config.cheesy,
                command: None,
                last: WheelCommand::ZERO,
            })),
            reduced_speed_limit: config.reduced_speed_limit,
        }
    }

    /// 设置正常限速系数，限幅到 [0, 1]
    pub fn set_speed_limit(&self, limit: f64) {
        if limit.is_nan() {
            tracing::warn!("Ignoring NaN drive speed limit");
            return;
        }
        self.state.lock().speed_limit = limit.clamp(0.0, 1.0);
    }

    pub fn speed_limit(&self) -> f64 {
        self.state.lock().speed_limit
    }

    /// 进入/退出减速状态
    pub fn set_reduced(&self, reduced: bool) {
        self.state.lock().reduced = reduced;
    }

    pub fn is_reduced(&self) -> bool {
        self.state.lock().reduced
    }

    /// 当前生效的限速系数
    pub fn effective_limit(&self) -> f64 {
        let state = self.state.lock();
        self.limit_of(&state)
    }

    fn limit_of(&self, state: &DriveState) -> f64 {
        if state.reduced {
            state.speed_limit.min(self.reduced_speed_limit)
        } else {
            state.speed_limit
        }
    }

    pub fn set_heading_inverted(&self, inverted: bool) {
        self.state.lock().heading_inverted = inverted;
    }

    pub fn is_heading_inverted(&self) -> bool {
        self.state.lock().heading_inverted
    }

    pub fn set_cheesy(&self, cheesy: bool) {
        self.state.lock().cheesy = cheesy;
    }

    /// 切换混控方式，返回切换后是否为 cheesy
    pub fn toggle_cheesy(&self) -> bool {
        let mut state = self.state.lock();
        state.cheesy = !state.cheesy;
        state.cheesy
    }

    pub fn mix_mode(&self) -> MixMode {
        if self.state.lock().cheesy {
            MixMode::Cheesy
        } else {
            MixMode::Arcade
        }
    }

    /// 设置/清除外部指令
    pub fn set_command(&self, command: Option<DriveCommand>) {
        self.state.lock().command = command;
    }

    /// 最近一次下发给电机的输出
    pub fn last_command(&self) -> WheelCommand {
        self.state.lock().last
    }

    pub fn status(&self) -> DriveStatus {
        let state = self.state.lock();
        DriveStatus {
            mix: if state.cheesy {
                MixMode::Cheesy
            } else {
                MixMode::Arcade
            },
            heading_inverted: state.heading_inverted,
            reduced: state.reduced,
            limiter: self.limit_of(&state),
            command: state.command,
            last: state.last,
        }
    }
}

/// 底盘控制循环
pub struct DriveControlLoop {
    left: Arc<dyn Motor>,
    right: Arc<dyn Motor>,
    input: Arc<dyn OperatorInput>,
    config: DriveConfig,
    handle: DriveHandle,
}

impl DriveControlLoop {
    pub fn new(
        left: Arc<dyn Motor>,
        right: Arc<dyn Motor>,
        input: Arc<dyn OperatorInput>,
        config: DriveConfig,
    ) -> Self {
        let handle = DriveHandle::new(&config);
        Self {
            left,
            right,
            input,
            config,
            handle,
        }
    }

    pub fn handle(&self) -> DriveHandle {
        self.handle.clone()
    }

    fn read_input(&self) -> DriveCommand {
        let forward = self
            .input
            .axis(self.config.forward_stick, self.config.forward_axis);
        let rotation = self
            .input
            .axis(self.config.rotation_stick, self.config.rotation_axis);
        DriveCommand {
            forward: apply_deadband(forward.clamp(-1.0, 1.0), self.config.deadband),
            rotation: apply_deadband(rotation.clamp(-1.0, 1.0), self.config.deadband),
        }
    }

    /// 两侧都尝试下发，返回第一个错误
    fn send(&self, command: WheelCommand) -> Result<(), LoopError> {
        let left = self.left.set(ControlDemand::PercentOutput(command.left));
        let right = self.right.set(ControlDemand::PercentOutput(command.right));
        left?;
        right?;
        Ok(())
    }
}

impl Loop for DriveControlLoop {
    fn name(&self) -> &str {
        "drive_control"
    }

    fn on_start(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        tracing::info!("Started arcade drive at {:.3}s", timestamp.as_secs_f64());
        Ok(())
    }

    fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        let external = self.handle.state.lock().command;
        let input = match external {
            Some(command) => command,
            None => self.read_input(),
        };
        if !input.forward.is_finite() || !input.rotation.is_finite() {
            return Err(LoopError::Other(format!(
                "non-finite drive input: {:?}",
                input
            )));
        }

        let output = {
            let mut state = self.handle.state.lock();
            let mixed = if state.cheesy {
                cheesy_mix(
                    input.forward,
                    input.rotation,
                    state.heading_inverted,
                    self.config.cheesy_turn_nonlinearity,
                    self.config.cheesy_high_speed_turn_gain,
                )
            } else {
                arcade_mix(input.forward, input.rotation, state.heading_inverted)
            };
            let output = mixed.scaled(self.handle.limit_of(&state));
            state.last = output;
            output
        };

        tracing::trace!(left = output.left, right = output.right, "drive output");
        self.send(output)
    }

    fn on_stop(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        {
            let mut state = self.handle.state.lock();
            state.last = WheelCommand::ZERO;
            state.command = None;
        }
        let left = self.left.stop();
        let right = self.right.stop();
        tracing::info!("Stopped arcade drive at {:.3}s", timestamp.as_secs_f64());
        left?;
        right?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_hal::mock::{MockMotor, MockOperatorInput};
    use looper_hal::{Stick, StickAxis};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    struct Rig {
        left: MockMotor,
        right: MockMotor,
        input: MockOperatorInput,
        drive: DriveControlLoop,
    }

    fn rig(config: DriveConfig) -> Rig {
        let left = MockMotor::new("left");
        let right = MockMotor::new("right");
        let input = MockOperatorInput::new();
        let drive = DriveControlLoop::new(
            Arc::new(left.clone()),
            Arc::new(right.clone()),
            Arc::new(input.clone()),
            config,
        );
        Rig {
            left,
            right,
            input,
            drive,
        }
    }

    fn percent(motor: &MockMotor) -> f64 {
        motor.last_demand().map(|d| d.value()).unwrap_or(f64::NAN)
    }

    #[test]
    fn test_arcade_mix() {
        assert_eq!(arcade_mix(0.5, 0.0, false), WheelCommand::new(0.5, 0.5));
        assert_eq!(arcade_mix(0.5, 0.0, true), WheelCommand::new(-0.5, -0.5));
        assert_eq!(arcade_mix(0.0, 0.3, false), WheelCommand::new(-0.3, 0.3));
        // 反转车头不改变转向方向
        let cmd = arcade_mix(0.2, 0.3, true);
        assert!(close(cmd.left, -0.5) && close(cmd.right, 0.1));
        // 限幅
        assert_eq!(arcade_mix(1.0, 0.5, false), WheelCommand::new(0.5, 1.0));
    }

    #[test]
    fn test_cheesy_mix_contract() {
        for forward in [-1.0, -0.3, 0.0, 0.6, 1.0] {
            let cmd = cheesy_mix(forward, 0.0, false, 0.5, 0.4);
            assert!(close(cmd.left, forward) && close(cmd.right, forward));
        }

        let spin = cheesy_mix(0.0, 1.0, false, 0.5, 0.4);
        assert!(close(spin.left, -1.0) && close(spin.right, 1.0));

        // 高速时转向量减小
        let slow = cheesy_mix(0.1, 0.5, false, 0.5, 0.4);
        let fast = cheesy_mix(0.9, 0.5, false, 0.5, 0.4);
        assert!((slow.right - slow.left) > (fast.right - fast.left));
    }

    #[test]
    fn test_deadband() {
        assert_eq!(apply_deadband(0.05, 0.1), 0.0);
        assert!(close(apply_deadband(1.0, 0.1), 1.0));
        assert!(close(apply_deadband(-0.55, 0.1), -0.5));
        assert_eq!(apply_deadband(0.3, 0.0), 0.3);
    }

    #[test]
    fn test_loop_reads_configured_axes() {
        let mut rig = rig(DriveConfig::default());
        rig.input.set_axis(Stick::Left, StickAxis::Y, 0.6);
        rig.input.set_axis(Stick::Right, StickAxis::X, 0.0);

        rig.drive.on_loop(Duration::ZERO).unwrap();
        assert!(close(percent(&rig.left), 0.6));
        assert!(close(percent(&rig.right), 0.6));
        assert_eq!(rig.drive.handle().last_command(), WheelCommand::new(0.6, 0.6));
    }

    #[test]
    fn test_speed_limiter_applies_without_restart() {
        let mut rig = rig(DriveConfig::default());
        let handle = rig.drive.handle();
        rig.input.set_axis(Stick::Left, StickAxis::Y, 1.0);

        handle.set_reduced(true);
        rig.drive.on_loop(Duration::ZERO).unwrap();
        assert!(close(percent(&rig.left), 0.5));

        handle.set_reduced(false);
        handle.set_speed_limit(0.8);
        rig.drive.on_loop(Duration::from_millis(20)).unwrap();
        assert!(close(percent(&rig.left), 0.8));

        handle.set_speed_limit(3.0);
        assert_eq!(handle.speed_limit(), 1.0);
    }

    #[test]
    fn test_external_command_overrides_input() {
        let mut rig = rig(DriveConfig::default());
        let handle = rig.drive.handle();
        rig.input.set_axis(Stick::Left, StickAxis::Y, 1.0);
        handle.set_command(Some(DriveCommand::new(0.2, 0.1)));

        rig.drive.on_loop(Duration::ZERO).unwrap();
        assert!(close(percent(&rig.left), 0.1));
        assert!(close(percent(&rig.right), 0.3));
    }

    #[test]
    fn test_on_stop_commands_zero() {
        let mut rig = rig(DriveConfig::default());
        let handle = rig.drive.handle();
        rig.input.set_axis(Stick::Left, StickAxis::Y, 0.7);
        handle.set_command(Some(DriveCommand::new(0.4, 0.0)));
        rig.drive.on_loop(Duration::ZERO).unwrap();

        rig.drive.on_stop(Duration::from_millis(20)).unwrap();
        assert!(rig.left.last_demand().unwrap().is_neutral());
        assert!(rig.right.last_demand().unwrap().is_neutral());
        assert!(handle.last_command().is_zero());
        assert_eq!(handle.status().command, None);
    }

    #[test]
    fn test_motor_fault_still_drives_other_side() {
        let mut rig = rig(DriveConfig::default());
        rig.left.set_should_fail(true);
        rig.input.set_axis(Stick::Left, StickAxis::Y, 0.4);

        assert!(rig.drive.on_loop(Duration::ZERO).is_err());
        assert!(close(percent(&rig.right), 0.4));

        // 停止时同样两侧都尝试
        assert!(rig.drive.on_stop(Duration::ZERO).is_err());
        assert!(rig.right.last_demand().unwrap().is_neutral());
    }

    #[test]
    fn test_toggle_cheesy() {
        let rig = rig(DriveConfig::default());
        let handle = rig.drive.handle();
        assert_eq!(handle.mix_mode(), MixMode::Arcade);
        assert!(handle.toggle_cheesy());
        assert_eq!(handle.status().mix, MixMode::Cheesy);
        assert!(!handle.toggle_cheesy());
    }
}
