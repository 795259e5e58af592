//! 仿真对象
//!
//! 用 mock 设备搭一台简化的机器人：
//!
//! - 底盘：一阶惯性，`v' = (percent × max_speed − v) / τ`，编码器读回轮速，
//!   陀螺仪按差速运动学积分航向
//! - 炮塔：位置指令一步到位，占空比指令按固定速率转动，刻度低于下限时反向限位触发
//! - 视觉：目标固定在某个炮塔角度，偏差为目标角度减当前角度
//! - 理球：送球电机转动时每隔固定时间有一颗球经过断束传感器
//!
//! 仿真线程与控制线程并行运行，mock 设备内部有锁，可以跨线程共享。

use looper_control::{BindingsConfig, RobotConfig, TickScale};
use looper_hal::mock::{
    MockBreakBeam, MockDriveEncoders, MockImu, MockLimitSwitch, MockMotor, MockOperatorInput,
    MockVision,
};
use looper_hal::{ControlDemand, Direction, EncodedMotor, Imu, Stick, StickAxis};
use looper_sdk::RobotHardware;
use std::sync::Arc;

/// 全速时的轮速（m/s）
const MAX_WHEEL_SPEED: f64 = 3.5;
/// 底盘时间常数（s）
const DRIVE_TAU: f64 = 0.15;
/// 炮塔全占空比转速（刻度/s）
const TURRET_TICKS_PER_SEC: f64 = 20_000.0;
/// 反向限位位置（刻度）
const TURRET_REVERSE_LIMIT: f64 = -5_000.0;
/// 视觉目标所在的炮塔角度（度）
const TARGET_ANGLE_DEG: f64 = 12.0;
/// 送球时球到达传感器的间隔与遮挡时长（s）
const BALL_INTERVAL: f64 = 0.8;
const BALL_BLOCK_TIME: f64 = 0.2;

/// 仿真用的操作手输入
#[derive(Debug, Clone, Copy)]
pub struct OperatorScript {
    pub forward: f64,
    pub rotation: f64,
    /// 开始时按一次的按键
    pub enable_aim: bool,
    pub enable_indexing: bool,
}

impl Default for OperatorScript {
    fn default() -> Self {
        Self {
            forward: 0.5,
            rotation: 0.2,
            enable_aim: true,
            enable_indexing: true,
        }
    }
}

pub struct SimPlant {
    left: MockMotor,
    right: MockMotor,
    encoders: MockDriveEncoders,
    imu: MockImu,
    operator: MockOperatorInput,
    turret: MockMotor,
    limit: MockLimitSwitch,
    camera: MockVision,
    indexer: MockMotor,
    pulley: MockMotor,
    beam: MockBreakBeam,

    track_width: f64,
    turret_scale: TickScale,
    speeds: (f64, f64),
    heading_deg: f64,
    feed_time: f64,
}

impl SimPlant {
    pub fn new(config: &RobotConfig) -> Self {
        Self {
            left: MockMotor::new("drive_left"),
            right: MockMotor::new("drive_right"),
            encoders: MockDriveEncoders::new(),
            imu: MockImu::new(),
            operator: MockOperatorInput::new(),
            turret: MockMotor::new("turret"),
            limit: MockLimitSwitch::new(),
            camera: MockVision::new(),
            indexer: MockMotor::new("indexer"),
            pulley: MockMotor::new("pulley"),
            beam: MockBreakBeam::new(),
            track_width: config.odometry.track_width_m,
            turret_scale: TickScale::new(config.aim.ticks_per_rev, config.aim.reduction),
            speeds: (0.0, 0.0),
            heading_deg: 0.0,
            feed_time: 0.0,
        }
    }

    pub fn hardware(&self) -> RobotHardware {
        RobotHardware {
            left_drive: Some(Arc::new(self.left.clone())),
            right_drive: Some(Arc::new(self.right.clone())),
            drive_encoders: Some(Arc::new(self.encoders.clone())),
            imu: Some(Arc::new(self.imu.clone())),
            operator: Some(Arc::new(self.operator.clone())),
            turret: Some(Arc::new(self.turret.clone())),
            turret_limit: Some(Arc::new(self.limit.clone())),
            camera: Some(Arc::new(self.camera.clone())),
            indexer: Some(Arc::new(self.indexer.clone())),
            pulley: Some(Arc::new(self.pulley.clone())),
            ball_sensor: Some(Arc::new(self.beam.clone())),
        }
    }

    /// 设置摇杆并排队按键
    pub fn apply_operator(&self, script: &OperatorScript, bindings: &BindingsConfig) {
        self.operator
            .set_axis(Stick::Left, StickAxis::Y, script.forward);
        self.operator
            .set_axis(Stick::Right, StickAxis::X, script.rotation);
        if script.enable_aim {
            self.operator.press(&bindings.toggle_aim);
            self.operator.release(&bindings.toggle_aim);
        }
        if script.enable_indexing {
            self.operator.press(&bindings.toggle_indexing);
            self.operator.release(&bindings.toggle_indexing);
        }
    }

    fn percent(motor: &MockMotor) -> f64 {
        match motor.last_demand() {
            Some(ControlDemand::PercentOutput(value)) => value,
            Some(ControlDemand::Voltage(volts)) => volts / 12.0,
            _ => 0.0,
        }
    }

    /// 推进 `dt` 秒
    pub fn step(&mut self, dt: f64) {
        self.step_drive(dt);
        self.step_turret(dt);
        self.step_indexer(dt);
    }

    fn step_drive(&mut self, dt: f64) {
        let alpha = (dt / DRIVE_TAU).min(1.0);
        let target_left = Self::percent(&self.left) * MAX_WHEEL_SPEED;
        let target_right = Self::percent(&self.right) * MAX_WHEEL_SPEED;
        self.speeds.0 += (target_left - self.speeds.0) * alpha;
        self.speeds.1 += (target_right - self.speeds.1) * alpha;

        self.encoders.set_rates(self.speeds.0, self.speeds.1);

        let omega = (self.speeds.1 - self.speeds.0) / self.track_width;
        // IMU 可能被控制线程清零过
        self.heading_deg = self.imu.heading() + omega.to_degrees() * dt;
        self.imu.set_heading(self.heading_deg);

        let accel = (target_left + target_right - self.speeds.0 - self.speeds.1) / 2.0
            * alpha
            / dt.max(1e-6)
            / 9.81;
        self.imu.set_accel(accel, 0.0);
    }

    fn step_turret(&mut self, dt: f64) {
        let mut ticks = self.turret.position_ticks();
        match self.turret.last_demand() {
            Some(ControlDemand::Position(target)) => ticks = target,
            Some(ControlDemand::PercentOutput(value)) => ticks += value * TURRET_TICKS_PER_SEC * dt,
            _ => {},
        }
        let at_limit = ticks <= TURRET_REVERSE_LIMIT;
        if at_limit {
            ticks = TURRET_REVERSE_LIMIT;
        }
        self.turret.set_position_ticks(ticks);
        self.limit.set_pressed(Direction::Reverse, at_limit);

        let angle = self.turret_scale.to_angle(ticks);
        self.camera.set_target(Some(TARGET_ANGLE_DEG - angle.0));
    }

    fn step_indexer(&mut self, dt: f64) {
        if Self::percent(&self.indexer) > 0.0 {
            self.feed_time += dt;
        }
        let phase = self.feed_time % BALL_INTERVAL;
        self.beam
            .set_triggered(self.feed_time >= BALL_INTERVAL && phase < BALL_BLOCK_TIME);

        if let Some(ControlDemand::Position(target)) = self.pulley.last_demand() {
            self.pulley.set_position_ticks(target);
        }
    }

    /// 左右驱动电机最近一次的占空比
    pub fn drive_output(&self) -> (f64, f64) {
        (Self::percent(&self.left), Self::percent(&self.right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_hal::{LimitSwitch, Motor};

    #[test]
    fn test_drive_converges_to_commanded_speed() {
        let mut plant = SimPlant::new(&RobotConfig::default());
        plant.left.set(ControlDemand::PercentOutput(0.5)).unwrap();
        plant.right.set(ControlDemand::PercentOutput(0.5)).unwrap();
        for _ in 0..200 {
            plant.step(0.02);
        }
        assert!((plant.speeds.0 - 0.5 * MAX_WHEEL_SPEED).abs() < 1e-3);
        assert!(plant.heading_deg.abs() < 1e-9);
    }

    #[test]
    fn test_turret_hits_reverse_limit() {
        let mut plant = SimPlant::new(&RobotConfig::default());
        plant.turret.set(ControlDemand::PercentOutput(-1.0)).unwrap();
        for _ in 0..50 {
            plant.step(0.02);
        }
        assert!(plant.limit.is_pressed(Direction::Reverse));
        assert_eq!(plant.turret.position_ticks(), TURRET_REVERSE_LIMIT);
    }
}
