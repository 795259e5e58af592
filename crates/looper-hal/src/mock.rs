//! Mock 设备
//!
//! 内存中的设备实现，用于单元测试、集成测试和仿真器。
//!
//! 每个 mock 都是可克隆的句柄：克隆体共享同一份内部状态，
//! 测试代码一边把克隆体交给控制循环，一边在外部注入传感器读数、检查下发的控制量。

use crate::{
    Axis, BreakBeam, ButtonEdge, ControlDemand, Direction, DriveEncoders, EncodedMotor, HalError,
    Imu, LimitSwitch, Motor, OperatorInput, Side, Stick, StickAxis, VisionCamera,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct MotorInner {
    history: Vec<ControlDemand>,
    position_ticks: f64,
}

/// Mock 电机控制器
///
/// 记录所有下发的控制量；可以注入编码器读数和故障。
#[derive(Debug, Clone, Default)]
pub struct MockMotor {
    name: String,
    inner: Arc<Mutex<MotorInner>>,
    should_fail: Arc<AtomicBool>,
}

impl MockMotor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 最后一次下发的控制量
    pub fn last_demand(&self) -> Option<ControlDemand> {
        self.inner.lock().history.last().copied()
    }

    /// 全部下发历史
    pub fn history(&self) -> Vec<ControlDemand> {
        self.inner.lock().history.clone()
    }

    pub fn command_count(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    /// 注入编码器读数
    pub fn set_position_ticks(&self, ticks: f64) {
        self.inner.lock().position_ticks = ticks;
    }

    /// 让之后的 `set()` 返回错误
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }
}

impl Motor for MockMotor {
    fn set(&self, demand: ControlDemand) -> Result<(), HalError> {
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(HalError::Fault(format!("{}: injected failure", self.name)));
        }
        let demand = demand.validate()?;
        tracing::trace!(motor = %self.name, %demand, "mock motor set");
        self.inner.lock().history.push(demand);
        Ok(())
    }
}

impl EncodedMotor for MockMotor {
    fn position_ticks(&self) -> f64 {
        self.inner.lock().position_ticks
    }
}

#[derive(Debug)]
struct ImuInner {
    connected: bool,
    heading: f64,
    accel_x: f64,
    accel_y: f64,
}

impl Default for ImuInner {
    fn default() -> Self {
        Self {
            connected: true,
            heading: 0.0,
            accel_x: 0.0,
            accel_y: 0.0,
        }
    }
}

/// Mock IMU
#[derive(Debug, Clone, Default)]
pub struct MockImu {
    inner: Arc<Mutex<ImuInner>>,
    resets: Arc<AtomicU64>,
    yaw_zeroes: Arc<AtomicU64>,
}

impl MockImu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    pub fn set_heading(&self, degrees: f64) {
        self.inner.lock().heading = degrees;
    }

    pub fn set_accel(&self, x: f64, y: f64) {
        let mut inner = self.inner.lock();
        inner.accel_x = x;
        inner.accel_y = y;
    }

    /// `reset()` 被调用的次数
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// `zero_yaw()` 被调用的次数
    pub fn zero_yaw_count(&self) -> u64 {
        self.yaw_zeroes.load(Ordering::Relaxed)
    }
}

impl Imu for MockImu {
    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn heading(&self) -> f64 {
        self.inner.lock().heading
    }

    fn world_linear_accel(&self, axis: Axis) -> f64 {
        let inner = self.inner.lock();
        match axis {
            Axis::X => inner.accel_x,
            Axis::Y => inner.accel_y,
        }
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().heading = 0.0;
    }

    fn zero_yaw(&self) {
        self.yaw_zeroes.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().heading = 0.0;
    }
}

/// Mock 底盘编码器
#[derive(Debug, Clone, Default)]
pub struct MockDriveEncoders {
    rates: Arc<Mutex<[f64; 2]>>,
}

impl MockDriveEncoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rates(&self, left: f64, right: f64) {
        *self.rates.lock() = [left, right];
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl DriveEncoders for MockDriveEncoders {
    fn rate(&self, side: Side) -> f64 {
        self.rates.lock()[side_index(side)]
    }
}

/// Mock 断束传感器
#[derive(Debug, Clone, Default)]
pub struct MockBreakBeam {
    triggered: Arc<AtomicBool>,
}

impl MockBreakBeam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_triggered(&self, triggered: bool) {
        self.triggered.store(triggered, Ordering::Relaxed);
    }
}

impl BreakBeam for MockBreakBeam {
    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }
}

/// Mock 限位开关
#[derive(Debug, Clone, Default)]
pub struct MockLimitSwitch {
    forward: Arc<AtomicBool>,
    reverse: Arc<AtomicBool>,
}

impl MockLimitSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pressed(&self, direction: Direction, pressed: bool) {
        match direction {
            Direction::Forward => self.forward.store(pressed, Ordering::Relaxed),
            Direction::Reverse => self.reverse.store(pressed, Ordering::Relaxed),
        }
    }
}

impl LimitSwitch for MockLimitSwitch {
    fn is_pressed(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.forward.load(Ordering::Relaxed),
            Direction::Reverse => self.reverse.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct VisionInner {
    connected: bool,
    target_found: bool,
    horizontal_offset: f64,
}

/// Mock 视觉相机
#[derive(Debug, Clone)]
pub struct MockVision {
    inner: Arc<Mutex<VisionInner>>,
}

impl Default for MockVision {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VisionInner {
                connected: true,
                target_found: false,
                horizontal_offset: 0.0,
            })),
        }
    }
}

impl MockVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    /// 设置目标：`Some(offset)` 表示可见，`None` 表示丢失
    pub fn set_target(&self, offset: Option<f64>) {
        let mut inner = self.inner.lock();
        inner.target_found = offset.is_some();
        if let Some(offset) = offset {
            inner.horizontal_offset = offset;
        }
    }
}

impl VisionCamera for MockVision {
    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn is_target_found(&self) -> bool {
        self.inner.lock().target_found
    }

    fn horizontal_offset(&self) -> f64 {
        self.inner.lock().horizontal_offset
    }
}

#[derive(Debug, Default)]
struct OperatorInner {
    axes: HashMap<(Stick, StickAxis), f64>,
    edges: HashMap<String, VecDeque<ButtonEdge>>,
}

/// Mock 操作手输入
#[derive(Debug, Clone, Default)]
pub struct MockOperatorInput {
    inner: Arc<Mutex<OperatorInner>>,
}

impl MockOperatorInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_axis(&self, stick: Stick, axis: StickAxis, value: f64) {
        self.inner.lock().axes.insert((stick, axis), value);
    }

    /// 排队一个按键边沿，下一次 `button_edge(name)` 时被消费
    pub fn push_edge(&self, name: &str, edge: ButtonEdge) {
        self.inner
            .lock()
            .edges
            .entry(name.to_string())
            .or_default()
            .push_back(edge);
    }

    pub fn press(&self, name: &str) {
        self.push_edge(name, ButtonEdge::Pressed);
    }

    pub fn release(&self, name: &str) {
        self.push_edge(name, ButtonEdge::Released);
    }
}

impl OperatorInput for MockOperatorInput {
    fn axis(&self, stick: Stick, axis: StickAxis) -> f64 {
        self.inner
            .lock()
            .axes
            .get(&(stick, axis))
            .copied()
            .unwrap_or(0.0)
    }

    fn button_edge(&self, name: &str) -> ButtonEdge {
        self.inner
            .lock()
            .edges
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_motor_records_and_fails() {
        let motor = MockMotor::new("left");
        let handle = motor.clone();

        motor.set(ControlDemand::PercentOutput(0.5)).unwrap();
        motor.stop().unwrap();
        assert_eq!(handle.command_count(), 2);
        assert!(handle.last_demand().unwrap().is_neutral());

        handle.set_should_fail(true);
        assert!(motor.set(ControlDemand::PercentOutput(0.1)).is_err());
        assert_eq!(handle.command_count(), 2);
    }

    #[test]
    fn test_mock_motor_rejects_nan() {
        let motor = MockMotor::new("turret");
        assert!(motor.set(ControlDemand::Position(f64::NAN)).is_err());
        assert_eq!(motor.command_count(), 0);
    }

    #[test]
    fn test_mock_operator_edges_are_consumed() {
        let input = MockOperatorInput::new();
        input.press("X");
        input.release("X");

        assert_eq!(input.button_edge("X"), ButtonEdge::Pressed);
        assert_eq!(input.button_edge("X"), ButtonEdge::Released);
        assert_eq!(input.button_edge("X"), ButtonEdge::Unchanged);
        assert_eq!(input.button_edge("unknown"), ButtonEdge::Unchanged);
    }

    #[test]
    fn test_mock_encoder_rates() {
        let encoders = MockDriveEncoders::new();
        let shared: Arc<dyn DriveEncoders> = Arc::new(encoders.clone());
        encoders.set_rates(1.0, 2.0);
        assert_eq!(shared.rate(Side::Left), 1.0);
        assert_eq!(shared.rate(Side::Right), 2.0);
    }

    #[test]
    fn test_mock_imu_zero_yaw() {
        let imu = MockImu::new();
        imu.set_heading(45.0);
        imu.zero_yaw();
        assert_eq!(imu.heading(), 0.0);
        assert_eq!(imu.zero_yaw_count(), 1);
        assert_eq!(imu.reset_count(), 0);
    }
}
