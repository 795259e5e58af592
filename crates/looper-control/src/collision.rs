//! 碰撞检测循环
//!
//! 每个 tick 读取 IMU 在世界坐标系下两个水平轴的线加速度，与上一次采样作差得到
//! jerk；任一轴 `|jerk| > threshold` 即判定为碰撞。
//!
//! 标志每个 tick 从头重新计算，不做去抖或锁存。需要锁存的调用方
//! （例如震动手柄提示）可以使用 [`CollisionHandle::rising_edges`] 检测上升沿。

use crate::config::CollisionConfig;
use looper_core::{Loop, LoopError};
use looper_hal::{Axis, Imu};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 碰撞检测状态快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CollisionStatus {
    pub collided: bool,
    /// 最近一次计算的 jerk（g / 采样）
    pub jerk_x: f64,
    pub jerk_y: f64,
    /// 标志从 false 变为 true 的累计次数
    pub rising_edges: u64,
    /// IMU 当前是否可用
    pub imu_connected: bool,
}

/// 碰撞检测共享状态句柄
#[derive(Debug, Clone, Default)]
pub struct CollisionHandle {
    state: Arc<Mutex<CollisionStatus>>,
}

impl CollisionHandle {
    pub fn is_collided(&self) -> bool {
        self.state.lock().collided
    }

    pub fn rising_edges(&self) -> u64 {
        self.state.lock().rising_edges
    }

    pub fn status(&self) -> CollisionStatus {
        *self.state.lock()
    }
}

/// 单次 jerk 判定
///
/// 返回 `(jerk_x, jerk_y, collided)`。
pub fn detect_collision(previous: (f64, f64), current: (f64, f64), threshold: f64) -> (f64, f64, bool) {
    let jerk_x = current.0 - previous.0;
    let jerk_y = current.1 - previous.1;
    let collided = jerk_x.abs() > threshold || jerk_y.abs() > threshold;
    (jerk_x, jerk_y, collided)
}

/// 碰撞检测循环
///
/// 只读取加速度，不改变 IMU 的航向（航向由里程计循环管理）。
pub struct CollisionDetectionLoop {
    imu: Arc<dyn Imu>,
    threshold: f64,
    previous: Option<(f64, f64)>,
    handle: CollisionHandle,
}

impl CollisionDetectionLoop {
    pub fn new(imu: Arc<dyn Imu>, config: CollisionConfig) -> Self {
        Self {
            imu,
            threshold: config.threshold_g,
            previous: None,
            handle: CollisionHandle::default(),
        }
    }

    pub fn handle(&self) -> CollisionHandle {
        self.handle.clone()
    }
}

impl Loop for CollisionDetectionLoop {
    fn name(&self) -> &str {
        "collision_detection"
    }

    fn on_start(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.previous = None;
        Ok(())
    }

    fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        if !self.imu.is_connected() {
            let mut state = self.handle.state.lock();
            if state.imu_connected {
                tracing::warn!("IMU disconnected, collision detection paused");
            }
            state.collided = false;
            state.imu_connected = false;
            self.previous = None;
            return Ok(());
        }

        let current = (
            self.imu.world_linear_accel(Axis::X),
            self.imu.world_linear_accel(Axis::Y),
        );
        if !current.0.is_finite() || !current.1.is_finite() {
            self.previous = None;
            self.handle.state.lock().collided = false;
            return Err(LoopError::Stale("non-finite IMU acceleration"));
        }

        let previous = self.previous.replace(current);
        let mut state = self.handle.state.lock();
        state.imu_connected = true;

        let Some(previous) = previous else {
            // 第一个采样只作为基准
            state.collided = false;
            state.jerk_x = 0.0;
            state.jerk_y = 0.0;
            return Ok(());
        };

        let (jerk_x, jerk_y, collided) = detect_collision(previous, current, self.threshold);
        if collided && !state.collided {
            state.rising_edges += 1;
            tracing::info!(jerk_x, jerk_y, "Collision detected");
        }
        state.collided = collided;
        state.jerk_x = jerk_x;
        state.jerk_y = jerk_y;
        Ok(())
    }

    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.previous = None;
        self.handle.state.lock().collided = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_hal::mock::MockImu;

    fn ts(tick: u64) -> Duration {
        Duration::from_millis(tick * 20)
    }

    fn setup() -> (MockImu, CollisionDetectionLoop) {
        let imu = MockImu::new();
        let mut detector =
            CollisionDetectionLoop::new(Arc::new(imu.clone()), CollisionConfig::default());
        detector.on_start(ts(0)).unwrap();
        (imu, detector)
    }

    #[test]
    fn test_detect_collision() {
        assert!(!detect_collision((0.0, 0.0), (0.2, -0.2), 0.25).2);
        assert!(detect_collision((0.0, 0.0), (0.3, 0.0), 0.25).2);
        assert!(detect_collision((0.5, 0.5), (0.5, 0.2), 0.25).2);
    }

    #[test]
    fn test_constant_acceleration_never_collides() {
        let (imu, mut detector) = setup();
        imu.set_accel(0.8, -0.4);
        for i in 1..50 {
            detector.on_loop(ts(i)).unwrap();
            assert!(!detector.handle().is_collided());
        }
    }

    #[test]
    fn test_spike_flags_entry_and_exit() {
        let (imu, mut detector) = setup();
        let handle = detector.handle();

        imu.set_accel(0.1, 0.0);
        detector.on_loop(ts(1)).unwrap();
        detector.on_loop(ts(2)).unwrap();
        assert!(!handle.is_collided());

        imu.set_accel(0.1, 0.5);
        detector.on_loop(ts(3)).unwrap();
        assert!(handle.is_collided());

        // 回到基线：jerk 为 -0.5，同样超阈值
        imu.set_accel(0.1, 0.0);
        detector.on_loop(ts(4)).unwrap();
        assert!(handle.is_collided());
        assert_eq!(handle.rising_edges(), 1);

        detector.on_loop(ts(5)).unwrap();
        assert!(!handle.is_collided());
    }

    #[test]
    fn test_step_flags_only_its_own_tick() {
        let (imu, mut detector) = setup();
        let handle = detector.handle();
        detector.on_loop(ts(1)).unwrap();

        imu.set_accel(0.0, 0.3);
        let flags: Vec<bool> = (2..8)
            .map(|i| {
                detector.on_loop(ts(i)).unwrap();
                handle.is_collided()
            })
            .collect();
        assert_eq!(flags, vec![true, false, false, false, false, false]);
    }

    #[test]
    fn test_first_tick_after_start_primes_sample() {
        let (imu, mut detector) = setup();
        imu.set_accel(3.0, 3.0);
        detector.on_loop(ts(1)).unwrap();
        assert!(!detector.handle().is_collided());
    }

    #[test]
    fn test_disconnected_imu_clears_flag() {
        let (imu, mut detector) = setup();
        let handle = detector.handle();
        detector.on_loop(ts(1)).unwrap();
        imu.set_accel(1.0, 0.0);
        detector.on_loop(ts(2)).unwrap();
        assert!(handle.is_collided());

        imu.set_connected(false);
        detector.on_loop(ts(3)).unwrap();
        assert!(!handle.is_collided());
        assert!(!handle.status().imu_connected);

        // 重连后重新取基准
        imu.set_connected(true);
        imu.set_accel(-1.0, 0.0);
        detector.on_loop(ts(4)).unwrap();
        assert!(!handle.is_collided());
    }
}
