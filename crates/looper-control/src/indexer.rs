//! 自动理球循环
//!
//! 用断束传感器的上升沿计数已收进的球，并据此驱动送球电机和提升机构：
//!
//! | 计数 | 传感器 | 动作 |
//! |------|--------|------|
//! | 0 | - | 送球电机全速 |
//! | 1..4 | 触发 | 送球，并把提升机构推到该球对应的位置 |
//! | 1..4 | 未触发 | 继续送球 |
//! | 4 | - | 停止送球（已满） |
//!
//! 第一颗球的提升位移比之后每颗略大，两者作为独立的配置值保存，单位是提升轮圈数，
//! 下发前按 `pulley_ticks_per_rev` 换算成编码器刻度。
//!
//! 只在使能时运行；使能 → 禁用时计数在下一个 tick 清零。
//! 禁用期间仍然跟踪传感器状态，重新使能时已经挡住光路的球不会被重复计数。

use crate::config::IndexerConfig;
use crate::units::TickScale;
use looper_core::{Loop, LoopError};
use looper_hal::{BreakBeam, ControlDemand, EncodedMotor, Motor};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 机构最多容纳的球数
pub const BALL_CAPACITY: u8 = 4;

/// 理球状态快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub enabled: bool,
    pub count: u8,
    pub beam_triggered: bool,
    /// 最近一次下发的提升机构目标位置（刻度）
    pub pulley_target: Option<f64>,
    /// 已满，送球电机已停止
    pub full: bool,
}

#[derive(Debug, Default)]
struct IndexerState {
    status: IndexerStatus,
    reset_pending: bool,
}

/// 理球共享状态句柄
#[derive(Debug, Clone, Default)]
pub struct IndexerHandle {
    state: Arc<Mutex<IndexerState>>,
}

impl IndexerHandle {
    /// 使能/禁用；从使能变为禁用时，计数在下一个 tick 清零
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.status.enabled && !enabled {
            state.reset_pending = true;
        }
        state.status.enabled = enabled;
    }

    /// 切换使能，返回切换后的状态
    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().status.enabled
    }

    pub fn count(&self) -> u8 {
        self.state.lock().status.count
    }

    /// 请求清零计数，在下一个 tick 生效
    pub fn reset_count(&self) {
        self.state.lock().reset_pending = true;
    }

    pub fn status(&self) -> IndexerStatus {
        self.state.lock().status
    }
}

/// 每个 tick 的输出决策
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexerAction {
    /// 送球
    Feed,
    /// 送球并把提升机构推到给定位置（相对本轮起点的圈数）
    FeedAndLift(f64),
    /// 已满，停止送球
    Stop,
}

/// 根据计数和传感器状态决定输出
pub fn decide(count: u8, triggered: bool, config: &IndexerConfig) -> IndexerAction {
    match (count, triggered) {
        (c, _) if c >= BALL_CAPACITY => IndexerAction::Stop,
        (0, _) => IndexerAction::Feed,
        (c, true) => IndexerAction::FeedAndLift(
            config.first_ball_offset + f64::from(c - 1) * config.next_ball_offset,
        ),
        (_, false) => IndexerAction::Feed,
    }
}

/// 自动理球循环
pub struct AutoIndexingLoop {
    feeder: Arc<dyn Motor>,
    pulley: Arc<dyn EncodedMotor>,
    beam: Arc<dyn BreakBeam>,
    config: IndexerConfig,
    pulley_scale: TickScale,
    handle: IndexerHandle,
    previous_beam: bool,
    was_enabled: bool,
    /// 本轮第一颗球时提升机构的位置
    pulley_base: f64,
}

impl AutoIndexingLoop {
    pub fn new(
        feeder: Arc<dyn Motor>,
        pulley: Arc<dyn EncodedMotor>,
        beam: Arc<dyn BreakBeam>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            feeder,
            pulley,
            beam,
            pulley_scale: TickScale::new(config.pulley_ticks_per_rev, 1.0),
            config,
            handle: IndexerHandle::default(),
            previous_beam: false,
            was_enabled: false,
            pulley_base: 0.0,
        }
    }

    pub fn handle(&self) -> IndexerHandle {
        self.handle.clone()
    }

    fn stop_motors(&self) -> Result<(), LoopError> {
        let feeder = self.feeder.stop();
        let pulley = self.pulley.stop();
        feeder?;
        pulley?;
        Ok(())
    }
}

impl Loop for AutoIndexingLoop {
    fn name(&self) -> &str {
        "auto_indexing"
    }

    fn on_start(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.previous_beam = self.beam.is_triggered();
        Ok(())
    }

    fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        let triggered = self.beam.is_triggered();
        let rising = triggered && !self.previous_beam;
        self.previous_beam = triggered;

        let (enabled, count, was_empty) = {
            let mut state = self.handle.state.lock();
            if state.reset_pending {
                if state.status.count != 0 {
                    tracing::info!(count = state.status.count, "Ball count reset");
                }
                state.status.count = 0;
                state.status.pulley_target = None;
                state.status.full = false;
                state.reset_pending = false;
            }
            state.status.beam_triggered = triggered;

            let was_empty = state.status.count == 0;
            if state.status.enabled && rising && state.status.count < BALL_CAPACITY {
                state.status.count += 1;
                tracing::debug!(count = state.status.count, "Ball indexed");
            }
            (state.status.enabled, state.status.count, was_empty)
        };

        if !enabled {
            if self.was_enabled {
                self.was_enabled = false;
                return self.stop_motors();
            }
            return Ok(());
        }
        self.was_enabled = true;

        if was_empty {
            self.pulley_base = self.pulley.position_ticks();
        }

        let action = decide(count, triggered, &self.config);
        let mut state = self.handle.state.lock();
        state.status.full = action == IndexerAction::Stop;
        match action {
            IndexerAction::Feed => {
                drop(state);
                self.feeder
                    .set(ControlDemand::PercentOutput(self.config.feed_output))?;
            },
            IndexerAction::FeedAndLift(rotations) => {
                let target = self.pulley_base + self.pulley_scale.rotations_to_ticks(rotations);
                state.status.pulley_target = Some(target);
                drop(state);
                let feed = self
                    .feeder
                    .set(ControlDemand::PercentOutput(self.config.feed_output));
                let lift = self.pulley.set(ControlDemand::Position(target));
                feed?;
                lift?;
            },
            IndexerAction::Stop => {
                drop(state);
                self.feeder.stop()?;
            },
        }
        Ok(())
    }

    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.was_enabled = false;
        self.handle.state.lock().status.full = false;
        self.stop_motors()
    }
}
