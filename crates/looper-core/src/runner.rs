//! Runner - 固定频率控制线程
//!
//! 以固定周期驱动 [`ControlTarget::tick`]，并在每个 tick 之前把模式事件应用到调度器上。
//!
//! # 核心功能
//!
//! - **精确定时**: 使用 `spin_sleep` 按绝对截止时间休眠，避免周期累积漂移
//! - **模式事件串行化**: 其他线程通过 `crossbeam_channel` 发送 [`Mode`]，
//!   由控制线程在 tick 之间应用，调度器本身无需任何锁
//! - **超时检测**: tick 体超过 `overrun_warn_multiplier × 周期` 时计数并告警
//! - **安全退出**: 收到关闭信号（或通道断开）后调用 `shutdown()`，保证所有 `on_stop` 执行
//!
//! # 使用场景
//!
//! ```rust,no_run
//! use looper_core::{LoopScheduler, Mode, runner::{RunnerConfig, run_scheduler}};
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! let mut scheduler = LoopScheduler::new();
//! // ... register loops ...
//!
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let shutdown = Arc::new(AtomicBool::new(false));
//!
//! tx.send(Mode::Teleop).unwrap();
//! let stats = run_scheduler(&mut scheduler, &rx, &RunnerConfig::default(), &shutdown).unwrap();
//! println!("ticks: {}", stats.ticks);
//! ```

use crate::error::SchedulerError;
use crate::mode::Mode;
use crate::scheduler::{LoopScheduler, TickReport};
use crossbeam_channel::{Receiver, TryRecvError};
use spin_sleep::SpinSleeper;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 由 runner 驱动的控制目标
///
/// [`LoopScheduler`] 直接实现此 trait；上层的模式控制器也可以实现它，
/// 在转发给调度器之前记录当前模式。
pub trait ControlTarget {
    /// 模式变化通知（在控制线程上调用）
    fn on_mode_changed(&mut self, mode: Mode, timestamp: Duration);

    /// 执行一个 tick
    fn tick(&mut self, timestamp: Duration) -> TickReport;

    /// 停止所有运行中的循环
    fn shutdown(&mut self, timestamp: Duration);
}

impl ControlTarget for LoopScheduler {
    fn on_mode_changed(&mut self, mode: Mode, timestamp: Duration) {
        self.transition(mode, timestamp);
    }

    fn tick(&mut self, timestamp: Duration) -> TickReport {
        LoopScheduler::tick(self, timestamp)
    }

    fn shutdown(&mut self, timestamp: Duration) {
        self.stop_all(timestamp);
    }
}

/// Runner 配置
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// 控制频率（Hz）
    ///
    /// 默认 50.0（20ms 周期，比赛平台的标准周期）
    pub frequency_hz: f64,

    /// 超时告警倍数
    ///
    /// tick 体耗时超过 `overrun_warn_multiplier × 周期` 时记为一次 overrun。
    pub overrun_warn_multiplier: f64,

    /// 最大迭代次数（None 表示一直运行到关闭信号）
    ///
    /// 用于测试和仿真。
    pub max_iterations: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            overrun_warn_multiplier: 1.0,
            max_iterations: None,
        }
    }
}

impl RunnerConfig {
    /// 标称周期
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                self.frequency_hz
            )));
        }
        if !self.overrun_warn_multiplier.is_finite() || self.overrun_warn_multiplier <= 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "Invalid overrun_warn_multiplier: {} (must be > 0)",
                self.overrun_warn_multiplier
            )));
        }
        if self.frequency_hz > 1000.0 {
            tracing::warn!(
                "Very high control frequency: {} Hz. Loop bodies may not fit in one period.",
                self.frequency_hz
            );
        }
        Ok(())
    }
}

/// Runner 统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunnerStats {
    /// 已执行的 tick 数
    pub ticks: u64,
    /// 超时的 tick 数
    pub overruns: u64,
    /// 应用的模式事件数
    pub mode_changes: u64,
    /// 所有回调失败的累计数
    pub faults: u64,
    /// 单个 tick 的最长耗时
    pub max_tick: Duration,
}

/// 运行控制线程主循环
///
/// 阻塞直到：
/// - `shutdown` 被置为 `true`
/// - 模式事件通道断开（所有发送端被 drop）
/// - 达到 `max_iterations`
///
/// 返回前调用一次 `target.shutdown()`，保证所有运行中的循环都收到 `on_stop`。
///
/// # 时间戳
///
/// 传给回调的时间戳从调用本函数开始计时。
///
/// # 错误
///
/// 仅在配置非法时返回 [`SchedulerError::InvalidConfig`]；循环回调的错误只记录日志。
pub fn run_scheduler<T>(
    target: &mut T,
    events: &Receiver<Mode>,
    config: &RunnerConfig,
    shutdown: &AtomicBool,
) -> Result<RunnerStats, SchedulerError>
where
    T: ControlTarget + ?Sized,
{
    config.validate()?;

    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                tracing::info!("Control thread priority set to MAX (realtime)");
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to set control thread priority: {:?}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let period = config.period();
    let overrun_threshold = period.mul_f64(config.overrun_warn_multiplier);
    let sleeper = SpinSleeper::default();
    let epoch = Instant::now();
    let mut next_deadline = epoch;
    let mut stats = RunnerStats::default();

    tracing::info!(
        frequency_hz = config.frequency_hz,
        max_iterations = ?config.max_iterations,
        "Control loop started"
    );

    loop {
        if let Some(max) = config.max_iterations {
            if stats.ticks >= max {
                tracing::debug!("Reached max_iterations ({})", max);
                break;
            }
        }

        // Acquire: 看到 true 时必须看到设置方之前的写入
        if shutdown.load(Ordering::Acquire) {
            tracing::info!("Shutdown requested");
            break;
        }

        // 1. 应用排队的模式事件
        if !drain_mode_events(target, events, epoch, &mut stats) {
            tracing::info!("Mode event channel disconnected");
            break;
        }

        // 2. tick
        let tick_start = Instant::now();
        let report = target.tick(tick_start - epoch);
        let elapsed = tick_start.elapsed();

        stats.ticks += 1;
        stats.faults += report.faults as u64;
        if elapsed > stats.max_tick {
            stats.max_tick = elapsed;
        }
        if elapsed > overrun_threshold {
            stats.overruns += 1;
            tracing::warn!(
                tick = stats.ticks,
                elapsed_us = elapsed.as_micros() as u64,
                period_us = period.as_micros() as u64,
                "Tick overran its period"
            );
        }

        // 3. 休眠到下一个截止时间
        next_deadline += period;
        let now = Instant::now();
        if next_deadline > now {
            sleeper.sleep(next_deadline - now);
        } else {
            // 已经落后一个以上周期：重新对齐，不做追赶
            next_deadline = now;
        }
    }

    target.shutdown(epoch.elapsed());
    tracing::info!(
        ticks = stats.ticks,
        overruns = stats.overruns,
        faults = stats.faults,
        "Control loop stopped"
    );

    Ok(stats)
}

/// 应用所有排队的模式事件
///
/// 返回 `false` 表示通道已断开。
fn drain_mode_events<T>(
    target: &mut T,
    events: &Receiver<Mode>,
    epoch: Instant,
    stats: &mut RunnerStats,
) -> bool
where
    T: ControlTarget + ?Sized,
{
    loop {
        match events.try_recv() {
            Ok(mode) => {
                tracing::debug!(mode = %mode, "Applying mode event");
                target.on_mode_changed(mode, epoch.elapsed());
                stats.mode_changes += 1;
            },
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}
