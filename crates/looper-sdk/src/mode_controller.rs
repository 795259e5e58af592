//! 模式控制器
//!
//! 接收比赛控制器发来的模式变化事件，转成调度器的 `transition` 调用。
//! 同一模式的重复通知是空操作。
//!
//! 当前模式同时发布到一个 [`AtomicMode`]，其他线程（遥测、CLI）可以无锁读取。

use looper_core::{AtomicMode, ControlTarget, LoopScheduler, LoopStatus, Mode, TickReport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub struct ModeController {
    scheduler: LoopScheduler,
    current: Option<Mode>,
    published: Arc<AtomicMode>,
    transitions: u64,
}

impl ModeController {
    pub fn new(scheduler: LoopScheduler) -> Self {
        Self {
            scheduler,
            current: None,
            published: Arc::new(AtomicMode::default()),
            transitions: 0,
        }
    }

    /// 当前模式；还没有收到过任何模式事件时为 `None`
    pub fn current_mode(&self) -> Option<Mode> {
        self.current
    }

    /// 跨线程读取当前模式
    pub fn mode_watcher(&self) -> Arc<AtomicMode> {
        self.published.clone()
    }

    /// 已应用的模式切换次数
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// 处理模式变化，返回是否真正发生了切换
    pub fn change_mode(&mut self, mode: Mode, timestamp: Duration) -> bool {
        if self.current == Some(mode) {
            tracing::debug!(%mode, "Mode unchanged, ignoring");
            return false;
        }

        let (stopped, started) = self.scheduler.transition(mode, timestamp);
        tracing::info!(
            from = %self.current.map_or("none", Mode::as_str),
            to = %mode,
            stopped,
            started,
            "Mode changed at {:.3}s",
            timestamp.as_secs_f64()
        );
        self.current = Some(mode);
        self.published.set(mode, Ordering::Release);
        self.transitions += 1;
        true
    }

    pub fn scheduler(&self) -> &LoopScheduler {
        &self.scheduler
    }

    pub fn status(&self) -> Vec<LoopStatus> {
        self.scheduler.status()
    }
}

impl ControlTarget for ModeController {
    fn on_mode_changed(&mut self, mode: Mode, timestamp: Duration) {
        self.change_mode(mode, timestamp);
    }

    fn tick(&mut self, timestamp: Duration) -> TickReport {
        self.scheduler.tick(timestamp)
    }

    fn shutdown(&mut self, timestamp: Duration) {
        let stopped = self.scheduler.stop_all(timestamp);
        tracing::info!(stopped, "All loops stopped");
        self.current = None;
        self.published.set(Mode::Disabled, Ordering::Release);
    }
}

impl std::fmt::Debug for ModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeController")
            .field("current", &self.current)
            .field("transitions", &self.transitions)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
