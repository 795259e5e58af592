//! Loop trait - 周期性控制逻辑的通用接口
//!
//! # 四阶段生命周期
//!
//! ```text
//!              start(mode)                 tick()
//! NeverStarted ───────────► on_first_start ─► on_start ─► Running ─► on_loop ...
//!                                                           │
//!                                              stop(mode)   ▼
//!                                       Stopped ◄──────── on_stop
//!                                          │
//!                             start(mode)  └──► on_start ─► Running
//! ```
//!
//! - `on_first_start`: 进程生命周期内最多调用一次
//! - `on_start` / `on_stop`: 每次所属模式启动/停止时调用
//! - `on_loop`: 仅在 `Running` 状态下、每个 tick 调用一次
//!
//! # 时间戳
//!
//! 所有回调接收的 `timestamp` 是调度器时钟（自控制线程启动以来的单调时间），
//! 控制器应当使用它计算 `dt`，而不是自行读取系统时钟，便于单元测试。
//!
//! # 约束
//!
//! - 回调不得阻塞、休眠或执行延迟不可控的 IO
//! - `on_stop` 必须把所控制的执行器置于安全（停止）状态

use crate::error::LoopError;
use std::fmt;
use std::time::Duration;

/// 循环的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// 从未启动
    #[default]
    NeverStarted,
    /// 已停止
    Stopped,
    /// 运行中
    Running,
}

/// 生命周期阶段（用于日志和故障报告）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    FirstStart,
    Start,
    Loop,
    Stop,
}

impl LoopPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopPhase::FirstStart => "on_first_start",
            LoopPhase::Start => "on_start",
            LoopPhase::Loop => "on_loop",
            LoopPhase::Stop => "on_stop",
        }
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 周期性控制逻辑
///
/// 每个子系统实现一个（或几个）`Loop`，通过
/// [`LoopScheduler::register`](crate::LoopScheduler::register) 挂到一个或多个模式上。
///
/// # 线程安全
///
/// 要求 `Send`，以便整个调度器可以移动到控制线程；不要求 `Sync`，
/// 回调只会在控制线程上被调用。
///
/// # 示例
///
/// ```rust
/// use looper_core::{Loop, LoopError};
/// use std::time::Duration;
///
/// struct Blink {
///     on: bool,
/// }
///
/// impl Loop for Blink {
///     fn name(&self) -> &str {
///         "blink"
///     }
///
///     fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
///         self.on = !self.on;
///         Ok(())
///     }
///
///     fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
///         self.on = false;
///         Ok(())
///     }
/// }
/// ```
pub trait Loop: Send {
    /// 循环名（用于日志，注册时要求唯一）
    fn name(&self) -> &str;

    /// 首次启动（进程生命周期内最多一次），在 `on_start` 之前调用
    fn on_first_start(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        Ok(())
    }

    /// 所属模式启动
    fn on_start(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        Ok(())
    }

    /// 每个 tick 调用一次
    fn on_loop(&mut self, timestamp: Duration) -> Result<(), LoopError>;

    /// 所属模式停止，必须让执行器回到安全状态
    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        Ok(())
    }
}

impl<L: Loop + ?Sized> Loop for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_first_start(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        (**self).on_first_start(timestamp)
    }

    fn on_start(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        (**self).on_start(timestamp)
    }

    fn on_loop(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        (**self).on_loop(timestamp)
    }

    fn on_stop(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        (**self).on_stop(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        loops: u32,
    }

    impl Loop for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
            self.loops += 1;
            Ok(())
        }
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        let mut counter = Counter { loops: 0 };
        let ts = Duration::from_millis(20);

        assert!(counter.on_first_start(ts).is_ok());
        assert!(counter.on_start(ts).is_ok());
        assert!(counter.on_stop(ts).is_ok());
        assert_eq!(counter.loops, 0);
    }

    #[test]
    fn test_boxed_loop_delegates() {
        let mut boxed: Box<dyn Loop> = Box::new(Counter { loops: 0 });
        boxed.on_loop(Duration::ZERO).unwrap();
        assert_eq!(boxed.name(), "counter");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(LoopPhase::FirstStart.to_string(), "on_first_start");
        assert_eq!(LoopPhase::Stop.to_string(), "on_stop");
        assert_eq!(LoopState::default(), LoopState::NeverStarted);
    }
}
