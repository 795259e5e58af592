//! LoopScheduler - 按模式分组的协作式循环调度器
//!
//! # 职责
//!
//! - 持有所有注册的 [`Loop`]，按模式标签分组
//! - `start(mode)` / `stop(mode)` 启停一个模式分组，保证 `on_first_start` 只执行一次
//! - `tick()` 按**注册顺序**驱动所有运行中的循环
//!
//! # 顺序保证
//!
//! 同一 tick 内的执行顺序就是注册顺序。后注册的循环可以读取先注册循环在本 tick
//! 中触发的硬件更新（例如里程计在底盘之后执行）。
//!
//! # 故障隔离
//!
//! 回调返回的 `Err` 和回调中的 panic 都会被捕获、带循环名和阶段记录日志，
//! 然后继续执行剩余循环。一个子系统的故障不会让底盘失去安全停止能力。
//!
//! # 线程模型
//!
//! 调度器不可重入，所有方法都要求 `&mut self`；模式切换必须和 `tick()`
//! 在同一个控制线程上串行执行（见 [`runner`](crate::runner)）。

use crate::error::{LoopError, SchedulerError};
use crate::lifecycle::{Loop, LoopPhase, LoopState};
use crate::mode::Mode;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// 模式标签集合
pub type ModeTags = SmallVec<[Mode; 4]>;

/// 注册后返回的循环标识（即注册序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(usize);

impl LoopId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 单个循环的状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatus {
    pub id: LoopId,
    pub name: String,
    pub modes: ModeTags,
    pub state: LoopState,
    /// 回调失败（Err 或 panic）的累计次数
    pub faults: u64,
    /// `on_first_start` 执行时的时间戳
    pub first_started_at: Option<Duration>,
}

/// 一次 tick 的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// 执行了 `on_loop` 的循环数
    pub executed: usize,
    /// 其中失败的循环数
    pub faults: usize,
}

struct LoopSlot {
    id: LoopId,
    name: String,
    modes: ModeTags,
    state: LoopState,
    faults: u64,
    first_started_at: Option<Duration>,
    body: Box<dyn Loop>,
}

impl LoopSlot {
    fn is_tagged(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// 调用一个生命周期回调，捕获错误与 panic
    ///
    /// 返回回调是否成功。
    fn invoke(&mut self, phase: LoopPhase, timestamp: Duration) -> bool {
        if !self.check_invariant(phase) {
            return false;
        }

        let body = &mut self.body;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match phase {
            LoopPhase::FirstStart => body.on_first_start(timestamp),
            LoopPhase::Start => body.on_start(timestamp),
            LoopPhase::Loop => body.on_loop(timestamp),
            LoopPhase::Stop => body.on_stop(timestamp),
        }));

        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                self.faults += 1;
                self.report_error(phase, timestamp, &err);
                false
            },
            Err(payload) => {
                self.faults += 1;
                tracing::error!(
                    loop_name = %self.name,
                    phase = %phase,
                    timestamp = timestamp.as_secs_f64(),
                    panic = panic_message(payload.as_ref()),
                    "Loop callback panicked"
                );
                false
            },
        }
    }

    fn report_error(&self, phase: LoopPhase, timestamp: Duration, err: &LoopError) {
        tracing::error!(
            loop_name = %self.name,
            phase = %phase,
            timestamp = timestamp.as_secs_f64(),
            error = %err,
            "Loop callback failed"
        );
    }

    /// 程序不变量检查
    ///
    /// debug 构建中直接断言失败；release 构建记录日志并跳过本次调用。
    fn check_invariant(&self, phase: LoopPhase) -> bool {
        let violation = match phase {
            LoopPhase::Loop if self.state != LoopState::Running => {
                Some("on_loop invoked while not running")
            },
            LoopPhase::FirstStart if self.first_started_at.is_some() => {
                Some("on_first_start invoked twice")
            },
            _ => None,
        };

        match violation {
            Some(what) => {
                tracing::error!(loop_name = %self.name, phase = %phase, "Invariant violated: {}", what);
                debug_assert!(false, "loop '{}': {}", self.name, what);
                false
            },
            None => true,
        }
    }

    fn status(&self) -> LoopStatus {
        LoopStatus {
            id: self.id,
            name: self.name.clone(),
            modes: self.modes.clone(),
            state: self.state,
            faults: self.faults,
            first_started_at: self.first_started_at,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// 按模式分组的循环调度器
///
/// # 示例
///
/// ```rust
/// use looper_core::{Loop, LoopError, LoopScheduler, Mode};
/// use std::time::Duration;
///
/// struct Heartbeat;
///
/// impl Loop for Heartbeat {
///     fn name(&self) -> &str {
///         "heartbeat"
///     }
///
///     fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
///         Ok(())
///     }
/// }
///
/// let mut scheduler = LoopScheduler::new();
/// scheduler.register(Heartbeat, &Mode::ENABLED).unwrap();
///
/// scheduler.start(Mode::Teleop, Duration::ZERO);
/// let report = scheduler.tick(Duration::from_millis(20));
/// assert_eq!(report.executed, 1);
/// ```
#[derive(Default)]
pub struct LoopScheduler {
    slots: Vec<LoopSlot>,
    /// 一旦启动过任一模式，注册表即封闭
    sealed: bool,
    ticks: u64,
}

impl LoopScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个循环，挂到给定的一个或多个模式上
    ///
    /// # 错误
    ///
    /// - [`SchedulerError::RegistrationClosed`]: 已经启动过任一模式
    /// - [`SchedulerError::DuplicateLoop`]: 循环名重复
    /// - [`SchedulerError::NoModes`]: `modes` 为空
    pub fn register<L>(&mut self, body: L, modes: &[Mode]) -> Result<LoopId, SchedulerError>
    where
        L: Loop + 'static,
    {
        self.register_boxed(Box::new(body), modes)
    }

    /// [`register`](Self::register) 的 trait object 版本
    pub fn register_boxed(
        &mut self,
        body: Box<dyn Loop>,
        modes: &[Mode],
    ) -> Result<LoopId, SchedulerError> {
        let name = body.name().to_string();

        if self.sealed {
            return Err(SchedulerError::RegistrationClosed { name });
        }
        if modes.is_empty() {
            return Err(SchedulerError::NoModes { name });
        }
        if self.slots.iter().any(|slot| slot.name == name) {
            return Err(SchedulerError::DuplicateLoop { name });
        }

        let mut tags = ModeTags::new();
        for mode in modes {
            if !tags.contains(mode) {
                tags.push(*mode);
            }
        }

        let id = LoopId(self.slots.len());
        tracing::debug!(loop_name = %name, modes = ?tags, "Registered loop");
        self.slots.push(LoopSlot {
            id,
            name,
            modes: tags,
            state: LoopState::NeverStarted,
            faults: 0,
            first_started_at: None,
            body,
        });
        Ok(id)
    }

    /// 启动一个模式分组
    ///
    /// 对每个带 `mode` 标签的循环：
    /// - `NeverStarted`: `on_first_start` → `Running` → `on_start`
    /// - `Stopped`: `Running` → `on_start`
    /// - `Running`: 无操作
    ///
    /// 返回本次被启动的循环数。
    pub fn start(&mut self, mode: Mode, timestamp: Duration) -> usize {
        self.seal();
        let mut started = 0;

        for slot in self.slots.iter_mut().filter(|slot| slot.is_tagged(mode)) {
            match slot.state {
                LoopState::Running => continue,
                LoopState::NeverStarted => {
                    slot.invoke(LoopPhase::FirstStart, timestamp);
                    slot.first_started_at = Some(timestamp);
                },
                LoopState::Stopped => {},
            }

            slot.state = LoopState::Running;
            slot.invoke(LoopPhase::Start, timestamp);
            started += 1;
            tracing::info!(
                loop_name = %slot.name,
                mode = %mode,
                timestamp = timestamp.as_secs_f64(),
                "Started loop"
            );
        }

        started
    }

    /// 停止一个模式分组
    ///
    /// 对每个带 `mode` 标签且正在运行的循环同步调用 `on_stop`，然后置为 `Stopped`。
    /// 即使 `on_stop` 失败，状态也会推进到 `Stopped`。
    ///
    /// 返回本次被停止的循环数。
    pub fn stop(&mut self, mode: Mode, timestamp: Duration) -> usize {
        let mut stopped = 0;

        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.is_tagged(mode) && slot.state == LoopState::Running)
        {
            Self::stop_slot(slot, timestamp);
            stopped += 1;
        }

        stopped
    }

    /// 切换到 `mode`
    ///
    /// 先停止所有未带 `mode` 标签的运行中循环，再启动 `mode` 分组。
    /// 同时带有新旧模式标签的循环保持运行，不经历 stop/start。
    pub fn transition(&mut self, mode: Mode, timestamp: Duration) -> (usize, usize) {
        let mut stopped = 0;

        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.state == LoopState::Running && !slot.is_tagged(mode))
        {
            Self::stop_slot(slot, timestamp);
            stopped += 1;
        }

        let started = self.start(mode, timestamp);
        tracing::debug!(mode = %mode, stopped, started, "Mode transition");
        (stopped, started)
    }

    /// 停止所有运行中的循环
    pub fn stop_all(&mut self, timestamp: Duration) -> usize {
        let mut stopped = 0;

        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.state == LoopState::Running)
        {
            Self::stop_slot(slot, timestamp);
            stopped += 1;
        }

        stopped
    }

    fn stop_slot(slot: &mut LoopSlot, timestamp: Duration) {
        slot.invoke(LoopPhase::Stop, timestamp);
        slot.state = LoopState::Stopped;
        tracing::info!(
            loop_name = %slot.name,
            timestamp = timestamp.as_secs_f64(),
            "Stopped loop"
        );
    }

    /// 按注册顺序对所有运行中的循环调用 `on_loop`
    pub fn tick(&mut self, timestamp: Duration) -> TickReport {
        let mut report = TickReport::default();

        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.state == LoopState::Running)
        {
            report.executed += 1;
            if !slot.invoke(LoopPhase::Loop, timestamp) {
                report.faults += 1;
            }
        }

        self.ticks += 1;
        tracing::trace!(
            tick = self.ticks,
            executed = report.executed,
            faults = report.faults,
            "Tick"
        );
        report
    }

    fn seal(&mut self) {
        if !self.sealed {
            self.sealed = true;
            tracing::debug!(loops = self.slots.len(), "Loop registry sealed");
        }
    }

    /// 注册表是否已封闭
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 已执行的 tick 数
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn loop_state(&self, id: LoopId) -> Option<LoopState> {
        self.slots.get(id.0).map(|slot| slot.state)
    }

    /// 按名称查找循环
    pub fn find(&self, name: &str) -> Option<LoopId> {
        self.slots.iter().find(|slot| slot.name == name).map(|slot| slot.id)
    }

    /// 所有循环的状态快照（按注册顺序）
    pub fn status(&self) -> Vec<LoopStatus> {
        self.slots.iter().map(LoopSlot::status).collect()
    }

    /// 当前处于运行状态的循环名（按注册顺序）
    pub fn running(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|slot| slot.state == LoopState::Running)
            .map(|slot| slot.name.as_str())
            .collect()
    }
}

impl std::fmt::Debug for LoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopScheduler")
            .field("loops", &self.status())
            .field("sealed", &self.sealed)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    /// 记录每次回调的测试循环
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_loop: bool,
        panic_on_loop: bool,
    }

    impl Probe {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                fail_on_loop: false,
                panic_on_loop: false,
            }
        }

        fn record(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, phase));
        }
    }

    impl Loop for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn on_first_start(&mut self, _ts: Duration) -> Result<(), LoopError> {
            self.record("first_start");
            Ok(())
        }

        fn on_start(&mut self, _ts: Duration) -> Result<(), LoopError> {
            self.record("start");
            Ok(())
        }

        fn on_loop(&mut self, _ts: Duration) -> Result<(), LoopError> {
            self.record("loop");
            if self.panic_on_loop {
                panic!("boom");
            }
            if self.fail_on_loop {
                return Err(LoopError::Other("injected".to_string()));
            }
            Ok(())
        }

        fn on_stop(&mut self, _ts: Duration) -> Result<(), LoopError> {
            self.record("stop");
            Ok(())
        }
    }

    fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn drain(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn test_first_start_then_start() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        let id = scheduler.register(Probe::new("a", &log), &[Mode::Teleop]).unwrap();

        assert_eq!(scheduler.loop_state(id), Some(LoopState::NeverStarted));
        assert_eq!(scheduler.start(Mode::Teleop, Duration::ZERO), 1);
        assert_eq!(drain(&log), vec!["a:first_start", "a:start"]);
        assert_eq!(scheduler.loop_state(id), Some(LoopState::Running));

        // 已运行：无操作
        assert_eq!(scheduler.start(Mode::Teleop, Duration::ZERO), 0);
        assert!(drain(&log).is_empty());

        scheduler.stop(Mode::Teleop, Duration::ZERO);
        scheduler.start(Mode::Teleop, Duration::ZERO);
        assert_eq!(drain(&log), vec!["a:stop", "a:start"]);
    }

    #[test]
    fn test_tick_runs_in_registration_order() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("drive", &log), &[Mode::Teleop]).unwrap();
        scheduler.register(Probe::new("idle", &log), &[Mode::Disabled]).unwrap();
        scheduler.register(Probe::new("odometry", &log), &Mode::ENABLED).unwrap();

        scheduler.start(Mode::Teleop, Duration::ZERO);
        drain(&log);

        let report = scheduler.tick(Duration::from_millis(20));
        assert_eq!(report, TickReport { executed: 2, faults: 0 });
        assert_eq!(drain(&log), vec!["drive:loop", "odometry:loop"]);
    }

    #[test]
    fn test_tick_without_started_mode_does_nothing() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("a", &log), &[Mode::Teleop]).unwrap();

        let report = scheduler.tick(Duration::ZERO);
        assert_eq!(report.executed, 0);
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_register_after_start_fails() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("a", &log), &[Mode::Teleop]).unwrap();
        scheduler.start(Mode::Autonomous, Duration::ZERO);

        let err = scheduler
            .register(Probe::new("b", &log), &[Mode::Teleop])
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::RegistrationClosed {
                name: "b".to_string()
            }
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_modes() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("a", &log), &[Mode::Teleop]).unwrap();

        assert!(matches!(
            scheduler.register(Probe::new("a", &log), &[Mode::Test]),
            Err(SchedulerError::DuplicateLoop { .. })
        ));
        assert!(matches!(
            scheduler.register(Probe::new("b", &log), &[]),
            Err(SchedulerError::NoModes { .. })
        ));
    }

    #[test]
    fn test_failing_loop_is_isolated() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        let mut bad = Probe::new("bad", &log);
        bad.fail_on_loop = true;
        let mut worse = Probe::new("worse", &log);
        worse.panic_on_loop = true;
        let bad_id = scheduler.register(bad, &[Mode::Teleop]).unwrap();
        scheduler.register(worse, &[Mode::Teleop]).unwrap();
        scheduler.register(Probe::new("good", &log), &[Mode::Teleop]).unwrap();

        scheduler.start(Mode::Teleop, Duration::ZERO);
        drain(&log);

        let report = scheduler.tick(Duration::from_millis(20));
        assert_eq!(report, TickReport { executed: 3, faults: 2 });
        assert_eq!(drain(&log), vec!["bad:loop", "worse:loop", "good:loop"]);

        let status = scheduler.status();
        assert_eq!(status[bad_id.index()].faults, 1);
        assert_eq!(status[1].faults, 1);
        assert_eq!(status[2].faults, 0);
        // 故障循环仍处于运行状态
        assert_eq!(status[1].state, LoopState::Running);
    }

    #[test]
    fn test_transition_keeps_shared_loops_running() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("enabled", &log), &Mode::ENABLED).unwrap();
        scheduler.register(Probe::new("auto", &log), &[Mode::Autonomous]).unwrap();
        scheduler.register(Probe::new("teleop", &log), &[Mode::Teleop]).unwrap();

        scheduler.transition(Mode::Autonomous, Duration::ZERO);
        drain(&log);

        let (stopped, started) = scheduler.transition(Mode::Teleop, Duration::from_secs(15));
        assert_eq!((stopped, started), (1, 1));
        assert_eq!(drain(&log), vec!["auto:stop", "teleop:first_start", "teleop:start"]);
        assert_eq!(scheduler.running(), vec!["enabled", "teleop"]);

        // 重复切换到同一模式是无操作
        assert_eq!(scheduler.transition(Mode::Teleop, Duration::from_secs(16)), (0, 0));
    }

    #[test]
    fn test_stop_all() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler.register(Probe::new("a", &log), &[Mode::Teleop]).unwrap();
        scheduler.register(Probe::new("b", &log), &[Mode::Teleop, Mode::Test]).unwrap();

        scheduler.start(Mode::Teleop, Duration::ZERO);
        drain(&log);

        assert_eq!(scheduler.stop_all(Duration::from_secs(1)), 2);
        assert_eq!(drain(&log), vec!["a:stop", "b:stop"]);
        assert!(scheduler.running().is_empty());
    }

    #[test]
    fn test_duplicate_mode_tags_collapse() {
        let log = new_log();
        let mut scheduler = LoopScheduler::new();
        scheduler
            .register(Probe::new("a", &log), &[Mode::Teleop, Mode::Teleop])
            .unwrap();
        assert_eq!(scheduler.status()[0].modes.len(), 1);
        assert_eq!(scheduler.find("a"), Some(LoopId(0)));
        assert_eq!(scheduler.find("missing"), None);
    }
}
