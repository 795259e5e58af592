//! 操作手按键绑定循环
//!
//! 每个 tick 轮询一次按键边沿，把逻辑按键名映射到子系统句柄上的操作：
//!
//! | 绑定 | 边沿 | 动作 |
//! |------|------|------|
//! | `reduce_speed` | 按下 / 松开 | 切换减速 / 恢复按下前的状态 |
//! | `invert_heading` | 按下 / 松开 | 切换车头方向 / 恢复按下前的状态 |
//! | `toggle_cheesy` | 按下 | 切换 arcade / cheesy |
//! | `toggle_aim` | 按下 | 切换自动瞄准 |
//! | `toggle_indexing` | 按下 | 切换自动理球 |
//! | `zero_turret` | 按下 | 炮塔归零 |
//!
//! 对应子系统被禁用（缺少硬件）时边沿仍然会被读取并丢弃，避免积压。
//! 必须注册在底盘循环之前，本 tick 的按键在同一 tick 生效。

use looper_control::{AimHandle, BindingsConfig, DriveHandle, IndexerHandle};
use looper_core::{Loop, LoopError};
use looper_hal::{ButtonEdge, OperatorInput};
use std::sync::Arc;
use std::time::Duration;

pub struct OperatorBindingsLoop {
    input: Arc<dyn OperatorInput>,
    bindings: BindingsConfig,
    drive: Option<DriveHandle>,
    aim: Option<AimHandle>,
    indexer: Option<IndexerHandle>,
    /// 按住期间保存按下前的状态，松开或停止时恢复
    held_reduce: Option<bool>,
    held_invert: Option<bool>,
}

impl OperatorBindingsLoop {
    pub fn new(input: Arc<dyn OperatorInput>, bindings: BindingsConfig) -> Self {
        Self {
            input,
            bindings,
            drive: None,
            aim: None,
            indexer: None,
            held_reduce: None,
            held_invert: None,
        }
    }

    pub fn with_drive(mut self, drive: DriveHandle) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn with_aim(mut self, aim: AimHandle) -> Self {
        self.aim = Some(aim);
        self
    }

    pub fn with_indexer(mut self, indexer: IndexerHandle) -> Self {
        self.indexer = Some(indexer);
        self
    }

    fn edge(&self, name: &str) -> ButtonEdge {
        self.input.button_edge(name)
    }

    fn release_holds(&mut self) {
        let reduce = self.held_reduce.take();
        let invert = self.held_invert.take();
        if let Some(drive) = &self.drive {
            if let Some(prior) = reduce {
                drive.set_reduced(prior);
            }
            if let Some(prior) = invert {
                drive.set_heading_inverted(prior);
            }
        }
    }
}

impl Loop for OperatorBindingsLoop {
    fn name(&self) -> &str {
        "operator_bindings"
    }

    fn on_loop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        match self.edge(&self.bindings.reduce_speed) {
            ButtonEdge::Pressed => {
                if let Some(drive) = &self.drive {
                    let prior = *self.held_reduce.get_or_insert(drive.is_reduced());
                    drive.set_reduced(!prior);
                }
            },
            ButtonEdge::Released => {
                if let (Some(drive), Some(prior)) = (&self.drive, self.held_reduce.take()) {
                    drive.set_reduced(prior);
                }
            },
            ButtonEdge::Unchanged => {},
        }

        match self.edge(&self.bindings.invert_heading) {
            ButtonEdge::Pressed => {
                if let Some(drive) = &self.drive {
                    let prior = *self.held_invert.get_or_insert(drive.is_heading_inverted());
                    drive.set_heading_inverted(!prior);
                }
            },
            ButtonEdge::Released => {
                if let (Some(drive), Some(prior)) = (&self.drive, self.held_invert.take()) {
                    drive.set_heading_inverted(prior);
                }
            },
            ButtonEdge::Unchanged => {},
        }

        if self.edge(&self.bindings.toggle_cheesy) == ButtonEdge::Pressed {
            if let Some(drive) = &self.drive {
                let mix = if drive.toggle_cheesy() {
                    "cheesy"
                } else {
                    "arcade"
                };
                tracing::info!(mix, "Drive mix toggled");
            }
        }

        if self.edge(&self.bindings.toggle_aim) == ButtonEdge::Pressed {
            if let Some(aim) = &self.aim {
                let aiming = aim.toggle_aiming();
                tracing::info!(aiming, "Auto-aim toggled");
            }
        }

        if self.edge(&self.bindings.toggle_indexing) == ButtonEdge::Pressed {
            if let Some(indexer) = &self.indexer {
                let enabled = indexer.toggle();
                tracing::info!(enabled, "Auto-indexing toggled");
            }
        }

        if self.edge(&self.bindings.zero_turret) == ButtonEdge::Pressed {
            if let Some(aim) = &self.aim {
                aim.start_zeroing();
            }
        }

        Ok(())
    }

    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.release_holds();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_control::{AutoAimLoop, AutoIndexingLoop, DriveControlLoop, MixMode};
    use looper_control::{AimConfig, AimState, DriveConfig, IndexerConfig};
    use looper_hal::mock::{
        MockBreakBeam, MockLimitSwitch, MockMotor, MockOperatorInput, MockVision,
    };

    struct Rig {
        input: MockOperatorInput,
        drive: DriveHandle,
        aim: AimHandle,
        indexer: IndexerHandle,
        bindings: OperatorBindingsLoop,
    }

    fn rig() -> Rig {
        rig_with_drive(DriveConfig::default())
    }

    fn rig_with_drive(drive_config: DriveConfig) -> Rig {
        let input = MockOperatorInput::new();
        let drive = DriveControlLoop::new(
            Arc::new(MockMotor::new("left")),
            Arc::new(MockMotor::new("right")),
            Arc::new(input.clone()),
            drive_config,
        )
        .handle();
        let aim = AutoAimLoop::new(
            Arc::new(MockMotor::new("turret")),
            Arc::new(MockVision::new()),
            Some(Arc::new(MockLimitSwitch::new())),
            AimConfig::default(),
        )
        .handle();
        let indexer = AutoIndexingLoop::new(
            Arc::new(MockMotor::new("indexer")),
            Arc::new(MockMotor::new("pulley")),
            Arc::new(MockBreakBeam::new()),
            IndexerConfig::default(),
        )
        .handle();
        let bindings = OperatorBindingsLoop::new(Arc::new(input.clone()), BindingsConfig::default())
            .with_drive(drive.clone())
            .with_aim(aim.clone())
            .with_indexer(indexer.clone());
        Rig {
            input,
            drive,
            aim,
            indexer,
            bindings,
        }
    }

    fn ts(tick: u64) -> Duration {
        Duration::from_millis(tick * 20)
    }

    #[test]
    fn test_hold_to_reduce() {
        let mut rig = rig();
        rig.input.press("L2");
        rig.bindings.on_loop(ts(1)).unwrap();
        assert_eq!(rig.drive.effective_limit(), 0.5);

        rig.bindings.on_loop(ts(2)).unwrap();
        assert_eq!(rig.drive.effective_limit(), 0.5);

        rig.input.release("L2");
        rig.bindings.on_loop(ts(3)).unwrap();
        assert_eq!(rig.drive.effective_limit(), 1.0);
    }

    #[test]
    fn test_hold_invert_relative_to_configured_heading() {
        let mut rig = rig_with_drive(DriveConfig {
            invert_heading: true,
            ..DriveConfig::default()
        });
        assert!(rig.drive.is_heading_inverted());

        rig.input.press("R2");
        rig.bindings.on_loop(ts(1)).unwrap();
        assert!(!rig.drive.is_heading_inverted());

        rig.input.release("R2");
        rig.bindings.on_loop(ts(2)).unwrap();
        assert!(rig.drive.is_heading_inverted());

        // 按住期间停止同样恢复
        rig.input.press("R2");
        rig.bindings.on_loop(ts(3)).unwrap();
        assert!(!rig.drive.is_heading_inverted());
        rig.bindings.on_stop(ts(4)).unwrap();
        assert!(rig.drive.is_heading_inverted());
    }

    #[test]
    fn test_hold_reduce_restores_prior_state() {
        let mut rig = rig();
        rig.drive.set_reduced(true);

        rig.input.press("L2");
        rig.bindings.on_loop(ts(1)).unwrap();
        assert!(!rig.drive.is_reduced());
        assert_eq!(rig.drive.effective_limit(), 1.0);

        rig.input.release("L2");
        rig.bindings.on_loop(ts(2)).unwrap();
        assert!(rig.drive.is_reduced());
        assert_eq!(rig.drive.effective_limit(), 0.5);
    }

    #[test]
    fn test_toggles() {
        let mut rig = rig();
        rig.input.press("X");
        rig.input.press("R1");
        rig.input.press("L1");
        rig.bindings.on_loop(ts(1)).unwrap();

        assert_eq!(rig.drive.mix_mode(), MixMode::Cheesy);
        assert_eq!(rig.aim.state(), AimState::Aiming);
        assert!(rig.indexer.is_enabled());

        // 松开不触发切换
        rig.input.release("X");
        rig.bindings.on_loop(ts(2)).unwrap();
        assert_eq!(rig.drive.mix_mode(), MixMode::Cheesy);
    }

    #[test]
    fn test_zero_turret() {
        let mut rig = rig();
        rig.input.press("Options");
        rig.bindings.on_loop(ts(1)).unwrap();
        assert_eq!(rig.aim.state(), AimState::Zeroing);
    }

    #[test]
    fn test_stop_releases_held_buttons() {
        let mut rig = rig();
        rig.input.press("L2");
        rig.input.press("R2");
        rig.bindings.on_loop(ts(1)).unwrap();
        assert!(rig.drive.is_heading_inverted());

        rig.bindings.on_stop(ts(2)).unwrap();
        assert!(!rig.drive.is_heading_inverted());
        assert_eq!(rig.drive.effective_limit(), 1.0);
    }

    #[test]
    fn test_missing_subsystems_still_consume_edges() {
        let input = MockOperatorInput::new();
        let mut bindings = OperatorBindingsLoop::new(Arc::new(input.clone()), BindingsConfig::default());
        input.press("R1");
        bindings.on_loop(ts(1)).unwrap();
        assert_eq!(input.button_edge("R1"), ButtonEdge::Unchanged);
    }
}
