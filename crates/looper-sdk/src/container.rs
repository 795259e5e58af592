//! 整机组装
//!
//! [`RobotContainer::build`] 是模式到行为映射的唯一声明处。注册顺序即 tick 顺序：
//!
//! | 顺序 | 循环 | 模式 |
//! |------|------|------|
//! | 1 | `operator_bindings` | Teleop |
//! | 2 | `drive_control` | Teleop |
//! | 3 | `collision_detection` | Autonomous, Teleop |
//! | 4 | `odometry` | Disabled, Autonomous, Teleop |
//! | 5 | `auto_aim` | Teleop |
//! | 6 | `auto_indexing` | Autonomous, Teleop |
//!
//! 缺少硬件或配置分节非法时，只禁用受影响的子系统并记录错误，其余部分照常运行。

use crate::bindings::OperatorBindingsLoop;
use crate::error::RobotError;
use crate::mode_controller::ModeController;
use crossbeam_channel::Receiver;
use looper_control::{
    AimHandle, AimStatus, AutoAimLoop, AutoIndexingLoop, CollisionDetectionLoop, CollisionHandle,
    CollisionStatus, DriveControlLoop, DriveHandle, DriveStatus, IndexerHandle, IndexerStatus,
    OdometryHandle, OdometryLoop, OdometryStatus, RobotConfig,
};
use looper_core::{AtomicMode, LoopScheduler, Mode, RunnerStats, run_scheduler};
use looper_hal::{
    BreakBeam, DriveEncoders, EncodedMotor, Imu, LimitSwitch, Motor, OperatorInput, VisionCamera,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 整机硬件句柄，缺失的设备为 `None`
#[derive(Clone, Default)]
pub struct RobotHardware {
    pub left_drive: Option<Arc<dyn Motor>>,
    pub right_drive: Option<Arc<dyn Motor>>,
    pub drive_encoders: Option<Arc<dyn DriveEncoders>>,
    pub imu: Option<Arc<dyn Imu>>,
    pub operator: Option<Arc<dyn OperatorInput>>,
    pub turret: Option<Arc<dyn EncodedMotor>>,
    pub turret_limit: Option<Arc<dyn LimitSwitch>>,
    pub camera: Option<Arc<dyn VisionCamera>>,
    pub indexer: Option<Arc<dyn Motor>>,
    pub pulley: Option<Arc<dyn EncodedMotor>>,
    pub ball_sensor: Option<Arc<dyn BreakBeam>>,
}

impl std::fmt::Debug for RobotHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotHardware")
            .field("left_drive", &self.left_drive.is_some())
            .field("right_drive", &self.right_drive.is_some())
            .field("drive_encoders", &self.drive_encoders.is_some())
            .field("imu", &self.imu.is_some())
            .field("operator", &self.operator.is_some())
            .field("turret", &self.turret.is_some())
            .field("turret_limit", &self.turret_limit.is_some())
            .field("camera", &self.camera.is_some())
            .field("indexer", &self.indexer.is_some())
            .field("pulley", &self.pulley.is_some())
            .field("ball_sensor", &self.ball_sensor.is_some())
            .finish()
    }
}

/// 记录被禁用的子系统
fn disable(disabled: &mut Vec<&'static str>, subsystem: &'static str, reason: &dyn std::fmt::Display) {
    tracing::error!(subsystem, "Subsystem disabled: {}", reason);
    disabled.push(subsystem);
}

/// 整机遥测快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotTelemetry {
    pub mode: String,
    pub drive: Option<DriveStatus>,
    pub collision: Option<CollisionStatus>,
    pub odometry: Option<OdometryStatus>,
    pub aim: Option<AimStatus>,
    pub indexer: Option<IndexerStatus>,
}

/// 遥测读取端
///
/// 只持有各子系统句柄的克隆，可以在控制线程之外的任何线程上采样。
#[derive(Debug, Clone)]
pub struct TelemetryProbe {
    mode: Arc<AtomicMode>,
    drive: Option<DriveHandle>,
    collision: Option<CollisionHandle>,
    odometry: Option<OdometryHandle>,
    aim: Option<AimHandle>,
    indexer: Option<IndexerHandle>,
}

impl TelemetryProbe {
    pub fn snapshot(&self) -> RobotTelemetry {
        RobotTelemetry {
            mode: self.mode.get(Ordering::Acquire).to_string(),
            drive: self.drive.as_ref().map(DriveHandle::status),
            collision: self.collision.as_ref().map(CollisionHandle::status),
            odometry: self.odometry.as_ref().map(OdometryHandle::status),
            aim: self.aim.as_ref().map(AimHandle::status),
            indexer: self.indexer.as_ref().map(IndexerHandle::status),
        }
    }
}

/// 组装好的整机
#[derive(Debug)]
pub struct RobotContainer {
    config: RobotConfig,
    controller: ModeController,
    drive: Option<DriveHandle>,
    collision: Option<CollisionHandle>,
    odometry: Option<OdometryHandle>,
    aim: Option<AimHandle>,
    indexer: Option<IndexerHandle>,
    disabled: Vec<&'static str>,
}

impl RobotContainer {
    /// 按声明表注册所有可用的子系统
    ///
    /// # 错误
    ///
    /// 只有控制线程配置（`runner` 分节）非法或注册本身失败时返回错误；
    /// 子系统级别的问题只会禁用该子系统。
    pub fn build(config: RobotConfig, hardware: RobotHardware) -> Result<Self, RobotError> {
        config.runner.validate()?;

        let mut scheduler = LoopScheduler::new();
        let mut disabled = Vec::new();

        let drive = match (&hardware.left_drive, &hardware.right_drive, &hardware.operator) {
            (Some(left), Some(right), Some(operator)) => match config.drive.validate() {
                Ok(()) => Some(DriveControlLoop::new(
                    left.clone(),
                    right.clone(),
                    operator.clone(),
                    config.drive.clone(),
                )),
                Err(e) => {
                    disable(&mut disabled, "drive", &e);
                    None
                },
            },
            _ => {
                disable(&mut disabled, "drive", &"drive motors or operator input missing");
                None
            },
        };

        let collision = match &hardware.imu {
            Some(imu) => match config.collision.validate() {
                Ok(()) => Some(CollisionDetectionLoop::new(imu.clone(), config.collision.clone())),
                Err(e) => {
                    disable(&mut disabled, "collision", &e);
                    None
                },
            },
            None => {
                disable(&mut disabled, "collision", &"IMU missing");
                None
            },
        };

        let odometry = match &hardware.drive_encoders {
            Some(encoders) => match config.odometry.validate() {
                Ok(()) => Some(OdometryLoop::new(
                    encoders.clone(),
                    hardware.imu.clone(),
                    config.odometry.clone(),
                )),
                Err(e) => {
                    disable(&mut disabled, "odometry", &e);
                    None
                },
            },
            None => {
                disable(&mut disabled, "odometry", &"drive encoders missing");
                None
            },
        };

        let aim = match (&hardware.turret, &hardware.camera) {
            (Some(turret), Some(camera)) => match config.aim.validate() {
                Ok(()) => {
                    if hardware.turret_limit.is_none() {
                        tracing::warn!("Turret limit switch missing, zeroing unavailable");
                    }
                    Some(AutoAimLoop::new(
                        turret.clone(),
                        camera.clone(),
                        hardware.turret_limit.clone(),
                        config.aim.clone(),
                    ))
                },
                Err(e) => {
                    disable(&mut disabled, "aim", &e);
                    None
                },
            },
            _ => {
                disable(&mut disabled, "aim", &"turret motor or vision camera missing");
                None
            },
        };

        let indexer = match (&hardware.indexer, &hardware.pulley, &hardware.ball_sensor) {
            (Some(feeder), Some(pulley), Some(sensor)) => match config.indexer.validate() {
                Ok(()) => Some(AutoIndexingLoop::new(
                    feeder.clone(),
                    pulley.clone(),
                    sensor.clone(),
                    config.indexer.clone(),
                )),
                Err(e) => {
                    disable(&mut disabled, "indexer", &e);
                    None
                },
            },
            _ => {
                disable(&mut disabled, "indexer", &"indexer motors or ball sensor missing");
                None
            },
        };

        let drive_handle = drive.as_ref().map(DriveControlLoop::handle);
        let collision_handle = collision.as_ref().map(CollisionDetectionLoop::handle);
        let odometry_handle = odometry.as_ref().map(OdometryLoop::handle);
        let aim_handle = aim.as_ref().map(AutoAimLoop::handle);
        let indexer_handle = indexer.as_ref().map(AutoIndexingLoop::handle);

        match (&hardware.operator, config.bindings.validate()) {
            (Some(operator), Ok(())) => {
                let mut bindings =
                    OperatorBindingsLoop::new(operator.clone(), config.bindings.clone());
                if let Some(handle) = &drive_handle {
                    bindings = bindings.with_drive(handle.clone());
                }
                if let Some(handle) = &aim_handle {
                    bindings = bindings.with_aim(handle.clone());
                }
                if let Some(handle) = &indexer_handle {
                    bindings = bindings.with_indexer(handle.clone());
                }
                scheduler.register(bindings, &[Mode::Teleop])?;
            },
            (None, _) => disable(&mut disabled, "bindings", &"operator input missing"),
            (Some(_), Err(e)) => disable(&mut disabled, "bindings", &e),
        }

        if let Some(drive) = drive {
            scheduler.register(drive, &[Mode::Teleop])?;
        }
        if let Some(collision) = collision {
            scheduler.register(collision, &Mode::ENABLED)?;
        }
        if let Some(odometry) = odometry {
            scheduler.register(
                odometry,
                &[Mode::Disabled, Mode::Autonomous, Mode::Teleop],
            )?;
        }
        if let Some(aim) = aim {
            scheduler.register(aim, &[Mode::Teleop])?;
        }
        if let Some(indexer) = indexer {
            scheduler.register(indexer, &Mode::ENABLED)?;
        }

        tracing::info!(
            loops = scheduler.len(),
            disabled = ?disabled,
            "Robot container built"
        );

        Ok(Self {
            config,
            controller: ModeController::new(scheduler),
            drive: drive_handle,
            collision: collision_handle,
            odometry: odometry_handle,
            aim: aim_handle,
            indexer: indexer_handle,
            disabled,
        })
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ModeController {
        &mut self.controller
    }

    pub fn drive(&self) -> Option<&DriveHandle> {
        self.drive.as_ref()
    }

    pub fn collision(&self) -> Option<&CollisionHandle> {
        self.collision.as_ref()
    }

    pub fn odometry(&self) -> Option<&OdometryHandle> {
        self.odometry.as_ref()
    }

    pub fn aim(&self) -> Option<&AimHandle> {
        self.aim.as_ref()
    }

    pub fn indexer(&self) -> Option<&IndexerHandle> {
        self.indexer.as_ref()
    }

    /// 因缺少硬件或配置非法而被禁用的子系统
    pub fn disabled_subsystems(&self) -> &[&'static str] {
        &self.disabled
    }

    pub fn probe(&self) -> TelemetryProbe {
        TelemetryProbe {
            mode: self.controller.mode_watcher(),
            drive: self.drive.clone(),
            collision: self.collision.clone(),
            odometry: self.odometry.clone(),
            aim: self.aim.clone(),
            indexer: self.indexer.clone(),
        }
    }

    pub fn telemetry(&self) -> RobotTelemetry {
        self.probe().snapshot()
    }

    /// 在当前线程上运行控制循环，直到关闭信号、事件通道断开或达到 `max_iterations`
    pub fn run(
        &mut self,
        events: &Receiver<Mode>,
        shutdown: &AtomicBool,
        max_iterations: Option<u64>,
    ) -> Result<RunnerStats, RobotError> {
        let runner = self.config.runner.to_runner_config(max_iterations);
        let stats = run_scheduler(&mut self.controller, events, &runner, shutdown)?;
        tracing::info!(
            ticks = stats.ticks,
            overruns = stats.overruns,
            faults = stats.faults,
            "Control loop exited"
        );
        Ok(stats)
    }
}
