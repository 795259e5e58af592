//! simulate 命令
//!
//! 用 mock 设备和简化的物理模型运行完整的机器人控制循环。
//! 控制循环在独立线程上以配置的频率运行，本线程按脚本发送模式事件并推进仿真。

use anyhow::{Context, Result, anyhow};
use clap::Args;
use looper_core::Mode;
use looper_sdk::{RobotContainer, RobotTelemetry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::load_config;
use crate::script::parse_script;
use crate::sim::{OperatorScript, SimPlant};

/// 仿真命令参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 配置文件（缺省为内置默认值）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 模式脚本，逗号分隔的 `模式:秒数`
    #[arg(short, long, default_value = "disabled:0.5,auto:1,teleop:3,disabled:0.5")]
    pub script: String,

    /// 手动阶段的前进摇杆值
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub forward: f64,

    /// 手动阶段的转向摇杆值
    #[arg(long, default_value_t = 0.2, allow_negative_numbers = true)]
    pub rotation: f64,

    /// 以 JSON 输出结果
    #[arg(long)]
    pub json: bool,
}

/// 每一步结束时的快照
#[derive(Debug, Serialize)]
struct StepReport {
    mode: String,
    seconds: f64,
    telemetry: RobotTelemetry,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    ticks: u64,
    overruns: u64,
    mode_changes: u64,
    faults: u64,
    max_tick_us: u128,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    disabled_subsystems: Vec<String>,
    steps: Vec<StepReport>,
    stats: StatsReport,
    interrupted: bool,
}

impl SimulateCommand {
    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let steps = parse_script(&self.script)?;
        let step_dt = 1.0 / config.runner.frequency_hz;

        let mut plant = SimPlant::new(&config);
        let robot = RobotContainer::build(config.clone(), plant.hardware())
            .context("Failed to build robot")?;
        let probe = robot.probe();
        let disabled_subsystems = robot
            .disabled_subsystems()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let shutdown = shutdown.clone();
            ctrlc::set_handler(move || {
                eprintln!("\nReceived interrupt signal. Stopping all loops...");
                shutdown.store(true, Ordering::Release);
            })
            .context("Failed to set signal handler")?;
        }

        let (tx, rx) = crossbeam_channel::unbounded::<Mode>();
        let control = {
            let shutdown = shutdown.clone();
            let mut robot = robot;
            thread::Builder::new()
                .name("control".to_string())
                .spawn(move || robot.run(&rx, &shutdown, None))
                .context("Failed to spawn control thread")?
        };

        let operator = OperatorScript {
            forward: self.forward,
            rotation: self.rotation,
            ..OperatorScript::default()
        };
        let mut operator_applied = false;
        let mut reports = Vec::with_capacity(steps.len());

        for step in &steps {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            tracing::info!(mode = %step.mode, "Script step for {:?}", step.duration);
            tx.send(step.mode)
                .map_err(|_| anyhow!("Control thread exited early"))?;

            if step.mode == Mode::Teleop && !operator_applied {
                plant.apply_operator(&operator, &config.bindings);
                operator_applied = true;
            }

            let start = Instant::now();
            while start.elapsed() < step.duration && !shutdown.load(Ordering::Acquire) {
                plant.step(step_dt);
                thread::sleep(Duration::from_secs_f64(step_dt));
            }

            reports.push(StepReport {
                mode: step.mode.to_string(),
                seconds: step.duration.as_secs_f64(),
                telemetry: probe.snapshot(),
            });
            if !self.json {
                print_step(reports.len(), reports.last());
            }
        }

        let interrupted = shutdown.load(Ordering::Acquire);
        shutdown.store(true, Ordering::Release);
        drop(tx);
        let stats = control
            .join()
            .map_err(|_| anyhow!("Control thread panicked"))??;

        let (left, right) = plant.drive_output();
        let report = SimulationReport {
            disabled_subsystems,
            steps: reports,
            stats: StatsReport {
                ticks: stats.ticks,
                overruns: stats.overruns,
                mode_changes: stats.mode_changes,
                faults: stats.faults,
                max_tick_us: stats.max_tick.as_micros(),
            },
            interrupted,
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!();
            println!("📊 Control loop:");
            println!("  ticks: {}", report.stats.ticks);
            println!("  overruns: {}", report.stats.overruns);
            println!("  mode changes: {}", report.stats.mode_changes);
            println!("  faults: {}", report.stats.faults);
            println!("  max tick: {} µs", report.stats.max_tick_us);
            println!("  final drive output: ({:.3}, {:.3})", left, right);
            if !report.disabled_subsystems.is_empty() {
                println!("  ⚠️ disabled: {}", report.disabled_subsystems.join(", "));
            }
        }
        Ok(())
    }
}

fn print_step(index: usize, report: Option<&StepReport>) {
    let Some(report) = report else {
        return;
    };
    let t = &report.telemetry;
    println!("▶ Step {}: {} for {:.2}s", index, report.mode, report.seconds);
    if let Some(drive) = &t.drive {
        println!(
            "  drive: {:?} last=({:.3}, {:.3}) limiter={:.2}",
            drive.mix, drive.last.left, drive.last.right, drive.limiter
        );
    }
    if let Some(odometry) = &t.odometry {
        println!(
            "  pose: {}{}",
            odometry.pose,
            if odometry.stale { " (stale)" } else { "" }
        );
    }
    if let Some(collision) = &t.collision {
        println!("  collisions: {}", collision.rising_edges);
    }
    if let Some(aim) = &t.aim {
        println!(
            "  turret: {:?} angle={} on_target={}",
            aim.state, aim.angle, aim.on_target
        );
    }
    if let Some(indexer) = &t.indexer {
        println!(
            "  indexer: enabled={} balls={}{}",
            indexer.enabled,
            indexer.count,
            if indexer.full { " (full)" } else { "" }
        );
    }
}
