//! LoopScheduler 性能基准测试
//!
//! 测量一次 tick 驱动若干个轻量循环的开销，以及一次完整模式切换的开销。

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use looper_core::{Loop, LoopError, LoopScheduler, Mode};
use std::time::Duration;

struct Accumulator {
    name: String,
    value: f64,
}

impl Loop for Accumulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_loop(&mut self, timestamp: Duration) -> Result<(), LoopError> {
        self.value += black_box(timestamp.as_secs_f64()).sin();
        Ok(())
    }

    fn on_stop(&mut self, _timestamp: Duration) -> Result<(), LoopError> {
        self.value = 0.0;
        Ok(())
    }
}

fn build_scheduler(loops: usize) -> LoopScheduler {
    let mut scheduler = LoopScheduler::new();
    for i in 0..loops {
        let modes: &[Mode] = if i % 2 == 0 {
            &Mode::ENABLED
        } else {
            &[Mode::Teleop]
        };
        scheduler
            .register(
                Accumulator {
                    name: format!("loop-{}", i),
                    value: 0.0,
                },
                modes,
            )
            .unwrap();
    }
    scheduler
}

fn bench_tick(c: &mut Criterion) {
    let mut scheduler = build_scheduler(8);
    scheduler.start(Mode::Teleop, Duration::ZERO);

    let mut ts = Duration::ZERO;
    c.bench_function("scheduler_tick_8_loops", |b| {
        b.iter(|| {
            ts += Duration::from_millis(20);
            black_box(scheduler.tick(ts))
        })
    });
}

fn bench_transition(c: &mut Criterion) {
    let mut scheduler = build_scheduler(8);
    let mut ts = Duration::ZERO;
    let mut teleop = false;

    c.bench_function("scheduler_transition_auto_teleop", |b| {
        b.iter(|| {
            ts += Duration::from_millis(20);
            teleop = !teleop;
            let mode = if teleop { Mode::Teleop } else { Mode::Autonomous };
            black_box(scheduler.transition(mode, ts))
        })
    });
}

criterion_group!(benches, bench_tick, bench_transition);
criterion_main!(benches);
