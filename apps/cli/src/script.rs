//! 模式脚本解析
//!
//! 格式：逗号分隔的 `模式:秒数`，例如 `disabled:0.5,auto:2,teleop:3,disabled:1`。

use anyhow::{Context, Result, bail};
use looper_core::Mode;
use std::time::Duration;

/// 脚本中的一步
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptStep {
    pub mode: Mode,
    pub duration: Duration,
}

pub fn parse_script(script: &str) -> Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (idx, item) in script.split(',').map(str::trim).enumerate() {
        if item.is_empty() {
            continue;
        }
        let (mode, secs) = item
            .split_once(':')
            .with_context(|| format!("Step {}: expected 'mode:seconds', got '{}'", idx + 1, item))?;
        let mode: Mode = mode
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Step {}: {}", idx + 1, e))?;
        let secs: f64 = secs
            .trim()
            .parse()
            .with_context(|| format!("Step {}: invalid duration '{}'", idx + 1, secs))?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("Step {}: duration must be >= 0, got {}", idx + 1, secs);
        }
        steps.push(ScriptStep {
            mode,
            duration: Duration::from_secs_f64(secs),
        });
    }
    if steps.is_empty() {
        bail!("Script is empty");
    }
    Ok(steps)
}
