//! # 机器人配置
//!
//! 所有控制循环的调参值，按子系统分节，以 TOML 文件形式提供：
//!
//! ```toml
//! [drive]
//! speed_limit = 1.0
//! reduced_speed_limit = 0.5
//!
//! [collision]
//! threshold_g = 0.25
//!
//! [odometry]
//! track_width_m = 0.6647
//! ```
//!
//! 缺省的字段和分节使用默认值（来自实车标定）。
//! 每个分节可以单独校验：装配时某一节非法只禁用对应子系统，其余部分照常运行。

use looper_core::RunnerConfig;
use looper_hal::{Stick, StickAxis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// 序列化失败
    #[error("Failed to render configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 字段取值非法
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} is not finite", value)))
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} must be > 0", value)))
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{} is outside [{}, {}]", value, min, max),
        ))
    }
}

/// 整机配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub drive: DriveConfig,
    pub collision: CollisionConfig,
    pub odometry: OdometryConfig,
    pub aim: AimConfig,
    pub indexer: IndexerConfig,
    pub bindings: BindingsConfig,
    pub runner: RunnerSettings,
}

impl RobotConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// 渲染当前生效的配置
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 校验所有分节，返回第一个错误
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.drive.validate()?;
        self.collision.validate()?;
        self.odometry.validate()?;
        self.aim.validate()?;
        self.indexer.validate()?;
        self.bindings.validate()?;
        self.runner.validate()?;
        Ok(())
    }
}

/// 底盘
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// 正常限速系数 [0, 1]
    pub speed_limit: f64,
    /// 按住减速键时的限速系数 [0, 1]
    pub reduced_speed_limit: f64,
    /// 摇杆死区
    pub deadband: f64,
    /// 上电时是否反转车头
    pub invert_heading: bool,
    /// 上电时是否使用 cheesy 混控
    pub cheesy: bool,
    /// cheesy 转向曲线的非线性度 (0, 1]
    pub cheesy_turn_nonlinearity: f64,
    /// cheesy 满速前进时保留的转向增益 [0, 1]
    pub cheesy_high_speed_turn_gain: f64,
    pub forward_stick: Stick,
    pub forward_axis: StickAxis,
    pub rotation_stick: Stick,
    pub rotation_axis: StickAxis,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            speed_limit: 1.0,
            reduced_speed_limit: 0.5,
            deadband: 0.0,
            invert_heading: false,
            cheesy: false,
            cheesy_turn_nonlinearity: 0.5,
            cheesy_high_speed_turn_gain: 0.4,
            forward_stick: Stick::Left,
            forward_axis: StickAxis::Y,
            rotation_stick: Stick::Right,
            rotation_axis: StickAxis::X,
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("drive.speed_limit", self.speed_limit, 0.0, 1.0)?;
        check_range("drive.reduced_speed_limit", self.reduced_speed_limit, 0.0, 1.0)?;
        check_range("drive.deadband", self.deadband, 0.0, 0.5)?;
        check_finite("drive.cheesy_turn_nonlinearity", self.cheesy_turn_nonlinearity)?;
        if self.cheesy_turn_nonlinearity <= 0.0 || self.cheesy_turn_nonlinearity > 1.0 {
            return Err(ConfigError::invalid(
                "drive.cheesy_turn_nonlinearity",
                format!("{} is outside (0, 1]", self.cheesy_turn_nonlinearity),
            ));
        }
        check_range(
            "drive.cheesy_high_speed_turn_gain",
            self.cheesy_high_speed_turn_gain,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

/// 碰撞检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// 相邻两次采样的加速度差阈值（g）
    pub threshold_g: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self { threshold_g: 0.25 }
    }
}

impl CollisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("collision.threshold_g", self.threshold_g)
    }
}

/// 里程计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    /// 轮距（米）
    pub track_width_m: f64,
    /// 航向来自陀螺仪；为 false 时由左右轮速差积分
    pub use_gyro: bool,
    /// 陀螺仪顺时针为正时置 true
    pub invert_gyro: bool,
    /// 单次积分的最大步长（秒），超出部分视为时间跳变
    pub max_dt_s: f64,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            track_width_m: 0.6647246510483854,
            use_gyro: true,
            invert_gyro: false,
            max_dt_s: 0.1,
        }
    }
}

impl OdometryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("odometry.track_width_m", self.track_width_m)?;
        check_positive("odometry.max_dt_s", self.max_dt_s)?;
        Ok(())
    }
}

/// 炮塔瞄准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AimConfig {
    /// 电机每圈编码器刻度
    pub ticks_per_rev: f64,
    /// 减速比
    pub reduction: f64,
    /// 到位判定阈值（度）
    pub tolerance_deg: f64,
    /// 归零时的占空比（负值朝反向限位开关）
    pub zeroing_output: f64,
    /// 触发反向限位开关时的物理角度（度）
    pub zero_angle_deg: f64,
}

impl Default for AimConfig {
    fn default() -> Self {
        Self {
            ticks_per_rev: 42.0,
            reduction: 702.0,
            tolerance_deg: 0.01,
            zeroing_output: -0.4,
            zero_angle_deg: 0.0,
        }
    }
}

impl AimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("aim.ticks_per_rev", self.ticks_per_rev)?;
        check_positive("aim.reduction", self.reduction)?;
        check_positive("aim.tolerance_deg", self.tolerance_deg)?;
        check_range("aim.zeroing_output", self.zeroing_output, -1.0, 1.0)?;
        check_finite("aim.zero_angle_deg", self.zero_angle_deg)?;
        Ok(())
    }
}

/// 自动理球
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// 送球电机占空比
    pub feed_output: f64,
    /// 第一颗球的提升位移（提升轮圈数）
    pub first_ball_offset: f64,
    /// 之后每颗球的提升位移（提升轮圈数）
    pub next_ball_offset: f64,
    /// 提升轮每圈编码器刻度数
    pub pulley_ticks_per_rev: f64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            feed_output: 1.0,
            first_ball_offset: 3.25,
            next_ball_offset: 3.0,
            pulley_ticks_per_rev: 42.0,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("indexer.feed_output", self.feed_output, -1.0, 1.0)?;
        check_finite("indexer.first_ball_offset", self.first_ball_offset)?;
        check_finite("indexer.next_ball_offset", self.next_ball_offset)?;
        check_positive("indexer.pulley_ticks_per_rev", self.pulley_ticks_per_rev)?;
        Ok(())
    }
}

/// 操作手按键映射（逻辑按键名）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    /// 按住减速
    pub reduce_speed: String,
    /// 按住反转车头
    pub invert_heading: String,
    /// 按下切换 cheesy 混控
    pub toggle_cheesy: String,
    /// 按下切换自动瞄准
    pub toggle_aim: String,
    /// 按下切换自动理球
    pub toggle_indexing: String,
    /// 按下开始炮塔归零
    pub zero_turret: String,
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            reduce_speed: "L2".to_string(),
            invert_heading: "R2".to_string(),
            toggle_cheesy: "X".to_string(),
            toggle_aim: "R1".to_string(),
            toggle_indexing: "L1".to_string(),
            zero_turret: "Options".to_string(),
        }
    }
}

impl BindingsConfig {
    /// (字段名, 按键名)
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("bindings.reduce_speed", &self.reduce_speed),
            ("bindings.invert_heading", &self.invert_heading),
            ("bindings.toggle_cheesy", &self.toggle_cheesy),
            ("bindings.toggle_aim", &self.toggle_aim),
            ("bindings.toggle_indexing", &self.toggle_indexing),
            ("bindings.zero_turret", &self.zero_turret),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let entries = self.entries();
        for (i, &(field, name)) in entries.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid(field, "button name is empty"));
            }
            if let Some((other, _)) = entries[..i].iter().find(|(_, n)| *n == name) {
                return Err(ConfigError::invalid(
                    field,
                    format!("button '{}' is already bound to {}", name, other),
                ));
            }
        }
        Ok(())
    }
}

/// 控制线程
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub frequency_hz: f64,
    pub overrun_warn_multiplier: f64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let core = RunnerConfig::default();
        Self {
            frequency_hz: core.frequency_hz,
            overrun_warn_multiplier: core.overrun_warn_multiplier,
        }
    }
}

impl RunnerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("runner.frequency_hz", self.frequency_hz)?;
        check_positive("runner.overrun_warn_multiplier", self.overrun_warn_multiplier)?;
        Ok(())
    }

    pub fn to_runner_config(&self, max_iterations: Option<u64>) -> RunnerConfig {
        RunnerConfig {
            frequency_hz: self.frequency_hz,
            overrun_warn_multiplier: self.overrun_warn_multiplier,
            max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RobotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collision.threshold_g, 0.25);
        assert_eq!(config.aim.ticks_per_rev * config.aim.reduction, 42.0 * 702.0);
        assert_eq!(config.runner.frequency_hz, 50.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RobotConfig::from_toml_str(
            r#"
            [drive]
            reduced_speed_limit = 0.3
            rotation_stick = "Left"

            [collision]
            threshold_g = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.drive.reduced_speed_limit, 0.3);
        assert_eq!(config.drive.speed_limit, 1.0);
        assert_eq!(config.drive.rotation_stick, Stick::Left);
        assert_eq!(config.collision.threshold_g, 0.5);
        assert_eq!(config.odometry, OdometryConfig::default());
    }

    #[test]
    fn test_render_and_reparse() {
        let mut config = RobotConfig::default();
        config.indexer.first_ball_offset = 4.0;
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[indexer]"));
        assert_eq!(RobotConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_parse_error() {
        let err = RobotConfig::from_toml_str("[drive]\nspeed_limit = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RobotConfig::default();
        config.drive.speed_limit = 1.5;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("drive.speed_limit"));

        let mut config = RobotConfig::default();
        config.odometry.track_width_m = 0.0;
        assert!(config.odometry.validate().is_err());
        assert!(config.drive.validate().is_ok());

        let mut config = RobotConfig::default();
        config.aim.tolerance_deg = f64::NAN;
        assert!(config.aim.validate().is_err());
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut bindings = BindingsConfig::default();
        bindings.toggle_aim = "X".to_string();
        let err = bindings.validate().unwrap_err();
        assert!(format!("{}", err).contains("toggle_cheesy"));
    }

    #[test]
    fn test_runner_settings_conversion() {
        let runner = RunnerSettings::default().to_runner_config(Some(10));
        assert_eq!(runner.frequency_hz, 50.0);
        assert_eq!(runner.max_iterations, Some(10));
        assert!(runner.validate().is_ok());
    }
}
