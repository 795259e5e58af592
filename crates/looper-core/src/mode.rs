//! 运行模式定义
//!
//! 机器人在任一时刻只处于四种互斥模式之一；模式切换由外部（比赛控制器）驱动，
//! 对调度器而言是瞬时的。

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// 机器人运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Mode {
    /// 禁用（默认）：所有执行器必须处于安全状态
    #[default]
    Disabled = 0,

    /// 自动阶段
    Autonomous = 1,

    /// 手动操作阶段
    Teleop = 2,

    /// 测试模式
    Test = 3,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Disabled, Mode::Autonomous, Mode::Teleop, Mode::Test];

    /// "使能" 分组：自动和手动阶段都运行的循环使用这组标签
    pub const ENABLED: [Mode; 2] = [Mode::Autonomous, Mode::Teleop];

    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Disabled（安全默认值）。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Autonomous,
            2 => Self::Teleop,
            3 => Self::Test,
            _ => Self::Disabled,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::Autonomous => "autonomous",
            Mode::Teleop => "teleop",
            Mode::Test => "test",
        }
    }

    /// 执行器是否允许输出
    pub fn is_enabled(self) -> bool {
        matches!(self, Mode::Autonomous | Mode::Teleop)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模式名解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown mode: '{0}' (expected disabled, autonomous, teleop or test)")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "disable" => Ok(Mode::Disabled),
            "autonomous" | "auto" => Ok(Mode::Autonomous),
            "teleop" | "teleoperated" => Ok(Mode::Teleop),
            "test" => Ok(Mode::Test),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// 当前模式（原子版本，用于线程间共享）
///
/// # 使用场景
///
/// - 控制线程在模式切换后写入
/// - 遥测/仪表盘线程无锁读取
#[derive(Debug)]
pub struct AtomicMode {
    inner: AtomicU8,
}

impl AtomicMode {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> Mode {
        Mode::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, mode: Mode, ordering: Ordering) {
        self.inner.store(mode.as_u8(), ordering);
    }
}

impl Default for AtomicMode {
    fn default() -> Self {
        Self::new(Mode::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversions() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_u8(mode.as_u8()), mode);
        }
        assert_eq!(Mode::from_u8(255), Mode::Disabled); // 无效值
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("teleop".parse::<Mode>().unwrap(), Mode::Teleop);
        assert_eq!(" AUTO ".parse::<Mode>().unwrap(), Mode::Autonomous);
        assert_eq!("Disabled".parse::<Mode>().unwrap(), Mode::Disabled);
        assert!("match".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_enabled_group() {
        assert!(Mode::ENABLED.iter().all(|m| m.is_enabled()));
        assert!(!Mode::Disabled.is_enabled());
        assert!(!Mode::Test.is_enabled());
    }

    #[test]
    fn test_atomic_mode() {
        let mode = AtomicMode::default();
        assert_eq!(mode.get(Ordering::Relaxed), Mode::Disabled);

        mode.set(Mode::Teleop, Ordering::Relaxed);
        assert_eq!(mode.get(Ordering::Relaxed), Mode::Teleop);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Mode::Autonomous), "autonomous");
    }
}
