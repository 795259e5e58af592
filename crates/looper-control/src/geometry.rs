//! 平面位姿与差速底盘运动学

use crate::units::Rad;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 平面位姿（米 / 弧度）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: Rad,
}

impl Pose {
    pub const ORIGIN: Self = Pose {
        x: 0.0,
        y: 0.0,
        heading: Rad::ZERO,
    };

    pub fn new(x: f64, y: f64, heading: Rad) -> Self {
        Self { x, y, heading }
    }

    /// 沿圆弧前进
    ///
    /// 在机器人坐标系中行驶弧长 `distance`、航向变化 `dtheta` 后的新位姿（指数映射）。
    /// `dtheta` 趋近于 0 时退化为直线，使用泰勒展开避免除零。
    pub fn exp(&self, distance: f64, dtheta: Rad) -> Pose {
        let dt = dtheta.0;
        let (sin_over, one_minus_cos_over) = if dt.abs() < 1e-9 {
            (1.0 - dt * dt / 6.0, dt / 2.0)
        } else {
            (dt.sin() / dt, (1.0 - dt.cos()) / dt)
        };

        // 机器人坐标系下的位移
        let local_x = distance * sin_over;
        let local_y = distance * one_minus_cos_over;

        let (sin_h, cos_h) = self.heading.0.sin_cos();
        Pose {
            x: self.x + local_x * cos_h - local_y * sin_h,
            y: self.y + local_x * sin_h + local_y * cos_h,
            heading: (self.heading + dtheta).normalize(),
        }
    }

    /// 两个位姿之间的平移距离
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3} m, {:.3} m, {:.2}°)",
            self.x,
            self.y,
            self.heading.to_deg().0
        )
    }
}

/// 左右轮线速度（m/s）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

impl WheelSpeeds {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// 底盘中心线速度
    pub fn linear(&self) -> f64 {
        (self.left + self.right) / 2.0
    }

    /// 差速运动学角速度（rad/s），逆时针为正
    pub fn angular(&self, track_width: f64) -> f64 {
        (self.right - self.left) / track_width
    }
}

/// 左右两侧的电机输出（占空比，[-1, 1]）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelCommand {
    pub left: f64,
    pub right: f64,
}

impl WheelCommand {
    pub const ZERO: Self = WheelCommand {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// 逐侧限幅到 [-1, 1]
    pub fn clamped(self) -> Self {
        Self {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }

    /// 按比例缩放，保持左右比例不变，使较大一侧不超过 1
    pub fn desaturated(self) -> Self {
        let max = self.left.abs().max(self.right.abs());
        if max > 1.0 {
            Self {
                left: self.left / max,
                right: self.right / max,
            }
        } else {
            self
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exp_straight_line() {
        let pose = Pose::ORIGIN.exp(2.0, Rad::ZERO);
        assert!(close(pose.x, 2.0) && close(pose.y, 0.0));

        let pose = Pose::new(1.0, 1.0, Rad(FRAC_PI_2)).exp(1.0, Rad::ZERO);
        assert!(close(pose.x, 1.0) && close(pose.y, 2.0));
    }

    #[test]
    fn test_exp_quarter_circle() {
        // 半径 1 m 的四分之一圆
        let pose = Pose::ORIGIN.exp(FRAC_PI_2, Rad(FRAC_PI_2));
        assert!(close(pose.x, 1.0), "x = {}", pose.x);
        assert!(close(pose.y, 1.0), "y = {}", pose.y);
        assert!(close(pose.heading.0, FRAC_PI_2));
    }

    #[test]
    fn test_exp_turn_in_place() {
        let pose = Pose::ORIGIN.exp(0.0, Rad(PI / 3.0));
        assert!(close(pose.x, 0.0) && close(pose.y, 0.0));
        assert!(close(pose.heading.0, PI / 3.0));
    }

    #[test]
    fn test_wheel_kinematics() {
        let speeds = WheelSpeeds::new(1.0, 2.0);
        assert!(close(speeds.linear(), 1.5));
        assert!(close(speeds.angular(0.5), 2.0));
    }

    #[test]
    fn test_wheel_command_shaping() {
        let cmd = WheelCommand::new(1.5, -0.5);
        assert_eq!(cmd.clamped(), WheelCommand::new(1.0, -0.5));

        let d = WheelCommand::new(2.0, -1.0).desaturated();
        assert!(close(d.left, 1.0) && close(d.right, -0.5));

        assert_eq!(WheelCommand::new(0.4, 0.2).desaturated(), WheelCommand::new(0.4, 0.2));
        assert!(WheelCommand::ZERO.is_zero());
    }
}
