//! 强类型角度单位
//!
//! 使用 NewType 模式区分弧度和角度：IMU 与视觉相机按角度报告，
//! 位姿积分按弧度计算，混用会在编译期报错。
//!
//! # 示例
//!
//! ```rust
//! use looper_control::units::{Deg, Rad};
//!
//! let heading = Deg(90.0).to_rad();
//! assert!((heading.0 - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
//!
//! // 以下代码无法编译
//! // let _ = Rad(1.0) + Deg(1.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

macro_rules! angle_newtype {
    ($name:ident, $suffix:literal, $half_turn:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl $name {
            pub const ZERO: Self = $name(0.0);

            #[inline]
            pub fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                $name(self.0.abs())
            }

            /// 归一化到 (-半圈, 半圈]
            pub fn normalize(self) -> Self {
                let full = 2.0 * $half_turn;
                let mut angle = self.0 % full;
                if angle > $half_turn {
                    angle -= full;
                } else if angle <= -$half_turn {
                    angle += full;
                }
                $name(angle)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!("{:.4} ", $suffix), self.0)
            }
        }

        impl Add for $name {
            type Output = Self;
            #[inline]
            fn add(self, rhs: Self) -> Self {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, rhs: Self) -> Self {
                $name(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            #[inline]
            fn mul(self, rhs: f64) -> Self {
                $name(self.0 * rhs)
            }
        }

        impl Neg for $name {
            type Output = Self;
            #[inline]
            fn neg(self) -> Self {
                $name(-self.0)
            }
        }

        impl AddAssign for $name {
            #[inline]
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl SubAssign for $name {
            #[inline]
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }
    };
}

angle_newtype!(Rad, "rad", std::f64::consts::PI);
angle_newtype!(Deg, "°", 180.0);

impl Rad {
    #[inline]
    pub fn to_deg(self) -> Deg {
        Deg(self.0.to_degrees())
    }

    #[inline]
    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    #[inline]
    pub fn cos(self) -> f64 {
        self.0.cos()
    }
}

impl Deg {
    #[inline]
    pub fn to_rad(self) -> Rad {
        Rad(self.0.to_radians())
    }
}

impl From<Deg> for Rad {
    fn from(deg: Deg) -> Self {
        deg.to_rad()
    }
}

impl From<Rad> for Deg {
    fn from(rad: Rad) -> Self {
        rad.to_deg()
    }
}

/// 编码器刻度与机构角度之间的固定换算
///
/// `ticks_per_degree = ticks_per_rev × reduction / 360`，
/// 由电机每圈刻度数和减速比唯一确定。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickScale {
    ticks_per_degree: f64,
}

impl TickScale {
    pub fn new(ticks_per_rev: f64, reduction: f64) -> Self {
        Self {
            ticks_per_degree: ticks_per_rev * reduction / 360.0,
        }
    }

    pub fn ticks_per_degree(&self) -> f64 {
        self.ticks_per_degree
    }

    /// 一个刻度对应的角度（量化误差上界）
    pub fn resolution(&self) -> Deg {
        Deg(1.0 / self.ticks_per_degree)
    }

    #[inline]
    pub fn to_angle(&self, ticks: f64) -> Deg {
        Deg(ticks / self.ticks_per_degree)
    }

    #[inline]
    pub fn to_ticks(&self, angle: Deg) -> f64 {
        angle.0 * self.ticks_per_degree
    }

    /// 整圈数换算为刻度
    #[inline]
    pub fn rotations_to_ticks(&self, rotations: f64) -> f64 {
        rotations * 360.0 * self.ticks_per_degree
    }
}
