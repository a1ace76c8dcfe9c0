pub mod time;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// K 线时间周期枚举，定义向数据源请求的单根 K 线跨度。
///
/// # Invariants
/// - `duration()` 必须与枚举名称描述的跨度严格一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CandleInterval {
    // 1分钟
    Minute1,
    // 3分钟
    Minute3,
    // 5分钟
    Minute5,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 1小时
    Hour1,
    // 2小时
    Hour2,
    // 4小时
    Hour4,
    // 6小时
    Hour6,
    // 8小时
    Hour8,
    // 1日
    Day1,
}

impl CandleInterval {
    /// 单根 K 线覆盖的分钟数。
    pub fn minutes(&self) -> i64 {
        match self {
            CandleInterval::Minute1 => 1,
            CandleInterval::Minute3 => 3,
            CandleInterval::Minute5 => 5,
            CandleInterval::Minute15 => 15,
            CandleInterval::Minute30 => 30,
            CandleInterval::Hour1 => 60,
            CandleInterval::Hour2 => 120,
            CandleInterval::Hour4 => 240,
            CandleInterval::Hour6 => 360,
            CandleInterval::Hour8 => 480,
            CandleInterval::Day1 => 1440,
        }
    }

    /// 单根 K 线覆盖的时间跨度。
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(CandleInterval::Minute1),
            "3m" => Ok(CandleInterval::Minute3),
            "5m" => Ok(CandleInterval::Minute5),
            "15m" => Ok(CandleInterval::Minute15),
            "30m" => Ok(CandleInterval::Minute30),
            "1h" => Ok(CandleInterval::Hour1),
            "2h" => Ok(CandleInterval::Hour2),
            "4h" => Ok(CandleInterval::Hour4),
            "6h" => Ok(CandleInterval::Hour6),
            "8h" => Ok(CandleInterval::Hour8),
            "1d" => Ok(CandleInterval::Day1),
            _ => Err(format!("Unknown CandleInterval: {}", s)),
        }
    }
}

impl std::fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CandleInterval::Minute1 => "1m",
            CandleInterval::Minute3 => "3m",
            CandleInterval::Minute5 => "5m",
            CandleInterval::Minute15 => "15m",
            CandleInterval::Minute30 => "30m",
            CandleInterval::Hour1 => "1h",
            CandleInterval::Hour2 => "2h",
            CandleInterval::Hour4 => "4h",
            CandleInterval::Hour6 => "6h",
            CandleInterval::Hour8 => "8h",
            CandleInterval::Day1 => "1d",
        };
        write!(f, "{}", label)
    }
}

/// # Summary
/// 策略向信号源索取新信号的最小间隔（节流周期）。
///
/// # Invariants
/// - 同一 (symbol, strategy) 实例两次调用信号源之间的间隔不得小于该周期。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SignalInterval {
    Minute1,
    Minute3,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
}

impl SignalInterval {
    pub fn duration(&self) -> Duration {
        match self {
            SignalInterval::Minute1 => Duration::minutes(1),
            SignalInterval::Minute3 => Duration::minutes(3),
            SignalInterval::Minute5 => Duration::minutes(5),
            SignalInterval::Minute15 => Duration::minutes(15),
            SignalInterval::Minute30 => Duration::minutes(30),
            SignalInterval::Hour1 => Duration::hours(1),
        }
    }
}

impl FromStr for SignalInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(SignalInterval::Minute1),
            "3m" => Ok(SignalInterval::Minute3),
            "5m" => Ok(SignalInterval::Minute5),
            "15m" => Ok(SignalInterval::Minute15),
            "30m" => Ok(SignalInterval::Minute30),
            "1h" => Ok(SignalInterval::Hour1),
            _ => Err(format!("Unknown SignalInterval: {}", s)),
        }
    }
}

impl std::fmt::Display for SignalInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalInterval::Minute1 => write!(f, "1m"),
            SignalInterval::Minute3 => write!(f, "3m"),
            SignalInterval::Minute5 => write!(f, "5m"),
            SignalInterval::Minute15 => write!(f, "15m"),
            SignalInterval::Minute30 => write!(f, "30m"),
            SignalInterval::Hour1 => write!(f, "1h"),
        }
    }
}
