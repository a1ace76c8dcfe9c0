use thiserror::Error;

/// # Summary
/// 校验管线发现的单项问题。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{field} must be a finite positive number, got {value}")]
    InvalidNumber { field: &'static str, value: f64 },
    #[error("minute_estimated_time must be positive")]
    ZeroLifetime,
    #[error("minute_estimated_time {minutes} exceeds the limit of {max} minutes")]
    LifetimeTooLong { minutes: u32, max: u32 },
    #[error("{position} take profit {take_profit} is on the wrong side of open {open}")]
    TakeProfitSide {
        position: String,
        take_profit: f64,
        open: f64,
    },
    #[error("{position} stop loss {stop_loss} is on the wrong side of open {open}")]
    StopLossSide {
        position: String,
        stop_loss: f64,
        open: f64,
    },
    #[error("take profit distance {distance:.4}% is below the minimum of {min}%")]
    TakeProfitTooClose { distance: f64, min: f64 },
    #[error("stop loss distance {distance:.4}% exceeds the maximum of {max}%")]
    StopLossTooFar { distance: f64, max: f64 },
    #[error("current price {current} has already passed take profit {take_profit}")]
    TakeProfitAlreadyReached { current: f64, take_profit: f64 },
    #[error("current price {current} has already breached stop loss {stop_loss}")]
    StopLossAlreadyBreached { current: f64, stop_loss: f64 },
}

/// # Summary
/// 信号校验失败。一次校验收集全部问题后一起返回，不做任何静默修正。
#[derive(Error, Debug, Clone, PartialEq)]
#[error("signal validation failed: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// # Summary
/// 用户信号源执行失败。
#[derive(Error, Debug, Clone)]
pub enum StrategyError {
    #[error("Signal source error: {0}")]
    Source(String),
}
