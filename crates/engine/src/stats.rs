use serde::{Deserialize, Serialize};
use std::str::FromStr;
use vigil_core::signal::entity::TickResult;

const MINUTES_PER_YEAR: f64 = 525_600.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// # Summary
/// 一次回测中已平仓信号的聚合统计。
///
/// # Invariants
/// - 所有指标为 `Option<f64>`：样本不足或结果非有限数时为 `None`，绝不出现 NaN / Infinity。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatistics {
    pub total_signals: usize,
    pub win_count: usize,
    pub loss_count: usize,
    // 胜率（百分比）
    pub win_rate: Option<f64>,
    // 平均单笔收益（百分比）
    pub avg_pnl: Option<f64>,
    // 累计收益（百分比）
    pub total_pnl: Option<f64>,
    pub std_dev: Option<f64>,
    // avg / std
    pub sharpe_ratio: Option<f64>,
    // sharpe × √365
    pub annualized_sharpe_ratio: Option<f64>,
    // 平均盈利 / |平均亏损|
    pub certainty_ratio: Option<f64>,
    // 按平均持仓时长折算的年化预期收益
    pub expected_yearly_returns: Option<f64>,
}

impl BacktestStatistics {
    /// # Summary
    /// 从 tick 结果中提取 `Closed` 记录并计算统计。非平仓结果被忽略。
    pub fn from_results(results: &[TickResult]) -> Self {
        let mut pnls = Vec::new();
        let mut minutes_held = Vec::new();
        for result in results {
            if let TickResult::Closed {
                signal,
                close_timestamp,
                pnl,
                ..
            } = result
            {
                pnls.push(pnl.pnl_percentage);
                let held = (*close_timestamp - signal.pending_at).num_minutes();
                minutes_held.push(f64::from(i32::try_from(held).unwrap_or(i32::MAX)));
            }
        }

        let total_signals = pnls.len();
        if total_signals == 0 {
            return Self::default();
        }

        let count = count_f64(total_signals);
        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

        let total = pnls.iter().sum::<f64>();
        let avg = total / count;
        let variance = pnls.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / count;
        let std_dev = variance.sqrt();

        let sharpe = if std_dev > 0.0 { Some(avg / std_dev) } else { None };
        let certainty = match (mean(&wins), mean(&losses)) {
            (Some(w), Some(l)) => Some(w / l.abs()),
            _ => None,
        };
        let expected_yearly = mean(&minutes_held)
            .filter(|m| *m > 0.0)
            .map(|m| avg * (MINUTES_PER_YEAR / m));

        Self {
            total_signals,
            win_count: wins.len(),
            loss_count: losses.len(),
            win_rate: finite(count_f64(wins.len()) / count * 100.0),
            avg_pnl: finite(avg),
            total_pnl: finite(total),
            std_dev: finite(std_dev),
            sharpe_ratio: sharpe.and_then(finite),
            annualized_sharpe_ratio: sharpe.map(|s| s * DAYS_PER_YEAR.sqrt()).and_then(finite),
            certainty_ratio: certainty.and_then(finite),
            expected_yearly_returns: expected_yearly.and_then(finite),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / count_f64(values.len()))
    }
}

fn count_f64(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// # Summary
/// 对比驱动器的评选指标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkerMetric {
    SharpeRatio,
    AnnualizedSharpeRatio,
    WinRate,
    AvgPnl,
    TotalPnl,
    CertaintyRatio,
    ExpectedYearlyReturns,
}

impl WalkerMetric {
    /// 从统计中取出该指标，非有限数视为不可参与评选。
    pub fn extract(&self, stats: &BacktestStatistics) -> Option<f64> {
        let value = match self {
            WalkerMetric::SharpeRatio => stats.sharpe_ratio,
            WalkerMetric::AnnualizedSharpeRatio => stats.annualized_sharpe_ratio,
            WalkerMetric::WinRate => stats.win_rate,
            WalkerMetric::AvgPnl => stats.avg_pnl,
            WalkerMetric::TotalPnl => stats.total_pnl,
            WalkerMetric::CertaintyRatio => stats.certainty_ratio,
            WalkerMetric::ExpectedYearlyReturns => stats.expected_yearly_returns,
        };
        value.filter(|v| v.is_finite())
    }
}

impl FromStr for WalkerMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sharpeRatio" => Ok(WalkerMetric::SharpeRatio),
            "annualizedSharpeRatio" => Ok(WalkerMetric::AnnualizedSharpeRatio),
            "winRate" => Ok(WalkerMetric::WinRate),
            "avgPnl" => Ok(WalkerMetric::AvgPnl),
            "totalPnl" => Ok(WalkerMetric::TotalPnl),
            "certaintyRatio" => Ok(WalkerMetric::CertaintyRatio),
            "expectedYearlyReturns" => Ok(WalkerMetric::ExpectedYearlyReturns),
            _ => Err(format!("Unknown walker metric: {}", s)),
        }
    }
}

impl std::fmt::Display for WalkerMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WalkerMetric::SharpeRatio => "sharpeRatio",
            WalkerMetric::AnnualizedSharpeRatio => "annualizedSharpeRatio",
            WalkerMetric::WinRate => "winRate",
            WalkerMetric::AvgPnl => "avgPnl",
            WalkerMetric::TotalPnl => "totalPnl",
            WalkerMetric::CertaintyRatio => "certaintyRatio",
            WalkerMetric::ExpectedYearlyReturns => "expectedYearlyReturns",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use vigil_core::signal::entity::{CloseReason, Position, ProfitLoss, Signal};

    fn closed(pnl: f64, minutes: i64) -> TickResult {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TickResult::Closed {
            signal: Signal {
                id: "s".to_string(),
                symbol: "BTCUSDT".to_string(),
                strategy_name: "trend".to_string(),
                exchange_name: "binance".to_string(),
                position: Position::Long,
                price_open: 100.0,
                price_take_profit: 110.0,
                price_stop_loss: 95.0,
                minute_estimated_time: 600,
                note: None,
                scheduled_at: at,
                pending_at: at,
                is_scheduled: false,
            },
            current_price: 100.0,
            close_reason: CloseReason::TakeProfit,
            close_timestamp: at + Duration::minutes(minutes),
            pnl: ProfitLoss {
                pnl_percentage: pnl,
                price_open: 100.0,
                price_close: 100.0,
            },
        }
    }

    #[test]
    fn test_statistics_from_closed_results() {
        let stats = BacktestStatistics::from_results(&[closed(3.0, 60), closed(-1.0, 60), closed(1.0, 60)]);
        assert_eq!(stats.total_signals, 3);
        assert_eq!(stats.win_count, 2);
        assert_eq!(stats.loss_count, 1);
        assert!((stats.avg_pnl.unwrap() - 1.0).abs() < 1e-9);
        assert!((stats.total_pnl.unwrap() - 3.0).abs() < 1e-9);
        assert!((stats.certainty_ratio.unwrap() - 2.0).abs() < 1e-9);
        assert!((stats.expected_yearly_returns.unwrap() - 8_760.0).abs() < 1e-6);
        assert!(stats.sharpe_ratio.unwrap() > 0.0);
    }

    #[test]
    fn test_degenerate_samples_yield_none() {
        let empty = BacktestStatistics::from_results(&[]);
        assert_eq!(empty.total_signals, 0);
        assert!(empty.sharpe_ratio.is_none());

        let flat = BacktestStatistics::from_results(&[closed(1.0, 30), closed(1.0, 30)]);
        assert!(flat.sharpe_ratio.is_none());
        assert!(flat.certainty_ratio.is_none());
        assert_eq!(WalkerMetric::SharpeRatio.extract(&flat), None);
        assert_eq!(WalkerMetric::AvgPnl.extract(&flat), Some(1.0));
    }

    #[test]
    fn test_metric_names() {
        for name in ["sharpeRatio", "annualizedSharpeRatio", "winRate", "avgPnl", "totalPnl", "certaintyRatio", "expectedYearlyReturns"] {
            assert_eq!(name.parse::<WalkerMetric>().unwrap().to_string(), name);
        }
        assert!("profit".parse::<WalkerMetric>().is_err());
    }
}
