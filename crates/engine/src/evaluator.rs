//! 完成条件判定：给定信号与价格样本（或一根 K 线），判断是否应当激活或平仓。
//!
//! 判定顺序固定且不可调整：
//! - 活跃信号：到期 > 止盈 > 止损。
//! - 挂单信号：等待超时 > 激活前击穿止损 > 到达激活价。

use chrono::{DateTime, Duration, Utc};
use vigil_core::market::entity::Candle;
use vigil_core::signal::entity::{CloseReason, Position, Signal};

/// # Summary
/// 平仓判定结果。
///
/// # Invariants
/// - 止盈 / 止损平仓时 `price` 为信号上的精确价位，到期平仓时为触发时的价格样本。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseDecision {
    pub reason: CloseReason,
    pub price: f64,
}

/// # Summary
/// 挂单信号在一个价格样本上的判定结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCheck {
    // 超过激活等待上限
    TimedOut,
    // 尚未激活就已击穿止损
    StopLossBreached,
    // 到达激活价
    Reached,
    // 继续等待
    Waiting,
}

/// 活跃信号的到期时刻。
pub fn expires_at(signal: &Signal) -> DateTime<Utc> {
    signal.pending_at + Duration::minutes(i64::from(signal.minute_estimated_time))
}

/// 挂单信号的等待截止时刻。
pub fn activation_deadline(signal: &Signal, await_minutes: u32) -> DateTime<Utc> {
    signal.scheduled_at + Duration::minutes(i64::from(await_minutes))
}

/// # Summary
/// 以单个价格样本判定活跃信号是否平仓（实盘路径）。
///
/// # Arguments
/// * `signal`: 活跃信号。
/// * `price`: 当前价格样本。
/// * `when`: 当前时刻。
pub fn evaluate_sample(signal: &Signal, price: f64, when: DateTime<Utc>) -> Option<CloseDecision> {
    if when >= expires_at(signal) {
        return Some(CloseDecision {
            reason: CloseReason::TimeExpired,
            price,
        });
    }
    let (tp_hit, sl_hit) = match signal.position {
        Position::Long => (
            price >= signal.price_take_profit,
            price <= signal.price_stop_loss,
        ),
        Position::Short => (
            price <= signal.price_take_profit,
            price >= signal.price_stop_loss,
        ),
    };
    close_on_levels(signal, tp_hit, sl_hit)
}

/// # Summary
/// 以一根 K 线判定活跃信号是否平仓（快进路径）。
///
/// # Logic
/// 1. K 线开始时刻已到期：按 K 线开盘价到期平仓。
/// 2. 以最高 / 最低价判断是否触及止盈，其次止损；同一根 K 线同时满足时止盈优先。
///
/// # Returns
/// 到期价格与实盘含义不同：实盘按当前时刻之前若干根 1 分钟 K 线的 VWAP 取样，
/// 这里取到期时刻那根 K 线的开盘价，即到期时刻的成交价。
/// K 线耗尽仍未平仓时由调用方按最后一根收盘价到期平仓。
pub fn evaluate_candle(signal: &Signal, candle: &Candle) -> Option<CloseDecision> {
    if candle.time >= expires_at(signal) {
        return Some(CloseDecision {
            reason: CloseReason::TimeExpired,
            price: candle.open,
        });
    }
    let (tp_hit, sl_hit) = match signal.position {
        Position::Long => (
            candle.high >= signal.price_take_profit,
            candle.low <= signal.price_stop_loss,
        ),
        Position::Short => (
            candle.low <= signal.price_take_profit,
            candle.high >= signal.price_stop_loss,
        ),
    };
    close_on_levels(signal, tp_hit, sl_hit)
}

fn close_on_levels(signal: &Signal, tp_hit: bool, sl_hit: bool) -> Option<CloseDecision> {
    if tp_hit {
        Some(CloseDecision {
            reason: CloseReason::TakeProfit,
            price: signal.price_take_profit,
        })
    } else if sl_hit {
        Some(CloseDecision {
            reason: CloseReason::StopLoss,
            price: signal.price_stop_loss,
        })
    } else {
        None
    }
}

/// # Summary
/// 以单个价格样本判定挂单信号（实盘路径）。
pub fn check_activation_sample(
    signal: &Signal,
    price: f64,
    when: DateTime<Utc>,
    await_minutes: u32,
) -> ActivationCheck {
    if when >= activation_deadline(signal, await_minutes) {
        return ActivationCheck::TimedOut;
    }
    activation_on_range(signal, price, price)
}

/// # Summary
/// 以一根 K 线判定挂单信号（快进路径），使用最高 / 最低价。
pub fn check_activation_candle(
    signal: &Signal,
    candle: &Candle,
    await_minutes: u32,
) -> ActivationCheck {
    if candle.time >= activation_deadline(signal, await_minutes) {
        return ActivationCheck::TimedOut;
    }
    activation_on_range(signal, candle.low, candle.high)
}

fn activation_on_range(signal: &Signal, low: f64, high: f64) -> ActivationCheck {
    let (sl_breached, reached) = match signal.position {
        Position::Long => (low <= signal.price_stop_loss, low <= signal.price_open),
        Position::Short => (high >= signal.price_stop_loss, high >= signal.price_open),
    };
    if sl_breached {
        ActivationCheck::StopLossBreached
    } else if reached {
        ActivationCheck::Reached
    } else {
        ActivationCheck::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn long_signal() -> Signal {
        Signal {
            id: "s".to_string(),
            symbol: "BTCUSDT".to_string(),
            strategy_name: "trend".to_string(),
            exchange_name: "binance".to_string(),
            position: Position::Long,
            price_open: 42_000.0,
            price_take_profit: 43_000.0,
            price_stop_loss: 41_000.0,
            minute_estimated_time: 60,
            note: None,
            scheduled_at: start(),
            pending_at: start(),
            is_scheduled: false,
        }
    }

    fn candle(minute: i64, high: f64, low: f64) -> Candle {
        Candle {
            time: start() + Duration::minutes(minute),
            open: 42_100.0,
            high,
            low,
            close: 42_200.0,
            volume: 1.0,
        }
    }

    #[test]
    fn test_sample_uses_exact_levels() {
        let s = long_signal();
        let tp = evaluate_sample(&s, 43_500.0, start() + Duration::minutes(5)).unwrap();
        assert_eq!(tp.reason, CloseReason::TakeProfit);
        assert_eq!(tp.price, 43_000.0);

        let sl = evaluate_sample(&s, 40_000.0, start() + Duration::minutes(5)).unwrap();
        assert_eq!(sl.reason, CloseReason::StopLoss);
        assert_eq!(sl.price, 41_000.0);

        assert!(evaluate_sample(&s, 42_500.0, start() + Duration::minutes(5)).is_none());
    }

    #[test]
    fn test_expiry_beats_take_profit() {
        let s = long_signal();
        let both = candle(60, 43_500.0, 42_000.0);
        let decision = evaluate_candle(&s, &both).unwrap();
        assert_eq!(decision.reason, CloseReason::TimeExpired);
        assert_eq!(decision.price, both.open);

        let sample = evaluate_sample(&s, 43_500.0, start() + Duration::minutes(60)).unwrap();
        assert_eq!(sample.reason, CloseReason::TimeExpired);
        assert_eq!(sample.price, 43_500.0);
    }

    #[test]
    fn test_take_profit_beats_stop_loss_in_one_candle() {
        let s = long_signal();
        let wide = candle(10, 43_100.0, 40_900.0);
        assert_eq!(evaluate_candle(&s, &wide).unwrap().reason, CloseReason::TakeProfit);
    }

    #[test]
    fn test_short_levels() {
        let mut s = long_signal();
        s.position = Position::Short;
        s.price_take_profit = 41_000.0;
        s.price_stop_loss = 43_000.0;
        assert_eq!(
            evaluate_candle(&s, &candle(3, 43_200.0, 41_500.0)).unwrap().reason,
            CloseReason::StopLoss
        );
        assert_eq!(
            evaluate_sample(&s, 40_900.0, start()).unwrap().reason,
            CloseReason::TakeProfit
        );
    }

    #[test]
    fn test_activation_order() {
        let mut s = long_signal();
        s.is_scheduled = true;
        s.price_open = 40_000.0;
        s.price_stop_loss = 39_000.0;

        let t = start() + Duration::minutes(1);
        assert_eq!(check_activation_sample(&s, 41_000.0, t, 120), ActivationCheck::Waiting);
        assert_eq!(check_activation_sample(&s, 39_900.0, t, 120), ActivationCheck::Reached);
        // 一次跳空同时越过激活价与止损：止损优先
        assert_eq!(check_activation_sample(&s, 38_900.0, t, 120), ActivationCheck::StopLossBreached);
        assert_eq!(
            check_activation_sample(&s, 39_900.0, start() + Duration::minutes(120), 120),
            ActivationCheck::TimedOut
        );
        assert_eq!(
            check_activation_candle(&s, &candle(5, 41_000.0, 39_500.0), 120),
            ActivationCheck::Reached
        );
    }
}
