use vigil_core::config::EngineConfig;
use vigil_core::signal::entity::{Position, Signal};
use vigil_core::signal::error::{ValidationError, ValidationIssue};

/// # Summary
/// 信号校验管线。纯函数，不修改输入，收集全部问题后一次性返回。
///
/// # Logic
/// 1. 标识字段非空。
/// 2. 价格与当前价格样本均为有限正数，存活分钟数为正且不超过上限。
/// 3. 方向一致性：多头 止盈 > 开仓 > 止损，空头反之（严格不等）。
/// 4. 止盈距离不低于下限，止损距离不高于上限。
/// 5. 非挂单信号：当前价格不得已经越过止盈或止损（严格比较，恰好落在边界上仍然有效）。
///
/// # Arguments
/// * `signal`: 待校验信号，`is_scheduled` 决定是否执行第 5 步。
/// * `current_price`: 判断即时性的价格样本。
/// * `config`: 引擎配置。
///
/// # Returns
/// 校验通过返回 Ok，否则返回包含全部问题的 `ValidationError`。
pub fn validate_signal(
    signal: &Signal,
    current_price: f64,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    for (field, value) in [
        ("id", &signal.id),
        ("symbol", &signal.symbol),
        ("strategy_name", &signal.strategy_name),
        ("exchange_name", &signal.exchange_name),
    ] {
        if value.trim().is_empty() {
            issues.push(ValidationIssue::EmptyField(field));
        }
    }

    let mut prices_ok = true;
    for (field, value) in [
        ("price_open", signal.price_open),
        ("price_take_profit", signal.price_take_profit),
        ("price_stop_loss", signal.price_stop_loss),
        ("current_price", current_price),
    ] {
        if !is_positive(value) {
            issues.push(ValidationIssue::InvalidNumber { field, value });
            prices_ok = false;
        }
    }

    if signal.minute_estimated_time == 0 {
        issues.push(ValidationIssue::ZeroLifetime);
    } else if signal.minute_estimated_time > config.max_signal_lifetime_minutes {
        issues.push(ValidationIssue::LifetimeTooLong {
            minutes: signal.minute_estimated_time,
            max: config.max_signal_lifetime_minutes,
        });
    }

    // 价格本身不合法时，后续的距离与方向检查没有意义
    if !prices_ok {
        return Err(ValidationError { issues });
    }

    let open = signal.price_open;
    let tp = signal.price_take_profit;
    let sl = signal.price_stop_loss;

    let (tp_side_ok, sl_side_ok) = match signal.position {
        Position::Long => (tp > open, sl < open),
        Position::Short => (tp < open, sl > open),
    };
    if !tp_side_ok {
        issues.push(ValidationIssue::TakeProfitSide {
            position: signal.position.to_string(),
            take_profit: tp,
            open,
        });
    }
    if !sl_side_ok {
        issues.push(ValidationIssue::StopLossSide {
            position: signal.position.to_string(),
            stop_loss: sl,
            open,
        });
    }

    let tp_distance = (tp - open).abs() / open * 100.0;
    if tp_side_ok && tp_distance < config.min_take_profit_distance_percent {
        issues.push(ValidationIssue::TakeProfitTooClose {
            distance: tp_distance,
            min: config.min_take_profit_distance_percent,
        });
    }
    let sl_distance = (sl - open).abs() / open * 100.0;
    if sl_side_ok && sl_distance > config.max_stop_loss_distance_percent {
        issues.push(ValidationIssue::StopLossTooFar {
            distance: sl_distance,
            max: config.max_stop_loss_distance_percent,
        });
    }

    if !signal.is_scheduled {
        let (tp_passed, sl_breached) = match signal.position {
            Position::Long => (current_price > tp, current_price < sl),
            Position::Short => (current_price < tp, current_price > sl),
        };
        if tp_passed {
            issues.push(ValidationIssue::TakeProfitAlreadyReached {
                current: current_price,
                take_profit: tp,
            });
        }
        if sl_breached {
            issues.push(ValidationIssue::StopLossAlreadyBreached {
                current: current_price,
                stop_loss: sl,
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
