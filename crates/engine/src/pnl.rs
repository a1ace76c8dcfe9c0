use vigil_core::config::EngineConfig;
use vigil_core::signal::entity::{Position, ProfitLoss, Signal};

/// # Summary
/// 计算一笔已平仓信号的盈亏。
///
/// # Logic
/// 1. 开仓与平仓价格各自按不利方向计入滑点。
/// 2. 收益率按调整后价格计算，再扣除往返两次手续费。
///
/// # Arguments
/// * `signal`: 已平仓信号。
/// * `price_close`: 平仓价格（止盈 / 止损的精确价位，或到期时的价格样本）。
/// * `config`: 手续费与滑点配置（百分比）。
pub fn profit_loss(signal: &Signal, price_close: f64, config: &EngineConfig) -> ProfitLoss {
    let slip = config.percent_slippage / 100.0;
    let fees = config.percent_fee * 2.0;

    let (open, close, raw) = match signal.position {
        Position::Long => {
            let open = signal.price_open * (1.0 + slip);
            let close = price_close * (1.0 - slip);
            (open, close, (close - open) / open * 100.0)
        }
        Position::Short => {
            let open = signal.price_open * (1.0 - slip);
            let close = price_close * (1.0 + slip);
            (open, close, (open - close) / open * 100.0)
        }
    };

    ProfitLoss {
        pnl_percentage: raw - fees,
        price_open: open,
        price_close: close,
    }
}
