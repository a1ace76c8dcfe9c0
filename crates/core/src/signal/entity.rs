use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 仓位方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    // 做多
    Long,
    // 做空
    Short,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Long => write!(f, "long"),
            Position::Short => write!(f, "short"),
        }
    }
}

/// # Summary
/// 用户策略产生的开仓意图，尚未经过校验。
///
/// # Invariants
/// - `price_open` 为 `None` 表示按当前价格立即开仓。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProposal {
    pub position: Position,
    // 激活价格，缺省时取当前价格样本
    pub price_open: Option<f64>,
    pub price_take_profit: f64,
    pub price_stop_loss: f64,
    // 预计持仓分钟数
    pub minute_estimated_time: u32,
    // 自由文本备注
    pub note: Option<String>,
}

/// # Summary
/// 经过校验、物化后的交易信号。
///
/// # Invariants
/// - 多头：`price_take_profit > price_open > price_stop_loss`；空头反之。创建后价格不再改变。
/// - `pending_at >= scheduled_at`；立即开仓的信号二者相等且永不分离。
/// - 仅在挂单激活时发生一次变更：`pending_at` 更新为激活时刻，`is_scheduled` 置为 false。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    // 信号唯一标识
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub exchange_name: String,
    pub position: Position,
    pub price_open: f64,
    pub price_take_profit: f64,
    pub price_stop_loss: f64,
    pub minute_estimated_time: u32,
    pub note: Option<String>,
    // 创建时刻
    pub scheduled_at: DateTime<Utc>,
    // 激活时刻
    pub pending_at: DateTime<Utc>,
    // 是否仍在等待激活
    pub is_scheduled: bool,
}

impl Signal {
    /// 激活挂单信号，返回激活后的信号副本。
    pub fn activate(&self, when: DateTime<Utc>) -> Signal {
        Signal {
            pending_at: when.max(self.scheduled_at),
            is_scheduled: false,
            ..self.clone()
        }
    }
}

/// # Summary
/// 平仓原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TimeExpired,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TimeExpired => write!(f, "time_expired"),
        }
    }
}

/// # Summary
/// 盈亏记录。价格均为计入滑点后的价格，百分比已扣除往返手续费。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub pnl_percentage: f64,
    pub price_open: f64,
    pub price_close: f64,
}

/// # Summary
/// 状态机单次调用的结果，每次调用恰好产生一个变体。
///
/// # Invariants
/// - `Closed` / `Cancelled` 对该信号实例而言是终态，产生它的同一步内槽位已被清空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TickResult {
    // 无信号
    Idle {
        symbol: String,
        strategy_name: String,
        current_price: f64,
    },
    // 挂单等待激活
    Scheduled { signal: Signal, current_price: f64 },
    // 刚刚激活
    Opened { signal: Signal, current_price: f64 },
    // 持续监控中
    Active { signal: Signal, current_price: f64 },
    // 已平仓
    Closed {
        signal: Signal,
        current_price: f64,
        close_reason: CloseReason,
        close_timestamp: DateTime<Utc>,
        pnl: ProfitLoss,
    },
    // 挂单超时取消
    Cancelled {
        signal: Signal,
        current_price: f64,
        close_timestamp: DateTime<Utc>,
    },
}

impl TickResult {
    /// 结果标签，用于日志与事件分类。
    pub fn action(&self) -> &'static str {
        match self {
            TickResult::Idle { .. } => "idle",
            TickResult::Scheduled { .. } => "scheduled",
            TickResult::Opened { .. } => "opened",
            TickResult::Active { .. } => "active",
            TickResult::Closed { .. } => "closed",
            TickResult::Cancelled { .. } => "cancelled",
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            TickResult::Idle { .. } => None,
            TickResult::Scheduled { signal, .. }
            | TickResult::Opened { signal, .. }
            | TickResult::Active { signal, .. }
            | TickResult::Closed { signal, .. }
            | TickResult::Cancelled { signal, .. } => Some(signal),
        }
    }

    pub fn current_price(&self) -> f64 {
        match self {
            TickResult::Idle { current_price, .. }
            | TickResult::Scheduled { current_price, .. }
            | TickResult::Opened { current_price, .. }
            | TickResult::Active { current_price, .. }
            | TickResult::Closed { current_price, .. }
            | TickResult::Cancelled { current_price, .. } => *current_price,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickResult::Closed { .. } | TickResult::Cancelled { .. })
    }

    /// 终态结果的结束时刻。
    pub fn close_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            TickResult::Closed {
                close_timestamp, ..
            }
            | TickResult::Cancelled {
                close_timestamp, ..
            } => Some(*close_timestamp),
            _ => None,
        }
    }
}
