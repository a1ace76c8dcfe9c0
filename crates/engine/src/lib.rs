pub mod backtest;
pub mod client;
pub mod evaluator;
pub mod events;
pub mod frame;
pub mod live;
pub mod persist;
pub mod pnl;
pub mod stats;
pub mod validation;
pub mod walker;
