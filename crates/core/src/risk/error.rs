use thiserror::Error;

/// # Summary
/// 组合风控协作方自身故障（与 "拒绝" 不同，拒绝是正常业务结果）。
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("Risk backend error: {0}")]
    Backend(String),
}
