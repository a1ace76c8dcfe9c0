use thiserror::Error;

/// # Summary
/// 市场数据域错误枚举，处理网络、解析、数据缺失及异常数据等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `Anomalous` 与 `Network` 一样参与有限次数重试，耗尽后向上传播。
#[derive(Error, Debug, Clone)]
pub enum MarketError {
    // 网络层错误，包含底层客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据未找到 (内容为空)
    #[error("Data not found")]
    NotFound,
    // 数据样本不可信，通常意味着交易所返回了不完整的 K 线
    #[error("Anomalous data: {0}")]
    Anomalous(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
