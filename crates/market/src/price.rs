use vigil_core::market::entity::Candle;
use vigil_core::market::error::MarketError;

/// # Summary
/// 成交量加权平均价 (VWAP)。
///
/// # Logic
/// 1. 每根 K 线取典型价格 (high + low + close) / 3，以成交量加权。
/// 2. 总成交量为零时退化为收盘价的简单平均。
///
/// # Arguments
/// * `candles`: 参与计算的 K 线。
///
/// # Returns
/// K 线为空时返回 `MarketError::NotFound`。
pub fn vwap(candles: &[Candle]) -> Result<f64, MarketError> {
    if candles.is_empty() {
        return Err(MarketError::NotFound);
    }

    let (weighted, volume) = candles.iter().fold((0.0, 0.0), |(w, v), c| {
        (w + c.typical_price() * c.volume, v + c.volume)
    });

    let price = if volume > 0.0 {
        weighted / volume
    } else {
        let (sum, count) = candles
            .iter()
            .fold((0.0, 0.0), |(s, n), c| (s + c.close, n + 1.0));
        sum / count
    };

    if !price.is_finite() || price <= 0.0 {
        return Err(MarketError::Anomalous(format!(
            "average price is not a positive finite number: {}",
            price
        )));
    }
    Ok(price)
}

/// # Summary
/// 异常 K 线检测。交易所偶尔返回不完整的 K 线（价格接近 0），必须在进入引擎前拦截。
///
/// # Logic
/// 1. 任一价格非有限或非正、成交量为负或非有限，直接判定异常。
/// 2. 以典型价格为样本计算参考价：数量达到 `median_min_candles` 时取中位数，否则取均值。
/// 3. 任一价格低于 参考价 / `threshold_factor` 判定异常。
///
/// # Arguments
/// * `candles`: 待检测 K 线。
/// * `threshold_factor`: 阈值因子。
/// * `median_min_candles`: 使用中位数的最少数量。
///
/// # Returns
/// 通过返回 Ok，否则返回 `MarketError::Anomalous`。
pub fn check_anomalies(
    candles: &[Candle],
    threshold_factor: f64,
    median_min_candles: usize,
) -> Result<(), MarketError> {
    for c in candles {
        let prices = [c.open, c.high, c.low, c.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(MarketError::Anomalous(format!(
                "candle at {} has invalid prices o={} h={} l={} c={}",
                c.time, c.open, c.high, c.low, c.close
            )));
        }
        if !c.volume.is_finite() || c.volume < 0.0 {
            return Err(MarketError::Anomalous(format!(
                "candle at {} has invalid volume {}",
                c.time, c.volume
            )));
        }
    }

    if candles.is_empty() {
        return Ok(());
    }

    let mut samples: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    let reference = if samples.len() >= median_min_candles {
        median(&mut samples)
    } else {
        let (sum, count) = samples
            .iter()
            .fold((0.0, 0.0), |(s, n), p| (s + p, n + 1.0));
        sum / count
    };
    let threshold = reference / threshold_factor;

    if let Some(bad) = candles
        .iter()
        .find(|c| [c.open, c.high, c.low, c.close].iter().any(|p| *p < threshold))
    {
        return Err(MarketError::Anomalous(format!(
            "candle at {} is far below reference price {:.8} (low={})",
            bad.time, reference, bad.low
        )));
    }
    Ok(())
}

fn median(samples: &mut [f64]) -> f64 {
    samples.sort_by(f64::total_cmp);
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        (samples[mid - 1] + samples[mid]) / 2.0
    } else {
        samples[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let candles = vec![
            candle(0, 102.0, 98.0, 100.0, 1.0),
            candle(1, 202.0, 198.0, 200.0, 3.0),
        ];
        let price = vwap(&candles).unwrap();
        assert!((price - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_zero_volume_falls_back_to_simple_average() {
        let candles = vec![
            candle(0, 110.0, 90.0, 100.0, 0.0),
            candle(1, 210.0, 190.0, 300.0, 0.0),
        ];
        assert!((vwap(&candles).unwrap() - 200.0).abs() < 1e-9);
        assert!(matches!(vwap(&[]), Err(MarketError::NotFound)));
    }

    #[test]
    fn test_anomaly_detects_near_zero_candle() {
        let mut candles: Vec<Candle> = (0..6).map(|i| candle(i, 42_100.0, 41_900.0, 42_000.0, 5.0)).collect();
        assert!(check_anomalies(&candles, 1_000.0, 5).is_ok());

        candles.push(candle(6, 42_000.0, 0.01, 0.02, 5.0));
        assert!(matches!(
            check_anomalies(&candles, 1_000.0, 5),
            Err(MarketError::Anomalous(_))
        ));
    }

    #[test]
    fn test_anomaly_rejects_non_finite_values() {
        let candles = vec![candle(0, f64::NAN, 1.0, 1.0, 1.0)];
        assert!(check_anomalies(&candles, 1_000.0, 5).is_err());

        let candles = vec![candle(0, 2.0, 1.0, 1.5, -1.0)];
        assert!(check_anomalies(&candles, 1_000.0, 5).is_err());
    }
}
