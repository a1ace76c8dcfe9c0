use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::common::CandleInterval;
use vigil_core::engine::error::EngineError;

/// # Summary
/// 回测时间框架配置：名称、步长与起止时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSchema {
    pub name: String,
    pub interval: CandleInterval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FrameSchema {
    /// 按配置生成时间轴。
    pub fn timeline(&self) -> Result<Timeline, EngineError> {
        Timeline::build(self.start, self.end, self.interval)
    }
}

/// # Summary
/// 历史驱动器遍历的有序时刻序列。
///
/// # Invariants
/// - 严格递增，首个时刻为 `start`，所有时刻不晚于 `end`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    instants: Vec<DateTime<Utc>>,
}

impl Timeline {
    /// # Summary
    /// 从 `start` 起按 `interval` 步进生成时刻，直到超过 `end`（`end` 恰好落在步长上时包含）。
    ///
    /// # Returns
    /// `start > end` 时返回 `InvalidState`。
    pub fn build(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidState(format!(
                "frame start {} is after end {}",
                start, end
            )));
        }

        let step = interval.duration();
        let mut instants = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            instants.push(cursor);
            cursor += step;
        }
        Ok(Self { instants })
    }

    /// 使用调用方给定的时刻序列，要求严格递增。
    pub fn from_instants(instants: Vec<DateTime<Utc>>) -> Result<Self, EngineError> {
        if instants.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidState(
                "timeline instants must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { instants })
    }

    pub fn instants(&self) -> &[DateTime<Utc>] {
        &self.instants
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_build_includes_both_ends() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let timeline = Timeline::build(start, start + Duration::hours(1), CandleInterval::Minute15).unwrap();
        assert_eq!(timeline.len(), 5);
        assert_eq!(timeline.instants()[4], start + Duration::hours(1));
    }

    #[test]
    fn test_invalid_ranges() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(Timeline::build(start, start - Duration::minutes(1), CandleInterval::Minute1).is_err());
        assert!(Timeline::from_instants(vec![start, start]).is_err());
        assert_eq!(Timeline::build(start, start, CandleInterval::Day1).unwrap().len(), 1);
    }
}
