use crate::backtest::BacktestRun;
use crate::client::{ClientDeps, StrategyClient};
use crate::frame::Timeline;
use crate::stats::{BacktestStatistics, WalkerMetric};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vigil_core::engine::entity::{ErrorEvent, ProgressEvent};
use vigil_core::signal::port::StrategySchema;

/// # Summary
/// 单个策略在对比中的结果。
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy_name: String,
    pub statistics: BacktestStatistics,
    // None 表示该指标不可参与评选
    pub metric_value: Option<f64>,
}

/// # Summary
/// 多策略对比驱动器：在同一时间轴上依次回测每个策略，按指标追踪最优者。
///
/// # Invariants
/// - 策略严格串行执行，统计聚合不存在竞争。
/// - 只有指标为有限数的策略参与评选；严格大于才替换最优者，并列时保留先到者。
/// - 与具体策略无关的失败（配置不合法）投递到 exit 通道；单个策略内的失败由历史驱动器投递到 error 通道。
pub struct WalkerRun {
    symbol: String,
    strategies: Vec<StrategySchema>,
    metric: WalkerMetric,
    frame_name: String,
    timeline: Timeline,
    deps: ClientDeps,
    cancel: CancellationToken,
    cursor: usize,
    started: bool,
    best: Option<(String, f64)>,
    outcomes: Vec<StrategyOutcome>,
}

impl WalkerRun {
    pub fn new(
        symbol: impl Into<String>,
        strategies: Vec<StrategySchema>,
        metric: WalkerMetric,
        frame_name: impl Into<String>,
        timeline: Timeline,
        deps: ClientDeps,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategies,
            metric,
            frame_name: frame_name.into(),
            timeline,
            deps,
            cancel,
            cursor: 0,
            started: false,
            best: None,
            outcomes: Vec::new(),
        }
    }

    /// # Summary
    /// 回测下一个策略并产出进度。
    ///
    /// # Returns
    /// 全部策略完成、被取消或配置不合法时返回 None。
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if !self.started {
            self.started = true;
            if let Err(message) = self.check() {
                error!(symbol = %self.symbol, error = %message, "walker aborted");
                self.deps.events.exit(ErrorEvent {
                    strategy_name: None,
                    context: None,
                    message,
                });
                self.cursor = self.strategies.len();
                return None;
            }
        }
        if self.cancel.is_cancelled() {
            return None;
        }

        let schema = self.strategies.get(self.cursor)?.clone();
        self.cursor += 1;
        let strategy_name = schema.name.clone();

        let client = StrategyClient::new(self.symbol.clone(), schema, self.deps.clone());
        let run = BacktestRun::new(
            client,
            self.deps.exchange.clone(),
            self.deps.events.clone(),
            &self.timeline,
            self.frame_name.clone(),
            self.deps.config.schedule_await_minutes,
            self.cancel.child_token(),
        );
        let results = run.collect().await;

        let statistics = BacktestStatistics::from_results(&results);
        let metric_value = self.metric.extract(&statistics);
        if let Some(value) = metric_value
            && self.best.as_ref().is_none_or(|(_, best)| value > *best)
        {
            self.best = Some((strategy_name.clone(), value));
        }

        info!(
            symbol = %self.symbol,
            strategy = %strategy_name,
            metric = %self.metric,
            value = ?metric_value,
            signals = statistics.total_signals,
            "walker strategy finished"
        );

        let progress = ProgressEvent {
            symbol: self.symbol.clone(),
            strategy_name: strategy_name.clone(),
            metric: self.metric.to_string(),
            metric_value,
            best_strategy: self.best.as_ref().map(|(name, _)| name.clone()),
            best_metric: self.best.as_ref().map(|(_, value)| *value),
            strategies_tested: self.cursor,
            total_strategies: self.strategies.len(),
        };
        self.outcomes.push(StrategyOutcome {
            strategy_name,
            statistics,
            metric_value,
        });
        self.deps.events.progress(progress.clone());
        Some(progress)
    }

    /// 运行全部策略，返回最终进度记录。
    pub async fn run_to_end(&mut self) -> Option<ProgressEvent> {
        let mut last = None;
        while let Some(progress) = self.next().await {
            last = Some(progress);
        }
        last
    }

    /// 当前最优策略及其指标值。
    pub fn best(&self) -> Option<(&str, f64)> {
        self.best.as_ref().map(|(name, value)| (name.as_str(), *value))
    }

    /// 已完成策略的结果，按执行顺序排列。
    pub fn outcomes(&self) -> &[StrategyOutcome] {
        &self.outcomes
    }

    fn check(&self) -> Result<(), String> {
        if self.strategies.is_empty() {
            return Err("walker requires at least one strategy".to_string());
        }
        if self.timeline.is_empty() {
            return Err("walker timeline is empty".to_string());
        }
        let mut seen = HashSet::new();
        for schema in &self.strategies {
            if !seen.insert(schema.name.as_str()) {
                return Err(format!("duplicate strategy in walker: {}", schema.name));
            }
        }
        Ok(())
    }
}
