use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;
use vigil_core::engine::entity::{DoneEvent, ErrorEvent, ProgressEvent, RiskEvent, SignalEvent};

/// # Summary
/// 事件总线：每个事件类别一条无界单消费者通道。
///
/// # Invariants
/// - 同一类别内事件按发送顺序到达，慢消费者只会延迟后续事件，不会打乱顺序。
/// - 发送永不阻塞、永不让引擎失败；接收端被丢弃时事件直接丢弃。
#[derive(Clone)]
pub struct EventBus {
    signal: UnboundedSender<SignalEvent>,
    error: UnboundedSender<ErrorEvent>,
    exit: UnboundedSender<ErrorEvent>,
    done: UnboundedSender<DoneEvent>,
    risk: UnboundedSender<RiskEvent>,
    progress: UnboundedSender<ProgressEvent>,
}

/// # Summary
/// 与 `EventBus` 成对创建的接收端集合，由观察方持有。
pub struct EventStreams {
    // 每个 tick 结果
    pub signal: UnboundedReceiver<SignalEvent>,
    // 可恢复错误
    pub error: UnboundedReceiver<ErrorEvent>,
    // 致命错误
    pub exit: UnboundedReceiver<ErrorEvent>,
    // 驱动器结束
    pub done: UnboundedReceiver<DoneEvent>,
    // 风控拒绝
    pub risk: UnboundedReceiver<RiskEvent>,
    // 对比驱动器进度
    pub progress: UnboundedReceiver<ProgressEvent>,
}

impl EventBus {
    /// 创建事件总线及其接收端。
    pub fn channel() -> (Self, EventStreams) {
        let (signal, signal_rx) = unbounded_channel();
        let (error, error_rx) = unbounded_channel();
        let (exit, exit_rx) = unbounded_channel();
        let (done, done_rx) = unbounded_channel();
        let (risk, risk_rx) = unbounded_channel();
        let (progress, progress_rx) = unbounded_channel();
        (
            Self {
                signal,
                error,
                exit,
                done,
                risk,
                progress,
            },
            EventStreams {
                signal: signal_rx,
                error: error_rx,
                exit: exit_rx,
                done: done_rx,
                risk: risk_rx,
                progress: progress_rx,
            },
        )
    }

    /// 无人订阅的事件总线，所有事件被丢弃。
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn signal(&self, event: SignalEvent) {
        if self.signal.send(event).is_err() {
            trace!("signal event dropped: no subscriber");
        }
    }

    pub fn error(&self, event: ErrorEvent) {
        if self.error.send(event).is_err() {
            trace!("error event dropped: no subscriber");
        }
    }

    pub fn exit(&self, event: ErrorEvent) {
        if self.exit.send(event).is_err() {
            trace!("exit event dropped: no subscriber");
        }
    }

    pub fn done(&self, event: DoneEvent) {
        if self.done.send(event).is_err() {
            trace!("done event dropped: no subscriber");
        }
    }

    pub fn risk(&self, event: RiskEvent) {
        if self.risk.send(event).is_err() {
            trace!("risk event dropped: no subscriber");
        }
    }

    pub fn progress(&self, event: ProgressEvent) {
        if self.progress.send(event).is_err() {
            trace!("progress event dropped: no subscriber");
        }
    }
}
