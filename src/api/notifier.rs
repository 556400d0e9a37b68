//! Fire-and-forget notification sink.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::GovernanceEvent;

/// Receives governance events. Implementations must never block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: GovernanceEvent);
}

/// Notifier backed by an unbounded channel.
///
/// Sending never waits; a background task (or the caller of [`channel`](Self::channel))
/// drains the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: UnboundedSender<GovernanceEvent>,
}

impl ChannelNotifier {
    /// Notifier plus the receiving end, for callers that consume events themselves.
    pub fn channel() -> (Self, UnboundedReceiver<GovernanceEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Notifier whose events are written to the log by a spawned drain task.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn spawn_logging(json: bool) -> (Self, JoinHandle<()>) {
        let (notifier, mut rx) = Self::channel();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                log_event(&event, json);
            }
        });
        (notifier, handle)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: GovernanceEvent) {
        // Receiver gone means shutdown; dropping the event is fine
        let _ = self.tx.send(event);
    }
}

fn log_event(event: &GovernanceEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => info!(target: "notify", kind = event.kind(), "{}", line),
            Err(e) => warn!(target: "notify", error = %e, "Failed to encode event"),
        }
        return;
    }

    match event {
        GovernanceEvent::DrawdownLimitReached { daily_pnl, limit } => {
            warn!(target: "notify", daily_pnl = %daily_pnl, limit = %limit, "Drawdown limit reached");
        }
        GovernanceEvent::ExecutionFailed { symbol, error, .. } => {
            warn!(target: "notify", symbol = %symbol, error = %error, "Execution failed");
        }
        GovernanceEvent::StaleState { symbol, position_id } => {
            warn!(target: "notify", symbol = %symbol, position_id, "No price data for open position");
        }
        GovernanceEvent::DaySummary { date, stats, .. } => {
            info!(target: "notify", day = %date, "Day summary{}", stats);
        }
        other => info!(target: "notify", kind = other.kind(), "{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notify_does_not_block_without_consumer() {
        let (notifier, rx) = ChannelNotifier::channel();
        for _ in 0..1000 {
            notifier.notify(GovernanceEvent::DrawdownLimitReached {
                daily_pnl: dec!(-21),
                limit: dec!(20),
            });
        }
        drop(rx);
        // Closed channel is ignored
        notifier.notify(GovernanceEvent::DrawdownLimitReached {
            daily_pnl: dec!(-21),
            limit: dec!(20),
        });
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.notify(GovernanceEvent::StaleState {
            symbol: "EURUSDm".to_string(),
            position_id: 1,
        });
        notifier.notify(GovernanceEvent::DrawdownLimitReached {
            daily_pnl: dec!(-20),
            limit: dec!(20),
        });

        assert_eq!(rx.recv().await.unwrap().kind(), "stale_state");
        assert_eq!(rx.recv().await.unwrap().kind(), "drawdown_limit_reached");
    }
}
