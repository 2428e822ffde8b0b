//! Periodic flow-stats polling
//!
//! Every interval the monitor snapshots the registry and asks each switch
//! for flow statistics. Replies come back asynchronously through
//! [`crate::QltrController::on_flow_stats_reply`]. A failed request is logged
//! and the round continues with the next switch.

use crate::adapter::SwitchAdapter;
use crate::registry::SwitchRegistry;
use qltr_common::AtomicCounter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Monitor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Polling rounds run
    pub rounds: u64,
    /// Requests handed to the adapter
    pub requests: u64,
    /// Requests the adapter rejected
    pub failures: u64,
}

/// Stats poller
pub struct StatsMonitor {
    registry: Arc<SwitchRegistry>,
    adapter: Arc<dyn SwitchAdapter>,
    period: Duration,
    rounds: AtomicCounter,
    requests: AtomicCounter,
    failures: AtomicCounter,
}

impl StatsMonitor {
    /// Create monitor
    pub fn new(
        registry: Arc<SwitchRegistry>,
        adapter: Arc<dyn SwitchAdapter>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            adapter,
            period,
            rounds: AtomicCounter::new(0),
            requests: AtomicCounter::new(0),
            failures: AtomicCounter::new(0),
        }
    }

    /// Polling interval
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Counter snapshot
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            rounds: self.rounds.get(),
            requests: self.requests.get(),
            failures: self.failures.get(),
        }
    }

    /// Run one polling round over the switches registered right now.
    /// Returns the number of requests sent.
    pub async fn poll_once(&self) -> usize {
        self.rounds.inc();
        let switches = self.registry.all_handles();
        let mut sent = 0;

        for switch in &switches {
            match self.adapter.request_flow_stats(switch).await {
                Ok(()) => {
                    self.requests.inc();
                    sent += 1;
                }
                Err(e) => {
                    self.failures.inc();
                    warn!(node = %switch.id, error = %e, "Flow stats request failed");
                }
            }
        }

        debug!(switches = switches.len(), sent, "Stats round complete");
        sent
    }

    /// Start background polling. The first round runs immediately.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.period.as_secs(), "Stats monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(rounds = self.rounds.get(), "Stats monitor stopped");
    }
}

/// Handle to a running monitor. Dropping it also stops the loop.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Stats monitor task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{RecordingSwitchAdapter, SwitchHandle};
    use qltr_common::NodeId;

    fn setup(ids: &[u64]) -> (Arc<SwitchRegistry>, Arc<RecordingSwitchAdapter>) {
        let registry = Arc::new(SwitchRegistry::new());
        for id in ids {
            registry.register(SwitchHandle::new(NodeId(*id)));
        }
        (registry, Arc::new(RecordingSwitchAdapter::new()))
    }

    #[tokio::test]
    async fn test_poll_once_requests_every_switch() {
        let (registry, adapter) = setup(&[1, 2, 3]);
        let monitor = StatsMonitor::new(registry, adapter.clone(), Duration::from_secs(10));

        assert_eq!(monitor.poll_once().await, 3);
        for id in 1..=3 {
            assert_eq!(adapter.stats_requests(NodeId(id)), 1);
        }
        assert_eq!(
            monitor.stats(),
            MonitorStats {
                rounds: 1,
                requests: 3,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn test_poll_empty_registry() {
        let (registry, adapter) = setup(&[]);
        let monitor = StatsMonitor::new(registry, adapter.clone(), Duration::from_secs(10));
        assert_eq!(monitor.poll_once().await, 0);
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_round() {
        let (registry, adapter) = setup(&[1, 2, 3]);
        adapter.disconnect(NodeId(2));
        let monitor = StatsMonitor::new(registry, adapter.clone(), Duration::from_secs(10));

        assert_eq!(monitor.poll_once().await, 2);
        assert_eq!(adapter.stats_requests(NodeId(1)), 1);
        assert_eq!(adapter.stats_requests(NodeId(3)), 1);
        assert_eq!(monitor.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_polling_and_shutdown() {
        let (registry, adapter) = setup(&[1, 2]);
        let monitor = Arc::new(StatsMonitor::new(
            registry,
            adapter.clone(),
            Duration::from_secs(10),
        ));

        let handle = monitor.clone().spawn();
        // rounds at t = 0, 10, 20
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(monitor.stats().rounds, 3);
        assert_eq!(adapter.stats_requests(NodeId(1)), 3);
        assert_eq!(adapter.stats_requests(NodeId(2)), 3);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(monitor.stats().rounds, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let (registry, adapter) = setup(&[1]);
        let monitor = Arc::new(StatsMonitor::new(
            registry,
            adapter.clone(),
            Duration::from_secs(10),
        ));

        let handle = monitor.clone().spawn();
        // rounds at t = 0, 10
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(monitor.stats().rounds, 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(monitor.stats().rounds, 2);
        assert_eq!(adapter.stats_requests(NodeId(1)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_joining_later_is_polled() {
        let (registry, adapter) = setup(&[1]);
        let monitor = Arc::new(StatsMonitor::new(
            registry.clone(),
            adapter.clone(),
            Duration::from_secs(10),
        ));
        let handle = monitor.clone().spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        registry.register(SwitchHandle::new(NodeId(2)));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(adapter.stats_requests(NodeId(1)), 2);
        assert_eq!(adapter.stats_requests(NodeId(2)), 1);
        handle.shutdown().await;
    }
}
