//! QLTR Controller - Q-learning trust routing engine
//!
//! Control-plane decision logic for an SDN controller:
//!
//! - Packet-in frames are filtered, their source MAC learned and their
//!   destination mapped to an attachment switch
//! - An epsilon-greedy Q-learning router picks a path among trusted switches
//! - Per-hop flow rules and one packet-out are pushed through the
//!   [`SwitchAdapter`]
//! - A background monitor polls flow statistics that are reduced into
//!   throughput, efficiency and delivery-ratio figures
//!
//! OpenFlow encoding and switch sessions are left to the adapter.

#![warn(missing_docs)]

pub mod adapter;
pub mod config;
pub mod mac_table;
pub mod metrics;
pub mod monitor;
pub mod provisioner;
pub mod qlearning;
pub mod registry;
pub mod trust;

pub use adapter::{
    AdapterError, EgressTarget, FixedPortResolver, LearnedPortResolver, PortResolver,
    RecordingSwitchAdapter, SwitchAdapter, SwitchHandle,
};
pub use config::ControllerConfig;
pub use mac_table::MacLearningTable;
pub use metrics::{FlowMetrics, MetricsCalculator};
pub use monitor::{MonitorHandle, MonitorStats, StatsMonitor};
pub use provisioner::{FlowProvisioner, ProvisionReport};
pub use qlearning::{QLearningRouter, Selection};
pub use registry::{RegistryEvent, SwitchRegistry};
pub use trust::TrustModel;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use qltr_common::{AtomicCounter, FlowRule, NodeId, PacketIn, Port, QltrResult, StatsSample};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a packet-in was not routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Topology discovery frame
    Lldp,
    /// Frame carries no IPv4 packet
    NotIpv4,
}

/// Result of handling one packet-in
#[derive(Debug, Clone, PartialEq)]
pub enum PacketInOutcome {
    /// Path installed and packet forwarded
    Forwarded {
        /// How the path was chosen
        selection: Selection,
        /// What was installed
        report: ProvisionReport,
    },
    /// Frame skipped without side effects
    Ignored(IgnoreReason),
}

/// Metrics last reported by one switch
#[derive(Debug, Clone)]
pub struct SwitchMetrics {
    /// Reduced figures
    pub metrics: FlowMetrics,
    /// Samples the figures were computed from
    pub samples: Vec<StatsSample>,
    /// When the reply was processed
    pub updated_at: DateTime<Utc>,
}

/// Packet-in counters
#[derive(Debug, Default)]
pub struct ControllerStats {
    /// Packet-ins received
    pub packet_ins: AtomicCounter,
    /// Packet-ins routed
    pub forwarded: AtomicCounter,
    /// Packet-ins filtered out
    pub ignored: AtomicCounter,
    /// Packet-ins dropped on error
    pub dropped: AtomicCounter,
}

/// Controller facade wiring switch events to the routing engine
pub struct QltrController {
    config: ControllerConfig,
    registry: Arc<SwitchRegistry>,
    macs: Arc<MacLearningTable>,
    trust: TrustModel,
    router: QLearningRouter,
    provisioner: FlowProvisioner,
    calculator: MetricsCalculator,
    adapter: Arc<dyn SwitchAdapter>,
    latest: DashMap<NodeId, SwitchMetrics>,
    stats: ControllerStats,
}

impl QltrController {
    /// Create controller with an entropy-seeded random source
    pub fn new(config: ControllerConfig, adapter: Arc<dyn SwitchAdapter>) -> QltrResult<Self> {
        Self::with_rng(config, adapter, StdRng::from_entropy())
    }

    /// Create controller with an explicit random source
    pub fn with_rng(
        config: ControllerConfig,
        adapter: Arc<dyn SwitchAdapter>,
        rng: impl RngCore + Send + 'static,
    ) -> QltrResult<Self> {
        config.validate()?;

        let registry = Arc::new(SwitchRegistry::new());
        let macs = Arc::new(match config.mac_table.max_entries_per_switch {
            Some(max) => MacLearningTable::with_capacity(max),
            None => MacLearningTable::new(),
        });

        let default_port = Port(config.flow.default_egress_port);
        let ports: Arc<dyn PortResolver> = if config.flow.learned_ports {
            Arc::new(LearnedPortResolver::new(macs.clone(), default_port))
        } else {
            Arc::new(FixedPortResolver::new(default_port))
        };

        let provisioner = FlowProvisioner::new(registry.clone(), adapter.clone(), ports)
            .with_priority(config.flow.priority);
        let router = QLearningRouter::with_rng(config.learning, rng)?;

        info!(
            alpha = config.learning.alpha,
            gamma = config.learning.gamma,
            epsilon = config.learning.epsilon,
            "QLTR controller initialized"
        );

        Ok(Self {
            config,
            registry,
            macs,
            trust: TrustModel::new(),
            router,
            provisioner,
            calculator: MetricsCalculator::new(),
            adapter,
            latest: DashMap::new(),
            stats: ControllerStats::default(),
        })
    }

    /// Switch reported its features: register it and install the table-miss rule
    pub async fn on_switch_features(&self, handle: SwitchHandle) -> QltrResult<()> {
        self.registry.register(handle.clone());

        if self.config.flow.install_table_miss {
            if let Err(e) = self.adapter.send_flow_mod(&handle, &FlowRule::table_miss()).await {
                warn!(node = %handle.id, error = %e, "Failed to install table-miss flow");
                return Err(e.into());
            }
            debug!(node = %handle.id, "Installed table-miss flow");
        }
        Ok(())
    }

    /// Switch reached main-processing state
    pub fn on_switch_entered_main(&self, handle: SwitchHandle) -> bool {
        self.registry.register(handle)
    }

    /// Switch left main-processing state
    pub fn on_switch_left_main(&self, id: NodeId) -> Option<SwitchHandle> {
        let removed = self.registry.unregister(id);
        if removed.is_some() {
            self.macs.forget_switch(id);
        }
        removed
    }

    /// Route a new flow seen on `node`
    pub async fn on_packet_in(&self, node: NodeId, packet: PacketIn) -> QltrResult<PacketInOutcome> {
        self.stats.packet_ins.inc();
        let frame = packet.frame;

        if frame.is_lldp() {
            self.stats.ignored.inc();
            return Ok(PacketInOutcome::Ignored(IgnoreReason::Lldp));
        }
        if !frame.is_ipv4 {
            self.stats.ignored.inc();
            debug!(node = %node, ether_type = frame.ether_type, "Ignoring non-IPv4 frame");
            return Ok(PacketInOutcome::Ignored(IgnoreReason::NotIpv4));
        }

        self.macs.learn(node, frame.source, packet.in_port);

        let dst = match self.macs.locate(frame.destination) {
            Some((switch, _)) => switch,
            None => node,
        };

        let min_trust = self.config.trust.min_trust;
        let live: Vec<NodeId> = self
            .registry
            .live_ids()
            .into_iter()
            .filter(|id| self.trust.is_trusted(*id, min_trust))
            .collect();

        let (path, selection) = self.router.select_path_with(node, dst, &live);

        match self.provisioner.provision(&path, &packet, node).await {
            Ok(report) => {
                self.stats.forwarded.inc();
                debug!(
                    node = %node,
                    eth_src = %frame.source,
                    eth_dst = %frame.destination,
                    path = %report.path,
                    "Flow provisioned"
                );
                Ok(PacketInOutcome::Forwarded { selection, report })
            }
            Err(e) => {
                self.stats.dropped.inc();
                warn!(node = %node, path = %path, error = %e, "Packet-in dropped");
                Err(e)
            }
        }
    }

    /// Reduce a flow-stats reply and keep it as the switch's latest figures
    pub fn on_flow_stats_reply(&self, node: NodeId, samples: Vec<StatsSample>) -> QltrResult<FlowMetrics> {
        let metrics = match self.calculator.reduce(&samples) {
            Ok(metrics) => metrics,
            Err(e) => {
                debug!(node = %node, error = %e, "Skipping stats reply");
                return Err(e);
            }
        };

        info!(
            node = %node,
            throughput = metrics.throughput,
            efficiency = metrics.efficiency,
            packet_delivery_ratio = metrics.packet_delivery_ratio,
            "Flow stats"
        );

        self.latest.insert(
            node,
            SwitchMetrics {
                metrics,
                samples,
                updated_at: Utc::now(),
            },
        );
        Ok(metrics)
    }

    /// Last figures reported by `node`
    pub fn latest_metrics(&self, node: NodeId) -> Option<FlowMetrics> {
        self.latest.get(&node).map(|m| m.metrics)
    }

    /// Figures over every retained sample of every switch
    pub fn metrics_summary(&self) -> QltrResult<FlowMetrics> {
        let samples: Vec<StatsSample> = self
            .latest
            .iter()
            .flat_map(|m| m.samples.clone())
            .collect();
        self.calculator.reduce(&samples)
    }

    /// Feed a path reward back into the Q-table
    pub fn update_q(&self, src: NodeId, dst: NodeId, reward: f64) -> QltrResult<f64> {
        self.router.update_q(src, dst, reward)
    }

    /// Feed an observed success rate into a node's trust
    pub fn update_trust(&self, node: NodeId, success_rate: f64) -> QltrResult<f64> {
        self.trust.update(node, success_rate)
    }

    /// Build the stats monitor for this controller
    pub fn monitor(&self) -> Arc<StatsMonitor> {
        Arc::new(StatsMonitor::new(
            self.registry.clone(),
            self.adapter.clone(),
            self.config.monitor.interval(),
        ))
    }

    /// Start the stats monitor in the background
    pub fn spawn_monitor(&self) -> MonitorHandle {
        self.monitor().spawn()
    }

    /// Configuration in use
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Registered switches
    pub fn registry(&self) -> &Arc<SwitchRegistry> {
        &self.registry
    }

    /// Learned MAC locations
    pub fn mac_table(&self) -> &Arc<MacLearningTable> {
        &self.macs
    }

    /// Trust scores
    pub fn trust(&self) -> &TrustModel {
        &self.trust
    }

    /// Path selector
    pub fn router(&self) -> &QLearningRouter {
        &self.router
    }

    /// Packet-in counters
    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }
}
