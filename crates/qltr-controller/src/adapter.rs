//! Southbound switch adapter
//!
//! The controller never speaks OpenFlow itself. Flow installs, packet-outs
//! and stats requests go through [`SwitchAdapter`]; egress port selection goes
//! through [`PortResolver`] so a topology-aware resolver can replace the
//! constant one without touching the provisioner.

use crate::mac_table::MacLearningTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use qltr_common::{FlowRule, MacAddress, NodeId, PacketOut, Port, QltrError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Adapter errors
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Control channel to the switch is gone
    #[error("switch {0} disconnected")]
    Disconnected(NodeId),

    /// Message could not be sent
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl From<AdapterError> for QltrError {
    fn from(err: AdapterError) -> Self {
        QltrError::Adapter(err.to_string())
    }
}

/// Handle used to address one connected switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchHandle {
    /// Datapath id
    pub id: NodeId,
    /// Control-channel session
    pub session: Uuid,
    /// When the session reached main-processing state
    pub connected_at: DateTime<Utc>,
}

impl SwitchHandle {
    /// Handle for a fresh session
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            session: Uuid::new_v4(),
            connected_at: Utc::now(),
        }
    }
}

/// Commands the controller sends to switches
///
/// All sends are fire-and-forget: returning `Ok` means the message was handed
/// to the control channel, not that the switch applied it.
#[async_trait]
pub trait SwitchAdapter: Send + Sync {
    /// Install (or replace) a flow rule
    async fn send_flow_mod(&self, switch: &SwitchHandle, rule: &FlowRule) -> Result<(), AdapterError>;

    /// Emit a packet
    async fn send_packet_out(&self, switch: &SwitchHandle, packet: &PacketOut) -> Result<(), AdapterError>;

    /// Ask for flow statistics; the reply arrives later as a stats event
    async fn request_flow_stats(&self, switch: &SwitchHandle) -> Result<(), AdapterError>;
}

/// Where an egress port should lead
#[derive(Debug, Clone, Copy)]
pub enum EgressTarget<'a> {
    /// Next switch on the path
    Switch(&'a SwitchHandle),
    /// Destination host
    Host(MacAddress),
}

/// Egress port resolution
pub trait PortResolver: Send + Sync {
    /// Port on `from` leading toward `toward`
    fn resolve_egress_port(&self, from: &SwitchHandle, toward: EgressTarget<'_>) -> Port;
}

/// Resolver that always answers the same port
#[derive(Debug, Clone, Copy)]
pub struct FixedPortResolver {
    port: Port,
}

impl FixedPortResolver {
    /// Create resolver
    pub const fn new(port: Port) -> Self {
        Self { port }
    }
}

impl Default for FixedPortResolver {
    fn default() -> Self {
        Self::new(Port(1))
    }
}

impl PortResolver for FixedPortResolver {
    fn resolve_egress_port(&self, _from: &SwitchHandle, _toward: EgressTarget<'_>) -> Port {
        self.port
    }
}

/// Resolver answering host targets from the MAC learning table
///
/// Switch-to-switch targets still use the fallback port: there is no
/// adjacency information to consult.
pub struct LearnedPortResolver {
    macs: Arc<MacLearningTable>,
    fallback: FixedPortResolver,
}

impl LearnedPortResolver {
    /// Create resolver
    pub fn new(macs: Arc<MacLearningTable>, fallback: Port) -> Self {
        Self {
            macs,
            fallback: FixedPortResolver::new(fallback),
        }
    }
}

impl PortResolver for LearnedPortResolver {
    fn resolve_egress_port(&self, from: &SwitchHandle, toward: EgressTarget<'_>) -> Port {
        match toward {
            EgressTarget::Host(mac) => self
                .macs
                .lookup(from.id, mac)
                .unwrap_or_else(|| self.fallback.resolve_egress_port(from, toward)),
            EgressTarget::Switch(_) => self.fallback.resolve_egress_port(from, toward),
        }
    }
}

/// Message captured by [`RecordingSwitchAdapter`]
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    /// Flow install
    FlowMod {
        /// Target switch
        switch: NodeId,
        /// Installed rule
        rule: FlowRule,
    },
    /// Packet-out
    PacketOut {
        /// Target switch
        switch: NodeId,
        /// Emitted packet
        packet: PacketOut,
    },
    /// Flow-stats request
    StatsRequest {
        /// Target switch
        switch: NodeId,
    },
}

/// In-memory adapter recording every message (for testing and development)
#[derive(Default)]
pub struct RecordingSwitchAdapter {
    sent: Mutex<Vec<SentMessage>>,
    disconnected: Mutex<Vec<NodeId>>,
}

impl RecordingSwitchAdapter {
    /// Create adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send toward `id` from now on
    pub fn disconnect(&self, id: NodeId) {
        self.disconnected.lock().push(id);
    }

    /// All messages in send order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Flow rules installed on one switch, in send order
    pub fn flow_mods(&self, id: NodeId) -> Vec<FlowRule> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                SentMessage::FlowMod { switch, rule } if *switch == id => Some(rule.clone()),
                _ => None,
            })
            .collect()
    }

    /// Flow table of one switch after applying replace-on-same-key semantics
    pub fn installed_rules(&self, id: NodeId) -> Vec<FlowRule> {
        let mut table: Vec<FlowRule> = Vec::new();
        for rule in self.flow_mods(id) {
            match table.iter_mut().find(|r| r.same_key(&rule)) {
                Some(existing) => *existing = rule,
                None => table.push(rule),
            }
        }
        table
    }

    /// Packet-outs emitted on one switch
    pub fn packet_outs(&self, id: NodeId) -> Vec<PacketOut> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                SentMessage::PacketOut { switch, packet } if *switch == id => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of stats requests sent to one switch
    pub fn stats_requests(&self, id: NodeId) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| matches!(m, SentMessage::StatsRequest { switch } if *switch == id))
            .count()
    }

    fn record(&self, id: NodeId, message: SentMessage) -> Result<(), AdapterError> {
        if self.disconnected.lock().contains(&id) {
            return Err(AdapterError::Disconnected(id));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

#[async_trait]
impl SwitchAdapter for RecordingSwitchAdapter {
    async fn send_flow_mod(&self, switch: &SwitchHandle, rule: &FlowRule) -> Result<(), AdapterError> {
        self.record(
            switch.id,
            SentMessage::FlowMod {
                switch: switch.id,
                rule: rule.clone(),
            },
        )
    }

    async fn send_packet_out(&self, switch: &SwitchHandle, packet: &PacketOut) -> Result<(), AdapterError> {
        self.record(
            switch.id,
            SentMessage::PacketOut {
                switch: switch.id,
                packet: packet.clone(),
            },
        )
    }

    async fn request_flow_stats(&self, switch: &SwitchHandle) -> Result<(), AdapterError> {
        self.record(switch.id, SentMessage::StatsRequest { switch: switch.id })
    }
}
