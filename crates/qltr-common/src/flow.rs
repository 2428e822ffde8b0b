//! Forwarding types: paths, flow rules, packet-in frames and flow statistics

use crate::{MacAddress, NodeId, Port, QltrError, QltrResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// EtherType of IPv4
pub const ETH_TYPE_IPV4: u16 = 0x0800;
/// EtherType of ARP
pub const ETH_TYPE_ARP: u16 = 0x0806;
/// EtherType of LLDP (topology discovery)
pub const ETH_TYPE_LLDP: u16 = 0x88cc;

/// Ordered sequence of switches, source first, destination last
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<NodeId>", into = "Vec<NodeId>")]
pub struct Path(Vec<NodeId>);

impl Path {
    /// Minimum number of nodes in a path
    pub const MIN_LEN: usize = 2;

    /// Create a validated path
    pub fn new(nodes: Vec<NodeId>) -> QltrResult<Self> {
        if nodes.len() < Self::MIN_LEN {
            return Err(QltrError::InvalidPath { len: nodes.len() });
        }
        Ok(Self(nodes))
    }

    /// Two-node path
    pub fn direct(src: NodeId, dst: NodeId) -> Self {
        Self(vec![src, dst])
    }

    /// `src`, then every node of `via` in order, then `dst`
    pub fn through(src: NodeId, via: impl IntoIterator<Item = NodeId>, dst: NodeId) -> Self {
        let mut nodes = vec![src];
        nodes.extend(via);
        nodes.push(dst);
        Self(nodes)
    }

    /// Nodes in order
    #[inline]
    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false, a path holds at least two nodes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First node
    pub fn source(&self) -> NodeId {
        self.0[0]
    }

    /// Last node
    pub fn destination(&self) -> NodeId {
        self.0[self.0.len() - 1]
    }

    /// Consecutive (from, to) pairs
    pub fn hops(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }
}

impl TryFrom<Vec<NodeId>> for Path {
    type Error = QltrError;

    fn try_from(nodes: Vec<NodeId>) -> QltrResult<Self> {
        Self::new(nodes)
    }
}

impl From<Path> for Vec<NodeId> {
    fn from(path: Path) -> Self {
        path.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

/// Match predicate of a flow rule. `None` fields are wildcards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    /// Ingress port
    pub in_port: Option<Port>,
    /// Destination MAC
    pub eth_dst: Option<MacAddress>,
}

impl FlowMatch {
    /// Match everything (table-miss)
    pub const fn any() -> Self {
        Self {
            in_port: None,
            eth_dst: None,
        }
    }

    /// Match on ingress port and destination MAC
    pub const fn in_port_eth_dst(in_port: Port, eth_dst: MacAddress) -> Self {
        Self {
            in_port: Some(in_port),
            eth_dst: Some(eth_dst),
        }
    }
}

/// Flow action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowAction {
    /// Forward out of a port
    Output(Port),
}

/// Match-action forwarding instruction for one switch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRule {
    /// Rule priority, higher wins
    pub priority: u16,
    /// Match predicate
    pub matcher: FlowMatch,
    /// Actions applied on match
    pub actions: Vec<FlowAction>,
}

impl FlowRule {
    /// Priority of the table-miss rule
    pub const TABLE_MISS_PRIORITY: u16 = 0;

    /// Forward matching traffic out of a single port
    pub fn forward(priority: u16, matcher: FlowMatch, port: Port) -> Self {
        Self {
            priority,
            matcher,
            actions: vec![FlowAction::Output(port)],
        }
    }

    /// Send every unmatched packet to the controller
    pub fn table_miss() -> Self {
        Self::forward(Self::TABLE_MISS_PRIORITY, FlowMatch::any(), Port::CONTROLLER)
    }

    /// Rules with identical priority and match replace each other on a switch
    pub fn same_key(&self, other: &FlowRule) -> bool {
        self.priority == other.priority && self.matcher == other.matcher
    }
}

/// Ethernet-level view of a packet-in payload, decoded by the switch adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// EtherType
    pub ether_type: u16,
    /// Source MAC
    pub source: MacAddress,
    /// Destination MAC
    pub destination: MacAddress,
    /// Frame carries an IPv4 packet
    pub is_ipv4: bool,
}

impl DecodedFrame {
    /// Decoded IPv4 frame
    pub const fn ipv4(source: MacAddress, destination: MacAddress) -> Self {
        Self {
            ether_type: ETH_TYPE_IPV4,
            source,
            destination,
            is_ipv4: true,
        }
    }

    /// LLDP frame
    pub const fn is_lldp(&self) -> bool {
        self.ether_type == ETH_TYPE_LLDP
    }
}

/// Packet-in message as delivered by the switch adapter
#[derive(Debug, Clone)]
pub struct PacketIn {
    /// Switch buffer holding the packet, `None` when the full packet was sent
    pub buffer_id: Option<u32>,
    /// Ingress port
    pub in_port: Port,
    /// Decoded headers
    pub frame: DecodedFrame,
    /// Raw frame bytes
    pub data: Bytes,
}

/// Packet-out message emitted after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    /// Switch buffer to release, if any
    pub buffer_id: Option<u32>,
    /// Original ingress port
    pub in_port: Port,
    /// Actions to apply
    pub actions: Vec<FlowAction>,
    /// Raw frame bytes
    pub data: Bytes,
}

/// Counters for one flow entry, taken from a flow-stats reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSample {
    /// Packets matched
    pub packet_count: u64,
    /// Bytes matched
    pub byte_count: u64,
    /// Time the entry has been installed, in seconds
    pub duration_secs: f64,
}

impl StatsSample {
    /// Create sample
    pub const fn new(packet_count: u64, byte_count: u64, duration_secs: f64) -> Self {
        Self {
            packet_count,
            byte_count,
            duration_secs,
        }
    }
}
