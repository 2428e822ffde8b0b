//! Flow provisioning along a selected path

use crate::adapter::{EgressTarget, PortResolver, SwitchAdapter, SwitchHandle};
use crate::registry::SwitchRegistry;
use qltr_common::{
    FlowAction, FlowMatch, FlowRule, NodeId, PacketIn, PacketOut, Path, Port, QltrError,
    QltrResult,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default priority of path rules
pub const PATH_RULE_PRIORITY: u16 = 1;

/// Outcome of a successful provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Path that was installed
    pub path: Path,
    /// Switches that received a rule, in send order
    pub installed: Vec<NodeId>,
    /// Port the original packet was sent out of
    pub packet_out_port: Port,
}

/// Turns a path into per-hop flow rules plus one packet-out
///
/// Installs are sent in path order without waiting for acknowledgement. When
/// a hop cannot be resolved the run stops: rules already sent stay installed
/// and the triggering packet is dropped.
pub struct FlowProvisioner {
    registry: Arc<SwitchRegistry>,
    adapter: Arc<dyn SwitchAdapter>,
    ports: Arc<dyn PortResolver>,
    priority: u16,
}

impl FlowProvisioner {
    /// Create provisioner
    pub fn new(
        registry: Arc<SwitchRegistry>,
        adapter: Arc<dyn SwitchAdapter>,
        ports: Arc<dyn PortResolver>,
    ) -> Self {
        Self {
            registry,
            adapter,
            ports,
            priority: PATH_RULE_PRIORITY,
        }
    }

    /// Set rule priority
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// Provision an unchecked node sequence, rejecting it when shorter than two nodes
    pub async fn provision_hops(
        &self,
        nodes: &[NodeId],
        packet: &PacketIn,
        ingress: NodeId,
    ) -> QltrResult<ProvisionReport> {
        let path = Path::new(nodes.to_vec()).map_err(|e| {
            warn!(len = nodes.len(), "Invalid path selected");
            e
        })?;
        self.provision(&path, packet, ingress).await
    }

    /// Install `path` for the packet's (ingress port, destination MAC) and
    /// forward the packet from the ingress switch
    pub async fn provision(
        &self,
        path: &Path,
        packet: &PacketIn,
        ingress: NodeId,
    ) -> QltrResult<ProvisionReport> {
        let dst_mac = packet.frame.destination;
        let matcher = FlowMatch::in_port_eth_dst(packet.in_port, dst_mac);
        let mut installed = Vec::with_capacity(path.len() - 1);

        for (from, to) in path.hops() {
            let (from_switch, to_switch) = self.resolve_hop(from, to, installed.len())?;

            let target = if from == to {
                EgressTarget::Host(dst_mac)
            } else {
                EgressTarget::Switch(&to_switch)
            };
            let port = self.ports.resolve_egress_port(&from_switch, target);
            let rule = FlowRule::forward(self.priority, matcher, port);

            self.adapter.send_flow_mod(&from_switch, &rule).await?;
            debug!(node = %from, next = %to, port = %port, eth_dst = %dst_mac, "Installed flow");
            installed.push(from);
        }

        let ingress_switch = self.registry.get(ingress).ok_or_else(|| {
            warn!(node = %ingress, "Ingress switch left before packet-out");
            QltrError::UnresolvedHop {
                from: ingress,
                to: path.destination(),
                missing: ingress,
                installed: installed.len(),
            }
        })?;

        let packet_out_port = self
            .ports
            .resolve_egress_port(&ingress_switch, EgressTarget::Host(dst_mac));
        let out = PacketOut {
            buffer_id: packet.buffer_id,
            in_port: packet.in_port,
            actions: vec![FlowAction::Output(packet_out_port)],
            data: packet.data.clone(),
        };
        self.adapter.send_packet_out(&ingress_switch, &out).await?;

        Ok(ProvisionReport {
            path: path.clone(),
            installed,
            packet_out_port,
        })
    }

    fn resolve_hop(
        &self,
        from: NodeId,
        to: NodeId,
        installed: usize,
    ) -> QltrResult<(SwitchHandle, SwitchHandle)> {
        match (self.registry.get(from), self.registry.get(to)) {
            (Some(a), Some(b)) => Ok((a, b)),
            (a, _) => {
                let missing = if a.is_none() { from } else { to };
                warn!(
                    from = %from,
                    to = %to,
                    missing = %missing,
                    installed,
                    "Datapath not registered, dropping packet"
                );
                Err(QltrError::UnresolvedHop {
                    from,
                    to,
                    missing,
                    installed,
                })
            }
        }
    }
}
