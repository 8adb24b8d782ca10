//! Agent registry.
//!
//! [`OpAmpProxy`] is the bridge's single source of truth about connected
//! agents. The transport calls [`OpAmpProxy::on_connect`],
//! [`OpAmpProxy::on_message`] and [`OpAmpProxy::on_disconnect`]; the operator
//! reads through [`FleetQuery`].
//!
//! Lock order is registry then agent. Fleet-changed signals are pushed only
//! after the registry lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use opamp_core::protobufs::{
    AgentToServer, ComponentHealth, EffectiveConfig, ServerErrorResponse, ServerToAgent,
};
use opamp_core::{ConnectionId, InstanceId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::connection::AgentConnection;
use crate::connection_settings::ConnectionSettingsCalculator;
use crate::errors::ProxyError;
use crate::fleet::{FleetQuery, UpdateSignal};

#[derive(Default)]
struct ProxyState {
    agents_by_id: HashMap<InstanceId, Arc<Agent>>,
    agents_by_hostname: HashMap<String, InstanceId>,
    connections: HashMap<ConnectionId, HashSet<InstanceId>>,
}

impl ProxyState {
    /// Session for `id` bound to `conn`, plus whether it was just created.
    ///
    /// An id that shows up on a different connection starts a new session
    /// there and is detached from its old connection. The new session keeps
    /// no prior status, so its hostname entry is dropped until the agent
    /// reports a description again.
    fn ensure_agent(&mut self, id: InstanceId, conn: &Arc<AgentConnection>) -> (Arc<Agent>, bool) {
        if let Some(existing) = self.agents_by_id.get(&id) {
            if existing.connection().id == conn.id {
                return (Arc::clone(existing), false);
            }
        }

        let agent = Arc::new(Agent::new(id, Arc::clone(conn)));
        if let Some(stale) = self.agents_by_id.insert(id, Arc::clone(&agent)) {
            debug!(instance_id = %id, old_connection = %stale.connection().id, "agent moved connections");
            if let Some(ids) = self.connections.get_mut(&stale.connection().id) {
                let _ = ids.remove(&id);
            }
            if let Some(hostname) = stale.hostname() {
                self.remove_hostname_if_owned(&hostname, id);
            }
        }
        let _ = self
            .connections
            .entry(conn.id.clone())
            .or_default()
            .insert(id);
        (agent, true)
    }

    fn reindex_hostname(&mut self, id: InstanceId, previous: Option<String>, current: Option<String>) {
        if let Some(previous) = previous {
            if current.as_deref() != Some(previous.as_str()) {
                self.remove_hostname_if_owned(&previous, id);
            }
        }
        if let Some(current) = current {
            let _ = self.agents_by_hostname.insert(current, id);
        }
    }

    fn remove_hostname_if_owned(&mut self, hostname: &str, id: InstanceId) {
        if self.agents_by_hostname.get(hostname) == Some(&id) {
            let _ = self.agents_by_hostname.remove(hostname);
        }
    }
}

/// Registry of connected agents.
pub struct OpAmpProxy {
    capabilities: u64,
    settings: ConnectionSettingsCalculator,
    state: RwLock<ProxyState>,
    updates_tx: mpsc::Sender<()>,
    updates: UpdateSignal,
}

impl std::fmt::Debug for OpAmpProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpAmpProxy")
            .field("capabilities", &self.capabilities)
            .field("agents", &self.agent_count())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl OpAmpProxy {
    /// Create an empty registry declaring `capabilities` to every agent.
    pub fn new(capabilities: u64, settings: ConnectionSettingsCalculator) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(1);
        Self {
            capabilities,
            settings,
            state: RwLock::new(ProxyState::default()),
            updates_tx,
            updates: UpdateSignal::new(updates_rx),
        }
    }

    /// Server capabilities sent on every response.
    pub fn capabilities(&self) -> u64 {
        self.capabilities
    }

    /// Accept a new connection.
    pub fn on_connect(&self, conn: &AgentConnection) -> bool {
        info!(connection_id = %conn.id, "agent connection accepted");
        true
    }

    /// Handle one report and build the response for the same connection.
    pub fn on_message(&self, conn: &Arc<AgentConnection>, msg: AgentToServer) -> ServerToAgent {
        let mut response = ServerToAgent {
            instance_uid: msg.instance_uid.clone(),
            capabilities: self.capabilities,
            ..Default::default()
        };

        let instance_id = match InstanceId::from_wire(&msg.instance_uid) {
            Ok(id) => id,
            Err(e) => {
                warn!(connection_id = %conn.id, error = %e, "rejecting report with bad instance uid");
                response.error_response = Some(ServerErrorResponse::bad_request(e.to_string()));
                return response;
            }
        };
        debug!(
            connection_id = %conn.id,
            instance_id = %instance_id,
            sequence_num = msg.sequence_num,
            "received report"
        );

        let agent_updated = {
            let mut state = self.state.write();
            let (agent, created) = state.ensure_agent(instance_id, conn);
            let previous_hostname = agent.hostname();
            let description_changed = agent.update_status(&msg, &mut response, &self.settings);
            if description_changed {
                state.reindex_hostname(instance_id, previous_hostname, agent.hostname());
            }
            if created {
                info!(connection_id = %conn.id, instance_id = %instance_id, "agent registered");
            }
            created || description_changed
        };

        if agent_updated {
            self.notify();
        }
        response
    }

    /// Forget every agent that reported on `conn`.
    pub fn on_disconnect(&self, conn: &AgentConnection) {
        let removed = {
            let mut state = self.state.write();
            let ids = state.connections.remove(&conn.id).unwrap_or_default();
            for id in &ids {
                if let Some(agent) = state.agents_by_id.remove(id) {
                    if let Some(hostname) = agent.hostname() {
                        state.remove_hostname_if_owned(&hostname, *id);
                    }
                }
            }
            ids.len()
        };
        info!(connection_id = %conn.id, agents_removed = removed, "agent connection closed");
        self.notify();
    }

    /// Push a server-initiated message to an agent.
    pub fn send_to_agent(&self, id: InstanceId, msg: ServerToAgent) -> Result<(), ProxyError> {
        self.agent(id)?.send(msg)
    }

    /// Push a fresh connection settings offer to an agent.
    pub fn offer_connection_settings(&self, id: InstanceId) -> Result<(), ProxyError> {
        self.agent(id)?.offer_connection_settings(&self.settings)
    }

    /// Session for `id`.
    pub fn agent(&self, id: InstanceId) -> Result<Arc<Agent>, ProxyError> {
        self.state
            .read()
            .agents_by_id
            .get(&id)
            .map(Arc::clone)
            .ok_or(ProxyError::AgentNotFound(id))
    }

    /// Number of registered agents.
    pub fn agent_count(&self) -> usize {
        self.state.read().agents_by_id.len()
    }

    /// Number of connections that have reported at least once.
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    fn notify(&self) {
        // A full slot already carries a pending signal.
        let _ = self.updates_tx.try_send(());
    }
}

impl FleetQuery for OpAmpProxy {
    fn configurations(&self) -> HashMap<InstanceId, Option<EffectiveConfig>> {
        let state = self.state.read();
        state
            .agents_by_id
            .iter()
            .map(|(id, agent)| (*id, agent.effective_config()))
            .collect()
    }

    fn health(&self) -> HashMap<InstanceId, Option<ComponentHealth>> {
        let state = self.state.read();
        state
            .agents_by_id
            .iter()
            .map(|(id, agent)| (*id, agent.health()))
            .collect()
    }

    fn agents_by_hostname(&self) -> HashMap<String, InstanceId> {
        self.state.read().agents_by_hostname.clone()
    }

    fn has_updates(&self) -> UpdateSignal {
        self.updates.clone()
    }
}
