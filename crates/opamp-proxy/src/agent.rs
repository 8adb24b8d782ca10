//! Per-agent session state.
//!
//! An [`Agent`] folds the stream of `AgentToServer` reports from one
//! instance into a current view: description, capabilities, sequence
//! number, latest health and effective config. Agents may omit unchanged
//! sub-messages ("compressed" reports); when a report is compressed and the
//! previous one was missed, the response asks the agent for its full state.

use std::sync::Arc;

use opamp_core::InstanceId;
use opamp_core::protobufs::{
    AgentCapabilities, AgentDescription, AgentToServer, ComponentHealth, ConnectionSettingsOffers,
    EffectiveConfig, ServerToAgent, ServerToAgentFlags,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::connection::AgentConnection;
use crate::connection_settings::ConnectionSettingsCalculator;
use crate::errors::ProxyError;

/// Resource attribute naming the host (pod) the agent runs on.
pub const HOST_NAME_KEY: &str = "host.name";

/// Merged status fields of the latest reports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentStatus {
    /// Last non-empty description reported.
    pub description: Option<AgentDescription>,
    /// Capability bitmask from the latest report.
    pub capabilities: u64,
    /// Sequence number of the latest report.
    pub sequence_num: u64,
}

#[derive(Debug, Default)]
struct AgentState {
    status: Option<AgentStatus>,
    health: Option<ComponentHealth>,
    effective_config: Option<EffectiveConfig>,
    offered_settings: Option<ConnectionSettingsOffers>,
}

/// One agent instance known to the registry.
#[derive(Debug)]
pub struct Agent {
    instance_id: InstanceId,
    connection: Arc<AgentConnection>,
    state: RwLock<AgentState>,
}

impl Agent {
    /// A session with no reports yet.
    pub fn new(instance_id: InstanceId, connection: Arc<AgentConnection>) -> Self {
        Self {
            instance_id,
            connection,
            state: RwLock::new(AgentState::default()),
        }
    }

    /// The agent's instance id.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Connection the agent last reported on.
    pub fn connection(&self) -> &Arc<AgentConnection> {
        &self.connection
    }

    /// Merge `report` into the session and fill in `response`.
    ///
    /// Returns whether the agent description changed.
    pub fn update_status(
        &self,
        report: &AgentToServer,
        response: &mut ServerToAgent,
        settings: &ConnectionSettingsCalculator,
    ) -> bool {
        let mut state = self.state.write();

        let lost_previous_update = state
            .status
            .as_ref()
            .is_none_or(|prev| prev.sequence_num.wrapping_add(1) != report.sequence_num);

        let status = state.status.get_or_insert_with(AgentStatus::default);
        let description_changed = match &report.agent_description {
            Some(incoming)
                if !incoming.is_empty() && status.description.as_ref() != Some(incoming) =>
            {
                status.description = Some(incoming.clone());
                true
            }
            _ => false,
        };
        status.sequence_num = report.sequence_num;
        status.capabilities = report.capabilities;
        let capabilities = status.capabilities;

        let omitted =
            |present: bool, capability: AgentCapabilities| !present && capability.is_set_in(capabilities);
        let status_is_compressed = omitted(
            report.effective_config.is_some(),
            AgentCapabilities::ReportsEffectiveConfig,
        ) || omitted(
            report.package_statuses.is_some(),
            AgentCapabilities::ReportsPackageStatuses,
        ) || omitted(
            report.remote_config_status.is_some(),
            AgentCapabilities::ReportsRemoteConfig,
        ) || omitted(report.health.is_some(), AgentCapabilities::ReportsHealth);

        if status_is_compressed && lost_previous_update {
            debug!(
                instance_id = %self.instance_id,
                sequence_num = report.sequence_num,
                "compressed report after a gap, requesting full state"
            );
            response.flags |= ServerToAgentFlags::ReportFullState.bit();
        }

        if description_changed {
            let offer = settings.offer();
            response.connection_settings = Some(offer.clone());
            state.offered_settings = Some(offer);
        }

        if let Some(health) = &report.health {
            state.health = Some(health.clone());
        }
        if let Some(config) = &report.effective_config {
            state.effective_config = Some(config.clone());
        }
        if let Some(custom) = &report.custom_message {
            trace!(
                instance_id = %self.instance_id,
                capability = %custom.capability,
                message_type = %custom.r#type,
                "custom message received, not handled"
            );
        }

        description_changed
    }

    /// Push a server-initiated message to the agent.
    ///
    /// An empty `instance_uid` is filled in with this agent's id.
    pub fn send(&self, mut message: ServerToAgent) -> Result<(), ProxyError> {
        if message.instance_uid.is_empty() {
            message.instance_uid = self.instance_id.to_bytes().to_vec();
        }
        self.connection.send(message)
    }

    /// Recompute the connection settings offer and push it unprompted.
    pub fn offer_connection_settings(
        &self,
        settings: &ConnectionSettingsCalculator,
    ) -> Result<(), ProxyError> {
        let offer = settings.offer();
        self.state.write().offered_settings = Some(offer.clone());
        self.send(ServerToAgent {
            connection_settings: Some(offer),
            ..Default::default()
        })
    }

    /// Snapshot of the merged status, if any report arrived.
    pub fn status(&self) -> Option<AgentStatus> {
        self.state.read().status.clone()
    }

    /// Latest reported health.
    pub fn health(&self) -> Option<ComponentHealth> {
        self.state.read().health.clone()
    }

    /// Latest reported effective configuration.
    pub fn effective_config(&self) -> Option<EffectiveConfig> {
        self.state.read().effective_config.clone()
    }

    /// Last connection settings offered to this agent.
    pub fn offered_settings(&self) -> Option<ConnectionSettingsOffers> {
        self.state.read().offered_settings.clone()
    }

    /// Hash of the last offer, if one was made.
    pub fn offered_settings_hash(&self) -> Option<Vec<u8>> {
        self.state
            .read()
            .offered_settings
            .as_ref()
            .map(|offer| offer.hash.clone())
    }

    /// Non-empty `host.name` from the description's non-identifying attributes.
    pub fn hostname(&self) -> Option<String> {
        let state = self.state.read();
        state
            .status
            .as_ref()?
            .description
            .as_ref()?
            .non_identifying_str(HOST_NAME_KEY)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}
