//! Read-only fleet view for the surrounding operator.

use std::collections::HashMap;
use std::sync::Arc;

use opamp_core::InstanceId;
use opamp_core::protobufs::{ComponentHealth, EffectiveConfig};
use tokio::sync::{Mutex, mpsc};

/// Queries over the agents currently connected.
///
/// Every call returns an independent snapshot.
pub trait FleetQuery: Send + Sync {
    /// Latest effective configuration per agent.
    fn configurations(&self) -> HashMap<InstanceId, Option<EffectiveConfig>>;

    /// Latest health per agent.
    fn health(&self) -> HashMap<InstanceId, Option<ComponentHealth>>;

    /// Agents indexed by their reported `host.name`.
    fn agents_by_hostname(&self) -> HashMap<String, InstanceId>;

    /// Signal raised whenever the fleet changed and should be re-queried.
    fn has_updates(&self) -> UpdateSignal;
}

/// Coalescing "fleet changed" signal.
///
/// Backed by a single-slot channel: any number of changes between two
/// waits collapse into one wake-up. Clones compete for one receiver, so
/// each signal is observed by exactly one waiter.
#[derive(Clone, Debug)]
pub struct UpdateSignal {
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl UpdateSignal {
    pub(crate) fn new(rx: mpsc::Receiver<()>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next change.
    ///
    /// Returns `false` once the registry has been dropped.
    pub async fn changed(&self) -> bool {
        self.rx.lock().await.recv().await.is_some()
    }

    /// Consume a pending change without waiting.
    ///
    /// Returns `false` while another clone is parked in [`Self::changed`],
    /// since that waiter owns the receiver and will take the change.
    pub fn try_changed(&self) -> bool {
        self.rx
            .try_lock()
            .is_ok_and(|mut rx| rx.try_recv().is_ok())
    }
}
