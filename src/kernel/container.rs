//! Module containers.
//!
//! A container groups modules, gives their log lines a source name, and
//! publishes topology changes to any number of listeners over bounded
//! crossbeam channels.

use crate::config::KernelConfig;
use crate::error::{KernelError, Result, ResultExt};
use crate::kernel::combiner::ApplyCombiner;
use crate::kernel::connector::Connector;
use crate::kernel::id::SubscriptionId;
use crate::kernel::module::Module;
use crate::kernel::signal::{ConnectorSignal, SignalHandler};
use crate::kernel::transfer::ConnectorKind;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Channel capacity for container events (container → listener).
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Topology change published by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContainerEvent {
    ModuleAdded { module: String },
    ModuleRemoved { module: String },
    /// Canonical names of both endpoints.
    ConnectionEstablished { input: String, output: String },
    ConnectionClosed { input: String, output: String },
}

/// Snapshot of a single connector.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorSnapshot {
    pub name: String,
    pub kind: ConnectorKind,
    pub transfer: Option<String>,
    pub connections: usize,
}

/// Snapshot of a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSnapshot {
    pub name: String,
    pub description: String,
    pub connectors: Vec<ConnectorSnapshot>,
}

/// Snapshot of a single edge, by canonical names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EdgeSnapshot {
    pub output: String,
    pub input: String,
}

/// Complete topology snapshot of a container.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub container: String,
    pub modules: Vec<ModuleSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

struct Subscription {
    module: Weak<Module>,
    connector: Weak<Connector>,
    signal: ConnectorSignal,
    id: SubscriptionId,
}

pub struct ModuleContainer {
    name: String,
    modules: RwLock<Vec<Arc<Module>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    listeners: Mutex<Vec<Sender<ContainerEvent>>>,
    event_capacity: usize,
    this: Weak<ModuleContainer>,
}

impl ModuleContainer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_capacity(name, EVENT_CHANNEL_CAPACITY)
    }

    pub fn from_config(config: &KernelConfig) -> Arc<Self> {
        Self::with_capacity(config.container_name.clone(), config.event_channel_capacity)
    }

    fn with_capacity(name: impl Into<String>, event_capacity: usize) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            name,
            modules: RwLock::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            event_capacity: event_capacity.max(1),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take ownership of `module`. A module belongs to one container at a time.
    pub fn add(&self, module: Arc<Module>) -> Result<()> {
        if let Err(owner) = module.claim_container(&self.this) {
            return Err(KernelError::ModuleAlreadyAssociated {
                module: module.name().to_string(),
                container: owner.name().to_string(),
            });
        }

        let mut subscriptions = Vec::new();
        if let Err(e) = self.subscribe_inputs(&module, &mut subscriptions) {
            release(subscriptions);
            module.set_container(Weak::new());
            return Err(e);
        }

        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(subscriptions);
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(module.clone());

        tracing::info!(
            source = %self.log_source(),
            "Added module {}",
            module.name()
        );
        self.publish(ContainerEvent::ModuleAdded {
            module: module.name().to_string(),
        });
        Ok(())
    }

    fn subscribe_inputs(
        &self,
        module: &Arc<Module>,
        subscriptions: &mut Vec<Subscription>,
    ) -> Result<()> {
        for input in module.input_connectors() {
            for signal in [
                ConnectorSignal::ConnectionEstablished,
                ConnectorSignal::ConnectionClosed,
            ] {
                let id = input
                    .subscribe_signal(signal, self.edge_handler(signal))
                    .with_context(|| {
                        format!("Failed to add module {} to {}", module.name(), self.name)
                    })?;
                subscriptions.push(Subscription {
                    module: Arc::downgrade(module),
                    connector: Arc::downgrade(input.connector()),
                    signal,
                    id,
                });
            }
        }
        Ok(())
    }

    /// Disconnect `module` from everything and release it.
    pub fn remove(&self, module: &Arc<Module>) -> Result<()> {
        let removed = {
            let mut modules = self
                .modules
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            modules
                .iter()
                .position(|m| Arc::ptr_eq(m, module))
                .map(|pos| modules.remove(pos))
        };
        let Some(module) = removed else {
            return Err(KernelError::ModuleNotFound(module.name().to_string()));
        };

        let released: Vec<Subscription> = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscriptions)
                .into_iter()
                .partition(|s| s.module.ptr_eq(&Arc::downgrade(&module)));
            *subscriptions = kept;
            released
        };

        let result = module.disconnect();
        release(released);
        module.set_container(Weak::new());

        tracing::info!(
            source = %self.log_source(),
            "Removed module {}",
            module.name()
        );
        self.publish(ContainerEvent::ModuleRemoved {
            module: module.name().to_string(),
        });
        result
    }

    /// First module called `name`.
    pub fn find_module(&self, name: &str) -> Option<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a listener for topology events.
    pub fn subscribe(&self) -> Receiver<ContainerEvent> {
        let (tx, rx) = bounded(self.event_capacity);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Connections `module`'s outputs could make to the inputs of every
    /// module in this container, grouped by target module and sorted by its
    /// name. Targets with no possible connection are omitted.
    pub fn possible_connections(&self, module: &Arc<Module>) -> Vec<(Arc<Module>, Vec<ApplyCombiner>)> {
        let mut groups: Vec<_> = self
            .modules()
            .into_iter()
            .filter_map(|target| {
                let combiners = ApplyCombiner::create_combiner_list(module, &target);
                (!combiners.is_empty()).then_some((target, combiners))
            })
            .collect();
        groups.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        groups
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let mut modules = Vec::new();
        let mut edges = Vec::new();
        for module in self.modules() {
            let connectors = module
                .connectors()
                .iter()
                .map(|c| ConnectorSnapshot {
                    name: c.name().to_string(),
                    kind: c.kind(),
                    transfer: c.transfer_type().map(|t| t.name().to_string()),
                    connections: c.is_connected(),
                })
                .collect();
            for output in module.output_connectors() {
                for input in output.peers() {
                    edges.push(EdgeSnapshot {
                        output: output.canonical_name(),
                        input: input.canonical_name(),
                    });
                }
            }
            modules.push(ModuleSnapshot {
                name: module.name().to_string(),
                description: module.description().to_string(),
                connectors,
            });
        }
        edges.sort();
        TopologySnapshot {
            container: self.name.clone(),
            modules,
            edges,
        }
    }

    fn log_source(&self) -> String {
        format!("ModuleContainer ({})", self.name)
    }

    fn edge_handler(&self, signal: ConnectorSignal) -> SignalHandler {
        let container = self.this.clone();
        Arc::new(move |here, there| {
            let (Some(container), Some(input)) = (container.upgrade(), here) else {
                return;
            };
            let input = input.canonical_name();
            let output = there.canonical_name();
            let event = match signal {
                ConnectorSignal::ConnectionClosed => ContainerEvent::ConnectionClosed { input, output },
                _ => ContainerEvent::ConnectionEstablished { input, output },
            };
            container.publish(event);
        })
    }

    fn publish(&self, event: ContainerEvent) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    source = %self.log_source(),
                    "Event listener is full, dropping {:?}",
                    event
                );
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

fn release(subscriptions: Vec<Subscription>) {
    for subscription in subscriptions {
        if let Some(connector) = subscription.connector.upgrade() {
            connector.unsubscribe_signal(subscription.signal, subscription.id);
        }
    }
}

impl fmt::Debug for ModuleContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContainer")
            .field("name", &self.name)
            .field("modules", &self.len())
            .finish()
    }
}
