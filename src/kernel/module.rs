//! Modules own connectors.
//!
//! A module is a named processing unit with a set of input and output
//! connectors. It reacts to connector events through a [`ModuleNotifier`]
//! and waits for work on its [`ConditionSet`], which every input's
//! data-changed condition is part of.

use crate::error::{KernelError, Result};
use crate::kernel::combiner::DisconnectCombiner;
use crate::kernel::condition::ConditionSet;
use crate::kernel::connector::{Connector, ConnectorRef};
use crate::kernel::container::ModuleContainer;
use crate::kernel::input::InputConnector;
use crate::kernel::output::OutputConnector;
use crate::kernel::signal::{ConnectorSignal, SignalHandler};
use crate::kernel::transfer::{ConnectorKind, TransferType};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Module-side reactions to connector events.
///
/// `here` is the module's own connector, `there` its partner. All methods
/// default to doing nothing.
pub trait ModuleNotifier: Send + Sync {
    fn connection_established(&self, _here: &ConnectorRef, _there: &ConnectorRef) {}

    fn connection_closed(&self, _here: &ConnectorRef, _there: &ConnectorRef) {}

    /// An input received new data from `output`.
    fn data_changed(&self, _input: &ConnectorRef, _output: &ConnectorRef) {}
}

/// Notifier for modules that only poll their inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ModuleNotifier for NoopNotifier {}

pub struct Module {
    name: String,
    description: String,
    notifier: Arc<dyn ModuleNotifier>,
    inputs: RwLock<Vec<InputConnector>>,
    outputs: RwLock<Vec<OutputConnector>>,
    container: RwLock<Weak<ModuleContainer>>,
    state: ConditionSet,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        notifier: Arc<dyn ModuleNotifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            description: description.into(),
            notifier,
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            container: RwLock::new(Weak::new()),
            state: ConditionSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Conditions this module's main loop waits on.
    pub fn state(&self) -> &ConditionSet {
        &self.state
    }

    pub fn container(&self) -> Option<Arc<ModuleContainer>> {
        self.container
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Associate with `container` unless a live container already owns this
    /// module. The check and the update happen under one lock.
    pub(crate) fn claim_container(
        &self,
        container: &Weak<ModuleContainer>,
    ) -> std::result::Result<(), Arc<ModuleContainer>> {
        let mut slot = self
            .container
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = slot.upgrade() {
            return Err(owner);
        }
        *slot = container.clone();
        Ok(())
    }

    pub(crate) fn set_container(&self, container: Weak<ModuleContainer>) {
        *self
            .container
            .write()
            .unwrap_or_else(PoisonError::into_inner) = container;
    }

    pub fn add_input(
        self: &Arc<Self>,
        name: &str,
        description: &str,
        transfer: Option<TransferType>,
    ) -> Result<InputConnector> {
        let mut inputs = self.inputs.write().unwrap_or_else(PoisonError::into_inner);
        let outputs = self
            .outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if inputs.iter().any(|c| c.name() == name) || outputs.iter().any(|c| c.name() == name) {
            return Err(KernelError::NameNotUnique(format!("{}:{}", self.name, name)));
        }

        let connector =
            Connector::create(self, name, description, ConnectorKind::Input, transfer)?;
        let input = InputConnector(connector);
        self.state.add(input.condition());
        inputs.push(input.clone());
        tracing::debug!("Added input {} to module {}", name, self.name);
        Ok(input)
    }

    pub fn add_output(
        self: &Arc<Self>,
        name: &str,
        description: &str,
        transfer: Option<TransferType>,
    ) -> Result<OutputConnector> {
        let inputs = self.inputs.read().unwrap_or_else(PoisonError::into_inner);
        let mut outputs = self
            .outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if inputs.iter().any(|c| c.name() == name) || outputs.iter().any(|c| c.name() == name) {
            return Err(KernelError::NameNotUnique(format!("{}:{}", self.name, name)));
        }

        let connector =
            Connector::create(self, name, description, ConnectorKind::Output, transfer)?;
        let output = OutputConnector(connector);
        outputs.push(output.clone());
        tracing::debug!("Added output {} to module {}", name, self.name);
        Ok(output)
    }

    pub fn input_connectors(&self) -> Vec<InputConnector> {
        self.inputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn output_connectors(&self) -> Vec<OutputConnector> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Inputs first, then outputs, each in creation order.
    pub fn connectors(&self) -> Vec<ConnectorRef> {
        let mut all: Vec<ConnectorRef> = self
            .input_connectors()
            .into_iter()
            .map(|c| c.0)
            .collect();
        all.extend(self.output_connectors().into_iter().map(|c| c.0));
        all
    }

    /// Look up a connector by plain name or canonical `module:connector` name.
    pub fn find_connector(&self, name: &str) -> Option<ConnectorRef> {
        let plain = name
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(name);
        self.connectors().into_iter().find(|c| c.name() == plain)
    }

    pub fn find_input_connector(&self, name: &str) -> Option<InputConnector> {
        self.find_connector(name).and_then(|c| c.to_input())
    }

    pub fn find_output_connector(&self, name: &str) -> Option<OutputConnector> {
        self.find_connector(name).and_then(|c| c.to_output())
    }

    /// Like `find_connector`, failing with `ConnectorNotFound`.
    pub fn get_connector(&self, name: &str) -> Result<ConnectorRef> {
        self.find_connector(name)
            .ok_or_else(|| KernelError::ConnectorNotFound {
                module: self.name.clone(),
                connector: name.to_string(),
            })
    }

    /// The handler a connector subscribes on construction for `signal`.
    pub fn signal_handler(&self, signal: ConnectorSignal) -> SignalHandler {
        let notifier = self.notifier.clone();
        match signal {
            ConnectorSignal::ConnectionEstablished => Arc::new(move |here, there| {
                if let Some(here) = here {
                    notifier.connection_established(here, there);
                }
            }),
            ConnectorSignal::ConnectionClosed => Arc::new(move |here, there| {
                if let Some(here) = here {
                    notifier.connection_closed(here, there);
                }
            }),
            ConnectorSignal::DataChanged => Arc::new(move |input, output| {
                if let Some(input) = input {
                    notifier.data_changed(input, output);
                }
            }),
        }
    }

    /// Drop every edge of every connector. Returns the first failure after
    /// all connectors have been processed.
    pub fn disconnect(&self) -> Result<()> {
        let mut first_error = None;
        for connector in self.connectors() {
            if let Err(e) = connector.disconnect_all() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Disconnect combiners grouped by own connector. Connectors without
    /// edges are left out.
    pub fn possible_disconnections(&self) -> Vec<(ConnectorRef, Vec<DisconnectCombiner>)> {
        self.connectors()
            .into_iter()
            .filter_map(|connector| {
                let combiners = connector.possible_disconnections();
                (!combiners.is_empty()).then_some((connector, combiners))
            })
            .collect()
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        let inputs = std::mem::take(self.inputs.get_mut().unwrap_or_else(PoisonError::into_inner));
        let outputs =
            std::mem::take(self.outputs.get_mut().unwrap_or_else(PoisonError::into_inner));
        let connectors = inputs
            .into_iter()
            .map(|c| c.0)
            .chain(outputs.into_iter().map(|c| c.0));
        for connector in connectors {
            if let Err(e) = connector.disconnect_all() {
                tracing::warn!("Module {} left an edge behind: {}", self.name, e);
            }
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("inputs", &self.input_connectors().len())
            .field("outputs", &self.output_connectors().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ModuleNotifier for Recorder {
        fn connection_established(&self, here: &ConnectorRef, there: &ConnectorRef) {
            self.events
                .lock()
                .unwrap()
                .push(format!("established {} {}", here, there));
        }

        fn connection_closed(&self, here: &ConnectorRef, there: &ConnectorRef) {
            self.events
                .lock()
                .unwrap()
                .push(format!("closed {} {}", here, there));
        }

        fn data_changed(&self, input: &ConnectorRef, output: &ConnectorRef) {
            self.events
                .lock()
                .unwrap()
                .push(format!("data {} {}", input, output));
        }
    }

    #[test]
    fn test_connector_names_are_unique() {
        let module = Module::new("m", "", Arc::new(NoopNotifier));
        module.add_input("a", "", None).unwrap();
        let err = module.add_output("a", "", None).unwrap_err();
        assert!(matches!(err, KernelError::NameNotUnique(ref n) if n == "m:a"));
    }

    #[test]
    fn test_find_by_plain_and_canonical_name() {
        let module = Module::new("reader", "", Arc::new(NoopNotifier));
        module.add_output("out", "", None).unwrap();
        assert!(module.find_connector("out").is_some());
        assert!(module.find_connector("reader:out").is_some());
        assert!(module.find_output_connector("out").is_some());
        assert!(module.find_input_connector("out").is_none());
        assert!(matches!(
            module.get_connector("missing"),
            Err(KernelError::ConnectorNotFound { .. })
        ));
    }

    #[test]
    fn test_notifier_sees_events_in_order() {
        let recorder = Arc::new(Recorder::default());
        let src = Module::new("src", "", Arc::new(NoopNotifier));
        let dst = Module::new("dst", "", recorder.clone());
        let out = src.add_output("out", "", None).unwrap();
        let inp = dst.add_input("in", "", None).unwrap();

        out.connect(&inp, false).unwrap();
        out.propagate_data_change();
        dst.disconnect().unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "data dst:in src:out",
                "established dst:in src:out",
                "data dst:in src:out",
                "closed dst:in src:out",
            ]
        );
    }

    #[test]
    fn test_drop_disconnects_peers() {
        let src = Module::new("src", "", Arc::new(NoopNotifier));
        let dst = Module::new("dst", "", Arc::new(NoopNotifier));
        let out = src.add_output("out", "", None).unwrap();
        let inp = dst.add_input("in", "", None).unwrap();
        out.connect(&inp, false).unwrap();

        drop(out);
        drop(src);
        assert_eq!(inp.is_connected(), 0);
    }

    #[test]
    fn test_inputs_join_module_state() {
        let module = Module::new("m", "", Arc::new(NoopNotifier));
        module.add_input("a", "", None).unwrap();
        module.add_input("b", "", None).unwrap();
        module.add_output("c", "", None).unwrap();
        assert_eq!(module.state().len(), 2);
    }
}
