//! Deferred connect/disconnect actions.
//!
//! A combiner names two endpoints by module and connector name and performs
//! an operation on them later. Modules are held weakly: if either module is
//! gone by the time the combiner is applied, the action is skipped.

use crate::kernel::connector::{Connector, ConnectorRef};
use crate::kernel::error::ConnectorResult;
use crate::kernel::module::Module;
use std::fmt;
use std::sync::{Arc, Weak};

/// An action on a pair of connectors.
pub trait Combiner: Send + Sync {
    fn apply(&self) -> ConnectorResult<()>;
}

/// A connector addressed through its module.
#[derive(Clone)]
pub struct ConnectorEndpoint {
    module: Weak<Module>,
    module_name: String,
    connector: String,
}

impl ConnectorEndpoint {
    pub fn new(module: &Arc<Module>, connector: impl Into<String>) -> Self {
        Self {
            module: Arc::downgrade(module),
            module_name: module.name().to_string(),
            connector: connector.into(),
        }
    }

    pub fn from_connector(connector: &Connector) -> Self {
        Self {
            module: connector.module_weak(),
            module_name: connector.module_name().to_string(),
            connector: connector.name().to_string(),
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn connector_name(&self) -> &str {
        &self.connector
    }

    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// The connector, if its module is still alive and still provides it.
    pub fn resolve(&self) -> Option<ConnectorRef> {
        self.module.upgrade()?.find_connector(&self.connector)
    }
}

impl fmt::Display for ConnectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_name, self.connector)
    }
}

impl fmt::Debug for ConnectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectorEndpoint({})", self)
    }
}

/// Removes the edge between `source` and `target`.
#[derive(Debug, Clone)]
pub struct DisconnectCombiner {
    source: ConnectorEndpoint,
    target: ConnectorEndpoint,
}

impl DisconnectCombiner {
    pub fn new(
        source_module: &Arc<Module>,
        source_connector: &str,
        target_module: &Arc<Module>,
        target_connector: &str,
    ) -> Self {
        Self {
            source: ConnectorEndpoint::new(source_module, source_connector),
            target: ConnectorEndpoint::new(target_module, target_connector),
        }
    }

    pub fn from_connectors(source: &Connector, target: &Connector) -> Self {
        Self {
            source: ConnectorEndpoint::from_connector(source),
            target: ConnectorEndpoint::from_connector(target),
        }
    }

    pub fn source(&self) -> &ConnectorEndpoint {
        &self.source
    }

    pub fn target(&self) -> &ConnectorEndpoint {
        &self.target
    }
}

impl Combiner for DisconnectCombiner {
    fn apply(&self) -> ConnectorResult<()> {
        let (Some(source), Some(target)) = (self.source.resolve(), self.target.resolve()) else {
            tracing::info!(
                "Skipping disconnect of {} from {}: endpoint no longer exists",
                self.target,
                self.source
            );
            return Ok(());
        };
        source.disconnect(&target, true)
    }
}

impl fmt::Display for DisconnectCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -x- {}", self.source, self.target)
    }
}

/// Connects `source` to `target`.
#[derive(Debug, Clone)]
pub struct ApplyCombiner {
    source: ConnectorEndpoint,
    target: ConnectorEndpoint,
    force: bool,
}

impl ApplyCombiner {
    pub fn new(
        source_module: &Arc<Module>,
        source_connector: &str,
        target_module: &Arc<Module>,
        target_connector: &str,
    ) -> Self {
        Self {
            source: ConnectorEndpoint::new(source_module, source_connector),
            target: ConnectorEndpoint::new(target_module, target_connector),
            force: false,
        }
    }

    /// Skip the payload type check when applied.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn source(&self) -> &ConnectorEndpoint {
        &self.source
    }

    pub fn target(&self) -> &ConnectorEndpoint {
        &self.target
    }

    /// Every edge that could be made from an output of `source` to an input
    /// of `target`. Pairs already connected are left out.
    pub fn create_combiner_list(source: &Arc<Module>, target: &Arc<Module>) -> Vec<ApplyCombiner> {
        let inputs = target.input_connectors();
        let mut combiners = Vec::new();
        for output in source.output_connectors() {
            for input in &inputs {
                if !(output.connectable(input) && input.connectable(&output)) {
                    continue;
                }
                if output.is_connected_to(input).unwrap_or(false) {
                    continue;
                }
                combiners.push(ApplyCombiner::new(
                    source,
                    output.name(),
                    target,
                    input.name(),
                ));
            }
        }
        combiners
    }
}

impl Combiner for ApplyCombiner {
    fn apply(&self) -> ConnectorResult<()> {
        let (Some(source), Some(target)) = (self.source.resolve(), self.target.resolve()) else {
            tracing::info!(
                "Skipping connect of {} with {}: endpoint no longer exists",
                self.target,
                self.source
            );
            return Ok(());
        };
        source.connect(&target, self.force)
    }
}

impl fmt::Display for ApplyCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
