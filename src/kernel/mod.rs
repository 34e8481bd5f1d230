//! Module connector kernel.
//!
//! Modules exchange data through connectors. An output connector may feed
//! any number of input connectors; an input connector listens to at most one
//! output. Edges are created and removed at runtime from any thread, and
//! connectors report every change through synchronous signals.
//!
//! ```text
//! ┌──────────────┐  ConnectionEstablished  ┌──────────────┐
//! │ src:out      │ ──────────────────────► │ dst:in       │
//! │ (Output)     │  DataChanged(None, out) │ (Input)      │
//! │              │ ──────────────────────► │ updated=true │──► Module::state()
//! └──────────────┘                         └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`connector`]: the base protocol (connect, disconnect, symmetry checks)
//! - [`input`] / [`output`]: role-specific behavior and typed views
//! - [`module`]: connector owners and their notifiers
//! - [`container`]: module registry and topology event feed
//! - [`combiner`]: deferred connect/disconnect actions
//! - [`data_input`]: inputs of data-loading modules

pub mod combiner;
pub mod condition;
pub mod connector;
pub mod container;
pub mod data_input;
pub mod error;
mod gate;
pub mod id;
pub mod input;
pub mod module;
pub mod output;
pub mod signal;
pub mod transfer;

pub use combiner::{ApplyCombiner, Combiner, ConnectorEndpoint, DisconnectCombiner};
pub use condition::{Condition, ConditionSet};
pub use connector::{Connector, ConnectorRef};
pub use container::{ContainerEvent, ModuleContainer, TopologySnapshot};
pub use data_input::{
    DataModule, DataModuleInput, DataModuleInputFile, DataModuleInputFilter,
    DataModuleInputFilterFile,
};
pub use error::{ConnectorError, ConnectorResult};
pub use id::{ConnectorId, SubscriptionId};
pub use input::{InputConnector, InputData};
pub use module::{Module, ModuleNotifier, NoopNotifier};
pub use output::{OutputConnector, OutputData, Payload};
pub use signal::{ConnectorSignal, SignalHandler};
pub use transfer::{ConnectorKind, TransferType};
