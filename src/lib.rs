//! # modflow: module connector kernel
//!
//! Modules in a dataflow graph exchange data through named connectors. This
//! crate implements the connector protocol: creating and removing edges
//! between inputs and outputs from any thread, keeping both ends of every
//! edge consistent, and telling modules when their inputs change.
//!
//! ## Architecture
//!
//! - **Connectors**: `Input` and `Output` endpoints owned by a module
//! - **Signals**: synchronous observer lists for established/closed/data-changed
//! - **Conditions**: wake module threads waiting for new data
//! - **Containers**: group modules and publish topology events over crossbeam channels
//! - **Combiners**: deferred connect/disconnect actions resolved against the live graph
//!
//! ## Configuration
//!
//! Kernel settings are stored as TOML in the platform-appropriate data
//! directory under `dev.modflow.kernel` (see [`config`]).
//!
//! ## Example
//!
//! ```
//! use modflow::kernel::{InputData, Module, NoopNotifier, OutputData};
//! use std::sync::Arc;
//!
//! let source = Module::new("source", "", Arc::new(NoopNotifier));
//! let sink = Module::new("sink", "", Arc::new(NoopNotifier));
//! let out = OutputData::<u32>::create(&source, "out", "").unwrap();
//! let input = InputData::<u32>::create(&sink, "in", "").unwrap();
//!
//! out.connect(&input, false).unwrap();
//! out.update_data(Arc::new(7));
//! assert_eq!(input.data(true).as_deref(), Some(&7));
//! ```

pub mod config;
pub mod error;
pub mod kernel;

// Re-export commonly used types
pub use config::KernelConfig;
pub use error::{KernelError, Result, ResultExt};
pub use kernel::{
    ConnectorError, ConnectorRef, InputConnector, InputData, Module, ModuleContainer,
    ModuleNotifier, OutputConnector, OutputData,
};
