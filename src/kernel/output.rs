//! Output connectors.
//!
//! An output stores the most recent payload and broadcasts `DataChanged` to
//! every connected input when it changes. Outputs may fan out to any number
//! of inputs.

use crate::error::Result;
use crate::kernel::connector::ConnectorRef;
use crate::kernel::module::Module;
use crate::kernel::transfer::TransferType;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

/// Type-erased payload held by an output.
pub type Payload = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub(crate) struct OutputState {
    data: RwLock<Option<Payload>>,
}

impl OutputState {
    pub(crate) fn data(&self) -> Option<Payload> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_data(&self, data: Option<Payload>) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
    }
}

/// A connector known to be an output.
#[derive(Clone)]
pub struct OutputConnector(pub(crate) ConnectorRef);

impl OutputConnector {
    pub fn connector(&self) -> &ConnectorRef {
        &self.0
    }

    /// Tell every connected input that the data changed.
    pub fn propagate_data_change(&self) {
        tracing::debug!(
            source = %self.0.log_source(),
            "Propagating data change of {} to {} input(s)",
            self.0.canonical_name(),
            self.0.is_connected()
        );
        self.0.signals().data_changed.emit(None, &self.0);
    }

    pub fn raw_data(&self) -> Option<Payload> {
        self.0.output_state().and_then(OutputState::data)
    }

    /// Replace the stored payload and propagate the change.
    pub fn update_raw_data(&self, data: Option<Payload>) {
        if let Some(state) = self.0.output_state() {
            state.set_data(data);
        }
        self.propagate_data_change();
    }
}

impl Deref for OutputConnector {
    type Target = ConnectorRef;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for OutputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputConnector").field(&self.0).finish()
    }
}

/// Typed view of an output producing `T`.
pub struct OutputData<T> {
    output: OutputConnector,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> OutputData<T> {
    /// Create the output and register it with `module`.
    pub fn create(module: &Arc<Module>, name: &str, description: &str) -> Result<Self> {
        let output = module.add_output(name, description, Some(TransferType::of::<T>()))?;
        Ok(Self {
            output,
            _marker: PhantomData,
        })
    }

    pub fn update_data(&self, data: Arc<T>) {
        let payload: Payload = data;
        self.output.update_raw_data(Some(payload));
    }

    /// Drop the stored payload. Connected inputs are told about it.
    pub fn clear_data(&self) {
        self.output.update_raw_data(None);
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.output.raw_data()?.downcast::<T>().ok()
    }

    pub fn output(&self) -> &OutputConnector {
        &self.output
    }
}

impl<T> Clone for OutputData<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for OutputData<T> {
    type Target = OutputConnector;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}
