//! Input connectors.
//!
//! An input accepts at most one partner. While connected it listens to the
//! partner's `DataChanged` signal and re-emits it as its own, with itself as
//! the receiver, so module handlers see `(input, output)`. Each forwarded
//! change also sets the `updated` flag and notifies the input's
//! data-changed condition.

use crate::error::Result;
use crate::kernel::condition::Condition;
use crate::kernel::connector::{Connector, ConnectorRef};
use crate::kernel::error::ConnectorResult;
use crate::kernel::module::Module;
use crate::kernel::signal::ConnectorSignal;
use crate::kernel::transfer::TransferType;
use crate::kernel::id::SubscriptionId;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Mutable state only inputs carry.
#[derive(Default)]
pub(crate) struct InputState {
    updated: Mutex<bool>,
    /// Partner whose `DataChanged` we listen to, and the token to undo it.
    upstream: Mutex<Option<(Weak<Connector>, SubscriptionId)>>,
    /// Nesting depth of in-flight disconnects.
    disconnecting: AtomicUsize,
}

impl InputState {
    fn set_updated(&self) {
        *self.updated.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    fn updated(&self) -> bool {
        *self.updated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handled_update(&self) -> bool {
        std::mem::take(&mut *self.updated.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn begin_disconnecting(&self) {
        self.disconnecting.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_disconnecting(&self) {
        let _ = self
            .disconnecting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst) > 0
    }

    #[cfg(test)]
    pub(crate) fn lock_upstream(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<(Weak<Connector>, SubscriptionId)>> {
        self.upstream.lock().unwrap()
    }
}

/// Record a data change coming from `sender` and pass it on.
fn forward_data_change(input: &ConnectorRef, sender: &ConnectorRef) {
    if let Some(state) = input.input_state() {
        state.set_updated();
    }
    input.signals().data_changed.emit(Some(input), sender);
    input.data_changed_condition().notify();
}

/// Subscribe the handlers every input needs for itself.
pub(crate) fn subscribe_internal(input: &ConnectorRef) -> ConnectorResult<()> {
    let weak = Arc::downgrade(input);
    input.subscribe_signal(
        ConnectorSignal::ConnectionEstablished,
        Arc::new(move |_, there| {
            if let Some(input) = weak.upgrade() {
                forward_data_change(&input, there);
            }
        }),
    )?;

    let weak = Arc::downgrade(input);
    input.subscribe_signal(
        ConnectorSignal::ConnectionClosed,
        Arc::new(move |_, _| {
            if let Some(input) = weak.upgrade() {
                if let Some(state) = input.input_state() {
                    state.set_updated();
                }
                input.data_changed_condition().notify();
            }
        }),
    )?;
    Ok(())
}

pub(crate) fn connect_signals(
    input: &ConnectorRef,
    state: &InputState,
    output: &ConnectorRef,
) -> std::result::Result<(), String> {
    let weak = Arc::downgrade(input);
    let id = output.signals().data_changed.connect(Arc::new(move |_, sender| {
        if let Some(input) = weak.upgrade() {
            forward_data_change(&input, sender);
        }
    }))?;

    let mut upstream = state
        .upstream
        .lock()
        .map_err(|e| format!("Failed to acquire upstream lock: {}", e))?;
    if let Some((previous, token)) = upstream.replace((Arc::downgrade(output), id)) {
        if let Some(previous) = previous.upgrade() {
            previous.signals().data_changed.disconnect(token)?;
        }
    }
    Ok(())
}

pub(crate) fn disconnect_signals(
    state: &InputState,
    output: &Connector,
) -> std::result::Result<(), String> {
    let mut upstream = state
        .upstream
        .lock()
        .map_err(|e| format!("Failed to acquire upstream lock: {}", e))?;
    let matches = upstream
        .as_ref()
        .is_some_and(|(peer, _)| std::ptr::eq(peer.as_ptr(), output));
    if matches {
        if let Some((_, token)) = upstream.take() {
            output.signals().data_changed.disconnect(token)?;
        }
    }
    Ok(())
}

/// A connector known to be an input.
#[derive(Clone)]
pub struct InputConnector(pub(crate) ConnectorRef);

impl InputConnector {
    pub fn connector(&self) -> &ConnectorRef {
        &self.0
    }

    fn state(&self) -> Option<&InputState> {
        self.0.input_state()
    }

    /// Whether new data arrived since the last `handled_update`.
    pub fn updated(&self) -> bool {
        self.state().is_some_and(InputState::updated)
    }

    pub fn set_updated(&self) {
        if let Some(state) = self.state() {
            state.set_updated();
        }
    }

    /// Clear the update flag, returning its previous value.
    pub fn handled_update(&self) -> bool {
        self.state().is_some_and(InputState::handled_update)
    }

    /// True while a disconnect involving this input is in progress.
    pub fn is_disconnecting(&self) -> bool {
        self.state().is_some_and(InputState::disconnecting)
    }

    pub fn condition(&self) -> Arc<Condition> {
        self.0.data_changed_condition()
    }
}

impl Deref for InputConnector {
    type Target = ConnectorRef;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for InputConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputConnector").field(&self.0).finish()
    }
}

/// Typed view of an input receiving `T` from its partner output.
pub struct InputData<T> {
    input: InputConnector,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> InputData<T> {
    /// Create the input and register it with `module`.
    pub fn create(module: &Arc<Module>, name: &str, description: &str) -> Result<Self> {
        let input = module.add_input(name, description, Some(TransferType::of::<T>()))?;
        Ok(Self {
            input,
            _marker: PhantomData,
        })
    }

    /// Current data of the connected output.
    ///
    /// Returns `None` when unconnected, while a disconnect is in progress,
    /// when the output has no data, or when the data is not a `T`. With
    /// `reset` the update flag is cleared.
    pub fn data(&self, reset: bool) -> Option<Arc<T>> {
        if reset {
            self.input.handled_update();
        }
        if self.input.is_disconnecting() {
            return None;
        }
        let output = self.input.first_peer()?;
        output.output_state()?.data()?.downcast::<T>().ok()
    }

    pub fn input(&self) -> &InputConnector {
        &self.input
    }
}

impl<T> Clone for InputData<T> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for InputData<T> {
    type Target = InputConnector;

    fn deref(&self) -> &Self::Target {
        &self.input
    }
}
