//! Synchronous observer lists for connector events.
//!
//! Handlers run on the emitting thread before the triggering call returns.
//! `emit` snapshots the handler list and releases its lock before invoking
//! anything, so a handler may subscribe, unsubscribe, or call back into the
//! connector (`is_connected`, `connect`, ...) without deadlocking.

use crate::kernel::connector::ConnectorRef;
use crate::kernel::id::SubscriptionId;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// Events a connector can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorSignal {
    ConnectionEstablished,
    ConnectionClosed,
    DataChanged,
}

impl ConnectorSignal {
    pub const ALL: [ConnectorSignal; 3] = [
        ConnectorSignal::ConnectionEstablished,
        ConnectorSignal::ConnectionClosed,
        ConnectorSignal::DataChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorSignal::ConnectionEstablished => "connection_established",
            ConnectorSignal::ConnectionClosed => "connection_closed",
            ConnectorSignal::DataChanged => "data_changed",
        }
    }
}

impl fmt::Display for ConnectorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectorSignal::ALL
            .into_iter()
            .find(|signal| signal.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown signal \"{}\"", s))
    }
}

/// Handler invoked with `(receiver, sender)`.
///
/// For `ConnectionEstablished` and `ConnectionClosed` the receiver is the
/// connector emitting the signal ("here") and the sender its partner
/// ("there"). An output broadcasting `DataChanged` passes no receiver; the
/// input forwarding it fills itself in.
pub type SignalHandler = Arc<dyn Fn(Option<&ConnectorRef>, &ConnectorRef) + Send + Sync>;

/// Observer list for one signal kind.
#[derive(Default)]
pub struct Signal {
    slots: RwLock<Vec<(SubscriptionId, SignalHandler)>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Fails only if the slot list lock is poisoned.
    pub fn connect(&self, handler: SignalHandler) -> Result<SubscriptionId, String> {
        let id = SubscriptionId::next();
        self.slots
            .write()
            .map_err(|e| format!("Failed to acquire signal lock: {}", e))?
            .push((id, handler));
        Ok(id)
    }

    /// Remove a handler by its token. Returns whether it was registered.
    pub fn disconnect(&self, id: SubscriptionId) -> Result<bool, String> {
        let mut slots = self
            .slots
            .write()
            .map_err(|e| format!("Failed to acquire signal lock: {}", e))?;
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        Ok(slots.len() != before)
    }

    pub fn disconnect_all(&self) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler in registration order.
    pub fn emit(&self, receiver: Option<&ConnectorRef>, sender: &ConnectorRef) {
        let handlers: Vec<SignalHandler> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler(receiver, sender);
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.len()).finish()
    }
}

/// The three observer lists every connector carries.
#[derive(Debug, Default)]
pub struct ConnectorSignals {
    pub established: Signal,
    pub closed: Signal,
    pub data_changed: Signal,
}

impl ConnectorSignals {
    pub fn get(&self, signal: ConnectorSignal) -> &Signal {
        match signal {
            ConnectorSignal::ConnectionEstablished => &self.established,
            ConnectorSignal::ConnectionClosed => &self.closed,
            ConnectorSignal::DataChanged => &self.data_changed,
        }
    }

    pub fn clear(&self) {
        self.established.disconnect_all();
        self.closed.disconnect_all();
        self.data_changed.disconnect_all();
    }
}
