//! The connector protocol.
//!
//! A [`Connector`] is a named endpoint owned by a [`Module`]. Edges are
//! undirected at the storage level: each endpoint keeps its partner in its own
//! connection list, and an edge only exists when both lists agree.
//!
//! Locking rules:
//!
//! - When both lists must be held, they are locked in ascending
//!   [`ConnectorId`] order regardless of which side initiated the call.
//! - No list lock is held while signal handlers run.
//! - `connect` and `disconnect` additionally hold the [`EdgeGate`] of both
//!   endpoints, in the same order, for their whole duration. The gate is
//!   re-entrant, so handlers may operate on the same connectors.
//!
//! Connectors hold strong references to their partners. The cycle is broken
//! when either side disconnects; modules disconnect all of their connectors
//! when dropped.

use crate::kernel::combiner::DisconnectCombiner;
use crate::kernel::condition::Condition;
use crate::kernel::error::{ConnectorError, ConnectorResult};
use crate::kernel::gate::{EdgeGate, GateGuard};
use crate::kernel::id::{ConnectorId, SubscriptionId};
use crate::kernel::input::{self, InputConnector, InputState};
use crate::kernel::module::Module;
use crate::kernel::output::{OutputConnector, OutputState};
use crate::kernel::signal::{ConnectorSignal, ConnectorSignals, SignalHandler};
use crate::kernel::transfer::{ConnectorKind, TransferType};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Shared handle to a connector.
pub type ConnectorRef = Arc<Connector>;

/// Partners of a connector, keyed by id.
pub(crate) type PeerSet = BTreeMap<ConnectorId, ConnectorRef>;

const UNKNOWN_CONTAINER: &str = "Unknown";

pub(crate) enum ConnectorRole {
    Input(InputState),
    Output(OutputState),
}

pub struct Connector {
    id: ConnectorId,
    name: String,
    description: String,
    module_name: String,
    module: Weak<Module>,
    transfer: Option<TransferType>,
    connected: RwLock<PeerSet>,
    gate: EdgeGate,
    signals: ConnectorSignals,
    data_changed: Arc<Condition>,
    role: ConnectorRole,
}

impl Connector {
    /// Build a connector owned by `module` and subscribe the module's default
    /// handlers. Callers register the result with the module.
    pub(crate) fn create(
        module: &Arc<Module>,
        name: &str,
        description: &str,
        kind: ConnectorKind,
        transfer: Option<TransferType>,
    ) -> ConnectorResult<ConnectorRef> {
        let role = match kind {
            ConnectorKind::Input => ConnectorRole::Input(InputState::default()),
            ConnectorKind::Output => ConnectorRole::Output(OutputState::default()),
        };
        let connector = Arc::new(Connector {
            id: ConnectorId::next(),
            name: name.to_string(),
            description: description.to_string(),
            module_name: module.name().to_string(),
            module: Arc::downgrade(module),
            transfer,
            connected: RwLock::new(PeerSet::new()),
            gate: EdgeGate::default(),
            signals: ConnectorSignals::default(),
            data_changed: Arc::new(Condition::new()),
            role,
        });

        if connector.is_input() {
            input::subscribe_internal(&connector)?;
        }
        for signal in [
            ConnectorSignal::ConnectionEstablished,
            ConnectorSignal::ConnectionClosed,
        ] {
            connector.subscribe_signal(signal, connector.signal_handler(signal)?)?;
        }
        if connector.is_input() {
            let handler = connector.signal_handler(ConnectorSignal::DataChanged)?;
            connector.subscribe_signal(ConnectorSignal::DataChanged, handler)?;
        }
        Ok(connector)
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Name of the owning module, captured at construction.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// `"<module>:<connector>"`
    pub fn canonical_name(&self) -> String {
        format!("{}:{}", self.module_name, self.name)
    }

    pub fn kind(&self) -> ConnectorKind {
        match self.role {
            ConnectorRole::Input(_) => ConnectorKind::Input,
            ConnectorRole::Output(_) => ConnectorKind::Output,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.role, ConnectorRole::Input(_))
    }

    pub fn is_output(&self) -> bool {
        matches!(self.role, ConnectorRole::Output(_))
    }

    pub fn transfer_type(&self) -> Option<&TransferType> {
        self.transfer.as_ref()
    }

    /// Resolve the owning module.
    pub fn module(&self) -> ConnectorResult<Arc<Module>> {
        self.module
            .upgrade()
            .ok_or_else(|| ConnectorError::ModuleLockFailed {
                connector: self.canonical_name(),
            })
    }

    pub(crate) fn module_weak(&self) -> Weak<Module> {
        self.module.clone()
    }

    /// Condition notified whenever this connector's data changes.
    pub fn data_changed_condition(&self) -> Arc<Condition> {
        self.data_changed.clone()
    }

    pub(crate) fn signals(&self) -> &ConnectorSignals {
        &self.signals
    }

    pub(crate) fn input_state(&self) -> Option<&InputState> {
        match &self.role {
            ConnectorRole::Input(state) => Some(state),
            ConnectorRole::Output(_) => None,
        }
    }

    pub(crate) fn output_state(&self) -> Option<&OutputState> {
        match &self.role {
            ConnectorRole::Output(state) => Some(state),
            ConnectorRole::Input(_) => None,
        }
    }

    pub fn to_input(self: &Arc<Self>) -> Option<InputConnector> {
        self.is_input().then(|| InputConnector(self.clone()))
    }

    pub fn to_output(self: &Arc<Self>) -> Option<OutputConnector> {
        self.is_output().then(|| OutputConnector(self.clone()))
    }

    /// Strict compatibility: opposite kinds and matching payload types.
    pub fn connectable(&self, peer: &Connector) -> bool {
        self.lazy_connectable(peer)
            && TransferType::compatible(self.transfer.as_ref(), peer.transfer.as_ref())
    }

    /// Loose compatibility: opposite kinds only.
    pub fn lazy_connectable(&self, peer: &Connector) -> bool {
        self.kind() == peer.kind().opposite()
    }

    /// Number of partners. A poisoned list is still readable.
    pub fn is_connected(&self) -> usize {
        self.read_list().len()
    }

    /// Snapshot of the current partners.
    pub fn peers(&self) -> Vec<ConnectorRef> {
        self.read_list().values().cloned().collect()
    }

    pub(crate) fn first_peer(&self) -> Option<ConnectorRef> {
        self.read_list().values().next().cloned()
    }

    /// Whether `peer` is a partner. Both lists are consulted; a one-sided
    /// record is reported as [`ConnectorError::ConnectionInvalid`].
    pub fn is_connected_to(&self, peer: &Connector) -> ConnectorResult<bool> {
        if self.id == peer.id {
            return Ok(false);
        }
        let (mine, theirs) = read_pair(self, peer);
        let forward = mine.contains_key(&peer.id);
        let backward = theirs.contains_key(&self.id);
        drop(mine);
        drop(theirs);

        if forward != backward {
            return Err(self.report(ConnectorError::ConnectionInvalid {
                here: self.canonical_name(),
                there: peer.canonical_name(),
            }));
        }
        Ok(forward)
    }

    /// Connect to `peer`. With `force`, only the kinds are checked.
    ///
    /// Connecting an already connected pair is a successful no-op and fires
    /// no signals. On success `ConnectionEstablished` fires on this side,
    /// then on `peer`.
    pub fn connect(self: &Arc<Self>, peer: &ConnectorRef, force: bool) -> ConnectorResult<()> {
        let source = self.log_source();
        tracing::info!(
            source = %source,
            "Connecting {} with {}",
            peer.canonical_name(),
            self.canonical_name()
        );

        let compatible = if force {
            peer.lazy_connectable(self) && self.lazy_connectable(peer)
        } else {
            peer.connectable(self) && self.connectable(peer)
        };
        if !compatible {
            return Err(self.report(ConnectorError::ConnectorsIncompatible {
                here: self.canonical_name(),
                there: peer.canonical_name(),
            }));
        }

        let _gate = enter_pair(self, peer);
        if self.is_connected_to(peer)? || !self.insert_edge(peer)? {
            tracing::info!(
                source = %source,
                "{} and {} are already connected.",
                peer.canonical_name(),
                self.canonical_name()
            );
            return Ok(());
        }

        if let Err(reason) = self
            .connect_signals(peer)
            .and_then(|_| peer.connect_signals(self))
        {
            let _ = self.disconnect_signals(peer);
            let _ = peer.disconnect_signals(self);
            let rollback = self.remove_edge(peer, true);
            let reason = match rollback {
                Ok(_) => reason,
                Err(rollback) => format!("{}; rollback failed: {}", reason, rollback),
            };
            return Err(self.report(self.connection_failed(peer, reason)));
        }

        self.signals.established.emit(Some(self), peer);
        peer.signals.established.emit(Some(peer), self);
        Ok(())
    }

    /// Record the edge on both sides. Returns `false` when another thread
    /// completed the same edge first.
    fn insert_edge(self: &Arc<Self>, peer: &ConnectorRef) -> ConnectorResult<bool> {
        let result = match write_pair(self, peer) {
            Ok((mut mine, mut theirs)) => {
                if mine.contains_key(&peer.id) && theirs.contains_key(&self.id) {
                    Ok(false)
                } else {
                    let linked = link(self, peer, &mut mine, &mut theirs);
                    if linked.is_err() {
                        mine.remove(&peer.id);
                        theirs.remove(&self.id);
                    }
                    linked.map(|_| true)
                }
            }
            Err(reason) => Err(reason),
        };
        result.map_err(|reason| self.report(self.connection_failed(peer, reason)))
    }

    /// Drop the edge. Returns `false` when it was already gone on the
    /// partner's side.
    fn remove_edge(&self, peer: &Connector, remove_from_own_list: bool) -> Result<bool, String> {
        if remove_from_own_list {
            let (mut mine, mut theirs) = write_pair(self, peer)?;
            let removed = theirs.remove(&self.id).is_some();
            mine.remove(&peer.id);
            Ok(removed)
        } else {
            Ok(write_list(peer)?.remove(&self.id).is_some())
        }
    }

    /// Disconnect from `peer`. Disconnecting a pair that is not connected
    /// is a successful no-op.
    ///
    /// With `remove_from_own_list == false` only the partner forgets the
    /// edge. This connector keeps its entry until the next
    /// [`Connector::disconnect_all`] drops it.
    pub fn disconnect(
        self: &Arc<Self>,
        peer: &ConnectorRef,
        remove_from_own_list: bool,
    ) -> ConnectorResult<()> {
        let source = self.log_source();
        let not_connected = || {
            tracing::info!(
                source = %source,
                "Could not disconnect {} from {} as they are not connected.",
                peer.canonical_name(),
                self.canonical_name()
            );
        };

        let _gate = enter_pair(self, peer);
        if !self.is_connected_to(peer)? {
            not_connected();
            return Ok(());
        }

        tracing::info!(
            source = %source,
            "Disconnecting {} from {}",
            peer.canonical_name(),
            self.canonical_name()
        );

        self.begin_disconnecting();
        peer.begin_disconnecting();

        let result = self.remove_edge(peer, remove_from_own_list).and_then(|removed| {
            if removed {
                peer.disconnect_signals(self)
                    .and_then(|_| self.disconnect_signals(peer))?;
            }
            Ok(removed)
        });

        match result {
            Ok(true) => {
                self.signals.closed.emit(Some(self), peer);
                peer.signals.closed.emit(Some(peer), self);
            }
            Ok(false) => not_connected(),
            Err(_) => {}
        }

        peer.end_disconnecting();
        self.end_disconnecting();

        result.map(|_| ()).map_err(|reason| {
            self.report(ConnectorError::DisconnectFailed {
                here: self.canonical_name(),
                there: peer.canonical_name(),
                reason,
            })
        })
    }

    /// Disconnect every partner.
    ///
    /// Only partners present when the call started are released, so an edge
    /// established concurrently survives. Each edge leaves both lists in one
    /// step. The first failure is returned after the remaining partners have
    /// been processed.
    pub fn disconnect_all(self: &Arc<Self>) -> ConnectorResult<()> {
        let peers = self.peers();
        if peers.is_empty() {
            return Ok(());
        }

        self.begin_disconnecting();
        let mut first_error = None;
        for peer in &peers {
            if self.drop_one_sided(peer) {
                continue;
            }
            if let Err(e) = self.disconnect(peer, true) {
                first_error.get_or_insert(e);
            }
        }
        self.end_disconnecting();

        first_error.map_or(Ok(()), Err)
    }

    /// Forget `peer` if it no longer lists this connector.
    fn drop_one_sided(&self, peer: &Connector) -> bool {
        match write_pair(self, peer) {
            Ok((mut mine, theirs)) if !theirs.contains_key(&self.id) => {
                mine.remove(&peer.id).is_some()
            }
            _ => false,
        }
    }

    /// One combiner per partner, each undoing that edge when applied.
    pub fn possible_disconnections(self: &Arc<Self>) -> Vec<DisconnectCombiner> {
        self.peers()
            .iter()
            .map(|peer| DisconnectCombiner::from_connectors(self, peer))
            .collect()
    }

    pub fn subscribe_signal(
        &self,
        signal: ConnectorSignal,
        handler: SignalHandler,
    ) -> ConnectorResult<SubscriptionId> {
        self.signals.get(signal).connect(handler).map_err(|reason| {
            self.report(ConnectorError::SignalSubscriptionFailed {
                connector: self.canonical_name(),
                signal: signal.to_string(),
                reason,
            })
        })
    }

    /// Subscribe by signal name, e.g. `"data_changed"`.
    pub fn subscribe_signal_named(
        &self,
        signal: &str,
        handler: SignalHandler,
    ) -> ConnectorResult<SubscriptionId> {
        let kind = signal.parse::<ConnectorSignal>().map_err(|reason| {
            self.report(ConnectorError::SignalSubscriptionFailed {
                connector: self.canonical_name(),
                signal: signal.to_string(),
                reason,
            })
        })?;
        self.subscribe_signal(kind, handler)
    }

    pub fn unsubscribe_signal(&self, signal: ConnectorSignal, id: SubscriptionId) -> bool {
        self.signals.get(signal).disconnect(id).unwrap_or(false)
    }

    /// The owning module's default handler for `signal`.
    pub fn signal_handler(&self, signal: ConnectorSignal) -> ConnectorResult<SignalHandler> {
        Ok(self.module()?.signal_handler(signal))
    }

    fn connect_signals(self: &Arc<Self>, peer: &ConnectorRef) -> Result<(), String> {
        match &self.role {
            ConnectorRole::Input(state) => input::connect_signals(self, state, peer),
            ConnectorRole::Output(_) => Ok(()),
        }
    }

    fn disconnect_signals(&self, peer: &Connector) -> Result<(), String> {
        match &self.role {
            ConnectorRole::Input(state) => input::disconnect_signals(state, peer),
            ConnectorRole::Output(_) => Ok(()),
        }
    }

    fn begin_disconnecting(&self) {
        if let Some(state) = self.input_state() {
            state.begin_disconnecting();
        }
    }

    fn end_disconnecting(&self) {
        if let Some(state) = self.input_state() {
            state.end_disconnecting();
        }
    }

    fn read_list(&self) -> RwLockReadGuard<'_, PeerSet> {
        self.connected.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_failed(&self, peer: &Connector, reason: String) -> ConnectorError {
        ConnectorError::ConnectionFailed {
            here: self.canonical_name(),
            there: peer.canonical_name(),
            reason,
        }
    }

    /// `"ModuleContainer (<name>)"` for the container this connector lives in.
    pub(crate) fn log_source(&self) -> String {
        let container = self
            .module
            .upgrade()
            .and_then(|module| module.container())
            .map(|container| container.name().to_string())
            .unwrap_or_else(|| UNKNOWN_CONTAINER.to_string());
        format!("ModuleContainer ({})", container)
    }

    /// Log an error on its way to the caller.
    fn report(&self, err: ConnectorError) -> ConnectorError {
        let source = self.log_source();
        match err {
            ConnectorError::ConnectionInvalid { .. } => {
                tracing::error!(source = %source, "{}", err)
            }
            _ => tracing::warn!(source = %source, "{}", err),
        }
        err
    }

    #[cfg(test)]
    pub(crate) fn connected_list(&self) -> &RwLock<PeerSet> {
        &self.connected
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("name", &self.canonical_name())
            .field("kind", &self.kind())
            .field("transfer", &self.transfer)
            .field("connections", &self.is_connected())
            .finish()
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_name, self.name)
    }
}

/// Insert the edge into both lists after checking the input degree limit.
fn link(
    here: &ConnectorRef,
    there: &ConnectorRef,
    mine: &mut PeerSet,
    theirs: &mut PeerSet,
) -> Result<(), String> {
    fn saturated(connector: &Connector, list: &PeerSet, partner: ConnectorId) -> bool {
        connector.is_input() && list.keys().any(|id| *id != partner)
    }
    if saturated(here, mine, there.id) || saturated(there, theirs, here.id) {
        return Err("input connector already connected; disconnect it first".to_string());
    }
    mine.insert(there.id, there.clone());
    theirs.insert(here.id, here.clone());
    Ok(())
}

fn write_list(connector: &Connector) -> Result<RwLockWriteGuard<'_, PeerSet>, String> {
    connector.connected.write().map_err(|e| {
        format!(
            "Failed to acquire connection list lock of {}: {}",
            connector.canonical_name(),
            e
        )
    })
}

/// Enter both edge gates in id order.
fn enter_pair<'a>(a: &'a Connector, b: &'a Connector) -> (GateGuard<'a>, GateGuard<'a>) {
    if a.id < b.id {
        let first = a.gate.enter();
        let second = b.gate.enter();
        (first, second)
    } else {
        let first = b.gate.enter();
        let second = a.gate.enter();
        (second, first)
    }
}

/// Lock both lists for writing in id order. Guards come back in argument order.
fn write_pair<'a>(
    a: &'a Connector,
    b: &'a Connector,
) -> Result<(RwLockWriteGuard<'a, PeerSet>, RwLockWriteGuard<'a, PeerSet>), String> {
    if a.id < b.id {
        let first = write_list(a)?;
        let second = write_list(b)?;
        Ok((first, second))
    } else {
        let first = write_list(b)?;
        let second = write_list(a)?;
        Ok((second, first))
    }
}

fn read_pair<'a>(
    a: &'a Connector,
    b: &'a Connector,
) -> (RwLockReadGuard<'a, PeerSet>, RwLockReadGuard<'a, PeerSet>) {
    if a.id < b.id {
        let first = a.read_list();
        let second = b.read_list();
        (first, second)
    } else {
        let first = b.read_list();
        let second = a.read_list();
        (second, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::module::{Module, NoopNotifier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn module(name: &str) -> Arc<Module> {
        Module::new(name, "test module", Arc::new(NoopNotifier))
    }

    fn pair() -> (Arc<Module>, Arc<Module>, ConnectorRef, ConnectorRef) {
        let src = module("src");
        let dst = module("dst");
        let out = src.add_output("out", "", None).unwrap().connector().clone();
        let inp = dst.add_input("in", "", None).unwrap().connector().clone();
        (src, dst, out, inp)
    }

    #[test]
    fn test_canonical_name_and_kind() {
        let (_src, _dst, out, inp) = pair();
        assert_eq!(out.canonical_name(), "src:out");
        assert_eq!(inp.canonical_name(), "dst:in");
        assert_eq!(out.kind(), ConnectorKind::Output);
        assert!(inp.is_input());
        assert!(inp.to_input().is_some());
        assert!(inp.to_output().is_none());
    }

    #[test]
    fn test_connect_is_symmetric() {
        let (_src, _dst, out, inp) = pair();
        out.connect(&inp, false).unwrap();
        assert!(out.is_connected_to(&inp).unwrap());
        assert!(inp.is_connected_to(&out).unwrap());
        assert_eq!(out.is_connected(), 1);
        assert_eq!(inp.is_connected(), 1);
    }

    #[test]
    fn test_same_kind_is_incompatible() {
        let a = module("a");
        let b = module("b");
        let in_a = a.add_input("in", "", None).unwrap().connector().clone();
        let in_b = b.add_input("in", "", None).unwrap().connector().clone();
        let err = in_a.connect(&in_b, false).unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectorsIncompatible { .. }));
        let err = in_a.connect(&in_b, true).unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectorsIncompatible { .. }));
    }

    #[test]
    fn test_type_mismatch_needs_force() {
        let src = module("src");
        let dst = module("dst");
        let out = src
            .add_output("out", "", Some(TransferType::of::<f64>()))
            .unwrap()
            .connector()
            .clone();
        let inp = dst
            .add_input("in", "", Some(TransferType::of::<String>()))
            .unwrap()
            .connector()
            .clone();

        assert!(!out.connectable(&inp));
        assert!(out.lazy_connectable(&inp));
        assert!(matches!(
            out.connect(&inp, false),
            Err(ConnectorError::ConnectorsIncompatible { .. })
        ));
        out.connect(&inp, true).unwrap();
        assert!(out.is_connected_to(&inp).unwrap());
    }

    #[test]
    fn test_connect_twice_fires_once() {
        let (_src, _dst, out, inp) = pair();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            inp.subscribe_signal(
                ConnectorSignal::ConnectionEstablished,
                Arc::new(move |_, _| {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        }
        out.connect(&inp, false).unwrap();
        inp.connect(&out, false).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(inp.is_connected(), 1);
    }

    #[test]
    fn test_input_accepts_single_peer() {
        let (src, _dst, out, inp) = pair();
        let other = src.add_output("other", "", None).unwrap().connector().clone();
        out.connect(&inp, false).unwrap();

        let err = other.connect(&inp, false).unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectionFailed { .. }));
        assert_eq!(other.is_connected(), 0);
        assert!(inp.is_connected_to(&out).unwrap());
    }

    #[test]
    fn test_output_fans_out() {
        let (_src, dst, out, inp) = pair();
        let second = dst.add_input("second", "", None).unwrap().connector().clone();
        out.connect(&inp, false).unwrap();
        out.connect(&second, false).unwrap();
        assert_eq!(out.is_connected(), 2);
    }

    #[test]
    fn test_disconnect_not_connected_is_noop() {
        let (_src, _dst, out, inp) = pair();
        out.disconnect(&inp, true).unwrap();
        assert_eq!(out.is_connected(), 0);
    }

    #[test]
    fn test_disconnect_fires_closed_on_both_sides() {
        let (_src, _dst, out, inp) = pair();
        let closed = Arc::new(AtomicUsize::new(0));
        for connector in [&out, &inp] {
            let closed = closed.clone();
            connector
                .subscribe_signal(
                    ConnectorSignal::ConnectionClosed,
                    Arc::new(move |_, _| {
                        closed.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        out.connect(&inp, false).unwrap();
        inp.disconnect(&out, true).unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert!(!out.is_connected_to(&inp).unwrap());
    }

    #[test]
    fn test_disconnect_all_clears_every_edge() {
        let (_src, dst, out, inp) = pair();
        let second = dst.add_input("second", "", None).unwrap().connector().clone();
        out.connect(&inp, false).unwrap();
        out.connect(&second, false).unwrap();

        out.disconnect_all().unwrap();
        assert_eq!(out.is_connected(), 0);
        assert_eq!(inp.is_connected(), 0);
        assert_eq!(second.is_connected(), 0);
    }

    #[test]
    fn test_one_sided_edge_is_invalid() {
        let (_src, _dst, out, inp) = pair();
        out.connected_list()
            .write()
            .unwrap()
            .insert(inp.id(), inp.clone());

        let err = out.is_connected_to(&inp).unwrap_err();
        assert!(matches!(err, ConnectorError::ConnectionInvalid { .. }));

        out.connected_list().write().unwrap().clear();
    }

    #[test]
    fn test_self_is_never_connected() {
        let (_src, _dst, out, _inp) = pair();
        assert!(!out.is_connected_to(&out).unwrap());
    }

    #[test]
    fn test_subscribe_named() {
        let (_src, _dst, out, _inp) = pair();
        let id = out
            .subscribe_signal_named("connection_closed", Arc::new(|_, _| {}))
            .unwrap();
        assert!(out.unsubscribe_signal(ConnectorSignal::ConnectionClosed, id));

        let err = out
            .subscribe_signal_named("bogus", Arc::new(|_, _| {}))
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::SignalSubscriptionFailed { .. }
        ));
    }

    #[test]
    fn test_module_resolution_after_drop() {
        let (src, _dst, out, _inp) = pair();
        drop(src);
        assert!(matches!(
            out.module(),
            Err(ConnectorError::ModuleLockFailed { .. })
        ));
        assert!(matches!(
            out.signal_handler(ConnectorSignal::ConnectionClosed),
            Err(ConnectorError::ModuleLockFailed { .. })
        ));
    }

    #[test]
    fn test_possible_disconnections() {
        let (_src, _dst, out, inp) = pair();
        out.connect(&inp, false).unwrap();
        let combiners = out.possible_disconnections();
        assert_eq!(combiners.len(), 1);
        assert!(inp.possible_disconnections().len() == 1);
    }

    fn record(connector: &ConnectorRef, signal: ConnectorSignal, log: &Arc<std::sync::Mutex<Vec<String>>>) {
        let log = log.clone();
        connector
            .subscribe_signal(
                signal,
                Arc::new(move |here, _| {
                    let here = here.map(|h| h.to_string()).unwrap_or_default();
                    log.lock().unwrap().push(format!("{} {}", signal, here));
                }),
            )
            .unwrap();
    }

    #[test]
    fn test_racing_disconnects_close_once() {
        let (_src, _dst, out, inp) = pair();
        out.connect(&inp, false).unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        record(&out, ConnectorSignal::ConnectionClosed, &log);
        record(&inp, ConnectorSignal::ConnectionClosed, &log);

        // Stall the first disconnect after it has removed the edge.
        let upstream = inp.input_state().unwrap().lock_upstream();
        let handles: Vec<_> = [(inp.clone(), out.clone()), (out.clone(), inp.clone())]
            .into_iter()
            .map(|(here, there)| std::thread::spawn(move || here.disconnect(&there, true)))
            .collect();
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(upstream);
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2, "closed events: {:?}", *log);
        assert!(log.contains(&format!("{} src:out", ConnectorSignal::ConnectionClosed)));
        assert!(log.contains(&format!("{} dst:in", ConnectorSignal::ConnectionClosed)));
        assert_eq!(out.is_connected(), 0);
        assert_eq!(inp.is_connected(), 0);
    }

    #[test]
    fn test_disconnect_waits_for_wiring() {
        let (_src, _dst, out, inp) = pair();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        record(&inp, ConnectorSignal::ConnectionEstablished, &log);
        record(&inp, ConnectorSignal::ConnectionClosed, &log);

        // Stall the connect between recording the edge and wiring its signals.
        let upstream = inp.input_state().unwrap().lock_upstream();
        let connecting = {
            let (out, inp) = (out.clone(), inp.clone());
            std::thread::spawn(move || out.connect(&inp, false))
        };
        while out.is_connected() == 0 {
            std::thread::yield_now();
        }
        let disconnecting = {
            let (out, inp) = (out.clone(), inp.clone());
            std::thread::spawn(move || inp.disconnect(&out, true))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(upstream);
        connecting.join().unwrap().unwrap();
        disconnecting.join().unwrap().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                format!("{} dst:in", ConnectorSignal::ConnectionEstablished),
                format!("{} dst:in", ConnectorSignal::ConnectionClosed),
            ]
        );
        assert_eq!(inp.is_connected(), 0);
        assert_eq!(out.signals().data_changed.len(), 0);

        let input = inp.to_input().unwrap();
        input.handled_update();
        out.to_output().unwrap().propagate_data_change();
        assert!(!input.updated());
    }

    #[test]
    fn test_disconnect_all_drops_one_sided_entries() {
        let (_src, dst, out, inp) = pair();
        let second = dst.add_input("second", "", None).unwrap().connector().clone();
        out.connect(&inp, false).unwrap();
        out.connect(&second, false).unwrap();

        out.disconnect(&inp, false).unwrap();
        assert_eq!(inp.is_connected(), 0);
        assert_eq!(out.is_connected(), 2);

        out.disconnect_all().unwrap();
        assert_eq!(out.is_connected(), 0);
        assert_eq!(second.is_connected(), 0);
    }
}
