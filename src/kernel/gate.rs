//! Per-connector gate serializing edge operations.
//!
//! `connect` and `disconnect` hold the gates of both endpoints, taken in
//! [`ConnectorId`](crate::kernel::ConnectorId) order, from their first check
//! until their signals have been delivered. Another thread operating on
//! either endpoint waits until then, so an edge is never unwired while it is
//! still being wired and `ConnectionClosed` never overtakes the
//! `ConnectionEstablished` of the same edge.
//!
//! The gate is re-entrant for the thread holding it: signal handlers may
//! connect or disconnect the connectors whose signal they are handling.

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct Holder {
    thread: Option<ThreadId>,
    depth: usize,
}

#[derive(Default)]
pub(crate) struct EdgeGate {
    holder: Mutex<Holder>,
    released: Condvar,
}

impl EdgeGate {
    /// Block until the gate is free or already held by this thread.
    pub(crate) fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match holder.thread {
                None => {
                    holder.thread = Some(me);
                    break;
                }
                Some(owner) if owner == me => break,
                Some(_) => {
                    holder = self
                        .released
                        .wait(holder)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        holder.depth += 1;
        GateGuard { gate: self }
    }

    fn leave(&self) {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        holder.depth = holder.depth.saturating_sub(1);
        if holder.depth == 0 {
            holder.thread = None;
            drop(holder);
            self.released.notify_all();
        }
    }

    #[cfg(test)]
    fn is_held(&self) -> bool {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .thread
            .is_some()
    }
}

/// Releases one level of the gate when dropped.
pub(crate) struct GateGuard<'a> {
    gate: &'a EdgeGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
