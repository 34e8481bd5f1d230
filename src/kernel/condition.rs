//! Wait/notify primitives used to wake module threads.
//!
//! `Condition` is a plain broadcast: `wait()` blocks until the next
//! `notify()`. `ConditionSet` aggregates several conditions behind a sticky
//! flag so a notification arriving between two waits is not lost, which is
//! what a module main loop needs.

use crate::kernel::id::SubscriptionId;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Callback run on every `notify()`.
pub type ConditionCallback = Arc<dyn Fn() + Send + Sync>;

/// Broadcast wait/notify primitive.
#[derive(Default)]
pub struct Condition {
    generation: Mutex<u64>,
    cvar: Condvar,
    callbacks: RwLock<Vec<(SubscriptionId, ConditionCallback)>>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the next `notify()`.
    pub fn wait(&self) {
        let guard = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = *guard;
        let _guard = self
            .cvar
            .wait_while(guard, |generation| *generation == start)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the next `notify()` or until `timeout` elapses.
    /// Returns `true` if woken by a notification.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = *guard;
        let (_guard, result) = self
            .cvar
            .wait_timeout_while(guard, timeout, |generation| *generation == start)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    /// Wake every waiter and run the subscribed callbacks.
    pub fn notify(&self) {
        {
            let mut generation = self
                .generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *generation = generation.wrapping_add(1);
        }
        self.cvar.notify_all();

        let callbacks: Vec<ConditionCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in callbacks {
            cb();
        }
    }

    /// Number of notifications so far.
    pub fn generation(&self) -> u64 {
        *self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, callback: ConditionCallback) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(cb_id, _)| *cb_id != id);
        callbacks.len() != before
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("generation", &self.generation())
            .finish()
    }
}

#[derive(Default)]
struct Flag {
    fired: Mutex<bool>,
    cvar: Condvar,
}

impl Flag {
    fn fire(&self) {
        *self.fired.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cvar.notify_all();
    }
}

/// Aggregate of conditions. Fires when any member fires.
#[derive(Default)]
pub struct ConditionSet {
    flag: Arc<Flag>,
    members: Mutex<Vec<(Arc<Condition>, SubscriptionId)>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition. Adding the same condition twice is a no-op.
    pub fn add(&self, condition: Arc<Condition>) {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        if members.iter().any(|(c, _)| Arc::ptr_eq(c, &condition)) {
            return;
        }
        let flag = Arc::downgrade(&self.flag);
        let id = condition.subscribe(Arc::new(move || {
            if let Some(flag) = flag.upgrade() {
                flag.fire();
            }
        }));
        members.push((condition, id));
    }

    pub fn remove(&self, condition: &Arc<Condition>) -> bool {
        let mut members = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = members.iter().position(|(c, _)| Arc::ptr_eq(c, condition)) else {
            return false;
        };
        let (condition, id) = members.remove(pos);
        condition.unsubscribe(id);
        true
    }

    pub fn len(&self) -> usize {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire the set directly, independent of its members.
    pub fn notify(&self) {
        self.flag.fire();
    }

    /// Whether a notification is pending.
    pub fn is_fired(&self) -> bool {
        *self
            .flag
            .fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a member fires, then reset.
    pub fn wait(&self) {
        let guard = self
            .flag
            .fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut fired = self
            .flag
            .cvar
            .wait_while(guard, |fired| !*fired)
            .unwrap_or_else(PoisonError::into_inner);
        *fired = false;
    }

    /// Like `wait`, bounded by `timeout`. Returns `true` if fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self
            .flag
            .fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut fired, _) = self
            .flag
            .cvar
            .wait_timeout_while(guard, timeout, |fired| !*fired)
            .unwrap_or_else(PoisonError::into_inner);
        let was_fired = *fired;
        *fired = false;
        was_fired
    }
}

impl Drop for ConditionSet {
    fn drop(&mut self) {
        let members = self.members.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (condition, id) in members.drain(..) {
            condition.unsubscribe(id);
        }
    }
}

impl fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionSet")
            .field("members", &self.len())
            .field("fired", &self.is_fired())
            .finish()
    }
}
