//! Latest snapshot per tank plus the registry of live subscribers.
//!
//! Each registered tank gets its own slot. Persisting a snapshot and fanning it
//! out happen under the slot lock, and so does reading the current snapshot when
//! subscribing, so a subscriber never misses or duplicates an update around the
//! moment it joins. Tanks never contend with each other on a slot lock.
//!
//! Lock order: slot, then the slot map, then the database. Code holding the
//! database lock may touch the slot map but never a slot.

mod subscription;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use common::req::RealtimeSnapshot;
use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::TankError;

pub use subscription::Subscription;

/// Updates a subscriber may have queued before it counts as stalled.
pub const SUBSCRIBER_BUFFER: usize = 32;

#[derive(Default)]
struct TankSlot {
    snapshot: Option<RealtimeSnapshot>,
    subscribers: HashMap<u64, mpsc::Sender<RealtimeSnapshot>>,
}

impl TankSlot {
    fn publish(&mut self, snapshot: RealtimeSnapshot) -> usize {
        let tank_code = &snapshot.tank_code;
        self.subscribers
            .retain(|id, tx| match tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    // a stalled client reconnects and starts over from the current snapshot
                    warn!("subscriber {} of tank {} stalled, disconnecting", id, tank_code);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
        let delivered = self.subscribers.len();
        self.snapshot = Some(snapshot);
        delivered
    }
}

#[derive(Default)]
pub struct LiveHub {
    slots: RwLock<HashMap<String, Arc<Mutex<TankSlot>>>>,
    next_id: AtomicU64,
}

fn lock_slot(slot: &Mutex<TankSlot>) -> MutexGuard<'_, TankSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LiveHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn existing_slot(&self, tank_code: &str) -> Option<Arc<Mutex<TankSlot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tank_code)
            .cloned()
    }

    fn slot(&self, tank_code: &str) -> Arc<Mutex<TankSlot>> {
        if let Some(slot) = self.existing_slot(tank_code) {
            return slot;
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tank_code.to_string())
            .or_default()
            .clone()
    }

    /// Runs `f` on the tank's slot, locked, as long as the slot is still the
    /// registered one. `None` if the tank is not registered.
    fn with_slot<R>(&self, tank_code: &str, f: impl FnOnce(&mut TankSlot) -> R) -> Option<R> {
        loop {
            let slot = self.existing_slot(tank_code)?;
            let mut guard = lock_slot(&slot);
            let current = self
                .existing_slot(tank_code)
                .map_or(false, |registered| Arc::ptr_eq(&registered, &slot));
            if current {
                return Some(f(&mut guard));
            }
            // removed or replaced while we waited for the lock
        }
    }

    /// Makes the tank known to the hub. Does nothing if it already is.
    pub fn register(&self, tank_code: &str) {
        self.slot(tank_code);
    }

    pub fn get(&self, tank_code: &str) -> Option<RealtimeSnapshot> {
        self.existing_slot(tank_code)
            .and_then(|slot| lock_slot(&slot).snapshot.clone())
    }

    /// Replaces the tank's snapshot and sends it to every subscriber of that tank,
    /// registering the tank if needed.
    ///
    /// Returns the number of subscribers the snapshot was queued for. Subscribers
    /// whose stream has gone away or stalled are dropped from the registry here.
    pub fn put(&self, snapshot: RealtimeSnapshot) -> usize {
        let slot = self.slot(&snapshot.tank_code);
        let delivered = lock_slot(&slot).publish(snapshot);
        delivered
    }

    /// Produces a snapshot with `persist` and publishes it, both under the tank's
    /// slot lock, so the stored order and the broadcast order agree per tank.
    ///
    /// Fails with [`TankError::UnknownTank`] if the tank is not registered.
    pub fn publish_with<F>(
        &self,
        tank_code: &str,
        persist: F,
    ) -> Result<(RealtimeSnapshot, usize), TankError>
    where
        F: FnOnce() -> Result<RealtimeSnapshot, TankError>,
    {
        self.with_slot(tank_code, |slot| {
            let snapshot = persist()?;
            let delivered = slot.publish(snapshot.clone());
            Ok((snapshot, delivered))
        })
        .unwrap_or_else(|| Err(TankError::UnknownTank(tank_code.to_string())))
    }

    /// Registers a subscriber for `tank_code`.
    ///
    /// Returns the snapshot current at the time of subscribing (`None` if the tank
    /// has not reported yet) and the subscription yielding every later snapshot.
    pub fn subscribe(
        self: &Arc<Self>,
        tank_code: &str,
    ) -> Result<(Option<RealtimeSnapshot>, Subscription), TankError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        let current = self
            .with_slot(tank_code, |slot| {
                slot.subscribers.insert(id, tx);
                slot.snapshot.clone()
            })
            .ok_or_else(|| TankError::UnknownTank(tank_code.to_string()))?;
        debug!("subscriber {} joined tank {}", id, tank_code);

        Ok((
            current,
            Subscription::new(tank_code.to_string(), id, rx, Arc::downgrade(self)),
        ))
    }

    pub(crate) fn unsubscribe(&self, tank_code: &str, id: u64) {
        if let Some(slot) = self.existing_slot(tank_code) {
            if lock_slot(&slot).subscribers.remove(&id).is_some() {
                debug!("subscriber {} left tank {}", id, tank_code);
            }
        }
    }

    pub fn subscriber_count(&self, tank_code: &str) -> usize {
        self.existing_slot(tank_code)
            .map(|slot| lock_slot(&slot).subscribers.len())
            .unwrap_or(0)
    }

    /// Forgets a tank. Its streams end as soon as nobody holds the slot any more.
    ///
    /// Only touches the slot map, so it is safe to call with the database locked.
    pub fn remove(&self, tank_code: &str) -> bool {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tank_code)
            .is_some()
    }
}
