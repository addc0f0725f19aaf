//! Fixed-capacity subscription arena.
//!
//! ```text
//!   slots:  [ gen=3 wifi|ble ] [ gen=1 (free) ] [ gen=7 ble ] ...
//!   order:  [ 2, 0 ]                      ← registration order
//! ```
//!
//! A [`SubscriptionHandle`] is the slot index plus the slot's generation at
//! the time of subscribing.  Removing a record leaves the generation in place;
//! the next subscription in that slot bumps it, so a stale handle (already
//! removed, or never issued) never matches a live record.  Generation 0 is
//! never issued, which makes [`SubscriptionHandle::default`] a safe
//! "not subscribed" value.

use crate::app::ports::StateChangeListener;
use crate::error::{NmError, Result};
use crate::network::{NetworkSet, NetworkType};

// ───────────────────────────────────────────────────────────────
// Handle
// ───────────────────────────────────────────────────────────────

/// Opaque reference to a subscription, stored by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubscriptionHandle {
    index: u16,
    generation: u32,
}

impl SubscriptionHandle {
    /// Handle value before subscribing; never refers to a live record.
    pub const UNSET: Self = Self { index: 0, generation: 0 };

    pub const fn is_unset(&self) -> bool {
        self.generation == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Record<'a> {
    mask: NetworkSet,
    listener: &'a dyn StateChangeListener,
}

#[derive(Clone, Copy)]
struct Slot<'a> {
    generation: u32,
    record: Option<Record<'a>>,
}

impl Slot<'_> {
    const EMPTY: Self = Self {
        generation: 0,
        record: None,
    };
}

const fn next_generation(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        g => g,
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

/// Up to `N` live subscriptions, no heap.
pub struct SubscriptionRegistry<'a, const N: usize> {
    slots: [Slot<'a>; N],
    /// Occupied slot indices in registration order.
    order: heapless::Vec<u16, N>,
}

impl<'a, const N: usize> SubscriptionRegistry<'a, N> {
    const CAPACITY_OK: () = assert!(N > 0 && N <= u16::MAX as usize, "subscription capacity must be 1..=65535");

    pub const fn new() -> Self {
        let () = Self::CAPACITY_OK;
        Self {
            slots: [Slot::EMPTY; N],
            order: heapless::Vec::new(),
        }
    }

    /// Store a subscription.  `mask` is stored as given; the caller has
    /// already validated it against the supported set.
    pub fn insert(&mut self, mask: NetworkSet, listener: &'a dyn StateChangeListener) -> Result<SubscriptionHandle> {
        let index = self
            .slots
            .iter()
            .position(|s| s.record.is_none())
            .ok_or(NmError::NoMemory)?;
        let idx = index as u16;
        self.order.push(idx).map_err(|_| NmError::NoMemory)?;

        let slot = &mut self.slots[index];
        slot.generation = next_generation(slot.generation);
        slot.record = Some(Record { mask, listener });

        Ok(SubscriptionHandle {
            index: idx,
            generation: slot.generation,
        })
    }

    /// Remove a live subscription.  Unknown, stale and already-removed
    /// handles fail with [`NmError::Invalid`] and change nothing.
    pub fn remove(&mut self, handle: SubscriptionHandle) -> Result<()> {
        if !self.is_active(handle) {
            return Err(NmError::Invalid);
        }
        self.slots[handle.index as usize].record = None;
        self.order.retain(|&i| i != handle.index);
        Ok(())
    }

    pub fn is_active(&self, handle: SubscriptionHandle) -> bool {
        self.record(handle).is_some()
    }

    /// Network types a live subscription listens to.
    pub fn mask(&self, handle: SubscriptionHandle) -> Option<NetworkSet> {
        self.record(handle).map(|r| r.mask)
    }

    /// Live subscriptions interested in `network`, in registration order.
    pub fn matching(
        &self,
        network: NetworkType,
    ) -> impl Iterator<Item = (SubscriptionHandle, &'a dyn StateChangeListener)> + '_ {
        self.order.iter().filter_map(move |&index| {
            let slot = &self.slots[index as usize];
            let record = slot.record?;
            record.mask.contains(network).then_some((
                SubscriptionHandle {
                    index,
                    generation: slot.generation,
                },
                record.listener,
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn record(&self, handle: SubscriptionHandle) -> Option<&Record<'a>> {
        if handle.is_unset() {
            return None;
        }
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }
}

impl<const N: usize> Default for SubscriptionRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
