//! State-change fan-out.
//!
//! Dispatch runs in two phases so no lock is held while listener code runs:
//!
//! 1. [`snapshot`]: under the manager lock, copy the `(handle, listener)`
//!    pairs that match the event into a stack buffer (registration order).
//! 2. [`deliver`]: lock released, walk the snapshot.  Before each call the
//!    handle is re-validated through `still_active`, so a subscriber removed
//!    before its turn is skipped.  A subscriber removed while its own call is
//!    already starting still receives that one event.
//!
//! Listener references borrow for the manager's lifetime, so a snapshot can
//! never point at freed storage.

use log::trace;

use super::subscriptions::{SubscriptionHandle, SubscriptionRegistry};
use crate::app::events::StateEvent;
use crate::app::ports::StateChangeListener;
use crate::network::NetworkType;

/// One pending delivery.
#[derive(Clone, Copy)]
pub struct Target<'a> {
    pub handle: SubscriptionHandle,
    pub listener: &'a dyn StateChangeListener,
}

/// Matching subscribers captured for one event.
pub type Snapshot<'a, const N: usize> = heapless::Vec<Target<'a>, N>;

/// Capture the subscribers interested in `network`.
pub fn snapshot<'a, const N: usize>(registry: &SubscriptionRegistry<'a, N>, network: NetworkType) -> Snapshot<'a, N> {
    // At most N records exist, so the buffer cannot overflow.
    registry
        .matching(network)
        .map(|(handle, listener)| Target { handle, listener })
        .collect()
}

/// Invoke every still-active target.  Returns the number of listeners called.
pub fn deliver(
    targets: &[Target<'_>],
    event: StateEvent,
    mut still_active: impl FnMut(SubscriptionHandle) -> bool,
) -> usize {
    let mut delivered = 0;
    for target in targets {
        if !still_active(target.handle) {
            trace!("dispatch: skipping removed subscriber {:?}", target.handle);
            continue;
        }
        target.listener.on_state_change(event.network, event.state);
        delivered += 1;
    }
    delivered
}
