//! Outbound state-change events.
//!
//! Listeners receive `(network, state)` directly; [`StateEvent`] is the same
//! pair as a value, for adapters that queue events for later consumption
//! (e.g. [`ChannelListener`](crate::adapters::channel_sink::ChannelListener)).

use crate::network::{NetworkState, NetworkType};

/// A network type entered a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEvent {
    pub network: NetworkType,
    pub state: NetworkState,
}

impl StateEvent {
    pub const fn new(network: NetworkType, state: NetworkState) -> Self {
        Self { network, state }
    }
}
