//! Per-network-type state table.
//!
//! Plain data: the manager serialises access and performs validation.  Every
//! entry starts at [`NetworkState::Disabled`].

use crate::network::{NetworkSet, NetworkState, NetworkType};

/// Current state of every network type, indexed by [`NetworkType::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTable {
    states: [NetworkState; NetworkType::COUNT],
}

impl StateTable {
    pub const fn new() -> Self {
        Self {
            states: [NetworkState::Disabled; NetworkType::COUNT],
        }
    }

    pub const fn get(&self, network: NetworkType) -> NetworkState {
        self.states[network.index()]
    }

    /// Store `state` and return the previous value.  No comparison is made:
    /// re-storing the same state is a normal update.
    pub fn set(&mut self, network: NetworkType, state: NetworkState) -> NetworkState {
        core::mem::replace(&mut self.states[network.index()], state)
    }

    /// Types currently in `state`.
    pub fn in_state(&self, state: NetworkState) -> NetworkSet {
        NetworkType::ALL
            .into_iter()
            .filter(|t| self.get(*t) == state)
            .collect()
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}
