//! Channel-backed state listener.
//!
//! Listeners run synchronously in the reporting driver's context, so work
//! that may block belongs elsewhere.  [`ChannelListener`] copies each event
//! into a bounded `embassy-sync` channel that an async task (or a thread
//! using `futures_lite::future::block_on`) drains at its own pace.
//!
//! The listener never blocks: when the channel is full the event is dropped
//! and counted.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::StateEvent;
use crate::app::ports::StateChangeListener;
use crate::network::{NetworkState, NetworkType};

/// Bounded state-event queue shared by the listener and its consumer.
pub type EventChannel<const N: usize> = Channel<CriticalSectionRawMutex, StateEvent, N>;

pub struct ChannelListener<'c, const N: usize> {
    channel: &'c EventChannel<N>,
    dropped: AtomicU32,
}

impl<'c, const N: usize> ChannelListener<'c, N> {
    pub const fn new(channel: &'c EventChannel<N>) -> Self {
        Self {
            channel,
            dropped: AtomicU32::new(0),
        }
    }

    /// Events lost because the channel was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> StateChangeListener for ChannelListener<'_, N> {
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        if self.channel.try_send(StateEvent::new(network, state)).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("event channel full, dropped {} {} (total {})", network, state, total);
        }
    }
}
