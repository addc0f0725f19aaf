//! Log-based state listener.
//!
//! Writes every state change to the `log` facade (UART / USB-CDC through
//! `esp_idf_logger` in production).

use log::{info, warn};

use crate::app::ports::StateChangeListener;
use crate::network::{NetworkState, NetworkType};

/// Listener that logs every state change it is subscribed to.
pub struct LogListener;

impl StateChangeListener for LogListener {
    fn on_state_change(&self, network: NetworkType, state: NetworkState) {
        match state {
            NetworkState::Disabled => warn!("NET | {:<9} | disabled", network),
            NetworkState::Provisioned => info!("NET | {:<9} | credentials provisioned", network),
            _ => info!("NET | {:<9} | {}", network, state),
        }
    }
}
