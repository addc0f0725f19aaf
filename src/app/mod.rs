//! Application core: the network manager facade and its ports.
//!
//! [`service::NetworkManager`] composes the state table, subscription
//! registry and dispatcher from [`crate::registry`].  All interaction with
//! network stacks and application code happens through the **port traits**
//! in [`ports`], keeping this layer testable without real radios.

pub mod events;
pub mod ports;
pub mod service;
