//! Network vocabulary shared by the registry, the facade and the drivers.

pub mod profile;
pub mod set;
pub mod types;

pub use profile::{Credentials, Endpoint};
pub use set::NetworkSet;
pub use types::{NetworkState, NetworkType};
