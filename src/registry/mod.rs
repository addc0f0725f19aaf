//! State-tracking and subscription-dispatch engine.
//!
//! Pure data structures with no locking of their own.  The
//! [`NetworkManager`](crate::app::service::NetworkManager) owns one instance
//! of each behind a single critical-section mutex and drives dispatch.
//!
//! ```text
//!  notify(type, state)
//!        │
//!        ▼
//!  ┌────────────┐   ┌──────────────┐
//!  │ StateTable │   │ ReportQueues │ (locked, same critical section)
//!  └────────────┘   └──────┬───────┘
//!                          ▼ owner of the type's queue
//!  ┌──────────────────────┐   ┌────────────┐
//!  │ SubscriptionRegistry │──▶│  snapshot  │ (locked)
//!  └──────────────────────┘   └─────┬──────┘
//!                                   ▼
//!                             ┌────────────┐
//!                             │  deliver   │ (unlocked)
//!                             └────────────┘
//! ```

pub mod dispatch;
pub mod reports;
pub mod state;
pub mod subscriptions;

pub use reports::ReportQueues;
pub use state::StateTable;
pub use subscriptions::{SubscriptionHandle, SubscriptionRegistry};
