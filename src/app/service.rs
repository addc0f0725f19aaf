//! Network manager facade, the hexagonal core.
//!
//! [`NetworkManager`] owns the state table and subscription registry behind
//! one critical-section mutex and exposes the operations application code and
//! drivers use.  Drivers are injected through [`ManagerBuilder`]; listeners
//! are registered at runtime.
//!
//! ```text
//!  NetworkDriver ──▶ ┌─────────────────────────┐ ──▶ StateChangeListener
//!   (notify)         │     NetworkManager      │      (dispatch, unlocked)
//!                    │ StateTable · Registry   │
//!  NetworkDriver ◀── └─────────────────────────┘ ◀── application
//!   (enable/disable)                                 (subscribe, query)
//! ```
//!
//! The lock is held only to read or mutate the tables, never across a driver
//! call or a listener call.  Listeners may therefore re-enter the manager.
//!
//! Events of one type reach listeners in the order their states were
//! recorded.  Each report joins its type's queue in the critical section that
//! records it, and one thread at a time delivers a type's queue.  A report
//! made from inside a listener for a type this thread is already delivering
//! is queued and delivered after the current event, before the outer
//! `report_state` returns.

use core::cell::RefCell;
use std::thread::{self, ThreadId};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, warn};

use crate::config::NetworkConfig;
use crate::error::{ConfigError, DriverError, NmError, Result};
use crate::network::{Credentials, Endpoint, NetworkSet, NetworkState, NetworkType};
use crate::registry::dispatch;
use crate::registry::reports::Ticket;
use crate::registry::{ReportQueues, StateTable, SubscriptionHandle, SubscriptionRegistry};

use super::events::StateEvent;
use super::ports::{NetworkDriver, NetworkInterface, StateChangeListener, StateReporter};

/// Subscription pool size used by [`NetworkManager::builder`].
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 8;

type DriverTable<'a> = [Option<&'a dyn NetworkDriver>; NetworkType::COUNT];

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

struct Shared<'a, const N: usize> {
    states: StateTable,
    subscriptions: SubscriptionRegistry<'a, N>,
    reports: ReportQueues,
    enabled: NetworkSet,
    /// Types with an enable/disable currently in flight.
    transitioning: NetworkSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Enable,
    Disable,
}

impl Transition {
    fn apply(self, driver: &dyn NetworkDriver) -> core::result::Result<(), DriverError> {
        match self {
            Self::Enable => driver.enable(),
            Self::Disable => driver.disable(),
        }
    }

    fn reverse(self) -> Self {
        match self {
            Self::Enable => Self::Disable,
            Self::Disable => Self::Enable,
        }
    }

    /// State reported for every affected type once all drivers succeeded.
    fn resulting_state(self) -> NetworkState {
        match self {
            Self::Enable => NetworkState::Disconnected,
            Self::Disable => NetworkState::Disabled,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

/// What a reporter does next with its queued report.
enum Settle {
    Delivered,
    Drain,
    Wait,
}

// ───────────────────────────────────────────────────────────────
// NetworkManager
// ───────────────────────────────────────────────────────────────

/// State registry and notification router for the board's networks.
///
/// `N` bounds the number of live subscriptions.
pub struct NetworkManager<'a, const N: usize = DEFAULT_MAX_SUBSCRIPTIONS> {
    config: NetworkConfig,
    drivers: DriverTable<'a>,
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared<'a, N>>>,
}

impl<'a> NetworkManager<'a> {
    /// Start building a manager with the default subscription capacity.
    /// Use [`ManagerBuilder::new`] to pick another capacity.
    pub fn builder(config: NetworkConfig) -> ManagerBuilder<'a> {
        ManagerBuilder::new(config)
    }
}

impl<'a, const N: usize> NetworkManager<'a, N> {
    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up the networks the configuration enables at boot.
    pub fn start(&self) -> Result<()> {
        let enabled = self.config.enabled;
        if enabled.is_empty() {
            info!("NetworkManager started, no networks enabled at boot");
            return Ok(());
        }
        self.enable_network(enabled)?;
        info!("NetworkManager started, enabled {}", enabled);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Network types the board supports.  Never fails.
    pub fn get_available_networks(&self) -> NetworkSet {
        self.config.supported
    }

    /// Network types currently enabled (always a subset of the supported set).
    pub fn enabled_networks(&self) -> NetworkSet {
        self.with_shared(|s| s.enabled)
    }

    /// Network types whose current state is [`NetworkState::Connected`].
    pub fn connected_networks(&self) -> NetworkSet {
        self.with_shared(|s| s.states.in_state(NetworkState::Connected))
    }

    /// Current state of one supported network type.
    pub fn get_state(&self, network: NetworkType) -> Result<NetworkState> {
        if !self.config.supported.contains(network) {
            return Err(NmError::Invalid);
        }
        Ok(self.with_shared(|s| s.states.get(network)))
    }

    pub fn subscription_count(&self) -> usize {
        self.with_shared(|s| s.subscriptions.len())
    }

    pub const fn subscription_capacity(&self) -> usize {
        N
    }

    // ── State reporting ───────────────────────────────────────

    /// Record `state` for `network` and notify every matching subscriber
    /// before returning.
    ///
    /// Every call dispatches, including one that repeats the current state.
    /// Supported-but-disabled types are recorded and dispatched as well.
    ///
    /// Called from a listener for a type this thread is delivering, the event
    /// is queued behind the current one and delivered before the outermost
    /// report returns.  Fails with [`NmError::NoMemory`] if that queue is
    /// full; other callers wait for room instead.
    pub fn report_state(&self, network: NetworkType, state: NetworkState) -> Result<()> {
        if !self.config.supported.contains(network) {
            return Err(NmError::Invalid);
        }

        let me = thread::current().id();
        let (ticket, previous, nested) = loop {
            let accepted = self.with_shared(|s| -> Result<Option<(Ticket, NetworkState, bool)>> {
                let nested = s.reports.is_delivering(me);
                // Keep a slot free for an enable/disable about to commit.
                let reserved = usize::from(s.transitioning.contains(network));
                if !s.reports.has_room(network, reserved) {
                    return if nested { Err(NmError::NoMemory) } else { Ok(None) };
                }
                let ticket = s.reports.push(network, state, !nested)?;
                Ok(Some((ticket, s.states.set(network, state), nested)))
            })?;
            match accepted {
                Some(accepted) => break accepted,
                None => thread::yield_now(),
            }
        };

        debug!("{}: {} -> {}", network, previous, state);
        self.settle(network, ticket, me, nested);
        Ok(())
    }

    /// Driver-facing entry point; identical to [`report_state`](Self::report_state).
    pub fn notify_state_change(&self, network: NetworkType, state: NetworkState) -> Result<()> {
        self.report_state(network, state)
    }

    // ── Subscriptions ─────────────────────────────────────────

    /// Register `listener` for state changes of the types in `mask`.
    ///
    /// Types outside the supported set are dropped from the mask; a mask
    /// with no supported type fails with [`NmError::Invalid`].
    pub fn subscribe(&self, mask: NetworkSet, listener: &'a dyn StateChangeListener) -> Result<SubscriptionHandle> {
        let effective = mask.intersection(self.config.supported);
        if effective.is_empty() {
            return Err(NmError::Invalid);
        }
        let handle = self.with_shared(|s| s.subscriptions.insert(effective, listener))?;
        debug!("subscribed {:?} for {}", handle, effective);
        Ok(handle)
    }

    /// Remove a subscription.  Removing twice fails with [`NmError::Invalid`].
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.with_shared(|s| s.subscriptions.remove(handle))?;
        debug!("unsubscribed {:?}", handle);
        Ok(())
    }

    // ── Enable / disable ──────────────────────────────────────

    /// Bring up every type in `mask` that is not enabled yet, then report
    /// [`NetworkState::Disconnected`] for each of them.
    pub fn enable_network(&self, mask: NetworkSet) -> Result<()> {
        self.transition(mask, Transition::Enable)
    }

    /// Tear down every enabled type in `mask`, then report
    /// [`NetworkState::Disabled`] for each of them.
    pub fn disable_network(&self, mask: NetworkSet) -> Result<()> {
        self.transition(mask, Transition::Disable)
    }

    // ── Per-type configuration ────────────────────────────────

    pub fn get_network_interface(&self, network: NetworkType) -> Option<&'a dyn NetworkInterface> {
        self.driver(network)?.interface()
    }

    pub fn get_endpoint(&self, network: NetworkType) -> Option<Endpoint> {
        self.driver(network)?.endpoint()
    }

    pub fn get_credentials(&self, network: NetworkType) -> Option<Credentials> {
        self.driver(network)?.credentials()
    }

    // ── Internal ──────────────────────────────────────────────

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared<'a, N>) -> R) -> R {
        self.shared.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn driver(&self, network: NetworkType) -> Option<&'a dyn NetworkDriver> {
        if !self.config.supported.contains(network) {
            return None;
        }
        self.drivers[network.index()]
    }

    fn transition(&self, mask: NetworkSet, direction: Transition) -> Result<()> {
        if mask.is_empty() {
            return Err(NmError::Invalid);
        }
        if !mask.is_subset_of(self.config.supported) {
            return Err(NmError::NotSupported);
        }

        let affected = self.with_shared(|s| {
            if mask.intersects(s.transitioning) {
                return Err(NmError::Invalid);
            }
            let affected = match direction {
                Transition::Enable => mask.difference(s.enabled),
                Transition::Disable => mask.intersection(s.enabled),
            };
            if affected.iter().any(|n| !s.reports.has_room(n, 0)) {
                return Err(NmError::NoMemory);
            }
            s.transitioning = s.transitioning.union(affected);
            Ok(affected)
        })?;

        if affected.is_empty() {
            debug!("{} {}: nothing to do", direction.name(), mask);
            return Ok(());
        }

        // Held until the resulting states are reported.
        let _claim = Claim {
            manager: self,
            networks: affected,
        };

        self.drive(affected, direction)?;

        // The enabled set, the resulting states and their queued reports
        // change together, so a listener that unwinds can only cost
        // notifications.
        let me = thread::current().id();
        let state = direction.resulting_state();
        let committed = self.with_shared(|s| -> Result<([Option<Ticket>; NetworkType::COUNT], bool)> {
            // Reporters leave a slot free while these types are claimed.
            if affected.iter().any(|n| !s.reports.has_room(n, 0)) {
                return Err(NmError::NoMemory);
            }
            let nested = s.reports.is_delivering(me);
            let mut tickets = [None; NetworkType::COUNT];
            for network in affected.iter() {
                tickets[network.index()] = Some(s.reports.push(network, state, !nested)?);
            }
            for network in affected.iter() {
                s.states.set(network, state);
            }
            s.enabled = match direction {
                Transition::Enable => s.enabled.union(affected),
                Transition::Disable => s.enabled.difference(affected),
            };
            Ok((tickets, nested))
        });
        let (tickets, nested) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                self.roll_back(affected, direction);
                return Err(e);
            }
        };

        for network in affected.iter() {
            if let Some(ticket) = tickets[network.index()] {
                self.settle(network, ticket, me, nested);
            }
        }
        info!("{}d {}", direction.name(), affected);
        Ok(())
    }

    /// Return once `ticket` has been delivered, delivering it on this thread
    /// if nobody else is.  A `nested` reporter leaves its report to the
    /// current owner instead of waiting.
    fn settle(&self, network: NetworkType, ticket: Ticket, me: ThreadId, nested: bool) {
        loop {
            let step = self.with_shared(|s| {
                if s.reports.is_delivered(network, ticket) {
                    Settle::Delivered
                } else if s.reports.claim(network, me) {
                    Settle::Drain
                } else if nested {
                    Settle::Delivered
                } else {
                    Settle::Wait
                }
            });
            match step {
                Settle::Delivered => return,
                Settle::Drain => self.drain(network, ticket),
                Settle::Wait => thread::yield_now(),
            }
        }
    }

    /// Deliver `network`'s queue front to back, up to and including `own`
    /// and any reports queued from inside listeners after it.  The caller
    /// owns the queue.
    fn drain(&self, network: NetworkType, own: Ticket) {
        let mut delivery = Delivery {
            manager: self,
            network,
            in_flight: None,
            done: false,
        };
        loop {
            let next = self.with_shared(|s| {
                let (ticket, state) = s.reports.next(network, own)?;
                Some((ticket, state, dispatch::snapshot(&s.subscriptions, network)))
            });
            let Some((ticket, state, targets)) = next else {
                delivery.done = true;
                return;
            };

            delivery.in_flight = Some(ticket);
            let delivered = dispatch::deliver(&targets, StateEvent::new(network, state), |handle| {
                self.with_shared(|s| s.subscriptions.is_active(handle))
            });
            self.with_shared(|s| s.reports.finish(network, ticket));
            delivery.in_flight = None;
            debug!(
                "{}: {} delivered to {}/{} subscribers",
                network,
                state,
                delivered,
                targets.len()
            );
        }
    }

    /// Run `direction` on every driver in `affected`.  On the first failure
    /// the drivers already switched by this call are switched back.
    fn drive(&self, affected: NetworkSet, direction: Transition) -> Result<()> {
        let mut done = NetworkSet::EMPTY;
        for network in affected.iter() {
            let driver = self.driver(network).ok_or(NmError::NotSupported)?;
            if let Err(e) = direction.apply(driver) {
                error!("{}: {} failed: {}", network, direction.name(), e);
                self.roll_back(done, direction);
                return Err(e.into());
            }
            done.insert(network);
        }
        Ok(())
    }

    fn roll_back(&self, done: NetworkSet, direction: Transition) {
        let undo = direction.reverse();
        for network in done.iter() {
            if let Some(driver) = self.driver(network) {
                if let Err(e) = undo.apply(driver) {
                    warn!("{}: rollback {} failed: {}", network, undo.name(), e);
                }
            }
        }
    }
}

/// Marks `networks` as transitioning for as long as it lives, so a second
/// enable/disable of the same type is refused even if a listener panics.
struct Claim<'m, 'a, const N: usize> {
    manager: &'m NetworkManager<'a, N>,
    networks: NetworkSet,
}

impl<const N: usize> Drop for Claim<'_, '_, N> {
    fn drop(&mut self) {
        let networks = self.networks;
        self.manager
            .with_shared(|s| s.transitioning = s.transitioning.difference(networks));
    }
}

/// Owns delivery of one type's queue.  Dropped without `done` (a listener
/// unwound) it hands the queue back; reports still queued go out with the
/// next report of that type.
struct Delivery<'m, 'a, const N: usize> {
    manager: &'m NetworkManager<'a, N>,
    network: NetworkType,
    in_flight: Option<Ticket>,
    done: bool,
}

impl<const N: usize> Drop for Delivery<'_, '_, N> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let (network, in_flight) = (self.network, self.in_flight);
        warn!("{}: delivery interrupted", network);
        self.manager.with_shared(|s| s.reports.abandon(network, in_flight));
    }
}

impl<const N: usize> StateReporter for NetworkManager<'_, N> {
    fn notify_state_change(&self, network: NetworkType, state: NetworkState) -> Result<()> {
        self.report_state(network, state)
    }
}

// ───────────────────────────────────────────────────────────────
// Builder
// ───────────────────────────────────────────────────────────────

/// Validates the configuration and driver set before a manager exists.
pub struct ManagerBuilder<'a, const N: usize = DEFAULT_MAX_SUBSCRIPTIONS> {
    config: NetworkConfig,
    drivers: DriverTable<'a>,
    error: Option<ConfigError>,
}

impl<'a, const N: usize> ManagerBuilder<'a, N> {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            drivers: [None; NetworkType::COUNT],
            error: None,
        }
    }

    /// Register the driver for its network type.
    #[must_use]
    pub fn driver(mut self, driver: &'a dyn NetworkDriver) -> Self {
        if self.error.is_some() {
            return self;
        }
        let network = driver.network_type();
        let slot = &mut self.drivers[network.index()];
        if !self.config.supported.contains(network) {
            self.error = Some(ConfigError::UnsupportedDriver(network));
        } else if slot.is_some() {
            self.error = Some(ConfigError::DuplicateDriver(network));
        } else {
            *slot = Some(driver);
        }
        self
    }

    /// Fails if the configuration is invalid, a driver was rejected, or a
    /// supported type has no driver.  All network states start `Disabled`.
    pub fn build(self) -> core::result::Result<NetworkManager<'a, N>, ConfigError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.config.validate()?;
        if let Some(missing) = self.config.supported.iter().find(|t| self.drivers[t.index()].is_none()) {
            return Err(ConfigError::MissingDriver(missing));
        }

        info!(
            "NetworkManager: supported={} enabled={} max_subscriptions={}",
            self.config.supported, self.config.enabled, N
        );

        Ok(NetworkManager {
            config: self.config,
            drivers: self.drivers,
            shared: Mutex::new(RefCell::new(Shared {
                states: StateTable::new(),
                subscriptions: SubscriptionRegistry::new(),
                reports: ReportQueues::new(),
                enabled: NetworkSet::EMPTY,
                transitioning: NetworkSet::EMPTY,
            })),
        })
    }
}
