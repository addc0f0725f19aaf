//! Per-type report queues.
//!
//! Every accepted report is appended to its type's queue in the same critical
//! section that updates the state table, so queue order is table order.  At
//! most one thread owns delivery for a type at a time and delivers that
//! type's queue front to back.  Every other reporter either waits to deliver
//! its entry itself or, when it is inside a delivery already, leaves the entry
//! for the owner.  An owner stops after its own entry once the front entry
//! belongs to a waiting reporter, so a steady stream of reports cannot keep
//! one thread delivering forever.
//!
//! Plain data like the other registry tables: the manager holds the lock.

use std::thread::ThreadId;

use heapless::Deque;

use crate::error::{NmError, Result};
use crate::network::{NetworkState, NetworkType};

/// Reports that may be queued per network type before `report_state` has to
/// wait (or fails, when called from inside a delivery).
pub const REPORT_QUEUE_DEPTH: usize = 8;

/// Position of a report in its type's queue.  Starts at 1.
pub type Ticket = u64;

struct Entry {
    ticket: Ticket,
    state: NetworkState,
    /// The reporter waits to deliver this entry itself.
    waiter: bool,
}

struct Lane<const Q: usize> {
    queue: Deque<Entry, Q>,
    issued: Ticket,
    delivered: Ticket,
    owner: Option<ThreadId>,
}

impl<const Q: usize> Lane<Q> {
    const fn new() -> Self {
        Self {
            queue: Deque::new(),
            issued: 0,
            delivered: 0,
            owner: None,
        }
    }
}

pub struct ReportQueues<const Q: usize = REPORT_QUEUE_DEPTH> {
    lanes: [Lane<Q>; NetworkType::COUNT],
}

impl<const Q: usize> ReportQueues<Q> {
    pub const fn new() -> Self {
        Self {
            lanes: [const { Lane::new() }; NetworkType::COUNT],
        }
    }

    fn lane(&self, network: NetworkType) -> &Lane<Q> {
        &self.lanes[network.index()]
    }

    fn lane_mut(&mut self, network: NetworkType) -> &mut Lane<Q> {
        &mut self.lanes[network.index()]
    }

    /// Whether one more report fits, keeping `reserved` entries free.
    pub fn has_room(&self, network: NetworkType, reserved: usize) -> bool {
        self.lane(network).queue.len() + reserved < Q
    }

    pub fn queued(&self, network: NetworkType) -> usize {
        self.lane(network).queue.len()
    }

    /// Append a report.  Fails with [`NmError::NoMemory`] when the queue is full.
    pub fn push(&mut self, network: NetworkType, state: NetworkState, waiter: bool) -> Result<Ticket> {
        let lane = self.lane_mut(network);
        let ticket = lane.issued + 1;
        lane.queue
            .push_back(Entry { ticket, state, waiter })
            .map_err(|_| NmError::NoMemory)?;
        lane.issued = ticket;
        Ok(ticket)
    }

    /// Take delivery ownership of `network` if nobody holds it.
    pub fn claim(&mut self, network: NetworkType, owner: ThreadId) -> bool {
        let lane = self.lane_mut(network);
        if lane.owner.is_some() {
            return false;
        }
        lane.owner = Some(owner);
        true
    }

    /// True if `thread` owns delivery of any type.
    pub fn is_delivering(&self, thread: ThreadId) -> bool {
        self.lanes.iter().any(|l| l.owner == Some(thread))
    }

    pub fn is_delivered(&self, network: NetworkType, ticket: Ticket) -> bool {
        self.lane(network).delivered >= ticket
    }

    /// Next report for an owner whose own entry is `own`.  `None` ends
    /// ownership: the queue is empty, or `own` is out and the front entry's
    /// reporter delivers it.
    pub fn next(&mut self, network: NetworkType, own: Ticket) -> Option<(Ticket, NetworkState)> {
        let lane = self.lane_mut(network);
        let next = match lane.queue.front() {
            Some(e) if e.ticket <= own || !e.waiter => lane.queue.pop_front().map(|e| (e.ticket, e.state)),
            _ => None,
        };
        if next.is_none() {
            lane.owner = None;
        }
        next
    }

    /// Mark `ticket` (and everything before it) delivered.
    pub fn finish(&mut self, network: NetworkType, ticket: Ticket) {
        let lane = self.lane_mut(network);
        lane.delivered = lane.delivered.max(ticket);
    }

    /// Drop ownership without draining, after a listener unwound out of a
    /// delivery.  The report in flight counts as delivered; later entries
    /// stay queued for the next owner.
    pub fn abandon(&mut self, network: NetworkType, in_flight: Option<Ticket>) {
        if let Some(ticket) = in_flight {
            self.finish(network, ticket);
        }
        self.lane_mut(network).owner = None;
    }
}

impl<const Q: usize> Default for ReportQueues<Q> {
    fn default() -> Self {
        Self::new()
    }
}
