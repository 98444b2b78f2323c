//! Delivery-outcome accumulation and per-link detail capture.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::router::RawLink;

/// The seven delivery-outcome counters reported on every link.
///
/// [`Outcome::ALL`] is the ordered extraction table: accumulation walks
/// it and adds whichever counters the router reported, treating absent
/// ones as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Delivery accepted by the receiver.
    Accepted,
    /// Delivery released back to the sender.
    Released,
    /// Delivery rejected by the receiver.
    Rejected,
    /// Delivery modified by the receiver.
    Modified,
    /// Delivery awaiting settlement.
    Unsettled,
    /// Delivery sent presettled.
    Presettled,
    /// Delivery queued but not yet sent.
    Undelivered,
}

impl Outcome {
    /// All outcomes, in accumulation order.
    pub const ALL: [Outcome; 7] = [
        Outcome::Accepted,
        Outcome::Released,
        Outcome::Rejected,
        Outcome::Modified,
        Outcome::Unsettled,
        Outcome::Presettled,
        Outcome::Undelivered,
    ];

    /// The matching counter on a reported link, zero when absent.
    pub fn count_on(self, link: &RawLink) -> u64 {
        match self {
            Outcome::Accepted => link.accepted_count,
            Outcome::Released => link.released_count,
            Outcome::Rejected => link.rejected_count,
            Outcome::Modified => link.modified_count,
            Outcome::Unsettled => link.unsettled_count,
            Outcome::Presettled => link.presettled_count,
            Outcome::Undelivered => link.undelivered_count,
        }
        .unwrap_or(0)
    }
}

/// Running delivery-outcome totals plus per-link contribution records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeBundle {
    /// Deliveries accepted.
    pub accepted: u64,
    /// Deliveries released.
    pub released: u64,
    /// Deliveries rejected.
    pub rejected: u64,
    /// Deliveries modified.
    pub modified: u64,
    /// Deliveries awaiting settlement.
    pub unsettled: u64,
    /// Deliveries sent presettled.
    pub presettled: u64,
    /// Deliveries not yet sent.
    pub undelivered: u64,
    /// One record per link folded in, append-only within a cycle.
    pub links: Vec<LinkDetail>,
}

impl OutcomeBundle {
    /// A bundle with all counters zeroed and no link records.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_mut(&mut self, outcome: Outcome) -> &mut u64 {
        match outcome {
            Outcome::Accepted => &mut self.accepted,
            Outcome::Released => &mut self.released,
            Outcome::Rejected => &mut self.rejected,
            Outcome::Modified => &mut self.modified,
            Outcome::Unsettled => &mut self.unsettled,
            Outcome::Presettled => &mut self.presettled,
            Outcome::Undelivered => &mut self.undelivered,
        }
    }

    /// Fold one reported link into the totals and append its detail record.
    ///
    /// Only ever adds; a previously appended record is never revisited.
    pub fn record(
        &mut self,
        link: &RawLink,
        router_name: Option<&str>,
        client_name: Option<&str>,
    ) {
        for outcome in Outcome::ALL {
            *self.counter_mut(outcome) += outcome.count_on(link);
        }
        self.links.push(LinkDetail::capture(link, router_name, client_name));
    }

    /// Sum of delivery counts across the recorded links.
    pub fn aggregate_delivery_count(&self) -> u64 {
        self.links.iter().map(|l| l.delivery_count).sum()
    }
}

/// Ingress and egress outcome totals for one address or connection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectionalOutcomes {
    /// Traffic entering the mesh.
    pub ingress: OutcomeBundle,
    /// Traffic leaving the mesh.
    pub egress: OutcomeBundle,
}

/// Snapshot of one link's contribution at capture time.
///
/// Immutable once appended to a bundle.
#[derive(Debug, Clone, Serialize)]
pub struct LinkDetail {
    /// Router-assigned link identity.
    pub identity: Option<String>,
    /// Router-assigned link name.
    pub name: String,
    /// Operational status.
    pub oper_status: Option<String>,
    /// Administrative status.
    pub admin_status: Option<String>,
    /// Total deliveries over the link.
    pub delivery_count: u64,
    /// Link credit capacity.
    pub capacity: Option<u64>,
    /// Deliveries still queued on the link: undelivered plus unsettled.
    pub backlog: u64,
    /// Short name of the owning router, when known.
    pub router_name: Option<String>,
    /// Container name of the owning client, when known.
    pub client_name: Option<String>,
    /// Deliveries accepted.
    pub accepted_count: u64,
    /// Deliveries released.
    pub released_count: u64,
    /// Deliveries rejected.
    pub rejected_count: u64,
    /// Deliveries modified.
    pub modified_count: u64,
    /// Deliveries awaiting settlement.
    pub unsettled_count: u64,
    /// Deliveries sent presettled.
    pub presettled_count: u64,
    /// Deliveries not yet sent.
    pub undelivered_count: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub last_updated: u64,
}

impl LinkDetail {
    fn capture(link: &RawLink, router_name: Option<&str>, client_name: Option<&str>) -> Self {
        Self {
            identity: link.identity.clone(),
            name: link.name.clone(),
            oper_status: link.oper_status.clone(),
            admin_status: link.admin_status.clone(),
            delivery_count: link.delivery_count.unwrap_or(0),
            capacity: link.capacity,
            backlog: link.undelivered_count.unwrap_or(0) + link.unsettled_count.unwrap_or(0),
            router_name: router_name.map(str::to_owned),
            client_name: client_name.map(str::to_owned),
            accepted_count: Outcome::Accepted.count_on(link),
            released_count: Outcome::Released.count_on(link),
            rejected_count: Outcome::Rejected.count_on(link),
            modified_count: Outcome::Modified.count_on(link),
            unsettled_count: Outcome::Unsettled.count_on(link),
            presettled_count: Outcome::Presettled.count_on(link),
            undelivered_count: Outcome::Undelivered.count_on(link),
            last_updated: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
