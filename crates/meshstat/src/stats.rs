//! Aggregated per-address statistics and the cycle snapshot.

use std::collections::HashMap;

use serde::Serialize;

use crate::connection::ConnectionRecord;
use crate::outcome::DirectionalOutcomes;

/// Traffic and delivery-outcome totals for one address across the fleet.
///
/// Created on first reference from any router, never removed within a
/// cycle, and rebuilt from scratch every cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressStat {
    /// Inbound endpoint links attached to the address.
    pub senders: u64,
    /// Outbound endpoint links attached to the address.
    pub receivers: u64,
    /// During a cycle, the number of routers that observed the address;
    /// after normalization, the percentage of the fleet (0-100).
    pub propagated: f64,
    /// Deliveries entering the mesh at this address.
    pub messages_in: u64,
    /// Deliveries leaving the mesh at this address.
    pub messages_out: u64,
    /// Outcome totals over the address's endpoint links.
    pub outcomes: DirectionalOutcomes,
    /// Sticky once set: traffic relays through a store-and-forward hop,
    /// so delivery reports are counted phase-aware.
    pub waypoint: bool,
}

/// Per-address statistics keyed by canonical address name.
pub type AddressStats = HashMap<String, AddressStat>;

/// Get or create the stats entry for an address.
pub(crate) fn stats_for_address<'a>(
    stats: &'a mut AddressStats,
    address: &str,
) -> &'a mut AddressStat {
    stats.entry(address.to_owned()).or_default()
}

/// Result of one aggregation cycle.
///
/// Address keys may still carry a `scope::` qualifier when the address
/// was only observed through configuration or link routes; registry
/// consumers deliver those under the unscoped remainder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Per-address statistics.
    pub addresses: AddressStats,
    /// External application connections, keyed by qualified identity.
    pub connections: HashMap<String, ConnectionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_created_on_first_reference() {
        let mut stats = AddressStats::new();
        stats_for_address(&mut stats, "orders").senders += 1;
        stats_for_address(&mut stats, "orders").senders += 1;

        assert_eq!(stats.len(), 1);
        assert_eq!(stats["orders"].senders, 2);
        assert_eq!(stats["orders"].receivers, 0);
        assert!(!stats["orders"].waypoint);
    }
}
