//! Fleet-wide aggregation cycles.
//!
//! One cycle polls every known router node for its local tables and
//! reconciles them into a single [`Snapshot`]: connections are
//! classified, links are accumulated per address and per connection,
//! configured addresses and link routes feed propagation accounting,
//! and router-wide delivery totals are folded in phase-aware.
//!
//! Stages run strictly in sequence because later stages read state the
//! earlier ones accumulated; within a stage every router is queried
//! concurrently and the first failure sinks the cycle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{error, info};

use crate::address::{address_phase, clean_address};
use crate::config::{InternalIdentifiers, SpaceContext};
use crate::connection::{ConnectionLink, ConnectionRecord, application_connections};
use crate::error::{Error, QueryError, Result, Stage};
use crate::link_route::fully_routed_addresses;
use crate::outcome::OutcomeBundle;
use crate::router::{LinkDir, RawConnection, RawLink, Router};
use crate::stats::{AddressStats, Snapshot, stats_for_address};

/// Aggregates per-node telemetry from a router fleet into one consistent
/// snapshot per cycle.
///
/// The aggregator caches fleet membership between cycles; all counters
/// are recomputed from scratch each cycle from current node-reported
/// values. Polling cadence, retries, and cycle overlap are the caller's
/// concern.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use meshstat::{FleetStats, SpaceContext};
///
/// let mut stats = FleetStats::new(router, SpaceContext::default());
/// let snapshot = stats.collect().await?;
/// for (address, stat) in &snapshot.addresses {
///     println!("{address}: {} in / {} out", stat.messages_in, stat.messages_out);
/// }
/// ```
pub struct FleetStats {
    router: Arc<dyn Router>,
    routers: Vec<Arc<dyn Router>>,
    context: SpaceContext,
    internal: InternalIdentifiers,
}

impl FleetStats {
    /// Create an aggregator polling the fleet known to `router`.
    pub fn new(router: Arc<dyn Router>, context: SpaceContext) -> Self {
        Self::with_internal_identifiers(router, context, InternalIdentifiers::default())
    }

    /// Create an aggregator with a custom internal-component set.
    pub fn with_internal_identifiers(
        router: Arc<dyn Router>,
        context: SpaceContext,
        internal: InternalIdentifiers,
    ) -> Self {
        Self {
            router,
            routers: Vec::new(),
            context,
            internal,
        }
    }

    /// Fleet membership as of the last refresh.
    pub fn routers(&self) -> &[Arc<dyn Router>] {
        &self.routers
    }

    /// Run one aggregation cycle.
    ///
    /// Queries every fleet member stage by stage and merges the results
    /// into one snapshot. Any failing router query fails the whole
    /// cycle: the error is logged and returned, and the caller keeps
    /// whatever snapshot it already holds.
    pub async fn collect(&mut self) -> Result<Snapshot> {
        match self.collect_inner().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                error!("failed to retrieve router stats: {e}");
                Err(e)
            }
        }
    }

    /// Refresh fleet membership, logging changes.
    ///
    /// An empty result keeps the cached membership but yields an empty
    /// fleet for this cycle, so the snapshot comes out empty rather
    /// than partial.
    async fn update_routers(&mut self) -> Result<Vec<Arc<dyn Router>>> {
        let routers = self
            .router
            .list_routers()
            .await
            .map_err(|source| Error::stage(Stage::Routers, source))?;
        if routers.is_empty() {
            info!("no routers found");
            return Ok(Vec::new());
        }
        if !same_routers(&routers, &self.routers) {
            info!("routers changed: {:?}", targets(&routers));
        }
        self.routers = routers;
        Ok(self.routers.clone())
    }

    async fn collect_inner(&mut self) -> Result<Snapshot> {
        let routers = self.update_routers().await?;

        // Connections first: both accumulation passes key on the
        // classified connection map.
        let connection_results = query_stage(&routers, Stage::Connections, |r| async move {
            r.get_connections().await
        })
        .await?;
        let per_router: Vec<(Arc<dyn Router>, Vec<RawConnection>)> =
            routers.iter().cloned().zip(connection_results).collect();
        let mut connections =
            application_connections(&per_router, &self.context, &self.internal);

        let link_results =
            query_stage(&routers, Stage::Links, |r| async move { r.get_links().await }).await?;
        let mut addresses = AddressStats::new();
        for (index, links) in link_results.iter().enumerate() {
            collect_by_address(links, &mut addresses, &routers[index], &connections, index);
            collect_by_connection(links, &mut connections, &routers[index], index);
        }

        // Configured addresses mark propagation and waypoints.
        let configured = query_stage(&routers, Stage::Addresses, |r| async move {
            r.get_addresses().await
        })
        .await?;
        for reported in &configured {
            for address in reported {
                let stat = stats_for_address(&mut addresses, &address.prefix);
                stat.propagated += 1.0;
                if address.waypoint {
                    stat.waypoint = true;
                }
            }
        }

        // Link routes surface traffic that bypasses per-address
        // configuration; fold in the delivery totals accumulated above.
        let link_routes = query_stage(&routers, Stage::LinkRoutes, |r| async move {
            r.get_link_routes().await
        })
        .await?;
        for reported in &link_routes {
            for address in fully_routed_addresses(reported) {
                let stat = stats_for_address(&mut addresses, &address);
                stat.messages_in += stat.outcomes.ingress.aggregate_delivery_count();
                stat.messages_out += stat.outcomes.egress.aggregate_delivery_count();
                stat.propagated += 1.0;
            }
        }

        // Observation counts become a percentage of the fleet.
        for stat in addresses.values_mut() {
            stat.propagated = stat.propagated / routers.len() as f64 * 100.0;
        }

        let address_stats = query_stage(&routers, Stage::AddressStats, |r| async move {
            r.get_address_stats().await
        })
        .await?;
        for reported in &address_stats {
            for address in reported {
                let phase = address_phase(&address.name);
                let stat = stats_for_address(&mut addresses, clean_address(&address.name));
                if stat.waypoint {
                    // Phase 0 is the inbound leg of the relay, phase 1
                    // the outbound one; counting any other phase would
                    // double count the internal forwarding hop.
                    match phase {
                        Some(0) => stat.messages_in += address.deliveries_ingress,
                        Some(1) => stat.messages_out += address.deliveries_egress,
                        _ => {}
                    }
                } else {
                    stat.messages_in += address.deliveries_ingress;
                    stat.messages_out += address.deliveries_egress;
                }
            }
        }

        Ok(Snapshot {
            addresses,
            connections,
        })
    }
}

/// Issue one query to every router concurrently, failing the stage on
/// the first router error.
async fn query_stage<T, F, Fut>(
    routers: &[Arc<dyn Router>],
    stage: Stage,
    query: F,
) -> Result<Vec<Vec<T>>>
where
    F: Fn(Arc<dyn Router>) -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, QueryError>>,
{
    try_join_all(routers.iter().cloned().map(query))
        .await
        .map_err(|source| Error::stage(stage, source))
}

/// Fold endpoint links into per-address sender/receiver counts and
/// outcome totals.
///
/// Links without an owning address, of non-endpoint type, or on a
/// connection that is not in this cycle's classified map contribute
/// nothing. Inter-router links keep the address entry alive without
/// counting towards it.
fn collect_by_address(
    links: &[RawLink],
    stats: &mut AddressStats,
    router: &Arc<dyn Router>,
    connections: &HashMap<String, ConnectionRecord>,
    index: usize,
) {
    for link in links {
        if !link.is_endpoint() {
            continue;
        }
        let Some(owning_addr) = link.owning_addr.as_deref().filter(|a| !a.is_empty()) else {
            continue;
        };
        let Some(connection_id) = link.connection_id.as_deref() else {
            continue;
        };
        let Some(connection) = connections.get(&format!("{connection_id}-{index}")) else {
            continue;
        };

        let address = clean_address(owning_addr);
        let counts = stats_for_address(stats, address);
        if link.is_inter_router() {
            continue;
        }
        match link.link_dir {
            Some(LinkDir::In) => {
                counts.senders += 1;
                counts.outcomes.ingress.record(
                    link,
                    router.short_name(),
                    Some(&connection.container),
                );
            }
            Some(LinkDir::Out) => {
                counts.receivers += 1;
                counts.outcomes.egress.record(
                    link,
                    router.short_name(),
                    Some(&connection.container),
                );
            }
            None => {}
        }
    }
}

/// Fold every link into its owning connection's sender/receiver list,
/// outcome totals, and message counters.
///
/// Unlike the per-address pass this one takes all links, inter-router
/// ones included; a link whose connection is unknown is skipped.
fn collect_by_connection(
    links: &[RawLink],
    connections: &mut HashMap<String, ConnectionRecord>,
    router: &Arc<dyn Router>,
    index: usize,
) {
    for link in links {
        let Some(connection_id) = link.connection_id.as_deref() else {
            continue;
        };
        let Some(connection) = connections.get_mut(&format!("{connection_id}-{index}")) else {
            continue;
        };

        // The entry's own bundle captures the link without fleet
        // context; the connection-level bundles get it resolved.
        let mut outcomes = OutcomeBundle::new();
        outcomes.record(link, None, None);
        let deliveries = link.delivery_count.unwrap_or(0);
        let entry = ConnectionLink {
            address: link
                .owning_addr
                .as_deref()
                .map(|a| clean_address(a).to_owned()),
            name: link.name.clone(),
            // The router-assigned link id.
            uuid: link.name.clone(),
            deliveries,
            outcomes,
        };
        let client = connection.container.clone();
        match link.link_dir {
            Some(LinkDir::In) => {
                connection.senders.push(entry);
                connection
                    .outcomes
                    .ingress
                    .record(link, router.short_name(), Some(&client));
                connection.messages_in += deliveries;
            }
            Some(LinkDir::Out) => {
                connection.receivers.push(entry);
                connection
                    .outcomes
                    .egress
                    .record(link, router.short_name(), Some(&client));
                connection.messages_out += deliveries;
            }
            None => {}
        }
    }
}

fn same_routers(a: &[Arc<dyn Router>], b: &[Arc<dyn Router>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.target() == y.target())
}

fn targets(routers: &[Arc<dyn Router>]) -> Vec<&str> {
    routers.iter().map(|r| r.target()).collect()
}
