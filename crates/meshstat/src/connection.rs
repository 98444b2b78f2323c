//! Connection classification and record materialization.
//!
//! Routers report every connection they hold, control plane included.
//! Only external application connections are materialized into the
//! snapshot; everything else is dropped before the map is built.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::{InternalIdentifiers, SpaceContext};
use crate::outcome::{DirectionalOutcomes, OutcomeBundle};
use crate::router::{ConnectionCloser, RawConnection, Router};

/// Namespace under which stable connection identities are derived.
/// Changing it would re-key every tracked connection downstream.
const CONNECTION_ID_NAMESPACE: Uuid = Uuid::from_u128(0x1c1f79b652a54c6b9f31b0c62a7d4e52);

/// Deterministic identity for one logical client connection.
///
/// A v5 UUID over (namespace, address space, container, host) only, so
/// the same client receives the same identity across cycles and agent
/// restarts even though the router-local identity changes every cycle.
pub fn stable_uuid(namespace: &str, space: &str, container: &str, host: &str) -> Uuid {
    let mut name = Vec::new();
    for part in [namespace, space, container, host] {
        name.extend_from_slice(part.as_bytes());
        name.push(0);
    }
    Uuid::new_v5(&CONNECTION_ID_NAMESPACE, &name)
}

/// One sender or receiver entry on a connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionLink {
    /// Canonical address the link is attached to, when reported.
    pub address: Option<String>,
    /// Router-assigned link name.
    pub name: String,
    /// Router-assigned link id, stable for the life of the link.
    pub uuid: String,
    /// Delivery count at capture time.
    pub deliveries: u64,
    /// Outcome totals and the captured detail record for this link.
    pub outcomes: OutcomeBundle,
}

/// An external application connection, merged across the fleet.
///
/// Keyed in the snapshot by `"{identity}-{router_index}"` so identity
/// collisions across fleet members stay distinct. Built fresh each
/// cycle; never merged with prior cycles.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    /// Router-local identity, unique only within one node and one cycle.
    pub id: String,
    /// Address-space identifier.
    pub address_space: String,
    /// Namespace the address space lives in.
    pub address_space_namespace: String,
    /// Address-space type.
    pub address_space_type: String,
    /// Stable cross-cycle identity, see [`stable_uuid`].
    pub uuid: Uuid,
    /// Remote host.
    pub host: String,
    /// Remote container name.
    pub container: String,
    /// Properties advertised on open.
    pub properties: HashMap<String, String>,
    /// Whether the transport is encrypted.
    pub encrypted: bool,
    /// Negotiated SASL mechanism, `"none"` when unauthenticated.
    pub sasl_mechanism: String,
    /// Authenticated user.
    pub user: Option<String>,
    /// Deliveries sent by the client, summed over its sender links.
    pub messages_in: u64,
    /// Deliveries received by the client, summed over its receiver links.
    pub messages_out: u64,
    /// Outcome totals over all of the connection's links.
    pub outcomes: DirectionalOutcomes,
    /// Sender-link entries, in fold-in order.
    pub senders: Vec<ConnectionLink>,
    /// Receiver-link entries, in fold-in order.
    pub receivers: Vec<ConnectionLink>,
    /// Unix seconds the router accepted the connection, derived from
    /// the reported uptime.
    pub creation_timestamp: u64,
    /// Close capability bound to the owning router.
    #[serde(skip)]
    pub closer: ConnectionCloser,
}

fn is_internal(internal: &InternalIdentifiers, c: &RawConnection) -> bool {
    c.properties
        .get("product")
        .is_some_and(|product| internal.contains(product))
        || internal.contains(&c.container)
}

/// Whether a reported connection carries external application traffic.
pub fn is_application_connection(internal: &InternalIdentifiers, c: &RawConnection) -> bool {
    c.role == "normal" && !is_internal(internal, c)
}

/// Merge per-router connection tables into the global record map.
///
/// A reused qualified key is logged and overwritten, last write wins;
/// correct routers never produce one, so the anomaly is tolerated
/// rather than fatal.
pub(crate) fn application_connections(
    results: &[(Arc<dyn Router>, Vec<RawConnection>)],
    context: &SpaceContext,
    internal: &InternalIdentifiers,
) -> HashMap<String, ConnectionRecord> {
    let now = now_secs();
    let mut connections = HashMap::new();
    for (index, (router, reported)) in results.iter().enumerate() {
        for c in reported
            .iter()
            .filter(|c| is_application_connection(internal, c))
        {
            let qualified_id = format!("{}-{}", c.identity, index);
            if connections.contains_key(&qualified_id) {
                warn!("overwriting connection details for {qualified_id}");
            }
            let record = ConnectionRecord {
                id: c.identity.clone(),
                address_space: context.name.clone(),
                address_space_namespace: context.namespace.clone(),
                address_space_type: context.kind.clone(),
                uuid: stable_uuid(&context.namespace, &context.name, &c.container, &c.host),
                host: c.host.clone(),
                container: c.container.clone(),
                properties: c.properties.clone(),
                encrypted: c.is_encrypted,
                sasl_mechanism: if c.is_authenticated {
                    c.sasl.clone().unwrap_or_else(|| "none".into())
                } else {
                    "none".into()
                },
                user: c.user.clone(),
                messages_in: 0,
                messages_out: 0,
                outcomes: DirectionalOutcomes::default(),
                senders: Vec::new(),
                receivers: Vec::new(),
                creation_timestamp: now.saturating_sub(c.uptime_seconds),
                closer: ConnectionCloser::new(Arc::clone(router), c.identity.clone()),
            };
            connections.insert(qualified_id, record);
        }
    }
    connections
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
