//! The router query capability and the raw rows it reports.
//!
//! Every fleet member exposes its local connection, link, address,
//! link-route, and address-statistics tables through the [`Router`]
//! trait. The wire protocol behind those queries lives in the transport
//! client supplied by the embedding service; this crate only consumes
//! the typed rows.
//!
//! Router-reported data is best-effort and sparse: absent fields are
//! `None` (or zero once folded in), never an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Direction of a link or link route, relative to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDir {
    /// Towards the router (client sends).
    In,
    /// Away from the router (client receives).
    Out,
}

/// Query capability for one member of the router fleet.
///
/// All queries are one-shot and may fail; a hung query hangs the cycle,
/// so timeout policy belongs to the implementation, not this crate.
#[async_trait]
pub trait Router: Send + Sync {
    /// Routing-table target identifier for this node.
    ///
    /// Used to diff fleet membership across cycles; two handles with the
    /// same target denote the same node.
    fn target(&self) -> &str;

    /// Short node name, parsed out of the `/`-separated target.
    fn short_name(&self) -> Option<&str> {
        self.target().split('/').nth(3)
    }

    /// Query the fleet membership as seen by this node.
    async fn list_routers(&self) -> Result<Vec<Arc<dyn Router>>, QueryError>;

    /// Query the node's local connection table.
    async fn get_connections(&self) -> Result<Vec<RawConnection>, QueryError>;

    /// Query the node's local link table.
    async fn get_links(&self) -> Result<Vec<RawLink>, QueryError>;

    /// Query the node's configured addresses.
    async fn get_addresses(&self) -> Result<Vec<RawConfiguredAddress>, QueryError>;

    /// Query the node's configured link routes.
    async fn get_link_routes(&self) -> Result<Vec<RawLinkRoute>, QueryError>;

    /// Query the node's per-address delivery totals.
    async fn get_address_stats(&self) -> Result<Vec<RawAddressStat>, QueryError>;

    /// Apply an administrative patch to one connection on this node.
    async fn update_connection(
        &self,
        selector: ConnectionSelector,
        patch: ConnectionPatch,
    ) -> Result<(), QueryError>;
}

/// Selects the connection an administrative patch applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSelector {
    /// Router-local connection identity.
    pub identity: String,
}

/// Administrative status requested for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    /// Connection stays open.
    Enabled,
    /// Router tears the connection down.
    Deleted,
}

/// Administrative patch applied via [`Router::update_connection`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionPatch {
    /// Requested administrative status.
    pub admin_status: Option<AdminStatus>,
}

/// Capability to request administrative close of one connection.
///
/// Bound to the owning router when the connection record is built, so
/// downstream consumers can close a client connection without holding a
/// router handle themselves.
#[derive(Clone)]
pub struct ConnectionCloser {
    router: Arc<dyn Router>,
    identity: String,
}

impl ConnectionCloser {
    pub(crate) fn new(router: Arc<dyn Router>, identity: String) -> Self {
        Self { router, identity }
    }

    /// Identity of the connection this capability closes.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Ask the owning router to mark the connection deleted.
    pub async fn request_close(&self) -> Result<(), QueryError> {
        self.router
            .update_connection(
                ConnectionSelector {
                    identity: self.identity.clone(),
                },
                ConnectionPatch {
                    admin_status: Some(AdminStatus::Deleted),
                },
            )
            .await
    }
}

impl fmt::Debug for ConnectionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCloser")
            .field("router", &self.router.target())
            .field("identity", &self.identity)
            .finish()
    }
}

/// A connection row as reported by one router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConnection {
    /// Router-local identity, unique only within one node and one cycle.
    pub identity: String,
    /// Remote container name.
    pub container: String,
    /// Remote host.
    pub host: String,
    /// Connection role; `"normal"` for client traffic.
    pub role: String,
    /// Properties advertised on open, e.g. `product`.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Whether the transport is encrypted.
    #[serde(default)]
    pub is_encrypted: bool,
    /// Whether the peer authenticated.
    #[serde(default)]
    pub is_authenticated: bool,
    /// Negotiated SASL mechanism, when authenticated.
    pub sasl: Option<String>,
    /// Authenticated user.
    pub user: Option<String>,
    /// Seconds since the router accepted the connection.
    #[serde(default)]
    pub uptime_seconds: u64,
}

/// A link row as reported by one router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLink {
    /// Router-assigned link identity.
    pub identity: Option<String>,
    /// Router-assigned link name, stable for the life of the link.
    pub name: String,
    /// Identity of the owning connection on the same node.
    pub connection_id: Option<String>,
    /// Link type; `"endpoint"` for client attachments.
    pub link_type: Option<String>,
    /// Direction relative to the router.
    pub link_dir: Option<LinkDir>,
    /// Raw address the link is attached to, routing prefix included.
    pub owning_addr: Option<String>,
    /// Operational status.
    pub oper_status: Option<String>,
    /// Administrative status.
    pub admin_status: Option<String>,
    /// Total deliveries over the link.
    pub delivery_count: Option<u64>,
    /// Link credit capacity.
    pub capacity: Option<u64>,
    /// Deliveries accepted.
    pub accepted_count: Option<u64>,
    /// Deliveries released.
    pub released_count: Option<u64>,
    /// Deliveries rejected.
    pub rejected_count: Option<u64>,
    /// Deliveries modified.
    pub modified_count: Option<u64>,
    /// Deliveries awaiting settlement.
    pub unsettled_count: Option<u64>,
    /// Deliveries sent presettled.
    pub presettled_count: Option<u64>,
    /// Deliveries not yet sent.
    pub undelivered_count: Option<u64>,
}

impl RawLink {
    /// Whether this link is a client attachment.
    pub fn is_endpoint(&self) -> bool {
        self.link_type.as_deref() == Some("endpoint")
    }

    /// Whether this is a router-internal inter-router link.
    ///
    /// Such links carry the reserved `qdlink.` name prefix and never
    /// represent application traffic.
    pub fn is_inter_router(&self) -> bool {
        self.name.starts_with("qdlink.")
    }
}

/// A configured address row as reported by one router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfiguredAddress {
    /// Configured address prefix.
    pub prefix: String,
    /// Whether traffic relays through a store-and-forward hop.
    #[serde(default)]
    pub waypoint: bool,
}

/// A link-route row as reported by one router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLinkRoute {
    /// Route name; `override*` names are implementation artifacts.
    pub name: String,
    /// Routed address prefix.
    pub prefix: String,
    /// Routed direction.
    pub dir: Option<LinkDir>,
}

/// Router-wide delivery totals for one address, phase variants included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAddressStat {
    /// Raw address name, routing prefix included.
    pub name: String,
    /// Deliveries entering the mesh at this address.
    #[serde(default)]
    pub deliveries_ingress: u64,
    /// Deliveries leaving the mesh at this address.
    #[serde(default)]
    pub deliveries_egress: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_detection() {
        let link = RawLink {
            link_type: Some("endpoint".into()),
            ..Default::default()
        };
        assert!(link.is_endpoint());
        assert!(!RawLink::default().is_endpoint());
    }

    #[test]
    fn test_inter_router_prefix() {
        let link = RawLink {
            name: "qdlink.abc123".into(),
            ..Default::default()
        };
        assert!(link.is_inter_router());

        let link = RawLink {
            name: "myapp.qdlink".into(),
            ..Default::default()
        };
        assert!(!link.is_inter_router());
    }

    #[test]
    fn test_link_dir_serde() {
        assert_eq!(serde_json::to_string(&LinkDir::In).unwrap(), "\"in\"");
        assert_eq!(
            serde_json::from_str::<LinkDir>("\"out\"").unwrap(),
            LinkDir::Out
        );
    }
}
