//! End-to-end aggregation cycle tests.
//!
//! Drives `FleetStats` through the public API with scripted stub
//! routers: the single-router scenario, propagation across a two-router
//! fleet, waypoint phase accounting, link-route folding, stage-failure
//! short-circuiting, and stable connection identity.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshstat::router::{
    ConnectionPatch, ConnectionSelector, LinkDir, RawAddressStat, RawConfiguredAddress,
    RawConnection, RawLink, RawLinkRoute,
};
use meshstat::{FleetStats, QueryError, Router, SpaceContext, Stage};

/// A router whose every query returns scripted rows, with an optional
/// injected failure per stage.
#[derive(Default)]
struct StubRouter {
    target: String,
    members: Vec<Arc<dyn Router>>,
    connections: Vec<RawConnection>,
    links: Vec<RawLink>,
    addresses: Vec<RawConfiguredAddress>,
    link_routes: Vec<RawLinkRoute>,
    address_stats: Vec<RawAddressStat>,
    fail_on: Option<Stage>,
    closed: Mutex<Vec<String>>,
}

impl StubRouter {
    fn named(name: &str) -> Self {
        Self {
            target: format!("amqp:/_topo/0/{name}/$management"),
            ..Default::default()
        }
    }

    fn check(&self, stage: Stage) -> Result<(), QueryError> {
        if self.fail_on == Some(stage) {
            return Err(format!("stub failure in {stage}").into());
        }
        Ok(())
    }
}

#[async_trait]
impl Router for StubRouter {
    fn target(&self) -> &str {
        &self.target
    }

    async fn list_routers(&self) -> Result<Vec<Arc<dyn Router>>, QueryError> {
        self.check(Stage::Routers)?;
        Ok(self.members.clone())
    }

    async fn get_connections(&self) -> Result<Vec<RawConnection>, QueryError> {
        self.check(Stage::Connections)?;
        Ok(self.connections.clone())
    }

    async fn get_links(&self) -> Result<Vec<RawLink>, QueryError> {
        self.check(Stage::Links)?;
        Ok(self.links.clone())
    }

    async fn get_addresses(&self) -> Result<Vec<RawConfiguredAddress>, QueryError> {
        self.check(Stage::Addresses)?;
        Ok(self.addresses.clone())
    }

    async fn get_link_routes(&self) -> Result<Vec<RawLinkRoute>, QueryError> {
        self.check(Stage::LinkRoutes)?;
        Ok(self.link_routes.clone())
    }

    async fn get_address_stats(&self) -> Result<Vec<RawAddressStat>, QueryError> {
        self.check(Stage::AddressStats)?;
        Ok(self.address_stats.clone())
    }

    async fn update_connection(
        &self,
        selector: ConnectionSelector,
        _patch: ConnectionPatch,
    ) -> Result<(), QueryError> {
        self.closed.lock().unwrap().push(selector.identity);
        Ok(())
    }
}

/// Root handle whose membership query returns the given members.
fn fleet(members: Vec<Arc<StubRouter>>) -> Arc<dyn Router> {
    Arc::new(StubRouter {
        target: "stats".into(),
        members: members
            .into_iter()
            .map(|m| m as Arc<dyn Router>)
            .collect(),
        ..Default::default()
    })
}

fn context() -> SpaceContext {
    SpaceContext {
        name: "myspace".into(),
        namespace: "apps".into(),
        kind: "standard".into(),
    }
}

fn app_connection(identity: &str, container: &str, host: &str) -> RawConnection {
    RawConnection {
        identity: identity.into(),
        container: container.into(),
        host: host.into(),
        role: "normal".into(),
        uptime_seconds: 120,
        ..Default::default()
    }
}

fn endpoint_link(
    name: &str,
    connection_id: &str,
    owning_addr: &str,
    dir: LinkDir,
    deliveries: u64,
) -> RawLink {
    RawLink {
        name: name.into(),
        connection_id: Some(connection_id.into()),
        link_type: Some("endpoint".into()),
        link_dir: Some(dir),
        owning_addr: Some(owning_addr.into()),
        delivery_count: Some(deliveries),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_end_to_end_single_router() {
    let mut link = endpoint_link("l1", "1", "aorders", LinkDir::In, 4);
    link.accepted_count = Some(4);

    let router = Arc::new(StubRouter {
        connections: vec![app_connection("1", "myapp", "10.0.0.5:43210")],
        links: vec![link],
        addresses: vec![RawConfiguredAddress {
            prefix: "orders".into(),
            waypoint: false,
        }],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    let orders = &snapshot.addresses["orders"];
    assert_eq!(orders.senders, 1);
    assert_eq!(orders.receivers, 0);
    assert_eq!(orders.propagated, 100.0);
    assert_eq!(orders.outcomes.ingress.accepted, 4);
    assert_eq!(orders.outcomes.ingress.links.len(), 1);
    assert_eq!(
        orders.outcomes.ingress.links[0].router_name.as_deref(),
        Some("router-a")
    );
    assert_eq!(
        orders.outcomes.ingress.links[0].client_name.as_deref(),
        Some("myapp")
    );

    assert_eq!(snapshot.connections.len(), 1);
    let conn = &snapshot.connections["1-0"];
    assert_eq!(conn.container, "myapp");
    assert_eq!(conn.messages_in, 4);
    assert_eq!(conn.messages_out, 0);
    assert_eq!(conn.senders.len(), 1);
    assert_eq!(conn.senders[0].uuid, "l1");
    assert_eq!(conn.senders[0].address.as_deref(), Some("orders"));
    assert_eq!(conn.outcomes.ingress.accepted, 4);
    assert_eq!(conn.sasl_mechanism, "none");
}

#[tokio::test]
async fn test_propagation_across_two_routers() {
    let a = Arc::new(StubRouter {
        addresses: vec![RawConfiguredAddress {
            prefix: "events".into(),
            waypoint: false,
        }],
        ..StubRouter::named("router-a")
    });
    let b = Arc::new(StubRouter::named("router-b"));

    let mut stats = FleetStats::new(fleet(vec![a, b]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    assert_eq!(snapshot.addresses["events"].propagated, 50.0);
}

#[tokio::test]
async fn test_internal_connections_dropped() {
    let router = Arc::new(StubRouter {
        connections: vec![
            app_connection("1", "agent", "10.0.0.2:5671"),
            app_connection("2", "myapp", "10.0.0.5:43210"),
        ],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    assert_eq!(snapshot.connections.len(), 1);
    assert!(snapshot.connections.contains_key("2-0"));
}

#[tokio::test]
async fn test_waypoint_phase_accounting() {
    let router = Arc::new(StubRouter {
        addresses: vec![RawConfiguredAddress {
            prefix: "orders".into(),
            waypoint: true,
        }],
        address_stats: vec![
            RawAddressStat {
                name: "M0orders".into(),
                deliveries_ingress: 10,
                deliveries_egress: 99,
            },
            RawAddressStat {
                name: "M1orders".into(),
                deliveries_ingress: 99,
                deliveries_egress: 7,
            },
            // Internal forwarding leg, must not count.
            RawAddressStat {
                name: "M2orders".into(),
                deliveries_ingress: 5,
                deliveries_egress: 5,
            },
        ],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    let orders = &snapshot.addresses["orders"];
    assert!(orders.waypoint);
    assert_eq!(orders.messages_in, 10);
    assert_eq!(orders.messages_out, 7);
}

#[tokio::test]
async fn test_plain_address_stats_count_both_directions() {
    let router = Arc::new(StubRouter {
        address_stats: vec![RawAddressStat {
            name: "aevents".into(),
            deliveries_ingress: 3,
            deliveries_egress: 4,
        }],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    let events = &snapshot.addresses["events"];
    assert_eq!(events.messages_in, 3);
    assert_eq!(events.messages_out, 4);
}

#[tokio::test]
async fn test_link_route_folds_accumulated_deliveries() {
    let router = Arc::new(StubRouter {
        connections: vec![app_connection("1", "myapp", "10.0.0.5:43210")],
        links: vec![
            endpoint_link("l1", "1", "aorders", LinkDir::In, 4),
            endpoint_link("l2", "1", "aorders", LinkDir::Out, 6),
        ],
        link_routes: vec![
            RawLinkRoute {
                name: "lr-in".into(),
                prefix: "orders".into(),
                dir: Some(LinkDir::In),
            },
            RawLinkRoute {
                name: "lr-out".into(),
                prefix: "orders".into(),
                dir: Some(LinkDir::Out),
            },
        ],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    let orders = &snapshot.addresses["orders"];
    assert_eq!(orders.messages_in, 4);
    assert_eq!(orders.messages_out, 6);
    assert_eq!(orders.propagated, 100.0);
}

#[tokio::test]
async fn test_stage_failure_collapses_cycle() {
    let router = Arc::new(StubRouter {
        connections: vec![app_connection("1", "myapp", "10.0.0.5:43210")],
        fail_on: Some(Stage::Links),
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let err = stats.collect().await.expect_err("cycle fails");
    assert_eq!(err.failed_stage(), Stage::Links);
}

#[tokio::test]
async fn test_one_failing_router_sinks_the_fleet() {
    let healthy = Arc::new(StubRouter {
        addresses: vec![RawConfiguredAddress {
            prefix: "events".into(),
            waypoint: false,
        }],
        ..StubRouter::named("router-a")
    });
    let failing = Arc::new(StubRouter {
        fail_on: Some(Stage::Addresses),
        ..StubRouter::named("router-b")
    });

    let mut stats = FleetStats::new(fleet(vec![healthy, failing]), context());
    let err = stats.collect().await.expect_err("cycle fails");
    assert_eq!(err.failed_stage(), Stage::Addresses);
}

#[tokio::test]
async fn test_empty_fleet_yields_empty_snapshot() {
    let mut stats = FleetStats::new(fleet(Vec::new()), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    assert!(snapshot.addresses.is_empty());
    assert!(snapshot.connections.is_empty());
}

#[tokio::test]
async fn test_uuid_stable_across_cycles() {
    // The router-local identity differs between the two cycles; the
    // derived identity must not.
    let first = Arc::new(StubRouter {
        connections: vec![app_connection("17", "myapp", "10.0.0.5:43210")],
        ..StubRouter::named("router-a")
    });
    let second = Arc::new(StubRouter {
        connections: vec![app_connection("42", "myapp", "10.0.0.5:43210")],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![first]), context());
    let one = stats.collect().await.expect("first cycle");

    let mut stats = FleetStats::new(fleet(vec![second]), context());
    let two = stats.collect().await.expect("second cycle");

    assert_eq!(one.connections["17-0"].uuid, two.connections["42-0"].uuid);
}

#[tokio::test]
async fn test_closer_requests_deletion_on_owning_router() {
    let router = Arc::new(StubRouter {
        connections: vec![app_connection("1", "myapp", "10.0.0.5:43210")],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router.clone()]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    snapshot.connections["1-0"]
        .closer
        .request_close()
        .await
        .expect("close accepted");

    assert_eq!(*router.closed.lock().unwrap(), vec!["1".to_string()]);
}

#[tokio::test]
async fn test_snapshot_serializes() {
    let router = Arc::new(StubRouter {
        connections: vec![app_connection("1", "myapp", "10.0.0.5:43210")],
        links: vec![endpoint_link("l1", "1", "aorders", LinkDir::In, 4)],
        ..StubRouter::named("router-a")
    });

    let mut stats = FleetStats::new(fleet(vec![router]), context());
    let snapshot = stats.collect().await.expect("cycle succeeds");

    let value = serde_json::to_value(&snapshot).expect("serializes");
    assert_eq!(value["addresses"]["orders"]["senders"], 1);
    assert_eq!(value["connections"]["1-0"]["container"], "myapp");
    // The close capability stays out of the serialized form.
    assert!(value["connections"]["1-0"].get("closer").is_none());
}
