//! Fleet-wide statistics aggregation for message-router meshes.
//!
//! `meshstat` polls every known router node for its local connection,
//! link, address, link-route, and address-statistics tables and merges
//! them into one consistent snapshot per cycle: per-address traffic and
//! delivery-outcome totals, and per-connection totals for external
//! application connections. Naming differences introduced by routing
//! internals (scope prefixes, multicast phase tags, link-route virtual
//! addresses) are reconciled along the way.
//!
//! The transport to the routers is not part of this crate: the embedding
//! service supplies a [`Router`] capability per fleet member and decides
//! polling cadence. A failed cycle returns an error instead of a partial
//! snapshot, so the caller simply keeps the previous result.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use meshstat::{FleetStats, SpaceContext};
//!
//! let mut stats = FleetStats::new(router, SpaceContext::default());
//! match stats.collect().await {
//!     Ok(snapshot) => {
//!         for (address, stat) in &snapshot.addresses {
//!             println!("{address}: {}% propagated", stat.propagated);
//!         }
//!     }
//!     Err(e) => eprintln!("cycle failed: {e}"),
//! }
//! ```

pub mod address;
pub mod config;
pub mod connection;
mod error;
mod fleet;
pub mod link_route;
pub mod outcome;
pub mod router;
pub mod stats;

pub use config::{InternalIdentifiers, SpaceContext};
pub use error::{Error, QueryError, Result, Stage};
pub use fleet::FleetStats;
pub use router::Router;
pub use stats::{AddressStat, Snapshot};
