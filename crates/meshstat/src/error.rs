//! Error types for aggregation cycles.

use std::fmt;

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error produced by a [`Router`](crate::Router) query.
///
/// The transport client behind the capability is an external collaborator,
/// so its failures arrive here as opaque boxed errors.
pub type QueryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stages of one aggregation cycle.
///
/// Each stage issues one query to every fleet member. A failed cycle
/// records the stage whose query sank it on [`Error::Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fleet membership refresh.
    Routers,
    /// Per-node connection table query.
    Connections,
    /// Per-node link table query.
    Links,
    /// Per-node configured address query.
    Addresses,
    /// Per-node link route query.
    LinkRoutes,
    /// Per-node address statistics query.
    AddressStats,
}

impl Stage {
    /// Stable lower-case label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Routers => "routers",
            Stage::Connections => "connections",
            Stage::Links => "links",
            Stage::Addresses => "addresses",
            Stage::LinkRoutes => "link routes",
            Stage::AddressStats => "address stats",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can occur during an aggregation cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fleet-wide query failed on at least one router.
    ///
    /// One failing router invalidates the whole cycle; a snapshot missing
    /// a fleet member's contribution would silently understate propagation
    /// percentages and fleet totals.
    #[error("{stage} query failed: {source}")]
    Stage {
        /// The pipeline stage whose query failed.
        stage: Stage,
        /// The underlying router error.
        #[source]
        source: QueryError,
    },
}

impl Error {
    /// Tag a router query error with the stage it failed in.
    pub fn stage(stage: Stage, source: QueryError) -> Self {
        Self::Stage { stage, source }
    }

    /// The stage this error occurred in.
    pub fn failed_stage(&self) -> Stage {
        match self {
            Self::Stage { stage, .. } => *stage,
        }
    }
}
