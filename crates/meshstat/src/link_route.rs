//! Link-route resolution.
//!
//! Link routes forward traffic for an address prefix directly between
//! links, bypassing normal per-address distribution. Traffic carried
//! this way is invisible to configured-address accounting, so routed
//! prefixes are discovered here and folded into the address view.

use std::collections::HashMap;

use crate::router::{LinkDir, RawLinkRoute};

/// Name prefix of override routes, implementation artifacts that never
/// denote a user-visible routed address.
const OVERRIDE_PREFIX: &str = "override";

#[derive(Default)]
struct Directions {
    inbound: bool,
    outbound: bool,
}

/// Prefixes that are fully routed, per the directionality policy.
///
/// A prefix qualifies when an outbound route exists and either an
/// inbound route exists too, or the prefix itself is topic-scoped.
/// Topic-scoped prefixes are treated as inherently routed in both
/// directions. Routes named `override*` are ignored.
pub fn fully_routed_addresses(link_routes: &[RawLinkRoute]) -> Vec<String> {
    let mut by_prefix: HashMap<&str, Directions> = HashMap::new();
    for route in link_routes {
        if route.name.starts_with(OVERRIDE_PREFIX) {
            continue;
        }
        let dirs = by_prefix.entry(route.prefix.as_str()).or_default();
        match route.dir {
            Some(LinkDir::In) => dirs.inbound = true,
            Some(LinkDir::Out) => dirs.outbound = true,
            None => {}
        }
    }

    by_prefix
        .into_iter()
        .filter(|(prefix, dirs)| dirs.outbound && (dirs.inbound || is_topic_scoped(prefix)))
        .map(|(prefix, _)| prefix.to_owned())
        .collect()
}

fn is_topic_scoped(prefix: &str) -> bool {
    matches!(prefix.find("::"), Some(i) if i > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, prefix: &str, dir: LinkDir) -> RawLinkRoute {
        RawLinkRoute {
            name: name.into(),
            prefix: prefix.into(),
            dir: Some(dir),
        }
    }

    fn sorted(mut addresses: Vec<String>) -> Vec<String> {
        addresses.sort();
        addresses
    }

    #[test]
    fn test_both_directions_qualify() {
        let routes = [
            route("lr-in", "orders", LinkDir::In),
            route("lr-out", "orders", LinkDir::Out),
        ];
        assert_eq!(fully_routed_addresses(&routes), vec!["orders".to_owned()]);
    }

    #[test]
    fn test_outbound_only_does_not_qualify() {
        let routes = [route("lr-out", "orders", LinkDir::Out)];
        assert!(fully_routed_addresses(&routes).is_empty());
    }

    #[test]
    fn test_inbound_only_does_not_qualify() {
        let routes = [route("lr-in", "orders", LinkDir::In)];
        assert!(fully_routed_addresses(&routes).is_empty());
    }

    #[test]
    fn test_topic_scoped_prefix_needs_no_inbound() {
        let routes = [route("lr-out", "queue::sub", LinkDir::Out)];
        assert_eq!(
            fully_routed_addresses(&routes),
            vec!["queue::sub".to_owned()]
        );
    }

    #[test]
    fn test_leading_scope_delimiter_does_not_count() {
        let routes = [route("lr-out", "::sub", LinkDir::Out)];
        assert!(fully_routed_addresses(&routes).is_empty());
    }

    #[test]
    fn test_override_routes_ignored() {
        let routes = [
            route("override-in", "orders", LinkDir::In),
            route("lr-out", "orders", LinkDir::Out),
        ];
        assert!(fully_routed_addresses(&routes).is_empty());
    }

    #[test]
    fn test_multiple_prefixes() {
        let routes = [
            route("a-in", "orders", LinkDir::In),
            route("a-out", "orders", LinkDir::Out),
            route("b-out", "events", LinkDir::Out),
            route("c-out", "topic::all", LinkDir::Out),
        ];
        assert_eq!(
            sorted(fully_routed_addresses(&routes)),
            vec!["orders".to_owned(), "topic::all".to_owned()]
        );
    }
}
