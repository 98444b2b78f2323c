//! Address-name normalization.
//!
//! Routers prefix every address with a routing-scope character, encode
//! multicast phases into the name, and scope topic subscriptions with a
//! `"::"` delimiter. Aggregation keys on the user-visible address, so
//! raw names are normalized before use.

/// Strip the routing prefix and any topic scope from a raw address.
///
/// Multicast addresses (`'M'` prefix) carry a phase digit in position 1
/// and lose a two-character prefix; every other non-empty address loses
/// a single scope character. A topic scope after the remaining prefix is
/// collapsed to the parent address.
///
/// # Example
///
/// ```
/// use meshstat::address::clean_address;
///
/// assert_eq!(clean_address("aorders"), "orders");
/// assert_eq!(clean_address("M1foo::bar"), "foo");
/// assert_eq!(clean_address(""), "");
/// ```
pub fn clean_address(raw: &str) -> &str {
    if raw.is_empty() {
        return raw;
    }
    let stripped = if raw.starts_with('M') {
        raw.get(2..).unwrap_or("")
    } else {
        raw.get(1..).unwrap_or("")
    };
    strip_topic_scope(stripped)
}

/// Multicast phase digit of a raw address, when present.
///
/// Only `'M'`-prefixed addresses carry a phase. The phase picks which
/// leg of a waypoint's store-and-forward traffic a delivery report
/// counts towards.
///
/// # Example
///
/// ```
/// use meshstat::address::address_phase;
///
/// assert_eq!(address_phase("M1foo::bar"), Some(1));
/// assert_eq!(address_phase("afoo"), None);
/// ```
pub fn address_phase(raw: &str) -> Option<u8> {
    if raw.starts_with('M') {
        raw.chars().nth(1).and_then(|c| c.to_digit(10)).map(|d| d as u8)
    } else {
        None
    }
}

// A leading "::" is not a scope delimiter.
fn strip_topic_scope(addr: &str) -> &str {
    match addr.find("::") {
        Some(i) if i > 0 => &addr[..i],
        _ => addr,
    }
}
