// src/matcher.rs
//
// Subscription matching: exact comparison on normalized location keys plus a
// configurable "all locations" wildcard. No substring matching: "SF" and
// "San Francisco" are distinct keys unless both are subscribed.

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::store::subscriptions::Subscription;

/// Canonical form used for location comparison everywhere: trimmed, inner
/// whitespace collapsed, lowercased. Storage keeps the original casing.
pub fn normalize_location(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s.trim(), " ").to_lowercase()
}

/// Destinations that should receive a bounty at `location`, given the cycle's
/// subscription snapshot. An empty/unknown location matches nobody; the
/// caller is responsible for counting and logging those.
pub fn matching_destinations(
    location: &str,
    subscriptions: &[Subscription],
    wildcard: &str,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let key = normalize_location(location);
    if key.is_empty() {
        return out;
    }
    let wild = normalize_location(wildcard);
    for sub in subscriptions {
        let sub_key = normalize_location(&sub.location);
        if sub_key == key || (!wild.is_empty() && sub_key == wild) {
            out.insert(sub.destination_id.clone());
        }
    }
    out
}
