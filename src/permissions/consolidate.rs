use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{Grant, PermissionKey, WILDCARD};

/// Ranks two grants for the same key. Lower priority number first, then a
/// deny before an allow, then the smaller id so the choice never depends on
/// input order.
fn rank(a: &Grant, b: &Grant) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.granted.cmp(&b.granted))
        .then(a.id.cmp(&b.id))
}

/// Keeps exactly one grant per (resource, action).
pub fn consolidate(candidates: impl IntoIterator<Item = Grant>) -> BTreeMap<PermissionKey, Grant> {
    let mut decided: BTreeMap<PermissionKey, Grant> = BTreeMap::new();

    for grant in candidates {
        match decided.get(&grant.key()) {
            Some(current) if rank(current, &grant) != Ordering::Greater => {}
            _ => {
                decided.insert(grant.key(), grant);
            }
        }
    }

    decided
}

/// Finds the grant that decides `(resource, action)`.
///
/// An exact entry wins over wildcard entries, then `(resource, *)`, then
/// `(*, action)`, then `(*, *)`.
pub fn find_decisive<'a>(
    decided: &'a BTreeMap<PermissionKey, Grant>,
    resource: &str,
    action: &str,
) -> Option<&'a Grant> {
    let lookups = [
        (resource, action),
        (resource, WILDCARD),
        (WILDCARD, action),
        (WILDCARD, WILDCARD),
    ];

    lookups
        .into_iter()
        .find_map(|(r, a)| decided.get(&PermissionKey::new(r, a)))
}
