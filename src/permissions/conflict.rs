use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{
    Conflict, ConflictResolution, ConflictSeverity, ConflictType, Grant, PermissionKey,
};

/// Groups candidates by (resource, action) and reports contradictions.
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn detect(candidates: &[Grant], now: DateTime<Utc>) -> Vec<Conflict> {
        let mut groups: BTreeMap<PermissionKey, Vec<&Grant>> = BTreeMap::new();
        for grant in candidates {
            groups.entry(grant.key()).or_default().push(grant);
        }

        let mut conflicts = Vec::new();
        for (key, members) in groups {
            if members.len() < 2 {
                continue;
            }

            let first = members[0].granted;
            if members.iter().any(|g| g.granted != first) {
                conflicts.push(Conflict {
                    resource: key.resource.clone(),
                    action: key.action.clone(),
                    conflict_type: ConflictType::Inheritance,
                    severity: ConflictSeverity::Medium,
                    members: members.iter().map(|g| (*g).clone()).collect(),
                    auto_resolvable: true,
                    suggested_resolution: ConflictResolution::KeepHighestPriority,
                });
            }

            if members.iter().any(|g| g.is_expired_at(now)) {
                conflicts.push(Conflict {
                    resource: key.resource,
                    action: key.action,
                    conflict_type: ConflictType::Expiry,
                    severity: ConflictSeverity::Low,
                    members: members.iter().map(|g| (*g).clone()).collect(),
                    auto_resolvable: true,
                    suggested_resolution: ConflictResolution::DropExpired,
                });
            }
        }

        conflicts
    }
}

/// Applies the suggested resolution of every auto-resolvable conflict.
///
/// Expired members are dropped before priority is compared, so an expired
/// grant can never win an inheritance conflict.
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn resolve(
        mut candidates: Vec<Grant>,
        conflicts: &[Conflict],
        now: DateTime<Utc>,
    ) -> Vec<Grant> {
        for conflict in conflicts.iter().filter(|c| !c.auto_resolvable) {
            tracing::warn!(
                resource = %conflict.resource,
                action = %conflict.action,
                conflict_type = ?conflict.conflict_type,
                "conflict needs manual resolution, leaving candidates untouched"
            );
        }

        let auto = |kind: ConflictType| {
            conflicts
                .iter()
                .filter(move |c| c.auto_resolvable && c.conflict_type == kind)
        };

        for conflict in auto(ConflictType::Expiry) {
            candidates.retain(|g| {
                !(g.matches_key(&conflict.resource, &conflict.action) && g.is_expired_at(now))
            });
        }

        for conflict in auto(ConflictType::Inheritance) {
            let best = candidates
                .iter()
                .filter(|g| g.matches_key(&conflict.resource, &conflict.action))
                .map(|g| g.priority)
                .min();

            if let Some(best) = best {
                candidates.retain(|g| {
                    !g.matches_key(&conflict.resource, &conflict.action) || g.priority == best
                });
            }
        }

        candidates
    }
}
