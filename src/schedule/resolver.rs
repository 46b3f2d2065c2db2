use std::collections::{BTreeMap, HashSet};

use crate::error::ScheduleError;
use crate::schedule::conflicts::Conflict;
use crate::schedule::ScheduleEntry;

/// Conflict id -> selected group tag.
pub type Resolutions = BTreeMap<String, String>;

/// Drops the losing options of every resolved conflict.
///
/// Unresolved conflicts keep all their entries, and selections naming an unknown
/// conflict or group are ignored. The result is an order-preserving subset of
/// `entries`.
pub fn resolve_conflicts(
    entries: &[ScheduleEntry],
    conflicts: &[Conflict],
    resolutions: &Resolutions,
) -> Vec<ScheduleEntry> {
    let mut excluded: HashSet<&str> = HashSet::new();
    for conflict in conflicts {
        let Some(selected) = resolutions.get(&conflict.id) else {
            continue;
        };
        if conflict.option(selected).is_none() {
            continue;
        }
        for option in conflict.options.iter().filter(|o| &o.group != selected) {
            excluded.extend(option.items.iter().map(|item| item.id.as_str()));
        }
    }

    entries
        .iter()
        .filter(|entry| !excluded.contains(entry.id.as_str()))
        .cloned()
        .collect()
}

pub fn unresolved_conflicts<'a>(
    conflicts: &'a [Conflict],
    resolutions: &Resolutions,
) -> Vec<&'a Conflict> {
    conflicts
        .iter()
        .filter(|conflict| {
            resolutions
                .get(&conflict.id)
                .map(|group| conflict.option(group).is_none())
                .unwrap_or(true)
        })
        .collect()
}

/// Strict-mode guard for call sites that require every conflict to be decided.
pub fn ensure_fully_resolved(
    conflicts: &[Conflict],
    resolutions: &Resolutions,
) -> Result<(), ScheduleError> {
    let pending = unresolved_conflicts(conflicts, resolutions);
    if pending.is_empty() {
        return Ok(());
    }
    Err(ScheduleError::Unresolved {
        count: pending.len(),
        first: pending[0].slot().to_string(),
    })
}
