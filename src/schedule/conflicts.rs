use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schedule::ids::{IdSource, UuidIds};
use crate::schedule::{GroupTag, ScheduleEntry, SlotKey};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub options: Vec<ConflictOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictOption {
    pub group: String,
    pub items: Vec<ScheduleEntry>,
}

impl Conflict {
    pub fn slot(&self) -> SlotKey {
        SlotKey {
            day: self.day.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|option| option.group.as_str())
    }

    pub fn option(&self, group: &str) -> Option<&ConflictOption> {
        self.options.iter().find(|option| option.group == group)
    }
}

pub fn detect_conflicts(entries: &[ScheduleEntry]) -> Vec<Conflict> {
    detect_conflicts_with(entries, &UuidIds)
}

/// Slots where two or more distinct group tags compete, in first-seen slot order.
///
/// Untagged entries are compatible with every group and never appear in an option.
pub fn detect_conflicts_with(entries: &[ScheduleEntry], ids: &dyn IdSource) -> Vec<Conflict> {
    let mut slots: IndexMap<SlotKey, Vec<&ScheduleEntry>> = IndexMap::new();
    for entry in entries {
        slots.entry(entry.slot()).or_default().push(entry);
    }

    let mut conflicts = Vec::new();
    for (slot, bucket) in slots {
        let mut by_group: IndexMap<&str, Vec<ScheduleEntry>> = IndexMap::new();
        for entry in bucket {
            let GroupTag::Tagged(tag) = &entry.group else {
                continue;
            };
            by_group.entry(tag.as_str()).or_default().push(entry.clone());
        }

        if by_group.len() < 2 {
            continue;
        }

        let options = by_group
            .into_iter()
            .map(|(group, items)| ConflictOption {
                group: group.to_string(),
                items,
            })
            .collect();
        conflicts.push(Conflict {
            id: ids.next_id(),
            day: slot.day,
            start_time: slot.start_time,
            end_time: slot.end_time,
            options,
        });
    }

    conflicts
}
