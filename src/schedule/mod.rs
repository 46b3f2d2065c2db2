pub mod conflicts;
pub mod ids;
pub mod resolver;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use conflicts::{detect_conflicts, detect_conflicts_with, Conflict, ConflictOption};
pub use ids::{IdSource, SequentialIds, UuidIds};
pub use resolver::{ensure_fully_resolved, resolve_conflicts, unresolved_conflicts, Resolutions};

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "GroupTag::is_untagged")]
    pub group: GroupTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_pattern: Option<String>,
}

impl ScheduleEntry {
    pub fn new(
        id: impl Into<String>,
        day: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            day: day.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            subject: subject.into(),
            room: None,
            group: GroupTag::Untagged,
            week_pattern: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = GroupTag::from_raw(Some(group.into()));
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn slot(&self) -> SlotKey {
        SlotKey {
            day: self.day.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }
}

/// Cohort an entry applies to. `Untagged` entries apply to every cohort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum GroupTag {
    #[default]
    Untagged,
    Tagged(String),
}

impl GroupTag {
    /// Missing, empty and whitespace-only tags all mean "no group".
    pub fn from_raw(raw: Option<String>) -> Self {
        match raw {
            Some(tag) if !tag.trim().is_empty() => Self::Tagged(tag),
            _ => Self::Untagged,
        }
    }

    pub fn is_untagged(&self) -> bool {
        matches!(self, Self::Untagged)
    }

    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Self::Untagged => None,
            Self::Tagged(tag) => Some(tag.as_str()),
        }
    }
}

impl Display for GroupTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Untagged => write!(f, "all"),
            Self::Tagged(tag) => write!(f, "{tag}"),
        }
    }
}

impl Serialize for GroupTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Untagged => serializer.serialize_none(),
            Self::Tagged(tag) => serializer.serialize_str(tag),
        }
    }
}

impl<'de> Deserialize<'de> for GroupTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_raw(raw))
    }
}

/// The (day, start, end) window two entries must share to compete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

impl Display for SlotKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} - {}", self.day, self.start_time, self.end_time)
    }
}

/// Entries held on `day`, matched case-insensitively, in schedule order.
pub fn entries_for_day<'a>(schedule: &'a [ScheduleEntry], day: &str) -> Vec<&'a ScheduleEntry> {
    schedule
        .iter()
        .filter(|entry| entry.day.eq_ignore_ascii_case(day.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{entries_for_day, GroupTag, ScheduleEntry};

    #[test]
    fn empty_and_null_groups_deserialize_as_untagged() {
        let entries: Vec<ScheduleEntry> = serde_json::from_value(json!([
            {"id": "a", "day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Math"},
            {"id": "b", "day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Math", "group": null},
            {"id": "c", "day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Math", "group": "  "},
            {"id": "d", "day": "Monday", "startTime": "9:00 AM", "endTime": "10:00 AM", "subject": "Lab", "group": "G1"}
        ]))
        .expect("failed to parse schedule");

        assert!(entries[0].group.is_untagged());
        assert!(entries[1].group.is_untagged());
        assert!(entries[2].group.is_untagged());
        assert_eq!(entries[3].group, GroupTag::Tagged("G1".to_string()));
    }

    #[test]
    fn serializes_with_camel_case_and_omits_missing_group() {
        let entry = ScheduleEntry::new("a", "Tuesday", "1:00 PM", "2:00 PM", "Physics")
            .with_room("B12");
        let value = serde_json::to_value(&entry).expect("failed to serialize");
        assert_eq!(value["startTime"], "1:00 PM");
        assert_eq!(value["room"], "B12");
        assert!(value.get("group").is_none());

        let tagged = entry.with_group("G2");
        let value = serde_json::to_value(&tagged).expect("failed to serialize");
        assert_eq!(value["group"], "G2");
    }

    #[test]
    fn filters_entries_for_day_ignoring_case() {
        let schedule = vec![
            ScheduleEntry::new("1", "Monday", "9:00 AM", "10:00 AM", "Math"),
            ScheduleEntry::new("2", "Tuesday", "9:00 AM", "10:00 AM", "Art"),
            ScheduleEntry::new("3", "monday", "11:00 AM", "12:00 PM", "Chem"),
        ];
        let monday = entries_for_day(&schedule, "MONDAY");
        let ids: Vec<&str> = monday.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
