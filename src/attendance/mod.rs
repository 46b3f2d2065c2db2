pub mod stats;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::IdSource;

pub use stats::{compute_stats, standing_message, OverallStats};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Cancelled,
}

impl AttendanceStatus {
    pub fn counts_as_attended(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

impl Display for AttendanceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
            Self::Excused => "Excused",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown attendance status: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for AttendanceStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => Ok(Self::Present),
            "absent" | "a" => Ok(Self::Absent),
            "late" | "l" => Ok(Self::Late),
            "excused" | "e" => Ok(Self::Excused),
            "cancelled" | "canceled" | "c" => Ok(Self::Cancelled),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub schedule_item_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl AttendanceRecord {
    pub fn new(
        ids: &dyn IdSource,
        schedule_item_id: impl Into<String>,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            id: ids.next_id(),
            schedule_item_id: schedule_item_id.into(),
            date,
            status,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Replaces any record for the same class and date, then appends `record`.
pub fn upsert_record(records: &mut Vec<AttendanceRecord>, record: AttendanceRecord) {
    records.retain(|existing| {
        !(existing.schedule_item_id == record.schedule_item_id && existing.date == record.date)
    });
    records.push(record);
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::schedule::SequentialIds;

    use super::{upsert_record, AttendanceRecord, AttendanceStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).expect("valid date")
    }

    #[test]
    fn upsert_replaces_same_class_and_date() {
        let ids = SequentialIds::new("rec");
        let mut records = vec![
            AttendanceRecord::new(&ids, "math", day(2), AttendanceStatus::Absent),
            AttendanceRecord::new(&ids, "math", day(3), AttendanceStatus::Present),
            AttendanceRecord::new(&ids, "art", day(2), AttendanceStatus::Present),
        ];
        upsert_record(
            &mut records,
            AttendanceRecord::new(&ids, "math", day(2), AttendanceStatus::Late),
        );

        assert_eq!(records.len(), 3);
        let last = records.last().expect("missing record");
        assert_eq!(last.schedule_item_id, "math");
        assert_eq!(last.status, AttendanceStatus::Late);
        assert!(!records
            .iter()
            .any(|r| r.schedule_item_id == "math" && r.status == AttendanceStatus::Absent));
    }

    #[test]
    fn records_use_wire_field_names() {
        let record: AttendanceRecord = serde_json::from_value(json!({
            "id": "r1",
            "scheduleItemId": "math",
            "date": "2024-09-02",
            "status": "CANCELLED",
            "timestamp": 1725264000000i64
        }))
        .expect("failed to parse record");
        assert_eq!(record.status, AttendanceStatus::Cancelled);
        assert_eq!(record.date, day(2));
    }

    #[test]
    fn parses_status_names() {
        assert_eq!("late".parse::<AttendanceStatus>().ok(), Some(AttendanceStatus::Late));
        assert_eq!(
            "Canceled".parse::<AttendanceStatus>().ok(),
            Some(AttendanceStatus::Cancelled)
        );
        assert!("sick".parse::<AttendanceStatus>().is_err());
    }
}
