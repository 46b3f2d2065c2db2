use serde::{Deserialize, Serialize};

use crate::attendance::{AttendanceRecord, AttendanceStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub percentage: f64,
    pub total_classes: usize,
    pub attended_classes: usize,
    pub missed_classes: usize,
    pub cancelled_classes: usize,
}

impl OverallStats {
    pub fn has_data(&self) -> bool {
        self.total_classes > 0 || self.cancelled_classes > 0
    }
}

/// Cancelled classes are left out of the total; late counts as attended.
pub fn compute_stats(records: &[AttendanceRecord]) -> OverallStats {
    let mut total_classes = 0usize;
    let mut attended_classes = 0usize;
    let mut cancelled_classes = 0usize;
    for record in records {
        if record.status == AttendanceStatus::Cancelled {
            cancelled_classes += 1;
            continue;
        }
        total_classes += 1;
        if record.status.counts_as_attended() {
            attended_classes += 1;
        }
    }

    let percentage = if total_classes > 0 {
        (attended_classes as f64 / total_classes as f64) * 100.0
    } else {
        100.0
    };

    OverallStats {
        percentage,
        total_classes,
        attended_classes,
        missed_classes: total_classes - attended_classes,
        cancelled_classes,
    }
}

pub fn standing_message(stats: &OverallStats) -> &'static str {
    if !stats.has_data() {
        return "No data yet";
    }
    match stats.percentage {
        p if p >= 90.0 => "Excellent! Keep it up!",
        p if p >= 75.0 => "Good job, you're on track.",
        p if p >= 60.0 => "Attendance is slipping.",
        _ => "You need to attend more classes.",
    }
}
