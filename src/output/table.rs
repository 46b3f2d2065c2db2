use chrono::NaiveDate;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::attendance::{standing_message, AttendanceRecord, AttendanceStatus, OverallStats};
use crate::schedule::{Conflict, ScheduleEntry};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_schedule_table(entries: &[ScheduleEntry]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Day", "Time", "Subject", "Room", "Group", "Id"]);
    for entry in entries {
        table.add_row(vec![
            entry.day.clone(),
            format!("{} - {}", entry.start_time, entry.end_time),
            entry.subject.clone(),
            entry.room.clone().unwrap_or_else(|| "-".to_string()),
            entry.group.to_string(),
            entry.id.clone(),
        ]);
    }
    table.to_string()
}

pub fn render_conflicts_table(conflicts: &[Conflict]) -> String {
    let mut table = new_table();
    table.set_header(vec!["#", "Slot", "Group", "Classes"]);
    for (idx, conflict) in conflicts.iter().enumerate() {
        for (opt_idx, option) in conflict.options.iter().enumerate() {
            let classes = option
                .items
                .iter()
                .map(|item| match &item.room {
                    Some(room) => format!("{} ({room})", item.subject),
                    None => item.subject.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let (number, slot) = if opt_idx == 0 {
                ((idx + 1).to_string(), conflict.slot().to_string())
            } else {
                (String::new(), String::new())
            };
            table.add_row(Row::from(vec![
                Cell::new(number),
                Cell::new(slot),
                Cell::new(&option.group).fg(Color::Yellow),
                Cell::new(classes),
            ]));
        }
    }
    table.to_string()
}

pub fn render_stats_table(stats: &OverallStats) -> String {
    let mut table = new_table();
    table.set_header(vec!["Attendance", "Attended", "Missed", "Cancelled", "Total"]);
    let pct = if stats.has_data() {
        format!("{:.0}%", stats.percentage)
    } else {
        "0%".to_string()
    };
    let pct_cell = if stats.percentage >= 75.0 {
        Cell::new(pct).fg(Color::Green)
    } else {
        Cell::new(pct).fg(Color::Red)
    };
    table.add_row(Row::from(vec![
        pct_cell,
        Cell::new(stats.attended_classes),
        Cell::new(stats.missed_classes),
        Cell::new(stats.cancelled_classes),
        Cell::new(stats.total_classes),
    ]));

    let mut out = table.to_string();
    out.push('\n');
    out.push_str(standing_message(stats));
    out
}

/// Lists a day's classes. Statuses are shown only when `date` pins the day to a calendar date.
pub fn render_day_table(
    day: &str,
    entries: &[&ScheduleEntry],
    records: &[AttendanceRecord],
    date: Option<NaiveDate>,
) -> String {
    let mut table = new_table();
    table.set_header(vec!["Time", "Subject", "Room", "Group", "Status", "Id"]);
    for entry in entries {
        let status = date.and_then(|date| {
            records
                .iter()
                .rev()
                .find(|r| r.schedule_item_id == entry.id && r.date == date)
                .map(|r| r.status)
        });
        let status_cell = match status {
            Some(AttendanceStatus::Present) | Some(AttendanceStatus::Late) => {
                Cell::new(status.map(|s| s.to_string()).unwrap_or_default()).fg(Color::Green)
            }
            Some(AttendanceStatus::Absent) => Cell::new("Absent").fg(Color::Red),
            Some(other) => Cell::new(other.to_string()),
            None => Cell::new("-"),
        };
        table.add_row(Row::from(vec![
            Cell::new(format!("{} - {}", entry.start_time, entry.end_time)),
            Cell::new(&entry.subject),
            Cell::new(entry.room.as_deref().unwrap_or("-")),
            Cell::new(entry.group.to_string()),
            status_cell,
            Cell::new(&entry.id),
        ]));
    }
    match date {
        Some(date) => format!("{day} ({date})\n{table}"),
        None => format!("{day}\n{table}"),
    }
}
