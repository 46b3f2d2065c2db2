use anyhow::Result;

use crate::attendance::AttendanceRecord;
use crate::schedule::ScheduleEntry;

pub fn schedule_to_csv(entries: &[ScheduleEntry]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["id", "day", "start_time", "end_time", "subject", "room", "group"])?;
    for entry in entries {
        writer.write_record([
            entry.id.as_str(),
            entry.day.as_str(),
            entry.start_time.as_str(),
            entry.end_time.as_str(),
            entry.subject.as_str(),
            entry.room.as_deref().unwrap_or_default(),
            entry.group.as_tag().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn records_to_csv(records: &[AttendanceRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["date", "schedule_item_id", "status", "timestamp"])?;
    for record in records {
        writer.write_record([
            record.date.to_string(),
            record.schedule_item_id.clone(),
            format!("{:?}", record.status).to_uppercase(),
            record.timestamp.to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

#[cfg(test)]
mod tests {
    use crate::schedule::ScheduleEntry;

    use super::schedule_to_csv;

    #[test]
    fn untagged_entries_leave_group_blank() {
        let entries = vec![
            ScheduleEntry::new("1", "Monday", "9:00 AM", "10:00 AM", "Math").with_group("G1"),
            ScheduleEntry::new("2", "Monday", "10:00 AM", "11:00 AM", "Art").with_room("R2"),
        ];
        let csv = schedule_to_csv(&entries).expect("csv");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,day,start_time,end_time,subject,room,group");
        assert_eq!(lines[1], "1,Monday,9:00 AM,10:00 AM,Math,,G1");
        assert_eq!(lines[2], "2,Monday,10:00 AM,11:00 AM,Art,R2,");
    }
}
