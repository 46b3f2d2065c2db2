pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExtractionError;
use crate::schedule::{GroupTag, IdSource, ScheduleEntry};

pub use gemini::GeminiExtractor;

/// A schedule row as the vision model reports it, before ids are settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawScheduleEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub week_pattern: Option<String>,
}

#[async_trait]
pub trait ScheduleExtractor: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<RawScheduleEntry>, ExtractionError>;
}

/// Keeps ids the model supplied and generates the rest. Zero rows is an error.
pub fn assign_ids(
    raw: Vec<RawScheduleEntry>,
    ids: &dyn IdSource,
) -> Result<Vec<ScheduleEntry>, ExtractionError> {
    if raw.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(raw
        .into_iter()
        .map(|row| ScheduleEntry {
            id: row
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| ids.next_id()),
            day: row.day.trim().to_string(),
            start_time: row.start_time.trim().to_string(),
            end_time: row.end_time.trim().to_string(),
            subject: row.subject.trim().to_string(),
            room: row.room.filter(|room| !room.trim().is_empty()),
            group: GroupTag::from_raw(row.group),
            week_pattern: row.week_pattern.filter(|p| !p.trim().is_empty()),
        })
        .collect())
}

pub async fn extract_schedule(
    extractor: &dyn ScheduleExtractor,
    image: &[u8],
    mime_type: &str,
    ids: &dyn IdSource,
) -> Result<Vec<ScheduleEntry>, ExtractionError> {
    let raw = extractor.extract(image, mime_type).await?;
    info!("{} returned {} schedule rows", extractor.name(), raw.len());
    assign_ids(raw, ids)
}

/// Best-effort MIME type from a file extension; defaults to PNG.
pub fn mime_type_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use crate::error::ExtractionError;
    use crate::schedule::{GroupTag, SequentialIds};

    use super::{assign_ids, extract_schedule, mime_type_for, RawScheduleEntry, ScheduleExtractor};

    fn raw(id: Option<&str>, group: Option<&str>) -> RawScheduleEntry {
        RawScheduleEntry {
            id: id.map(str::to_string),
            day: " Monday ".to_string(),
            start_time: "9:00 AM".to_string(),
            end_time: "10:00 AM".to_string(),
            subject: "SC LAB".to_string(),
            room: Some(String::new()),
            group: group.map(str::to_string),
            week_pattern: None,
        }
    }

    struct FixedExtractor(Vec<RawScheduleEntry>);

    #[async_trait]
    impl ScheduleExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract(
            &self,
            _image: &[u8],
            _mime_type: &str,
        ) -> Result<Vec<RawScheduleEntry>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn assigns_missing_ids_and_normalizes_fields() {
        let ids = SequentialIds::new("entry");
        let entries = assign_ids(vec![raw(None, Some("G1")), raw(Some("kept"), None)], &ids)
            .expect("assign ids");
        assert_eq!(entries[0].id, "entry-1");
        assert_eq!(entries[0].day, "Monday");
        assert_eq!(entries[0].group, GroupTag::Tagged("G1".to_string()));
        assert!(entries[0].room.is_none());
        assert_eq!(entries[1].id, "kept");
        assert!(entries[1].group.is_untagged());
    }

    #[test]
    fn empty_extraction_is_an_error() {
        let ids = SequentialIds::new("entry");
        assert!(matches!(assign_ids(Vec::new(), &ids), Err(ExtractionError::Empty)));
    }

    #[tokio::test]
    async fn extract_schedule_runs_extractor_then_assigns_ids() {
        let extractor = FixedExtractor(vec![raw(None, Some("G2"))]);
        let ids = SequentialIds::new("entry");
        let entries = extract_schedule(&extractor, b"png", "image/png", &ids)
            .await
            .expect("extract");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "entry-1");

        let empty = FixedExtractor(Vec::new());
        assert!(matches!(
            extract_schedule(&empty, b"png", "image/png", &ids).await,
            Err(ExtractionError::Empty)
        ));
    }

    #[test]
    fn guesses_mime_type_from_extension() {
        assert_eq!(mime_type_for(Path::new("week.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("week")), "image/png");
    }
}
