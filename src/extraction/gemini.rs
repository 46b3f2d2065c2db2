use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::extraction::{RawScheduleEntry, ScheduleExtractor};

const CONNECT_TIMEOUT_SECS: u64 = 6;
const ERROR_PREVIEW_CHARS: usize = 180;

const TIMETABLE_PROMPT: &str = r#"Read this timetable image. Day names run down the first column and time ranges run across the header row; every non-empty cell is one class.

Rules:
1. Only report cells with readable text. Skip empty, shaded or illegible cells.
2. Take the times from the cell's column header and write them as "H:MM AM/PM", for example column "12-01" is 12:00 PM to 1:00 PM.
3. A cell spanning several columns starts at the first column and ends at the end of the last one.
4. Cohort markers such as G1, G2 or "Group 1" go in "group" and are removed from the subject: "SC LAB G1" is subject "SC LAB", group "G1".
5. Never mix cells from different rows.
6. When unsure about a cell, leave it out.

Return a JSON array of objects with day, startTime, endTime, subject, room (or null) and group (or null)."#;

static RESPONSE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "day": { "type": "STRING" },
                "startTime": { "type": "STRING" },
                "endTime": { "type": "STRING" },
                "subject": { "type": "STRING" },
                "room": { "type": "STRING", "nullable": true },
                "group": { "type": "STRING", "nullable": true }
            },
            "required": ["day", "startTime", "endTime", "subject"]
        }
    })
});

/// Timetable extraction through the Gemini `generateContent` REST endpoint.
pub struct GeminiExtractor {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiExtractor {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| ExtractionError::MissingApiKey(config.api_key_env.clone()))?;
        let client = Client::builder()
            .user_agent("attendance-tracker/0.1")
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.model)
    }
}

pub fn build_request_body(image: &[u8], mime_type: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(image) } },
                { "text": TIMETABLE_PROMPT }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "temperature": 0,
            "responseSchema": RESPONSE_SCHEMA.clone()
        }
    })
}

/// Pulls the schedule array out of a `generateContent` response.
///
/// A response without any text part is treated as "nothing found".
pub fn parse_response(body: &Value) -> Result<Vec<RawScheduleEntry>, ExtractionError> {
    let text: String = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let text = strip_code_fence(text.trim());
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|e| ExtractionError::Malformed(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl ScheduleExtractor for GeminiExtractor {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<RawScheduleEntry>, ExtractionError> {
        let url = self.url();
        debug!("POST {url} ({} image bytes)", image.len());
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request_body(image, mime_type))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(ExtractionError::Upstream {
                status: status.as_u16(),
                body: preview,
            });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        parse_response(&value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ExtractionConfig;
    use crate::error::ExtractionError;

    use super::{build_request_body, parse_response, GeminiExtractor};

    #[test]
    fn request_body_carries_image_and_schema() {
        let body = build_request_body(b"abc", "image/jpeg");
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/data"),
            Some(&json!("YWJj"))
        );
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/mimeType"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(body.pointer("/generationConfig/temperature"), Some(&json!(0)));
        assert_eq!(
            body.pointer("/generationConfig/responseSchema/type"),
            Some(&json!("ARRAY"))
        );
    }

    #[test]
    fn parses_schedule_from_candidate_text() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "text": "[{\"day\":\"Monday\",\"startTime\":\"11:00 AM\",\"endTime\":\"1:00 PM\",\"subject\":\"SC LAB\",\"room\":null,\"group\":\"G1\"}]"
                    }]
                }
            }]
        });
        let rows = parse_response(&payload).expect("parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject, "SC LAB");
        assert_eq!(rows[0].group.as_deref(), Some("G1"));
        assert!(rows[0].room.is_none());
    }

    #[test]
    fn accepts_fenced_json_and_missing_text() {
        let fenced = json!({
            "candidates": [{ "content": { "parts": [{ "text": "```json\n[]\n```" }] } }]
        });
        assert!(parse_response(&fenced).expect("parse").is_empty());
        assert!(parse_response(&json!({ "candidates": [] }))
            .expect("parse")
            .is_empty());
    }

    #[test]
    fn rejects_non_schedule_text() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I could not read the image" }] } }]
        });
        assert!(matches!(
            parse_response(&payload),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = ExtractionConfig {
            api_key_env: "ATTENDANCE_TRACKER_TEST_UNSET_KEY".to_string(),
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            GeminiExtractor::from_config(&config),
            Err(ExtractionError::MissingApiKey(_))
        ));
    }

    #[test]
    fn builds_generate_content_url() {
        let config = ExtractionConfig {
            api_key: "k".to_string(),
            endpoint: "https://example.test/v1beta/models/".to_string(),
            model: "vision-model".to_string(),
            ..ExtractionConfig::default()
        };
        let extractor = GeminiExtractor::from_config(&config).expect("build extractor");
        assert_eq!(
            extractor.url(),
            "https://example.test/v1beta/models/vision-model:generateContent"
        );
    }
}
