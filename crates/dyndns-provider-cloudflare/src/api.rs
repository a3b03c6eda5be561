//! Cloudflare API v4 wire types
//!
//! Every response is wrapped in the same envelope:
//!
//! ```json
//! { "success": true, "errors": [], "messages": [], "result": ... }
//! ```

use dyndns_core::traits::{LiveRecord, RecordDraft, RecordType};
use serde::{Deserialize, Serialize};

/// Response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// Error or info entry of an envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Render envelope errors as one line, e.g. `"[1003] Invalid or missing zone id"`
pub(crate) fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Entry of `GET /zones`
#[derive(Debug, Deserialize)]
pub(crate) struct Zone {
    pub id: String,
    pub name: String,
}

/// Entry of `GET /zones/:zone_id/dns_records`
#[derive(Debug, Deserialize)]
pub(crate) struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
}

impl From<DnsRecord> for LiveRecord {
    fn from(record: DnsRecord) -> Self {
        LiveRecord {
            id: record.id,
            record_type: record.record_type,
            name: record.name,
            content: record.content,
            proxied: record.proxied,
        }
    }
}

/// Result of `DELETE /zones/:zone_id/dns_records/:id`
#[derive(Debug, Deserialize)]
pub(crate) struct Deleted {
    #[allow(dead_code)]
    pub id: String,
}

/// Body of record create (POST) and overwrite (PUT)
#[derive(Debug, Serialize)]
pub(crate) struct RecordBody<'a> {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: &'a str,
    pub content: &'a str,
    /// 1 means "automatic"
    pub ttl: u32,
    pub proxied: bool,
}

impl<'a> From<&'a RecordDraft> for RecordBody<'a> {
    fn from(draft: &'a RecordDraft) -> Self {
        RecordBody {
            record_type: draft.record_type,
            name: &draft.name,
            content: &draft.content,
            ttl: 1,
            proxied: draft.proxied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_listing() {
        let body = r#"{
            "success": true,
            "errors": [],
            "messages": [],
            "result": [
                { "id": "372e67954025e0ba6aaa6d586b9e0b59", "type": "AAAA",
                  "name": "home.example.com", "content": "2001:db8::5",
                  "proxied": false, "ttl": 1, "locked": false }
            ],
            "result_info": { "page": 1, "per_page": 100, "count": 1, "total_count": 1 }
        }"#;

        let envelope: Envelope<Vec<DnsRecord>> = serde_json::from_str(body).unwrap();
        assert!(envelope.success);

        let records: Vec<LiveRecord> = envelope
            .result
            .unwrap()
            .into_iter()
            .map(LiveRecord::from)
            .collect();
        assert_eq!(records[0].record_type, RecordType::Aaaa);
        assert_eq!(records[0].content, "2001:db8::5");
    }

    #[test]
    fn test_parse_failure_envelope() {
        let body = r#"{
            "success": false,
            "errors": [ { "code": 9109, "message": "Invalid access token" } ],
            "messages": [],
            "result": null
        }"#;

        let envelope: Envelope<Vec<Zone>> = serde_json::from_str(body).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
        assert_eq!(describe(&envelope.errors), "[9109] Invalid access token");
    }

    #[test]
    fn test_record_body_shape() {
        let draft = RecordDraft::new(RecordType::A, "example.com", "203.0.113.5", true);
        let body = serde_json::to_value(RecordBody::from(&draft)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "type": "A",
                "name": "example.com",
                "content": "203.0.113.5",
                "ttl": 1,
                "proxied": true
            })
        );
    }
}
