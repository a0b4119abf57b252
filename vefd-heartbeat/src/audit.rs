//! Audit log for heartbeat exchanges.

use crate::error::HeartbeatError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One recorded heartbeat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// Report id the exchange ran under.
    pub bus_id: String,
    /// The outbound request document as sent.
    pub request: Value,
    /// Encrypted response content, when the response carried one.
    pub response_encrypted: Option<String>,
    /// Decrypted (or plain) response content.
    pub response_decrypted: Option<Value>,
    /// Whether the response was verified and decrypted.
    pub result: bool,
    pub log_time: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        bus_id: impl Into<String>,
        request: Value,
        response_encrypted: Option<String>,
        response_decrypted: Option<Value>,
        result: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bus_id: bus_id.into(),
            request,
            response_encrypted,
            response_decrypted,
            result,
            log_time: Utc::now(),
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), HeartbeatError>;
}

/// Appends one JSON document per exchange to a log file.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), HeartbeatError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_jsonl_sink_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::new(&path);

        let first = AuditRecord::new(
            "MONITOR-R",
            json!({"bus_id": "MONITOR-R"}),
            Some("0xdeadbeef".to_string()),
            Some(json!({"commands": []})),
            true,
        );
        let second = AuditRecord::new("MONITOR-R", json!({}), None, None, false);

        sink.record(&first).await.unwrap();
        sink.record(&second).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.bus_id, "MONITOR-R");
        assert!(parsed.result);
        assert_eq!(parsed.response_encrypted.as_deref(), Some("0xdeadbeef"));

        let parsed: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert!(!parsed.result);
        assert!(parsed.response_decrypted.is_none());
    }
}
