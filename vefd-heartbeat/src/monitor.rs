//! The heartbeat reporting loop.
//!
//! On each tick the monitor POSTs the pre-built request document, verifies
//! and audits the response, and processes any remote commands the
//! monitoring side stacked into it. No failure stops the loop.

use crate::audit::{AuditRecord, AuditSink};
use crate::envelope::{ContentCipher, HeartbeatRequest};
use crate::error::HeartbeatError;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Remote commands delivered inside heartbeat responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Re-send the device information exchange.
    InfoModify,
    /// Recognized shape but unhandled instruction; skipped.
    Other(String),
}

impl RemoteCommand {
    fn parse(value: &Value) -> Option<Self> {
        let name = value.get("command")?.as_str()?;
        Some(match name {
            "INFO-MODI-R" => RemoteCommand::InfoModify,
            other => RemoteCommand::Other(other.to_string()),
        })
    }
}

/// Extracts the command list from a decrypted response document.
pub fn extract_commands(decrypted: &Value) -> Vec<RemoteCommand> {
    decrypted
        .get("commands")
        .and_then(Value::as_array)
        .map(|commands| commands.iter().filter_map(RemoteCommand::parse).collect())
        .unwrap_or_default()
}

/// Heartbeat statistics.
#[derive(Debug)]
pub struct HeartbeatStats {
    pub ticks_total: u64,
    pub failures_total: u64,
    /// Time since the last successful exchange, if any.
    pub last_success: Option<Duration>,
}

/// Periodic status reporter.
pub struct HeartbeatMonitor {
    endpoint: String,
    request: HeartbeatRequest,
    cipher: Arc<dyn ContentCipher>,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
    http: reqwest::Client,
    shutdown: AtomicBool,
    notify: Notify,
    ticks: AtomicU64,
    failures: AtomicU64,
    last_success: parking_lot::Mutex<Option<Instant>>,
}

impl HeartbeatMonitor {
    pub fn new(
        endpoint: impl Into<String>,
        request: HeartbeatRequest,
        cipher: Arc<dyn ContentCipher>,
        audit: Arc<dyn AuditSink>,
        interval: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            request,
            cipher,
            audit,
            interval,
            http: reqwest::Client::new(),
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
            ticks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_success: parking_lot::Mutex::new(None),
        }
    }

    /// Runs the reporting loop (call from a background task).
    pub async fn run(&self) {
        tracing::info!(
            "Heartbeat monitor started (endpoint {}, interval {:?})",
            self.endpoint,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            self.ticks.fetch_add(1, Ordering::Relaxed);
            match self.beat().await {
                Ok(commands) => {
                    *self.last_success.lock() = Some(Instant::now());
                    for command in commands {
                        self.dispatch(command).await;
                    }
                }
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("heartbeat exchange failed: {}", e);
                }
            }
        }

        tracing::info!("Heartbeat monitor stopped");
    }

    /// One exchange: POST the report, verify, audit, collect commands.
    async fn beat(&self) -> Result<Vec<RemoteCommand>, HeartbeatError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HeartbeatError::MalformedResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        self.process_response(&body).await
    }

    /// Verifies and audits one monitoring response.
    ///
    /// A response without a signature is recorded as an unverified
    /// exchange; a signed response must verify before decryption.
    async fn process_response(&self, body: &Value) -> Result<Vec<RemoteCommand>, HeartbeatError> {
        let data = body.pointer("/message/body/data").ok_or_else(|| {
            HeartbeatError::MalformedResponse("missing message.body.data".to_string())
        })?;
        let content = data
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| HeartbeatError::MalformedResponse("missing content".to_string()))?;

        let request_doc = serde_json::to_value(&self.request)?;

        let Some(sign) = data.get("sign").and_then(Value::as_str) else {
            // The monitoring side answered in the clear.
            let record = AuditRecord::new(
                &self.request.bus_id,
                request_doc,
                None,
                Some(Value::String(content.to_string())),
                false,
            );
            self.audit.record(&record).await?;
            return Ok(Vec::new());
        };

        if self.cipher.sign(content.as_bytes()) != sign {
            return Err(HeartbeatError::SignatureMismatch);
        }

        let key = data.get("key").and_then(Value::as_str).ok_or_else(|| {
            HeartbeatError::MalformedResponse("signed response without key".to_string())
        })?;
        let decrypted = self.cipher.decrypt(key, content)?;

        let record = AuditRecord::new(
            &self.request.bus_id,
            request_doc,
            Some(content.to_string()),
            Some(decrypted.clone()),
            true,
        );
        self.audit.record(&record).await?;

        Ok(extract_commands(&decrypted))
    }

    async fn dispatch(&self, command: RemoteCommand) {
        match command {
            RemoteCommand::InfoModify => {
                tracing::info!("remote command INFO-MODI-R: re-sending device info");
                if let Err(e) = self.info_exchange().await {
                    tracing::warn!("device info exchange failed: {}", e);
                }
            }
            RemoteCommand::Other(name) => {
                tracing::debug!("remote command {} not handled, skipping", name);
            }
        }
    }

    /// Answers an INFO-MODI-R instruction by re-sending the device report
    /// under the info-modification report id.
    async fn info_exchange(&self) -> Result<(), HeartbeatError> {
        let request = self.request.with_bus_id("INFO-MODI-R");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!("device info exchange answered {}", response.status());
        }
        Ok(())
    }

    /// Signals the monitor to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Returns heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            ticks_total: self.ticks.load(Ordering::Relaxed),
            failures_total: self.failures.load(Ordering::Relaxed),
            last_success: self.last_success.lock().map(|at| at.elapsed()),
        }
    }
}
