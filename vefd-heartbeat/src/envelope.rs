//! Outbound heartbeat request material.
//!
//! The request document is built exactly once at startup from the device
//! report and the deployment's cipher, then reused on every tick. There is
//! no module-level state.

use crate::error::HeartbeatError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Seam for the deployment-provided payload cipher.
///
/// The engine never computes or interprets encryption; implementations
/// live outside this repository and are injected at startup.
pub trait ContentCipher: Send + Sync {
    /// Signature over encrypted content bytes.
    fn sign(&self, content: &[u8]) -> String;

    /// Decrypts response content using the wrapped key from the response.
    fn decrypt(&self, key: &str, content: &str) -> Result<Value, HeartbeatError>;
}

/// Stand-in cipher for deployments that exchange unencrypted documents.
///
/// Signatures are empty (so any signed response fails verification and is
/// rejected) and "decryption" parses the content as plain JSON.
pub struct PlainCipher;

impl ContentCipher for PlainCipher {
    fn sign(&self, _content: &[u8]) -> String {
        String::new()
    }

    fn decrypt(&self, _key: &str, content: &str) -> Result<Value, HeartbeatError> {
        serde_json::from_str(content)
            .map_err(|e| HeartbeatError::MalformedResponse(format!("plain content: {}", e)))
    }
}

/// The device status document carried inside the heartbeat content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub sw_version: String,
}

/// The outbound heartbeat document.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest {
    /// Report id announced to the monitoring side.
    pub bus_id: String,
    /// Encrypted (or plain, depending on deployment) device report.
    pub content: String,
    /// Signature over `content`.
    pub sign: String,
    /// Wrapped key material for the monitoring side.
    pub key: String,
}

impl HeartbeatRequest {
    /// Builds the outbound document once at startup.
    pub fn build(
        bus_id: impl Into<String>,
        content: impl Into<String>,
        cipher: &dyn ContentCipher,
        key: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let sign = cipher.sign(content.as_bytes());
        Self {
            bus_id: bus_id.into(),
            content,
            sign,
            key: key.into(),
        }
    }

    /// A copy of this request announced under a different report id.
    pub fn with_bus_id(&self, bus_id: impl Into<String>) -> Self {
        Self {
            bus_id: bus_id.into(),
            ..self.clone()
        }
    }
}
