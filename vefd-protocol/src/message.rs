//! JSON payload documents exchanged inside frames.

use crate::frame::FrameFault;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content of a STATUS response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
}

impl StatusReport {
    /// The fixed document announcing the server is online.
    pub fn online() -> Self {
        Self {
            status: "online".to_string(),
        }
    }
}

/// Content of a DATA response: one invoice number assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAssignment {
    pub invoice_code: String,
    pub invoice_number: String,
}

impl InvoiceAssignment {
    /// Splits a queue work item of the form `code_number` on its first `_`.
    ///
    /// Returns `None` for items without a separator.
    pub fn from_work_item(item: &str) -> Option<Self> {
        let (code, number) = item.split_once('_')?;
        Some(Self {
            invoice_code: code.to_string(),
            invoice_number: number.to_string(),
        })
    }
}

/// Machine-identifiable reasons carried in ERROR responses.
///
/// The wire tokens are part of the device contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorReason {
    BadMagic0,
    BadMagic1,
    BadCommand,
    ChecksumMismatch,
    QueueUnavailable,
}

impl From<FrameFault> for ErrorReason {
    fn from(fault: FrameFault) -> Self {
        match fault {
            FrameFault::BadMagic0(_) => ErrorReason::BadMagic0,
            FrameFault::BadMagic1(_) => ErrorReason::BadMagic1,
            FrameFault::BadCommand(_) => ErrorReason::BadCommand,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReason::BadMagic0 => write!(f, "badMagic0"),
            ErrorReason::BadMagic1 => write!(f, "badMagic1"),
            ErrorReason::BadCommand => write!(f, "badCommand"),
            ErrorReason::ChecksumMismatch => write!(f, "checksumMismatch"),
            ErrorReason::QueueUnavailable => write!(f, "queueUnavailable"),
        }
    }
}

/// Content of an ERROR response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: ErrorReason,
}

impl ErrorReport {
    pub fn new(error: ErrorReason) -> Self {
        Self { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_document() {
        let json = serde_json::to_string(&StatusReport::online()).unwrap();
        assert_eq!(json, r#"{"status":"online"}"#);
    }

    #[test]
    fn test_work_item_split() {
        let assignment = InvoiceAssignment::from_work_item("INV001_4432").unwrap();
        assert_eq!(assignment.invoice_code, "INV001");
        assert_eq!(assignment.invoice_number, "4432");
    }

    #[test]
    fn test_work_item_splits_on_first_separator_only() {
        let assignment = InvoiceAssignment::from_work_item("INV_001_4432").unwrap();
        assert_eq!(assignment.invoice_code, "INV");
        assert_eq!(assignment.invoice_number, "001_4432");
    }

    #[test]
    fn test_malformed_work_item() {
        assert!(InvoiceAssignment::from_work_item("INV0014432").is_none());
    }

    #[test]
    fn test_error_tokens_are_stable() {
        let json = serde_json::to_string(&ErrorReport::new(ErrorReason::BadMagic0)).unwrap();
        assert_eq!(json, r#"{"error":"badMagic0"}"#);

        let json = serde_json::to_string(&ErrorReport::new(ErrorReason::ChecksumMismatch)).unwrap();
        assert_eq!(json, r#"{"error":"checksumMismatch"}"#);

        let parsed: ErrorReport = serde_json::from_str(r#"{"error":"queueUnavailable"}"#).unwrap();
        assert_eq!(parsed.error, ErrorReason::QueueUnavailable);
    }

    #[test]
    fn test_fault_to_reason() {
        assert_eq!(
            ErrorReason::from(FrameFault::BadMagic1(0x42)),
            ErrorReason::BadMagic1
        );
    }
}
