//! Command dispatch.

use crate::error::ServerError;
use std::sync::Arc;
use std::time::Duration;
use vefd_protocol::codec::Inbound;
use vefd_protocol::frame::{Command, Frame};
use vefd_protocol::message::{ErrorReason, ErrorReport, InvoiceAssignment, StatusReport};
use vefd_queue::{QueueError, WorkItem, WorkQueue};

/// Bounded empty-queue retry policy.
///
/// State during a retry is local to the request; nothing is shared across
/// connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum pop attempts after the replenish trigger.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Maps each assembled inbound exchange to exactly one response frame.
pub struct CommandHandler {
    queue: Arc<dyn WorkQueue>,
    retry: RetryPolicy,
}

impl CommandHandler {
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            queue,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Produces the response frame for one inbound exchange.
    ///
    /// Every protocol-level fault maps to a well-formed ERROR frame, in
    /// priority order: framing fault, checksum fault, then the command.
    pub async fn respond(&self, inbound: Inbound) -> Result<Frame, ServerError> {
        match inbound {
            Inbound::FramingFault(fault) => {
                tracing::warn!("framing fault (code {}): {}", fault.code(), fault);
                Self::error_frame(fault.into())
            }
            Inbound::ChecksumFault {
                received, computed, ..
            } => {
                tracing::warn!(
                    "checksum mismatch: received {:#06x}, computed {:#06x}",
                    received,
                    computed
                );
                Self::error_frame(ErrorReason::ChecksumMismatch)
            }
            Inbound::Request {
                command: Command::Status,
                ..
            } => {
                let frame = Frame::from_json(Command::Status, &StatusReport::online())?;
                Ok(frame)
            }
            Inbound::Request {
                command: Command::Data,
                ..
            } => self.assign_invoice().await,
            Inbound::Request {
                command: Command::Error,
                ..
            } => {
                // The request decoder rejects ERROR before it gets here.
                Self::error_frame(ErrorReason::BadCommand)
            }
        }
    }

    /// DATA: pop a work item, triggering replenishment once on an empty
    /// queue and retrying within the bounded budget.
    async fn assign_invoice(&self) -> Result<Frame, ServerError> {
        match self.next_item().await {
            Ok(Some(item)) => match InvoiceAssignment::from_work_item(item.as_str()) {
                Some(assignment) => Ok(Frame::from_json(Command::Data, &assignment)?),
                None => {
                    tracing::error!("malformed work item {:?} (no separator)", item.as_str());
                    Self::error_frame(ErrorReason::QueueUnavailable)
                }
            },
            Ok(None) => {
                tracing::warn!(
                    "work queue still empty after replenishment, {} attempts exhausted",
                    self.retry.max_attempts
                );
                Self::error_frame(ErrorReason::QueueUnavailable)
            }
            Err(e) => {
                tracing::error!("work queue backend unavailable: {}", e);
                Self::error_frame(ErrorReason::QueueUnavailable)
            }
        }
    }

    /// Pops the next item. On an empty queue the replenish trigger fires
    /// exactly once, then polling continues with backoff until the budget
    /// runs out.
    async fn next_item(&self) -> Result<Option<WorkItem>, QueueError> {
        if let Some(item) = self.queue.pop().await? {
            return Ok(Some(item));
        }

        self.queue.replenish().await?;

        for attempt in 1..=self.retry.max_attempts {
            tokio::time::sleep(self.retry.backoff).await;
            if let Some(item) = self.queue.pop().await? {
                tracing::debug!("queue refilled after {} attempt(s)", attempt);
                return Ok(Some(item));
            }
        }

        Ok(None)
    }

    fn error_frame(reason: ErrorReason) -> Result<Frame, ServerError> {
        Ok(Frame::from_json(Command::Error, &ErrorReport::new(reason))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted queue: the first `empty_pops` pops yield `None`, the rest
    /// yield the configured item.
    struct ScriptedQueue {
        item: String,
        empty_pops: AtomicU32,
        pops: AtomicU32,
        replenishes: AtomicU32,
    }

    impl ScriptedQueue {
        fn with_item(item: &str) -> Self {
            Self {
                item: item.to_string(),
                empty_pops: AtomicU32::new(0),
                pops: AtomicU32::new(0),
                replenishes: AtomicU32::new(0),
            }
        }

        /// First `n` pops return empty.
        fn empty_for(self, n: u32) -> Self {
            self.empty_pops.store(n, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl WorkQueue for ScriptedQueue {
        async fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
            let seen = self.pops.fetch_add(1, Ordering::SeqCst);
            if seen < self.empty_pops.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(Some(WorkItem(self.item.clone())))
        }

        async fn replenish(&self) -> Result<(), QueueError> {
            self.replenishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A queue that is empty forever.
    struct EmptyQueue {
        replenishes: AtomicU32,
    }

    #[async_trait]
    impl WorkQueue for EmptyQueue {
        async fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
            Ok(None)
        }

        async fn replenish(&self) -> Result<(), QueueError> {
            self.replenishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn request(command: Command) -> Inbound {
        Inbound::Request {
            command,
            payload: bytes::Bytes::new(),
            document: None,
        }
    }

    fn decode_document<T: serde::de::DeserializeOwned>(frame: &Frame) -> T {
        serde_json::from_slice(&frame.payload).unwrap()
    }

    #[tokio::test]
    async fn test_status_exchange() {
        let queue = Arc::new(ScriptedQueue::with_item("INV001_4432"));
        let handler = CommandHandler::new(queue);

        let frame = handler.respond(request(Command::Status)).await.unwrap();
        assert_eq!(frame.command, Command::Status);
        let report: StatusReport = decode_document(&frame);
        assert_eq!(report, StatusReport::online());
    }

    #[tokio::test]
    async fn test_data_exchange_with_item() {
        let queue = Arc::new(ScriptedQueue::with_item("INV001_4432"));
        let handler = CommandHandler::new(queue.clone());

        let frame = handler.respond(request(Command::Data)).await.unwrap();
        assert_eq!(frame.command, Command::Data);
        let assignment: InvoiceAssignment = decode_document(&frame);
        assert_eq!(assignment.invoice_code, "INV001");
        assert_eq!(assignment.invoice_number, "4432");
        assert_eq!(queue.replenishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_replenished_once() {
        // Two empty pops: the initial one and the first retry; the item
        // appears on the second retry. Replenish must fire exactly once.
        let queue = Arc::new(ScriptedQueue::with_item("INV007_0099").empty_for(2));
        let handler = CommandHandler::new(queue.clone()).with_retry(fast_retry());

        let frame = handler.respond(request(Command::Data)).await.unwrap();
        assert_eq!(frame.command, Command::Data);
        let assignment: InvoiceAssignment = decode_document(&frame);
        assert_eq!(assignment.invoice_code, "INV007");
        assert_eq!(queue.replenishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_never_replenishes_terminates() {
        let queue = Arc::new(EmptyQueue {
            replenishes: AtomicU32::new(0),
        });
        let handler = CommandHandler::new(queue.clone()).with_retry(fast_retry());

        let frame = handler.respond(request(Command::Data)).await.unwrap();
        assert_eq!(frame.command, Command::Error);
        let report: ErrorReport = decode_document(&frame);
        assert_eq!(report.error, ErrorReason::QueueUnavailable);
        assert_eq!(queue.replenishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_framing_fault_response() {
        let queue = Arc::new(ScriptedQueue::with_item("INV001_4432"));
        let handler = CommandHandler::new(queue);

        let frame = handler
            .respond(Inbound::FramingFault(
                vefd_protocol::FrameFault::BadMagic0(0x00),
            ))
            .await
            .unwrap();
        assert_eq!(frame.command, Command::Error);
        let report: ErrorReport = decode_document(&frame);
        assert_eq!(report.error, ErrorReason::BadMagic0);
    }

    #[tokio::test]
    async fn test_checksum_fault_response() {
        let queue = Arc::new(ScriptedQueue::with_item("INV001_4432"));
        let handler = CommandHandler::new(queue);

        let frame = handler
            .respond(Inbound::ChecksumFault {
                command: Command::Data,
                received: 0x1234,
                computed: 0x4321,
            })
            .await
            .unwrap();
        assert_eq!(frame.command, Command::Error);
        let report: ErrorReport = decode_document(&frame);
        assert_eq!(report.error, ErrorReason::ChecksumMismatch);
    }

    #[tokio::test]
    async fn test_malformed_work_item_is_queue_unavailable() {
        let queue = Arc::new(ScriptedQueue::with_item("no-separator"));
        let handler = CommandHandler::new(queue);

        let frame = handler.respond(request(Command::Data)).await.unwrap();
        assert_eq!(frame.command, Command::Error);
        let report: ErrorReport = decode_document(&frame);
        assert_eq!(report.error, ErrorReason::QueueUnavailable);
    }
}
