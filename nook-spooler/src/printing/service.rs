//! Receipt print service - producer-facing entry point
//!
//! Producers hand a receipt over and get a job id back immediately. Nothing
//! on this path waits for a printer; the worker picks the job up.

use std::sync::Arc;

use nook_printer::{DeliveryError, Discovery, ReliableTransmitter, TransportChannel};
use thiserror::Error;
use tokio::sync::Notify;

use super::renderer::ReceiptEncoder;
use super::storage::{PrintJobQueue, QueueError, QueueStats};
use super::types::{
    JobCorrelation, JobStatus, JobStatusView, PrintJob, ReceiptData, ReceiptValidationError,
};
use super::worker::{QueueWorker, WorkerSettings};

#[derive(Debug, Error)]
pub enum PrintServiceError {
    #[error("Invalid receipt: {0}")]
    InvalidReceipt(#[from] ReceiptValidationError),

    #[error("Print queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("Print job {id} is {status}")]
    InvalidState { id: String, status: JobStatus },

    #[error("Direct print failed: {0}")]
    Delivery(#[from] DeliveryError),
}

pub type PrintServiceResult<T> = Result<T, PrintServiceError>;

impl From<QueueError> for PrintServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::JobNotFound(id) => PrintServiceError::JobNotFound(id),
            QueueError::InvalidTransition { id, from, .. } => {
                PrintServiceError::InvalidState { id, status: from }
            }
            other => PrintServiceError::QueueUnavailable(other.to_string()),
        }
    }
}

/// Receipt print service
///
/// Responsibilities:
/// - Validate and enqueue receipts (the single authoritative print path)
/// - Job status, listing and operator requeue
/// - Preview and operator test print
#[derive(Clone)]
pub struct ReceiptPrintService {
    queue: PrintJobQueue,
    encoder: Arc<ReceiptEncoder>,
    discovery: Arc<Discovery>,
    transmitter: Arc<ReliableTransmitter>,
    wake: Arc<Notify>,
}

impl ReceiptPrintService {
    pub fn new(
        queue: PrintJobQueue,
        encoder: ReceiptEncoder,
        discovery: Discovery,
        transmitter: ReliableTransmitter,
    ) -> Self {
        Self {
            queue,
            encoder: Arc::new(encoder),
            discovery: Arc::new(discovery),
            transmitter: Arc::new(transmitter),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Worker sharing this service's queue, encoder and transports
    pub fn worker(&self, settings: WorkerSettings) -> QueueWorker {
        QueueWorker::new(
            self.queue.clone(),
            self.encoder.clone(),
            self.discovery.clone(),
            self.transmitter.clone(),
            self.wake.clone(),
            settings,
        )
    }

    pub fn queue(&self) -> &PrintJobQueue {
        &self.queue
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Queue a receipt for printing and return its job id
    pub fn submit_receipt(
        &self,
        receipt: &ReceiptData,
        correlation: JobCorrelation,
        priority: i32,
    ) -> PrintServiceResult<String> {
        receipt.validate()?;

        let id = self
            .queue
            .enqueue(receipt, correlation, priority)
            .map_err(|e| {
                tracing::warn!(
                    transaction_id = %receipt.transaction_id,
                    error = %e,
                    "Receipt could not be queued"
                );
                PrintServiceError::QueueUnavailable(e.to_string())
            })?;

        self.wake.notify_one();
        tracing::info!(
            job_id = %id,
            transaction_id = %receipt.transaction_id,
            priority,
            "Receipt queued for printing"
        );
        Ok(id)
    }

    pub fn get_job_status(&self, id: &str) -> PrintServiceResult<JobStatusView> {
        let job = self.get_job(id)?;
        Ok(JobStatusView::from(&job))
    }

    pub fn get_job(&self, id: &str) -> PrintServiceResult<PrintJob> {
        self.queue
            .get(id)?
            .ok_or_else(|| PrintServiceError::JobNotFound(id.to_string()))
    }

    /// Encoded bytes exactly as the worker would send them
    pub fn preview(&self, receipt: &ReceiptData) -> Vec<u8> {
        let encoded = self.encoder.encode_with_report(receipt);
        if let Some(ref e) = encoded.symbol_error {
            tracing::warn!(
                transaction_id = %receipt.transaction_id,
                error = %e,
                "Access symbol omitted from preview"
            );
        }
        encoded.bytes
    }

    /// Put a Failed job back in the queue (operator action)
    pub fn requeue(&self, id: &str) -> PrintServiceResult<JobStatusView> {
        let job = self.queue.requeue(id)?;
        self.wake.notify_one();
        Ok(JobStatusView::from(&job))
    }

    pub fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> PrintServiceResult<Vec<PrintJob>> {
        Ok(self.queue.list(status, limit)?)
    }

    pub fn stats(&self) -> PrintServiceResult<QueueStats> {
        Ok(self.queue.stats()?)
    }

    /// Operator test print: encode and deliver right now, bypassing the queue.
    ///
    /// Undeliverable bytes end up in the fallback directory.
    pub async fn print_direct(
        &self,
        receipt: &ReceiptData,
    ) -> PrintServiceResult<TransportChannel> {
        receipt.validate()?;
        let bytes = self.preview(receipt);
        let channel = self.transmitter.deliver(&self.discovery, &bytes).await?;
        tracing::info!(
            transaction_id = %receipt.transaction_id,
            channel = %channel,
            "Direct print delivered"
        );
        Ok(channel)
    }
}

impl std::fmt::Debug for ReceiptPrintService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptPrintService")
            .field("queue", &"<PrintJobQueue>")
            .field("encoder", &self.encoder)
            .field("probes", &self.discovery.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::DEFAULT_PRIORITY;
    use crate::printing::types::fixtures::{dec, sample_receipt};
    use nook_printer::{FallbackStore, TransmitPolicy};
    use std::time::Duration;

    fn service(fallback_dir: &std::path::Path) -> ReceiptPrintService {
        let policy = TransmitPolicy {
            attempts: 1,
            retry_backoff: Duration::ZERO,
            ..TransmitPolicy::default()
        };
        ReceiptPrintService::new(
            PrintJobQueue::open_in_memory().unwrap(),
            ReceiptEncoder::default(),
            Discovery::new(Vec::new(), Duration::from_millis(10)),
            ReliableTransmitter::new(policy, FallbackStore::new(fallback_dir)),
        )
    }

    #[test]
    fn test_submit_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let id = svc
            .submit_receipt(&sample_receipt(), JobCorrelation::default(), DEFAULT_PRIORITY)
            .unwrap();
        let view = svc.get_job_status(&id).unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert_eq!(view.retry_count, 0);
        assert_eq!(view.error, None);
        assert_eq!(svc.stats().unwrap().pending, 1);
    }

    #[test]
    fn test_submit_rejects_invalid_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let mut receipt = sample_receipt();
        receipt.total_amount = dec("-5");
        let err = svc
            .submit_receipt(&receipt, JobCorrelation::default(), DEFAULT_PRIORITY)
            .unwrap_err();
        assert!(matches!(err, PrintServiceError::InvalidReceipt(_)));
        assert_eq!(svc.stats().unwrap().total, 0);
    }

    #[test]
    fn test_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        assert!(matches!(
            svc.get_job_status("nope"),
            Err(PrintServiceError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_requeue_pending_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let id = svc
            .submit_receipt(&sample_receipt(), JobCorrelation::default(), DEFAULT_PRIORITY)
            .unwrap();
        assert!(matches!(
            svc.requeue(&id),
            Err(PrintServiceError::InvalidState {
                status: JobStatus::Pending,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_print_direct_without_printer_saves_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let receipt = sample_receipt();

        let err = svc.print_direct(&receipt).await.unwrap_err();
        assert!(matches!(
            err,
            PrintServiceError::Delivery(DeliveryError::NoChannel)
        ));

        let files = FallbackStore::new(dir.path()).list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), svc.preview(&receipt));
        // Direct print never touches the queue
        assert_eq!(svc.stats().unwrap().total, 0);
    }
}
