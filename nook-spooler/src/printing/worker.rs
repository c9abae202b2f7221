//! Print Queue Worker
//!
//! 从持久化队列取任务，渲染后发送到打印机，并记录结果。
//! The worker is the only code on the business path that touches hardware.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use nook_printer::{Discovery, ReliableTransmitter, TransportChannel};
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::renderer::ReceiptEncoder;
use super::storage::{PrintJobQueue, QueueResult};
use super::types::{FailureKind, PrintJob};

/// Loop timing
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Idle wait when the queue is empty and nobody wakes the worker
    pub poll_interval: Duration,
    /// How often Failed jobs are considered for automatic retry
    pub retry_scan_interval: Duration,
    /// Automatic retries stop once a job has failed this many times
    pub max_auto_retries: u32,
    pub sweep_interval: Duration,
    /// Terminal jobs untouched for longer than this are deleted
    pub retention: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry_scan_interval: Duration::from_secs(60),
            max_auto_retries: 3,
            sweep_interval: Duration::from_secs(3600),
            retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Floor for the idle poll so an empty queue never spins
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Floor for the retry scan and sweep timers
pub const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

impl WorkerSettings {
    /// Raise every interval to its floor
    pub fn clamped(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_POLL_INTERVAL),
            retry_scan_interval: self.retry_scan_interval.max(MIN_MAINTENANCE_INTERVAL),
            sweep_interval: self.sweep_interval.max(MIN_MAINTENANCE_INTERVAL),
            ..self
        }
    }
}

/// Result of processing one job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Printed {
        job_id: String,
        channel: TransportChannel,
    },
    Failed {
        job_id: String,
        kind: FailureKind,
    },
}

/// 打印队列工作者
///
/// Claims one job at a time. A failing job is recorded and the loop moves
/// on; nothing here can take the process down.
pub struct QueueWorker {
    queue: PrintJobQueue,
    encoder: Arc<ReceiptEncoder>,
    discovery: Arc<Discovery>,
    transmitter: Arc<ReliableTransmitter>,
    wake: Arc<Notify>,
    settings: WorkerSettings,
}

impl QueueWorker {
    pub fn new(
        queue: PrintJobQueue,
        encoder: Arc<ReceiptEncoder>,
        discovery: Arc<Discovery>,
        transmitter: Arc<ReliableTransmitter>,
        wake: Arc<Notify>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            encoder,
            discovery,
            transmitter,
            wake,
            settings: settings.clamped(),
        }
    }

    /// 运行工作者（阻塞直到收到 shutdown 信号）
    ///
    /// Shutdown is only observed between jobs; a transmission in progress
    /// runs to completion or failure.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Print queue worker started");

        match self.queue.recover_in_flight() {
            Ok(0) => {}
            Ok(n) => tracing::warn!(recovered = n, "Returned interrupted print jobs to the queue"),
            Err(e) => tracing::error!(error = %e, "Failed to recover interrupted print jobs"),
        }

        let mut retry_scan = periodic(self.settings.retry_scan_interval);
        let mut sweep = periodic(self.settings.sweep_interval);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Checked every pass, including while the queue stays busy
            if retry_scan.tick().now_or_never().is_some() {
                self.requeue_retryable();
            }
            if sweep.tick().now_or_never().is_some() {
                self.sweep();
            }

            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Failed to claim print job"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = retry_scan.tick() => self.requeue_retryable(),
                _ = sweep.tick() => self.sweep(),
            }
        }

        tracing::info!("Print queue worker received shutdown signal");
    }

    /// Claim and process a single job, if any is Pending
    pub async fn process_next(&self) -> QueueResult<Option<JobOutcome>> {
        let Some(job) = self.queue.claim_next()? else {
            return Ok(None);
        };
        Ok(Some(self.process_job(job).await))
    }

    async fn process_job(&self, job: PrintJob) -> JobOutcome {
        tracing::debug!(
            job_id = %job.id,
            priority = job.priority,
            retry_count = job.retry_count,
            "Processing print job"
        );

        let receipt = match job.receipt() {
            Ok(r) => r,
            Err(e) => {
                return self.record_failure(
                    &job,
                    FailureKind::InvalidPayload,
                    &format!("Invalid receipt payload: {}", e),
                );
            }
        };

        let encoded = self.encoder.encode_with_report(&receipt);
        if let Some(ref e) = encoded.symbol_error {
            tracing::warn!(
                job_id = %job.id,
                kind = %FailureKind::EncodingDegraded,
                error = %e,
                "Access symbol omitted from receipt"
            );
        }

        // Fresh discovery for every job
        let Some(channel) = self.discovery.discover().await else {
            return self.record_failure(
                &job,
                FailureKind::DiscoveryFailed,
                "No printer transport available",
            );
        };

        if let Err(e) = self.transmitter.transmit(&channel, &encoded.bytes).await {
            return self.record_failure(&job, FailureKind::TransmissionFailed, &e.to_string());
        }

        match self.queue.complete(&job.id) {
            Ok(_) => tracing::info!(job_id = %job.id, channel = %channel, "Receipt printed"),
            Err(e) => tracing::error!(
                job_id = %job.id,
                error = %e,
                "Receipt printed but job could not be marked completed"
            ),
        }

        JobOutcome::Printed {
            job_id: job.id,
            channel,
        }
    }

    fn record_failure(&self, job: &PrintJob, kind: FailureKind, error: &str) -> JobOutcome {
        match self.queue.fail(&job.id, kind, error) {
            Ok(failed) => tracing::warn!(
                job_id = %job.id,
                kind = %kind,
                retry_count = failed.retry_count,
                error,
                "Print job failed"
            ),
            Err(e) => tracing::error!(
                job_id = %job.id,
                kind = %kind,
                error = %e,
                "Failed to record print job failure"
            ),
        }

        JobOutcome::Failed {
            job_id: job.id.clone(),
            kind,
        }
    }

    fn requeue_retryable(&self) {
        match self.queue.requeue_retryable(self.settings.max_auto_retries) {
            Ok(0) => {}
            Ok(n) => tracing::info!(requeued = n, "Failed print jobs scheduled for retry"),
            Err(e) => tracing::error!(error = %e, "Retry scan failed"),
        }
    }

    fn sweep(&self) {
        match self.queue.sweep(self.settings.retention) {
            Ok(0) => {}
            Ok(n) => tracing::info!(deleted = n, "Old print jobs cleaned up"),
            Err(e) => tracing::error!(error = %e, "Print job cleanup failed"),
        }
    }
}

/// Interval whose first tick is one period away
fn periodic(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::fixtures::sample_receipt;
    use crate::printing::types::{JobCorrelation, JobStatus};
    use nook_printer::transport::UsbSerialProbe;
    use nook_printer::{FallbackStore, SerialPacing, TransmitPolicy};

    struct Harness {
        _dir: tempfile::TempDir,
        device_dir: std::path::PathBuf,
        fallback: FallbackStore,
        queue: PrintJobQueue,
        worker: QueueWorker,
    }

    fn fast_policy() -> TransmitPolicy {
        let pacing = SerialPacing {
            chunk_size: 64,
            chunk_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        };
        TransmitPolicy {
            attempts: 2,
            retry_backoff: Duration::from_millis(1),
            open_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            spool_timeout: Duration::from_secs(1),
            usb: pacing,
            bluetooth: pacing,
        }
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("dev");
        std::fs::create_dir(&device_dir).unwrap();
        let fallback = FallbackStore::new(dir.path().join("fallback"));
        let queue = PrintJobQueue::open_in_memory().unwrap();

        let discovery = Discovery::new(
            vec![Box::new(UsbSerialProbe::new(device_dir.clone()))],
            Duration::from_secs(1),
        );
        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(ReceiptEncoder::default()),
            Arc::new(discovery),
            Arc::new(ReliableTransmitter::new(fast_policy(), fallback.clone())),
            Arc::new(Notify::new()),
            WorkerSettings::default(),
        );

        Harness {
            _dir: dir,
            device_dir,
            fallback,
            queue,
            worker,
        }
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let h = harness();
        assert_eq!(h.worker.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prints_and_completes() {
        let h = harness();
        let device = h.device_dir.join("ttyUSB0");
        std::fs::write(&device, b"").unwrap();

        let receipt = sample_receipt();
        let id = h.queue.enqueue(&receipt, JobCorrelation::default(), 5).unwrap();

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Printed {
                job_id: id.clone(),
                channel: TransportChannel::SerialDevice(device.clone()),
            }
        );

        let job = h.queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.printed_at.is_some());

        // Bytes on the wire are exactly the preview bytes
        let written = std::fs::read(&device).unwrap();
        assert_eq!(written, ReceiptEncoder::default().encode(&receipt));
    }

    #[tokio::test]
    async fn test_out_of_range_hours_still_print() {
        let h = harness();
        let device = h.device_dir.join("ttyUSB0");
        std::fs::write(&device, b"").unwrap();

        // Stored payloads skip submit-time validation
        let mut receipt = sample_receipt();
        receipt.elapsed_hours = rust_decimal::Decimal::MAX;
        let id = h.queue.enqueue(&receipt, JobCorrelation::default(), 5).unwrap();

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert!(matches!(outcome, JobOutcome::Printed { .. }));
        assert_eq!(h.queue.get(&id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_no_transport_fails_without_fallback() {
        let h = harness();
        let id = h.queue.enqueue(&sample_receipt(), JobCorrelation::default(), 5).unwrap();

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                job_id: id.clone(),
                kind: FailureKind::DiscoveryFailed,
            }
        );

        let job = h.queue.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.failure_kind, Some(FailureKind::DiscoveryFailed));
        assert!(h.fallback.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transmit_failure_writes_fallback() {
        let h = harness();
        // Node is listed but is a directory, so opening it for write fails
        std::fs::create_dir(h.device_dir.join("ttyUSB0")).unwrap();
        let id = h.queue.enqueue(&sample_receipt(), JobCorrelation::default(), 5).unwrap();

        let outcome = h.worker.process_next().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                job_id: id.clone(),
                kind: FailureKind::TransmissionFailed,
            }
        );
        assert_eq!(h.fallback.list().await.unwrap().len(), 1);
        assert!(h.queue.get(&id).unwrap().unwrap().error.is_some());
    }

    /// Finds nothing after a fixed delay
    struct SlowEmptyProbe(Duration);

    #[async_trait::async_trait]
    impl nook_printer::TransportProbe for SlowEmptyProbe {
        fn name(&self) -> &'static str {
            "slow-empty"
        }

        async fn try_discover(&self) -> Option<TransportChannel> {
            tokio::time::sleep(self.0).await;
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_scan_runs_while_queue_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let queue = PrintJobQueue::open_in_memory().unwrap();

        // One job already failed once
        let failed = queue
            .enqueue(&sample_receipt(), JobCorrelation::default(), 9)
            .unwrap();
        queue.claim_next().unwrap().unwrap();
        queue
            .fail(&failed, FailureKind::DiscoveryFailed, "offline")
            .unwrap();

        // 100ms per job: 30 jobs keep the worker busy for 3s
        for _ in 0..30 {
            queue
                .enqueue(&sample_receipt(), JobCorrelation::default(), 5)
                .unwrap();
        }

        let worker = QueueWorker::new(
            queue.clone(),
            Arc::new(ReceiptEncoder::default()),
            Arc::new(Discovery::new(
                vec![Box::new(SlowEmptyProbe(Duration::from_millis(100)))],
                Duration::from_secs(1),
            )),
            Arc::new(ReliableTransmitter::new(
                fast_policy(),
                FallbackStore::new(dir.path().join("fallback")),
            )),
            Arc::new(Notify::new()),
            WorkerSettings {
                retry_scan_interval: Duration::from_secs(1),
                ..WorkerSettings::default()
            },
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(queue.stats().unwrap().pending > 0);
        let job = queue.get(&failed).unwrap().unwrap();
        assert!(job.status != JobStatus::Failed || job.retry_count >= 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(h.worker.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
