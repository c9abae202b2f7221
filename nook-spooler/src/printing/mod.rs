//! Receipt Printing Module
//!
//! Turns closed sessions into printed receipts:
//! - `renderer`: ReceiptData -> ESC/POS bytes
//! - `storage`: durable, priority-ordered job queue (redb)
//! - `worker`: background loop draining the queue to the printer
//! - `service`: producer-facing API (submit, status, preview, requeue)

pub mod renderer;
pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use renderer::{EncodedReceipt, ReceiptEncoder};
pub use service::{PrintServiceError, PrintServiceResult, ReceiptPrintService};
pub use storage::{PrintJobQueue, QueueError, QueueResult, QueueStats};
pub use types::*;
pub use worker::{JobOutcome, QueueWorker, WorkerSettings};
