//! Receipt and print job types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default job priority (higher = more urgent)
pub const DEFAULT_PRIORITY: i32 = 5;

/// Upper bound accepted for `elapsed_hours`
pub const MAX_ELAPSED_HOURS: i64 = 10_000;

/// Logical receipt for one closed session
///
/// Built once by the producer and never mutated afterwards. Stored as the
/// JSON payload of a [`PrintJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptData {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub customer_name: String,
    /// Table or location label
    pub table_label: String,
    pub session_start: DateTime<Utc>,
    /// None for open-ended subscription sessions
    #[serde(default)]
    pub session_end: Option<DateTime<Utc>>,
    /// Known per-hour rate; derived from total / hours when absent
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    pub elapsed_hours: Decimal,
    pub total_amount: Decimal,
    pub payment_method: String,
    #[serde(default)]
    pub cash_tendered: Option<Decimal>,
    #[serde(default)]
    pub change_due: Option<Decimal>,

    // 扫码凭证 (e.g. Wi-Fi password)
    #[serde(default)]
    pub access_code: Option<String>,
    /// Caption for the access line, "Wi-Fi" when absent
    #[serde(default)]
    pub access_label: Option<String>,

    // 店铺展示信息
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub closing_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptValidationError {
    #[error("Transaction id is empty")]
    MissingTransactionId,

    #[error("Elapsed hours must not be negative: {0}")]
    NegativeHours(Decimal),

    #[error("Elapsed hours exceed {max}: {value}")]
    ExcessiveHours { value: Decimal, max: i64 },

    #[error("{field} must not be negative: {value}")]
    NegativeAmount { field: &'static str, value: Decimal },
}

impl ReceiptData {
    /// Reject receipts the encoder cannot lay out sensibly
    pub fn validate(&self) -> Result<(), ReceiptValidationError> {
        if self.transaction_id.trim().is_empty() {
            return Err(ReceiptValidationError::MissingTransactionId);
        }
        if self.elapsed_hours.is_sign_negative() && !self.elapsed_hours.is_zero() {
            return Err(ReceiptValidationError::NegativeHours(self.elapsed_hours));
        }
        if self.elapsed_hours > Decimal::from(MAX_ELAPSED_HOURS) {
            return Err(ReceiptValidationError::ExcessiveHours {
                value: self.elapsed_hours,
                max: MAX_ELAPSED_HOURS,
            });
        }

        let amounts = [
            ("total_amount", Some(self.total_amount)),
            ("hourly_rate", self.hourly_rate),
            ("cash_tendered", self.cash_tendered),
            ("change_due", self.change_due),
        ];
        for (field, value) in amounts {
            if let Some(value) = value
                && value.is_sign_negative()
                && !value.is_zero()
            {
                return Err(ReceiptValidationError::NegativeAmount { field, value });
            }
        }
        Ok(())
    }
}

/// Print job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed or Failed
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Why printing did not (fully) succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Symbol omitted, receipt still printed
    EncodingDegraded,
    DiscoveryFailed,
    TransmissionFailed,
    QueueUnavailable,
    /// Stored payload could not be decoded
    InvalidPayload,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::EncodingDegraded => "EncodingDegraded",
            FailureKind::DiscoveryFailed => "DiscoveryFailed",
            FailureKind::TransmissionFailed => "TransmissionFailed",
            FailureKind::QueueUnavailable => "QueueUnavailable",
            FailureKind::InvalidPayload => "InvalidPayload",
        };
        f.write_str(s)
    }
}

/// Traceability ids carried with a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCorrelation {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Durable print job
///
/// Timestamps are Unix millis. The payload is never rewritten after
/// enqueue; transitions only touch status, retry and error fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    /// Serialized [`ReceiptData`]
    pub payload: String,
    pub status: JobStatus,
    pub priority: i32,
    /// FIFO tie-breaker for equal creation times
    pub sequence: u64,
    pub created_at: i64,
    pub updated_at: i64,
    pub printed_at: Option<i64>,
    pub retry_count: u32,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    #[serde(default)]
    pub correlation: JobCorrelation,
}

impl PrintJob {
    /// Decode the stored receipt
    pub fn receipt(&self) -> Result<ReceiptData, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Caller-facing view of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub printed_at: Option<i64>,
}

impl From<&PrintJob> for JobStatusView {
    fn from(job: &PrintJob) -> Self {
        Self {
            status: job.status,
            retry_count: job.retry_count,
            error: job.error.clone(),
            failure_kind: job.failure_kind,
            printed_at: job.printed_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// 2.5 h session, 150.00 total, cash payment
    pub fn sample_receipt() -> ReceiptData {
        ReceiptData {
            transaction_id: "TX-1001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 14, 30, 0).unwrap(),
            customer_name: "Ana Reyes".to_string(),
            table_label: "Table 4".to_string(),
            session_start: Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap(),
            session_end: Some(Utc.with_ymd_and_hms(2026, 10, 15, 14, 30, 0).unwrap()),
            hourly_rate: None,
            elapsed_hours: dec("2.5"),
            total_amount: dec("150.00"),
            payment_method: "Cash".to_string(),
            cash_tendered: Some(dec("200")),
            change_due: Some(dec("50")),
            access_code: Some("nook-guest-2026".to_string()),
            access_label: None,
            business_name: None,
            address_lines: Vec::new(),
            closing_message: None,
        }
    }
}
