//! Error types for the printer library

use thiserror::Error;

/// Failure of a single transmission to a transport channel
#[derive(Debug, Error)]
pub enum TransmitError {
    /// Device or spool queue is missing, unpaired, or not openable
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Open, write, or spool submission did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device stopped accepting bytes mid-stream
    #[error("Partial write: {0}")]
    PartialWrite(String),

    /// The device or spooler refused the data
    #[error("Device rejected: {0}")]
    DeviceRejected(String),
}

impl TransmitError {
    /// Map an I/O error raised while opening a device
    pub(crate) fn from_open(path: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                TransmitError::ChannelUnavailable(format!("{}: {}", path, err))
            }
            ErrorKind::TimedOut => TransmitError::Timeout(format!("{}: {}", path, err)),
            _ => TransmitError::DeviceRejected(format!("{}: {}", path, err)),
        }
    }

    /// Map an I/O error raised while writing to a device
    pub(crate) fn from_write(path: &str, written: usize, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WriteZero | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                TransmitError::PartialWrite(format!(
                    "{}: {} bytes written before failure: {}",
                    path, written, err
                ))
            }
            ErrorKind::TimedOut => TransmitError::Timeout(format!("{}: {}", path, err)),
            ErrorKind::NotFound => TransmitError::ChannelUnavailable(format!("{}: {}", path, err)),
            _ => TransmitError::DeviceRejected(format!("{}: {}", path, err)),
        }
    }
}

/// Result type for transmission
pub type TransmitResult<T> = Result<T, TransmitError>;

/// Failure of discover-then-transmit delivery
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No probe found a usable channel
    #[error("No printer transport available")]
    NoChannel,

    /// A channel was found but every attempt failed
    #[error(transparent)]
    Transmit(#[from] TransmitError),
}
