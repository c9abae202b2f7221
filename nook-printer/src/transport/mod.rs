//! # Printer Transport Layer
//!
//! Ways to reach a receipt printer from this host:
//!
//! - [`spooler`]: OS print spooler queue, raw (driver-bypassing) jobs
//! - [`serial`]: USB-serial and Bluetooth SPP device nodes, paced chunked writes
//! - [`discovery`]: ordered probes choosing one of the above per attempt

pub mod discovery;
pub mod serial;
pub mod spooler;

use std::fmt;
use std::path::PathBuf;

pub use discovery::{
    BluetoothSerialProbe, Discovery, DiscoveryConfig, SpoolerProbe, TransportProbe, UsbSerialProbe,
};
pub use serial::SerialPacing;

/// One concrete way to reach the printer
///
/// Never cached: availability changes between attempts (printer asleep,
/// re-paired, busy), so a fresh channel is discovered for every print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportChannel {
    /// Named OS spooler queue
    SpoolerQueue(String),
    /// USB-attached serial device node
    SerialDevice(PathBuf),
    /// Bluetooth serial (SPP) device node
    BluetoothSerialDevice(PathBuf),
}

impl TransportChannel {
    /// Short class name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            TransportChannel::SpoolerQueue(_) => "spooler",
            TransportChannel::SerialDevice(_) => "usb-serial",
            TransportChannel::BluetoothSerialDevice(_) => "bluetooth-serial",
        }
    }
}

impl fmt::Display for TransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportChannel::SpoolerQueue(name) => write!(f, "spooler:{}", name),
            TransportChannel::SerialDevice(path) => write!(f, "usb:{}", path.display()),
            TransportChannel::BluetoothSerialDevice(path) => {
                write!(f, "bluetooth:{}", path.display())
            }
        }
    }
}
