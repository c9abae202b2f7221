//! Transport discovery
//!
//! Each probe takes a point-in-time snapshot of what the host exposes right
//! now (spool queues, device nodes). Probes run in priority order and the
//! first hit wins:
//!
//! 1. spooler queue bound to a receipt-class printer
//! 2. USB-serial adapter
//! 3. Bluetooth SPP node (never an "incoming" port)

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::TransportChannel;
use super::spooler;

/// Default upper bound for a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Queue-name fragments that identify receipt-class printers
pub const DEFAULT_SPOOLER_PATTERNS: &[&str] =
    &["receipt", "thermal", "pos", "tm-", "xp-58", "xp-80", "58mm", "80mm"];

/// Device node prefixes used by USB-serial adapters (Linux, macOS)
const USB_SERIAL_PREFIXES: &[&str] = &[
    "ttyUSB",
    "ttyACM",
    "cu.usbserial",
    "cu.usbmodem",
    "cu.wchusbserial",
    "cu.SLAB_USBtoUART",
];

/// A single way of looking for the printer
#[async_trait]
pub trait TransportProbe: Send + Sync {
    /// Probe name for logs
    fn name(&self) -> &'static str;

    /// Look for a usable channel right now
    async fn try_discover(&self) -> Option<TransportChannel>;
}

/// Inputs shared by the standard probes
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory holding device nodes
    pub device_dir: PathBuf,
    /// Known printer name: exact spooler queue, or Bluetooth name fragment
    pub printer_name: Option<String>,
    /// Spooler queue-name fragments (case-insensitive)
    pub spooler_patterns: Vec<String>,
    /// Upper bound for each probe
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            printer_name: None,
            spooler_patterns: DEFAULT_SPOOLER_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Ordered list of probes
pub struct Discovery {
    probes: Vec<Box<dyn TransportProbe>>,
    probe_timeout: Duration,
}

impl Discovery {
    /// Build from an explicit probe list (evaluated in order)
    pub fn new(probes: Vec<Box<dyn TransportProbe>>, probe_timeout: Duration) -> Self {
        Self {
            probes,
            probe_timeout,
        }
    }

    /// Spooler, then USB serial, then Bluetooth serial
    pub fn standard(config: &DiscoveryConfig) -> Self {
        let probes: Vec<Box<dyn TransportProbe>> = vec![
            Box::new(SpoolerProbe::new(
                config.printer_name.clone(),
                config.spooler_patterns.clone(),
            )),
            Box::new(UsbSerialProbe::new(config.device_dir.clone())),
            Box::new(BluetoothSerialProbe::new(
                config.device_dir.clone(),
                config.printer_name.clone(),
            )),
        ];
        Self::new(probes, config.probe_timeout)
    }

    /// Number of configured probes
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Run the probes in priority order and return the first channel found
    #[instrument(skip(self), fields(probes = self.probes.len()))]
    pub async fn discover(&self) -> Option<TransportChannel> {
        for probe in &self.probes {
            match tokio::time::timeout(self.probe_timeout, probe.try_discover()).await {
                Ok(Some(channel)) => {
                    info!(probe = probe.name(), channel = %channel, "Printer transport found");
                    return Some(channel);
                }
                Ok(None) => {
                    debug!(probe = probe.name(), "Probe found nothing");
                }
                Err(_) => {
                    warn!(
                        probe = probe.name(),
                        timeout_ms = self.probe_timeout.as_millis() as u64,
                        "Probe timed out"
                    );
                }
            }
        }
        info!("No printer transport available");
        None
    }
}

// ============================================================================
// Spooler
// ============================================================================

/// OS spooler queue whose name marks it as a receipt printer
pub struct SpoolerProbe {
    printer_name: Option<String>,
    patterns: Vec<String>,
}

impl SpoolerProbe {
    pub fn new(printer_name: Option<String>, patterns: Vec<String>) -> Self {
        Self {
            printer_name,
            patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Pick a queue: exact configured name first, then the first pattern match
    pub fn select_queue(&self, queues: &[String]) -> Option<String> {
        if let Some(ref wanted) = self.printer_name
            && let Some(found) = queues.iter().find(|q| q.eq_ignore_ascii_case(wanted))
        {
            return Some(found.clone());
        }

        let mut sorted: Vec<&String> = queues.iter().collect();
        sorted.sort();
        sorted
            .into_iter()
            .find(|q| self.patterns.iter().any(|p| matches_word(q, p)))
            .cloned()
    }
}

/// Whether `pattern` occurs in `name` on word edges, ignoring case
///
/// Punctuation, letter/digit changes and lower-to-upper case changes all
/// separate words: `pos` matches `POS58` and `Front-POS` but not
/// `PostScript` or `Deposit`.
pub fn matches_word(name: &str, pattern: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    if pattern.is_empty() || pattern.len() > chars.len() {
        return false;
    }

    (0..=chars.len() - pattern.len()).any(|start| {
        let end = start + pattern.len();
        chars[start..end]
            .iter()
            .zip(&pattern)
            .all(|(c, p)| c.to_ascii_lowercase() == *p)
            && (start == 0 || is_word_edge(chars[start - 1], chars[start]))
            && (end == chars.len() || is_word_edge(chars[end - 1], chars[end]))
    })
}

fn is_word_edge(before: char, after: char) -> bool {
    !before.is_alphanumeric()
        || !after.is_alphanumeric()
        || before.is_ascii_digit() != after.is_ascii_digit()
        || (before.is_lowercase() && after.is_uppercase())
}

#[async_trait]
impl TransportProbe for SpoolerProbe {
    fn name(&self) -> &'static str {
        "spooler"
    }

    async fn try_discover(&self) -> Option<TransportChannel> {
        let queues = match spooler::list_queues().await {
            Ok(q) => q,
            Err(e) => {
                debug!(error = %e, "Spooler enumeration unavailable");
                return None;
            }
        };
        self.select_queue(&queues).map(TransportChannel::SpoolerQueue)
    }
}

// ============================================================================
// USB serial
// ============================================================================

/// USB-serial adapter node matched by platform naming patterns
pub struct UsbSerialProbe {
    device_dir: PathBuf,
}

impl UsbSerialProbe {
    pub fn new(device_dir: PathBuf) -> Self {
        Self { device_dir }
    }
}

/// Whether a device node name belongs to a USB-serial adapter
pub fn is_usb_serial_name(name: &str) -> bool {
    USB_SERIAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

#[async_trait]
impl TransportProbe for UsbSerialProbe {
    fn name(&self) -> &'static str {
        "usb-serial"
    }

    async fn try_discover(&self) -> Option<TransportChannel> {
        list_device_names(&self.device_dir)
            .await
            .into_iter()
            .find(|n| is_usb_serial_name(n))
            .map(|n| TransportChannel::SerialDevice(self.device_dir.join(n)))
    }
}

// ============================================================================
// Bluetooth serial
// ============================================================================

/// Bluetooth SPP node for the known printer
pub struct BluetoothSerialProbe {
    device_dir: PathBuf,
    printer_name: Option<String>,
}

impl BluetoothSerialProbe {
    pub fn new(device_dir: PathBuf, printer_name: Option<String>) -> Self {
        Self {
            device_dir,
            printer_name: printer_name.map(|n| n.to_lowercase()),
        }
    }

    /// Whether a device node name is an outgoing SPP port for our printer
    ///
    /// Linux `rfcomm*` nodes are bound to one remote address and carry no
    /// name. macOS exposes `cu.<advertised name>` nodes.
    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        if lower.contains("incoming") {
            return false;
        }
        if lower.starts_with("rfcomm") {
            return true;
        }
        if !name.starts_with("cu.") || is_usb_serial_name(name) {
            return false;
        }
        match self.printer_name {
            Some(ref wanted) => lower.contains(wanted.as_str()),
            None => false,
        }
    }
}

#[async_trait]
impl TransportProbe for BluetoothSerialProbe {
    fn name(&self) -> &'static str {
        "bluetooth-serial"
    }

    async fn try_discover(&self) -> Option<TransportChannel> {
        list_device_names(&self.device_dir)
            .await
            .into_iter()
            .find(|n| self.matches(n))
            .map(|n| TransportChannel::BluetoothSerialDevice(self.device_dir.join(n)))
    }
}

/// Snapshot of device node names, sorted
async fn list_device_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Device directory unreadable");
            return names;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Device enumeration stopped");
                break;
            }
        }
    }

    names.sort();
    names
}
