//! # nook-printer
//!
//! ESC/POS receipt printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building, including printer-rendered QR symbols
//! - Code page conversion (Windows-1252, GBK)
//! - Transport discovery (spooler queue, USB serial, Bluetooth serial)
//! - Paced, retried transmission with a local fallback file
//!
//! WHAT to print (receipt layout, job queue) lives in `nook-spooler`.
//!
//! ## Example
//!
//! ```ignore
//! use nook_printer::{Charset, Discovery, DiscoveryConfig, EscPosBuilder};
//! use nook_printer::{FallbackStore, ReliableTransmitter, TransmitPolicy};
//!
//! let mut b = EscPosBuilder::new(32, Charset::Latin);
//! b.center().bold().line("Study Nook").bold_off().left();
//! b.line_lr("Total", "60.00");
//! b.cut();
//!
//! let discovery = Discovery::standard(&DiscoveryConfig::default());
//! let tx = ReliableTransmitter::new(TransmitPolicy::default(), FallbackStore::new("fallback"));
//! tx.deliver(&discovery, &b.build()).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod fallback;
mod transmitter;
pub mod transport;

// Re-exports
pub use encoding::{Charset, encode_text, text_width};
pub use error::{DeliveryError, TransmitError, TransmitResult};
pub use escpos::{ErrorCorrection, EscPosBuilder, SymbolConfig, SymbolError, SymbolModel, pad_row};
pub use fallback::FallbackStore;
pub use transmitter::{ReliableTransmitter, TransmitPolicy};
pub use transport::{
    Discovery, DiscoveryConfig, SerialPacing, TransportChannel, TransportProbe,
};
