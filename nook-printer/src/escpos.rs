//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data.

use crate::encoding::{Charset, encode_text, text_width};
use thiserror::Error;

/// `GS ( k` prefix shared by all 2-D symbol functions
const SYMBOL_PREFIX: [u8; 3] = [0x1D, 0x28, 0x6B];

/// `cn` byte selecting the QR code symbol family
const SYMBOL_QR: u8 = 0x31;

/// 2-D symbol model (function 165)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolModel {
    Model1,
    Model2,
}

impl SymbolModel {
    fn code(self) -> u8 {
        match self {
            SymbolModel::Model1 => 0x31,
            SymbolModel::Model2 => 0x32,
        }
    }

    /// Parse a config value (`1` or `2`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(SymbolModel::Model1),
            "2" => Some(SymbolModel::Model2),
            _ => None,
        }
    }
}

/// 2-D symbol error-correction level (function 169)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCorrection {
    L,
    M,
    Q,
    H,
}

impl ErrorCorrection {
    fn code(self) -> u8 {
        match self {
            ErrorCorrection::L => 0x30,
            ErrorCorrection::M => 0x31,
            ErrorCorrection::Q => 0x32,
            ErrorCorrection::H => 0x33,
        }
    }

    /// Byte-mode capacity of the largest symbol at this level.
    ///
    /// Version 40 Model 2 figures; firmwares that only implement Model 1
    /// reject smaller payloads on their own.
    pub fn capacity(self) -> usize {
        match self {
            ErrorCorrection::L => 2953,
            ErrorCorrection::M => 2331,
            ErrorCorrection::Q => 1663,
            ErrorCorrection::H => 1273,
        }
    }

    /// Parse a config value (`L`, `M`, `Q`, `H`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L" => Some(ErrorCorrection::L),
            "M" => Some(ErrorCorrection::M),
            "Q" => Some(ErrorCorrection::Q),
            "H" => Some(ErrorCorrection::H),
            _ => None,
        }
    }
}

/// Printer-side symbol settings
///
/// Firmwares differ in what they accept, so these come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolConfig {
    pub model: SymbolModel,
    /// Module (dot) size, 1-16
    pub module_size: u8,
    pub error_correction: ErrorCorrection,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            model: SymbolModel::Model2,
            module_size: 6,
            error_correction: ErrorCorrection::M,
        }
    }
}

/// Why a symbol could not be emitted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol payload is empty")]
    Empty,

    #[error("symbol payload of {len} bytes exceeds capacity of {capacity}")]
    TooLong { len: usize, capacity: usize },
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. Text is converted to
/// the configured charset as it is written; command bytes are never
/// re-encoded.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    charset: Charset,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize, charset: Charset) -> Self {
        let mut builder = Self {
            buf: Vec::with_capacity(2048),
            width,
            charset,
        };
        builder.reset();
        builder
    }

    // === Text Output ===

    /// Write text in the configured charset
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = encode_text(s, self.charset);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        // ESC d n
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x02]);
        self
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x11]);
        self
    }

    /// Double height only
    pub fn double_height(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x01]);
        self
    }

    /// Double width only
    pub fn double_width(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x10]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Separators ===

    /// Print a line of '=' characters
    pub fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Layout Helpers ===

    /// Print a label/value row padded to the paper width
    ///
    /// The label is left-aligned and the value right-aligned. When both do
    /// not fit, a single space separates them and the row wraps on the
    /// printer instead of losing characters.
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let row = pad_row(left, right, self.width, self.charset);
        self.line(&row)
    }

    // === Paper Control ===

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        // GS V 0
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x00]);
        self
    }

    // === 2-D Symbol ===

    /// Store payload bytes in the symbol storage area (function 180)
    pub fn store_symbol_data(&mut self, data: &[u8]) -> &mut Self {
        // pL pH count cn + fn + m + data
        let len = data.len() + 3;
        let p_l = (len & 0xFF) as u8;
        let p_h = ((len >> 8) & 0xFF) as u8;
        self.buf.extend_from_slice(&SYMBOL_PREFIX);
        self.buf.extend_from_slice(&[p_l, p_h, SYMBOL_QR, 0x50, 0x30]);
        self.buf.extend_from_slice(data);
        self
    }

    /// Select the symbol model (function 165)
    pub fn select_symbol_model(&mut self, model: SymbolModel) -> &mut Self {
        self.buf.extend_from_slice(&SYMBOL_PREFIX);
        self.buf
            .extend_from_slice(&[0x04, 0x00, SYMBOL_QR, 0x41, model.code(), 0x00]);
        self
    }

    /// Set the module size in dots (function 167), clamped to 1-16
    pub fn symbol_module_size(&mut self, size: u8) -> &mut Self {
        let size = size.clamp(1, 16);
        self.buf.extend_from_slice(&SYMBOL_PREFIX);
        self.buf.extend_from_slice(&[0x03, 0x00, SYMBOL_QR, 0x43, size]);
        self
    }

    /// Set the error-correction level (function 169)
    pub fn symbol_error_correction(&mut self, level: ErrorCorrection) -> &mut Self {
        self.buf.extend_from_slice(&SYMBOL_PREFIX);
        self.buf
            .extend_from_slice(&[0x03, 0x00, SYMBOL_QR, 0x45, level.code()]);
        self
    }

    /// Print the symbol from storage (function 181)
    pub fn print_symbol(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&SYMBOL_PREFIX);
        self.buf.extend_from_slice(&[0x03, 0x00, SYMBOL_QR, 0x51, 0x30]);
        self
    }

    /// Emit a complete symbol block: store, model, size, level, print.
    ///
    /// Nothing is written when the payload is empty or over capacity.
    pub fn symbol(&mut self, data: &[u8], config: &SymbolConfig) -> Result<&mut Self, SymbolError> {
        if data.is_empty() {
            return Err(SymbolError::Empty);
        }
        let capacity = config.error_correction.capacity();
        if data.len() > capacity {
            return Err(SymbolError::TooLong {
                len: data.len(),
                capacity,
            });
        }

        self.store_symbol_data(data)
            .select_symbol_model(config.model)
            .symbol_module_size(config.module_size)
            .symbol_error_correction(config.error_correction)
            .print_symbol();
        Ok(self)
    }

    /// Initialize the printer (ESC @) and reselect the charset
    pub fn reset(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x40]);
        self.buf.extend_from_slice(self.charset.select_command());
        self
    }

    // === Build ===

    /// Finish and return the command stream
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(32, Charset::Latin)
    }
}

/// Lay out a label/value pair across `width` columns
pub fn pad_row(left: &str, right: &str, width: usize, charset: Charset) -> String {
    let lw = text_width(left, charset);
    let rw = text_width(right, charset);

    if lw + rw >= width {
        format!("{} {}", left, right)
    } else {
        format!("{}{}{}", left, " ".repeat(width - lw - rw), right)
    }
}
