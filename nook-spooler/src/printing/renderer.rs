//! Receipt renderer
//!
//! Renders ReceiptData into ESC/POS format for thermal printers. Pure: the
//! same receipt and settings always produce the same bytes, whichever path
//! (preview, queue worker, direct print) asks for them.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use nook_printer::{Charset, EscPosBuilder, SymbolConfig, SymbolError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::types::ReceiptData;

const DEFAULT_BUSINESS_NAME: &str = "Study Nook";
const DEFAULT_CLOSING_MESSAGE: &str = "Thank you!";
const DEFAULT_ACCESS_LABEL: &str = "Wi-Fi";

/// Bytes plus any non-fatal degradation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedReceipt {
    pub bytes: Vec<u8>,
    /// Set when the access symbol was left out
    pub symbol_error: Option<SymbolError>,
}

impl EncodedReceipt {
    pub fn is_degraded(&self) -> bool {
        self.symbol_error.is_some()
    }
}

/// Receipt encoder
///
/// Common widths:
/// - 58mm paper: 32 characters
/// - 80mm paper: 48 characters
#[derive(Debug, Clone)]
pub struct ReceiptEncoder {
    width: usize,
    timezone: Tz,
    charset: Charset,
    symbol: SymbolConfig,
    business_name: String,
    closing_message: String,
}

impl ReceiptEncoder {
    pub fn new(width: usize, timezone: Tz) -> Self {
        Self {
            width,
            timezone,
            charset: Charset::default(),
            symbol: SymbolConfig::default(),
            business_name: DEFAULT_BUSINESS_NAME.to_string(),
            closing_message: DEFAULT_CLOSING_MESSAGE.to_string(),
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_symbol(mut self, symbol: SymbolConfig) -> Self {
        self.symbol = symbol;
        self
    }

    /// Name printed when the receipt carries none
    pub fn with_business_name(mut self, name: impl Into<String>) -> Self {
        self.business_name = name.into();
        self
    }

    /// Closing line printed when the receipt carries none
    pub fn with_closing_message(mut self, message: impl Into<String>) -> Self {
        self.closing_message = message.into();
        self
    }

    /// Render a receipt to ESC/POS bytes
    pub fn encode(&self, receipt: &ReceiptData) -> Vec<u8> {
        self.encode_with_report(receipt).bytes
    }

    /// Render a receipt, reporting a dropped symbol instead of failing
    pub fn encode_with_report(&self, receipt: &ReceiptData) -> EncodedReceipt {
        let mut b = EscPosBuilder::new(self.width, self.charset);

        self.render_header(&mut b, receipt);
        self.render_rows(&mut b, receipt);
        b.sep_single();
        let symbol_error = self.render_access(&mut b, receipt);
        self.render_footer(&mut b, receipt);

        EncodedReceipt {
            bytes: b.build(),
            symbol_error,
        }
    }

    fn render_header(&self, b: &mut EscPosBuilder, receipt: &ReceiptData) {
        let name = receipt
            .business_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.business_name);

        b.center();
        b.double_size();
        b.bold();
        b.line(name);
        b.bold_off();
        b.reset_size();

        for line in &receipt.address_lines {
            b.line(line);
        }

        b.left();
        b.sep_double();
    }

    fn render_rows(&self, b: &mut EscPosBuilder, receipt: &ReceiptData) {
        b.line_lr("Transaction", &receipt.transaction_id);
        b.line_lr("Date", &format_datetime(receipt.timestamp, self.timezone));
        b.line_lr("Customer", &receipt.customer_name);
        b.line_lr("Table", &receipt.table_label);
        b.line_lr("Start", &format_datetime(receipt.session_start, self.timezone));

        let end = receipt
            .session_end
            .map(|t| format_datetime(t, self.timezone))
            .unwrap_or_else(|| "Open".to_string());
        b.line_lr("End", &end);

        b.line_lr("Duration", &format_duration(receipt.elapsed_hours));
        b.line_lr("Rate/Hour", &format_money(display_rate(receipt)));

        b.bold();
        b.line_lr("Total", &format_money(receipt.total_amount));
        b.bold_off();

        b.line_lr("Payment", &receipt.payment_method);
        if let Some(cash) = receipt.cash_tendered {
            b.line_lr("Cash", &format_money(cash));
        }
        if let Some(change) = receipt.change_due {
            b.line_lr("Change", &format_money(change));
        }
    }

    /// Symbol block plus the readable access line
    fn render_access(&self, b: &mut EscPosBuilder, receipt: &ReceiptData) -> Option<SymbolError> {
        let code = receipt.access_code.as_deref()?;
        let label = receipt
            .access_label
            .as_deref()
            .unwrap_or(DEFAULT_ACCESS_LABEL);

        b.center();
        let symbol_error = b.symbol(code.as_bytes(), &self.symbol).err();
        if symbol_error.is_none() {
            b.newline();
        }
        b.line(&format!("{}: {}", label, code));
        b.left();

        symbol_error
    }

    fn render_footer(&self, b: &mut EscPosBuilder, receipt: &ReceiptData) {
        let message = receipt
            .closing_message
            .as_deref()
            .unwrap_or(&self.closing_message);

        b.newline();
        b.center();
        b.line(message);
        b.left();

        // Feed and cut
        b.feed(4);
        b.cut();
    }
}

impl Default for ReceiptEncoder {
    fn default() -> Self {
        Self::new(32, chrono_tz::UTC)
    }
}

/// Known rate, else total / hours; zero hours gives zero
pub fn display_rate(receipt: &ReceiptData) -> Decimal {
    if let Some(rate) = receipt.hourly_rate {
        return rate;
    }
    if receipt.elapsed_hours <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    receipt
        .total_amount
        .checked_div(receipt.elapsed_hours)
        .unwrap_or(Decimal::ZERO)
}

/// Two decimals, half away from zero
pub fn format_money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// Fractional hours as `{h}h {m}m`; out-of-range input renders `0h 0m`
pub fn format_duration(hours: Decimal) -> String {
    let minutes = hours
        .checked_mul(Decimal::from(60))
        .map(|m| m.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|m| m.to_i64())
        .unwrap_or(0)
        .max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Format a timestamp in the display timezone (YYYY-MM-DD HH:MM)
fn format_datetime(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::fixtures::{dec, sample_receipt};
    use nook_printer::ErrorCorrection;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn row(label: &str, value: &str, width: usize) -> Vec<u8> {
        nook_printer::pad_row(label, value, width, Charset::Latin).into_bytes()
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = ReceiptEncoder::default();
        let receipt = sample_receipt();
        assert_eq!(encoder.encode(&receipt), encoder.encode(&receipt));
    }

    #[test]
    fn test_rate_derived_from_total() {
        let data = ReceiptEncoder::default().encode(&sample_receipt());
        assert!(find(&data, &row("Rate/Hour", "60.00", 32)).is_some());
        assert!(find(&data, &row("Total", "150.00", 32)).is_some());
        assert!(find(&data, &row("Duration", "2h 30m", 32)).is_some());
    }

    #[test]
    fn test_zero_hours_rate() {
        let mut receipt = sample_receipt();
        receipt.elapsed_hours = Decimal::ZERO;
        let data = ReceiptEncoder::default().encode(&receipt);
        assert!(find(&data, &row("Rate/Hour", "0.00", 32)).is_some());
        assert!(find(&data, &row("Duration", "0h 0m", 32)).is_some());
    }

    #[test]
    fn test_known_rate_wins() {
        let mut receipt = sample_receipt();
        receipt.hourly_rate = Some(dec("55"));
        assert_eq!(display_rate(&receipt), dec("55"));
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec("60")), "60.00");
        assert_eq!(format_money(dec("2.005")), "2.01");
        assert_eq!(format_money(dec("-2.005")), "-2.01");
        assert_eq!(format_money(dec("33.3333")), "33.33");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(dec("1.75")), "1h 45m");
        assert_eq!(format_duration(dec("0.5")), "0h 30m");
        assert_eq!(format_duration(dec("3")), "3h 0m");
    }

    #[test]
    fn test_format_duration_overflow() {
        assert_eq!(format_duration(Decimal::MAX), "0h 0m");
        assert_eq!(format_duration(dec("-2")), "0h 0m");
    }

    #[test]
    fn test_encode_survives_huge_hours() {
        let mut receipt = sample_receipt();
        receipt.elapsed_hours = Decimal::MAX;
        receipt.hourly_rate = None;

        let bytes = ReceiptEncoder::default().encode(&receipt);
        assert!(bytes.windows(5).any(|w| w == b"0h 0m"));
    }

    #[test]
    fn test_open_session_and_timezone() {
        let mut receipt = sample_receipt();
        receipt.session_end = None;
        let encoder = ReceiptEncoder::new(32, chrono_tz::Asia::Manila);
        let data = encoder.encode(&receipt);
        assert!(find(&data, &row("End", "Open", 32)).is_some());
        // 12:00 UTC = 20:00 Manila
        assert!(find(&data, &row("Start", "2026-10-15 20:00", 32)).is_some());
    }

    #[test]
    fn test_long_row_not_truncated() {
        let mut receipt = sample_receipt();
        receipt.customer_name = "Maximiliana Concepcion de la Cruz".to_string();
        let data = ReceiptEncoder::default().encode(&receipt);
        assert!(find(&data, b"Customer Maximiliana Concepcion de la Cruz\n").is_some());
    }

    #[test]
    fn test_layout_order() {
        let data = ReceiptEncoder::default().encode(&sample_receipt());
        assert_eq!(&data[..5], &[0x1B, 0x40, 0x1B, 0x74, 16]);

        let name = find(&data, b"Study Nook").unwrap();
        let tx = find(&data, b"Transaction").unwrap();
        let divider = find(&data, "-".repeat(32).as_bytes()).unwrap();
        let store = find(&data, &[0x1D, 0x28, 0x6B]).unwrap();
        let access = find(&data, b"Wi-Fi: nook-guest-2026").unwrap();
        let thanks = find(&data, b"Thank you!").unwrap();

        assert!(name < tx && tx < divider && divider < store);
        assert!(store < access && access < thanks);
        assert!(data.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_oversized_symbol_degrades() {
        let mut receipt = sample_receipt();
        receipt.access_code = Some("x".repeat(1300));
        let encoder = ReceiptEncoder::default().with_symbol(SymbolConfig {
            error_correction: ErrorCorrection::H,
            ..SymbolConfig::default()
        });

        let report = encoder.encode_with_report(&receipt);
        assert!(report.is_degraded());
        assert!(find(&report.bytes, &[0x1D, 0x28, 0x6B]).is_none());
        let access = format!("Wi-Fi: {}", "x".repeat(1300));
        assert!(find(&report.bytes, access.as_bytes()).is_some());
    }

    #[test]
    fn test_no_access_code_no_symbol() {
        let mut receipt = sample_receipt();
        receipt.access_code = None;
        let report = ReceiptEncoder::default().encode_with_report(&receipt);
        assert!(!report.is_degraded());
        assert!(find(&report.bytes, &[0x1D, 0x28, 0x6B]).is_none());
    }

    #[test]
    fn test_receipt_overrides_business_fields() {
        let mut receipt = sample_receipt();
        receipt.business_name = Some("Nook Annex".to_string());
        receipt.address_lines = vec!["12 Mabini St.".to_string()];
        receipt.closing_message = Some("See you soon".to_string());
        let data = ReceiptEncoder::default()
            .with_business_name("Ignored")
            .encode(&receipt);
        assert!(find(&data, b"Nook Annex").is_some());
        assert!(find(&data, b"12 Mabini St.").is_some());
        assert!(find(&data, b"See you soon").is_some());
        assert!(find(&data, b"Ignored").is_none());
    }
}
