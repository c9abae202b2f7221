//! Character set handling for thermal printers
//!
//! Receipt printers do not speak UTF-8. Text is converted to the printer's
//! code page before it enters the command stream, so command parameter bytes
//! (which may be >= 0x80) are never touched by the conversion.
//!
//! - `Latin`: Windows-1252, selected with `ESC t 16`
//! - `Gbk`: GBK double-byte mode for Chinese printers (`FS &` + `FS C 1`)

use encoding_rs::{Encoding, GBK, WINDOWS_1252};

/// Printer code page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// Windows-1252 (Western European)
    #[default]
    Latin,
    /// GBK (Simplified Chinese)
    Gbk,
}

impl Charset {
    fn encoding(self) -> &'static Encoding {
        match self {
            Charset::Latin => WINDOWS_1252,
            Charset::Gbk => GBK,
        }
    }

    /// Commands that put the printer into this code page.
    ///
    /// Must be re-sent after every `ESC @`, which resets the code page.
    pub fn select_command(self) -> &'static [u8] {
        match self {
            // ESC t 16 - WPC1252
            Charset::Latin => &[0x1B, 0x74, 16],
            // FS & - Chinese mode, FS C 1 - GBK
            Charset::Gbk => &[0x1C, 0x26, 0x1C, 0x43, 0x01],
        }
    }

    /// Parse a config value (`latin`, `cp1252`, `gbk`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "latin" | "latin1" | "cp1252" | "windows-1252" => Some(Charset::Latin),
            "gbk" | "gb2312" | "chinese" => Some(Charset::Gbk),
            _ => None,
        }
    }
}

/// Printed width of a string in columns
///
/// Double-byte characters occupy two columns, which is exactly their
/// encoded length on these printers.
pub fn text_width(s: &str, charset: Charset) -> usize {
    if s.is_ascii() {
        return s.len();
    }
    let mut sink = Vec::new();
    s.chars().map(|c| encode_char(c, charset, &mut sink)).sum()
}

/// Encode text for the printer
///
/// Unmappable characters become `?` rather than HTML entities.
pub fn encode_text(s: &str, charset: Charset) -> Vec<u8> {
    if s.is_ascii() {
        return s.as_bytes().to_vec();
    }
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        encode_char(c, charset, &mut out);
    }
    out
}

/// Append one encoded character, returning its printed width
fn encode_char(c: char, charset: Charset, out: &mut Vec<u8>) -> usize {
    if c.is_ascii() {
        out.push(c as u8);
        return 1;
    }
    if charset == Charset::Gbk && c == '€' {
        // Euro is missing from GBK: leave Chinese mode, PC858 Euro, re-enter
        out.extend_from_slice(&[0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26]);
        return 1;
    }
    let mut buf = [0u8; 4];
    let (cow, _, had_errors) = charset.encoding().encode(c.encode_utf8(&mut buf));
    if had_errors {
        out.push(b'?');
        1
    } else {
        out.extend_from_slice(&cow);
        cow.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("hello", Charset::Latin), 5);
        assert_eq!(text_width("café", Charset::Latin), 4);
        assert_eq!(text_width("你好", Charset::Gbk), 4);
        assert_eq!(text_width("AB中文CD", Charset::Gbk), 8);
        assert_eq!(text_width("a中b", Charset::Latin), 3);
    }

    #[test]
    fn test_encode_latin() {
        assert_eq!(encode_text("café", Charset::Latin), vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_unmappable_becomes_question_mark() {
        assert_eq!(encode_text("a中b", Charset::Latin), b"a?b".to_vec());
    }

    #[test]
    fn test_gbk_euro_escape() {
        let bytes = encode_text("€", Charset::Gbk);
        assert_eq!(bytes, vec![0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26]);
    }

    #[test]
    fn test_parse_charset() {
        assert_eq!(Charset::parse("GBK"), Some(Charset::Gbk));
        assert_eq!(Charset::parse(" latin "), Some(Charset::Latin));
        assert_eq!(Charset::parse("ebcdic"), None);
    }
}
