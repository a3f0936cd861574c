//! Text encodings for thermal printers
//!
//! Receipt text is built as UTF-8 interleaved with ESC/POS commands. Before it
//! is sent to the device it is converted to the code page of the printer:
//! - GBK for Chinese-mode printers (NT-5890K)
//! - Windows-1252 for Western code page printers (POS-5890, TM-T88)
//!
//! ASCII bytes (0x00-0x7F) pass through untouched so commands survive the
//! conversion. Characters the code page cannot represent become `?`.

use encoding_rs::{Encoding, GBK, WINDOWS_1252};
use tracing::instrument;

/// Code page a printer profile expects for text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Gbk,
    Cp1252,
}

impl TextEncoding {
    /// Printed width of a string in columns
    pub fn width(&self, s: &str) -> usize {
        match self {
            TextEncoding::Gbk => gbk_width(s),
            TextEncoding::Cp1252 => s.chars().count(),
        }
    }

    /// Convert a UTF-8 command stream to this code page
    pub fn convert(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            TextEncoding::Gbk => convert_to_gbk(bytes),
            TextEncoding::Cp1252 => convert_to_cp1252(bytes),
        }
    }
}

fn char_width(encoding: &'static Encoding, c: char) -> usize {
    if c.is_ascii() {
        return 1;
    }
    let mut tmp = [0u8; 4];
    let (cow, _, had_errors) = encoding.encode(c.encode_utf8(&mut tmp));
    if had_errors { 1 } else { cow.len() }
}

/// Get the GBK byte width of a string
///
/// Chinese characters take two columns, ASCII one.
pub fn gbk_width(s: &str) -> usize {
    s.chars().map(|c| char_width(GBK, c)).sum()
}

/// Drop control characters from user text
///
/// Newlines survive and tabs become spaces; everything else in C0, DEL and
/// C1 would reach the printer as a command byte.
pub fn printable_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Word-wrap text to a column width.
///
/// Explicit newlines are kept, blank lines survive, and words wider than a
/// full line are split.
pub fn wrap_text(text: &str, columns: usize, encoding: TextEncoding) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            let mut word_width = encoding.width(&word);

            if current_width > 0 && current_width + 1 + word_width <= columns {
                current.push(' ');
                current.push_str(&word);
                current_width += 1 + word_width;
                continue;
            }
            if current_width > 0 {
                lines.push(std::mem::take(&mut current));
            }
            while word_width > columns {
                let (head, tail) = split_at_width(&word, columns, encoding);
                lines.push(head);
                word = tail;
                word_width = encoding.width(&word);
            }
            current = word;
            current_width = word_width;
        }
        lines.push(current);
    }

    lines
}

fn split_at_width(word: &str, columns: usize, encoding: TextEncoding) -> (String, String) {
    let mut width = 0;
    for (idx, c) in word.char_indices() {
        let w = encoding.width(c.encode_utf8(&mut [0u8; 4]));
        if width + w > columns {
            // Always make progress, even when a single glyph is wider than the line
            let cut = if idx == 0 { c.len_utf8() } else { idx };
            return (word[..cut].to_string(), word[cut..].to_string());
        }
        width += w;
    }
    (word.to_string(), String::new())
}

/// Convert mixed UTF-8 content (with ESC/POS commands) to GBK
///
/// Only bytes >= 0x80 are treated as UTF-8 sequences and converted.
///
/// Also handles:
/// - Re-enabling Chinese mode after INIT command (ESC @)
/// - Euro symbol (€) through the PC858 code page
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn convert_to_gbk(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() * 2);

    // FS & - Enable Chinese mode, FS C 1 - Select GBK
    result.extend_from_slice(&[0x1C, 0x26, 0x1C, 0x43, 0x01]);

    convert_runs(bytes, &mut result, &[0x1C, 0x26], flush_gbk);

    // FS . - Exit Chinese mode
    result.extend_from_slice(&[0x1C, 0x2E]);

    result
}

/// Convert mixed UTF-8 content (with ESC/POS commands) to Windows-1252
///
/// Selects code page 16 (WPC1252) up front and again after every INIT.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn convert_to_cp1252(bytes: &[u8]) -> Vec<u8> {
    const SELECT_WPC1252: [u8; 3] = [0x1B, 0x74, 16];

    let mut result = Vec::with_capacity(bytes.len() + 8);
    result.extend_from_slice(&SELECT_WPC1252);

    convert_runs(bytes, &mut result, &SELECT_WPC1252, flush_cp1252);

    result
}

/// Walk the stream, passing ASCII through and handing non-ASCII runs to `flush`.
fn convert_runs(
    bytes: &[u8],
    result: &mut Vec<u8>,
    after_init: &[u8],
    flush: fn(&mut Vec<u8>, &mut Vec<u8>),
) {
    let mut buffer = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // ESC @ resets the code page, restore it right after
        if b == 0x1B && bytes.get(i + 1) == Some(&0x40) {
            flush(&mut buffer, result);
            result.extend_from_slice(&[0x1B, 0x40]);
            result.extend_from_slice(after_init);
            i += 2;
            continue;
        }

        if b < 0x80 {
            flush(&mut buffer, result);
            result.push(b);
        } else {
            buffer.push(b);
        }
        i += 1;
    }

    flush(&mut buffer, result);
}

fn encode_or_replace(encoding: &'static Encoding, text: &str, result: &mut Vec<u8>) {
    let mut tmp = [0u8; 4];
    for c in text.chars() {
        let (cow, _, had_errors) = encoding.encode(c.encode_utf8(&mut tmp));
        if had_errors {
            result.push(b'?');
        } else {
            result.extend_from_slice(&cow);
        }
    }
}

fn flush_gbk(buffer: &mut Vec<u8>, result: &mut Vec<u8>) {
    if buffer.is_empty() {
        return;
    }

    let s = String::from_utf8_lossy(buffer);
    let parts: Vec<&str> = s.split('€').collect();

    for (idx, part) in parts.iter().enumerate() {
        encode_or_replace(GBK, part, result);
        if idx < parts.len() - 1 {
            // Exit Chinese -> PC858 -> Euro -> Enter Chinese
            result.extend_from_slice(&[0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26]);
        }
    }
    buffer.clear();
}

fn flush_cp1252(buffer: &mut Vec<u8>, result: &mut Vec<u8>) {
    if buffer.is_empty() {
        return;
    }
    let s = String::from_utf8_lossy(buffer);
    encode_or_replace(WINDOWS_1252, &s, result);
    buffer.clear();
}
