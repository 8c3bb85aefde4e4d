//! Encoding normalization for archive entry bytes.
//!
//! Archive entries come from arbitrary editors and operating systems, so
//! their bytes are not guaranteed to be UTF-8. [`normalize`] always returns
//! usable UTF-8 text; uncertainty is reported as a note for the batch log
//! rather than as an error.
//!
//! Detection walks a fixed candidate list in order and picks the first
//! encoding the bytes are valid in:
//!
//! | Order | Encoding | Accepted when |
//! |-------|----------|---------------|
//! | 1 | UTF-8 | bytes are valid UTF-8 |
//! | 2 | ISO-8859-1 | no C1 control bytes (0x80–0x9F) |
//! | 3 | Windows-1252 | every 0x80–0x9F byte is an assigned code point |
//! | 4 | GB2312 | valid GBK whose double-byte pairs sit in the EUC-CN range |
//! | 5 | GBK | valid GBK |
//!
//! ISO-8859-1 accepts every byte sequence free of C1 bytes, which includes
//! all EUC-CN text. When the high bytes pair up as EUC-CN the double-byte
//! candidates are therefore tried before the single-byte ones
//! ([`detection_order`]).

use encoding_rs::{GBK, WINDOWS_1252};

/// A candidate source encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Iso8859_1,
    Windows1252,
    Gb2312,
    Gbk,
}

impl SourceEncoding {
    /// Detection order.
    pub const CANDIDATES: [SourceEncoding; 5] = [
        SourceEncoding::Utf8,
        SourceEncoding::Iso8859_1,
        SourceEncoding::Windows1252,
        SourceEncoding::Gb2312,
        SourceEncoding::Gbk,
    ];

    /// Order used when the bytes look like EUC-CN.
    pub const DOUBLE_BYTE_FIRST: [SourceEncoding; 5] = [
        SourceEncoding::Utf8,
        SourceEncoding::Gb2312,
        SourceEncoding::Gbk,
        SourceEncoding::Iso8859_1,
        SourceEncoding::Windows1252,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "UTF-8",
            SourceEncoding::Iso8859_1 => "ISO-8859-1",
            SourceEncoding::Windows1252 => "Windows-1252",
            SourceEncoding::Gb2312 => "GB2312",
            SourceEncoding::Gbk => "GBK",
        }
    }

    /// Decode `bytes` strictly; `None` when they are not valid in this encoding.
    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            SourceEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            SourceEncoding::Iso8859_1 => {
                if bytes.iter().any(|b| (0x80..=0x9F).contains(b)) {
                    return None;
                }
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            SourceEncoding::Windows1252 => {
                if bytes.iter().any(|b| WINDOWS_1252_UNASSIGNED.contains(b)) {
                    return None;
                }
                WINDOWS_1252
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|s| s.into_owned())
            }
            SourceEncoding::Gb2312 => {
                if !is_euc_cn(bytes) {
                    return None;
                }
                GBK.decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|s| s.into_owned())
            }
            SourceEncoding::Gbk => GBK
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|s| s.into_owned()),
        }
    }
}

/// Bytes with no mapping in Windows-1252.
const WINDOWS_1252_UNASSIGNED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Text guaranteed to be UTF-8, plus an optional note for the batch log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub note: Option<String>,
}

/// Convert `raw` to UTF-8.
///
/// Valid UTF-8 is returned unchanged (minus a leading byte-order mark) with
/// no note. Otherwise the first matching candidate encoding is used and the
/// note names it. If none match, invalid sequences are replaced with U+FFFD
/// and the note says a fallback conversion happened.
pub fn normalize(raw: &[u8]) -> Normalized {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);

    if let Ok(text) = std::str::from_utf8(raw) {
        return Normalized {
            text: text.to_string(),
            note: None,
        };
    }

    for candidate in detection_order(raw).iter().skip(1) {
        if let Some(text) = candidate.decode(raw) {
            return Normalized {
                text,
                note: Some(format!(
                    "converted encoding from {} to UTF-8",
                    candidate.label()
                )),
            };
        }
    }

    Normalized {
        text: String::from_utf8_lossy(raw).into_owned(),
        note: Some(
            "encoding could not be detected; applied fallback UTF-8 conversion".to_string(),
        ),
    }
}

/// Candidate order for `raw`, UTF-8 first in both cases.
pub fn detection_order(raw: &[u8]) -> &'static [SourceEncoding] {
    if raw.iter().any(|b| *b >= 0x80) && is_euc_cn(raw) {
        &SourceEncoding::DOUBLE_BYTE_FIRST
    } else {
        &SourceEncoding::CANDIDATES
    }
}

/// True when every high byte pairs up as an EUC-CN (GB2312) character.
fn is_euc_cn(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        let Some(&trail) = bytes.get(i + 1) else {
            return false;
        };
        if !(0xA1..=0xF7).contains(&b) || !(0xA1..=0xFE).contains(&trail) {
            return false;
        }
        i += 2;
    }
    true
}
