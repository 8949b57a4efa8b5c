//! Robust decoding of raw console output.
//!
//! Console tools on a localised Windows emit UTF-16 (`cmd /u`), UTF-8
//! (`chcp 65001`), the OEM code page or the ANSI code page, and nothing in the
//! byte stream says which. [`ByteDecoder`] tries, in order:
//!
//! 1. a byte-order mark (UTF-8, UTF-16LE, UTF-16BE), decoded with the BOM
//!    stripped;
//! 2. a BOM-less UTF-16 zero-byte pattern in the first 400 bytes;
//! 3. strict UTF-8 validation;
//! 4. otherwise the OEM code page, Windows-1252 and lossy UTF-8 candidates are
//!    each scored for "human-ness" and the best one wins.
//!
//! Decoding never fails; the worst case is a lossy string.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, WINDOWS_1252};

use crate::exec::oem::decode_oem;
use crate::util::constants::{UTF16_MIN_SAMPLE_BYTES, UTF16_SAMPLE_BYTES};
use crate::util::elevation::oem_code_page;

/// Which rule produced the decoded text. Reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedEncoding {
    Empty,
    Bom(&'static str),
    Utf16LeHeuristic,
    Utf16BeHeuristic,
    Utf8,
    Oem(u32),
    Windows1252,
    Utf8Lossy,
}

/// Stateless decoder parameterised by the system OEM code page.
#[derive(Debug, Clone, Copy)]
pub struct ByteDecoder {
    oem_code_page: u32,
}

impl Default for ByteDecoder {
    fn default() -> Self {
        Self::for_system()
    }
}

impl ByteDecoder {
    pub fn new(oem_code_page: u32) -> Self {
        Self { oem_code_page }
    }

    /// Decoder using the OEM code page the platform reports.
    pub fn for_system() -> Self {
        Self::new(oem_code_page())
    }

    /// Decode `bytes` into text. Never fails.
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.decode_detailed(bytes).0
    }

    /// Decode `bytes` and report which rule matched.
    pub fn decode_detailed(&self, bytes: &[u8]) -> (String, DetectedEncoding) {
        if bytes.is_empty() {
            return (String::new(), DetectedEncoding::Empty);
        }

        if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
            let text = enc.decode_without_bom_handling(&bytes[bom_len..]).0;
            return (text.into_owned(), DetectedEncoding::Bom(enc.name()));
        }

        if looks_like_utf16(bytes, 1) {
            let text = UTF_16LE.decode_without_bom_handling(bytes).0;
            return (text.into_owned(), DetectedEncoding::Utf16LeHeuristic);
        }
        if looks_like_utf16(bytes, 0) {
            let text = UTF_16BE.decode_without_bom_handling(bytes).0;
            return (text.into_owned(), DetectedEncoding::Utf16BeHeuristic);
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return (text.to_owned(), DetectedEncoding::Utf8);
        }

        let candidates = [
            (
                decode_oem(bytes, self.oem_code_page),
                DetectedEncoding::Oem(self.oem_code_page),
            ),
            (
                WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
                DetectedEncoding::Windows1252,
            ),
            (
                String::from_utf8_lossy(bytes).into_owned(),
                DetectedEncoding::Utf8Lossy,
            ),
        ];
        pick_best(candidates)
    }
}

/// Decode with the system decoder. Convenience for one-off calls.
pub fn decode_bytes(bytes: &[u8]) -> String {
    ByteDecoder::for_system().decode(bytes)
}

/// Highest-scoring candidate; on a tie the earlier candidate wins.
fn pick_best<const N: usize>(
    candidates: [(String, DetectedEncoding); N],
) -> (String, DetectedEncoding) {
    let mut best: Option<(i64, String, DetectedEncoding)> = None;
    for (text, enc) in candidates {
        let score = score_human_text(&text);
        tracing::trace!("decoder candidate {:?} scored {}", enc, score);
        let better = best.as_ref().map_or(true, |(top, _, _)| score > *top);
        if better {
            best = Some((score, text, enc));
        }
    }
    match best {
        Some((_, text, enc)) => (text, enc),
        None => (String::new(), DetectedEncoding::Empty),
    }
}

/// True when more than 20% of the bytes at positions `first, first+2, …`
/// within the sample are zero. `first = 1` tests little-endian, `0` big-endian.
fn looks_like_utf16(bytes: &[u8], first: usize) -> bool {
    let n = bytes.len().min(UTF16_SAMPLE_BYTES);
    if n < UTF16_MIN_SAMPLE_BYTES {
        return false;
    }

    let (checked, zeros) = bytes[..n]
        .iter()
        .skip(first)
        .step_by(2)
        .fold((0usize, 0usize), |(c, z), &b| (c + 1, z + usize::from(b == 0)));

    checked > 0 && zeros * 5 > checked
}

/// Punctuation that is neither rewarded nor penalised.
const NEUTRAL_PUNCTUATION: &str = ".,;:¡!¿?()[]{}-_\"'\\/|@#%&+=*<>";

/// Accented letters whose presence strongly suggests a correct Latin decode.
const ACCENTED: &str = "áéíóúñÁÉÍÓÚÑüÜ";

/// Score how much `s` looks like human-readable text.
///
/// +2 per letter or digit, +1 per whitespace, 0 for ordinary punctuation,
/// -2 per other symbol, -10 per control character, -20 per replacement
/// character; -3 per pipe beyond the second; +20 when accented Latin letters
/// appear; -50 when more than a fifth of the characters are control or
/// replacement characters.
pub fn score_human_text(s: &str) -> i64 {
    if s.is_empty() {
        return i64::MIN;
    }

    let mut score = 0i64;
    let mut weird = 0usize;
    let mut pipes = 0i64;
    let mut total = 0usize;
    let mut accented = false;

    for c in s.chars() {
        total += 1;
        if c == '|' {
            pipes += 1;
        }
        if ACCENTED.contains(c) {
            accented = true;
        }

        if c == '\u{FFFD}' {
            score -= 20;
            weird += 1;
        } else if c.is_control() && !matches!(c, '\r' | '\n' | '\t') {
            score -= 10;
            weird += 1;
        } else if c.is_alphanumeric() {
            score += 2;
        } else if matches!(c, ' ' | '\r' | '\n' | '\t') {
            score += 1;
        } else if !NEUTRAL_PUNCTUATION.contains(c) {
            score -= 2;
        }
    }

    if pipes > 2 {
        score -= (pipes - 2) * 3;
    }
    if accented {
        score += 20;
    }
    if weird > 0 && weird * 5 > total {
        score -= 50;
    }
    score
}
