//! Encoding detection for untrusted subtitle files.
//!
//! Subtitle files in the wild come in whatever code page the author's
//! system used. Detection tries an optional caller hint, then the encoding
//! announced by a byte-order mark, then a fixed fallback chain. A candidate
//! only wins when it decodes cleanly *and* the decoded text still looks
//! like the format being parsed.

use encoding_rs::{
    EncoderResult, Encoding, ISO_8859_2, UTF_8, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252,
};
use log::debug;

use crate::error::{Error, Result};

/// The candidates tried after the hint, most likely first.
pub fn fallback_chain() -> [&'static Encoding; 5] {
    [UTF_8, WINDOWS_1250, WINDOWS_1252, WINDOWS_1251, ISO_8859_2]
}

/// Text decoded by the detector together with the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Detects the encoding of raw subtitle bytes.
///
/// `markers` are ASCII sequences that carry the structure of the format
/// (e.g. `-->` for SubRip). When they occur in the raw bytes, a candidate
/// must preserve every one of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingDetector<'a> {
    markers: &'a [&'a str],
}

/// Resolves an encoding label such as `cp1250` or `utf-8`.
pub fn resolve(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
}

/// Decodes with no structural markers, see [`EncodingDetector::detect_and_decode`].
pub fn detect_and_decode(raw: &[u8], hint: Option<&str>) -> Result<Decoded> {
    EncodingDetector::new().detect_and_decode(raw, hint)
}

impl<'a> EncodingDetector<'a> {
    pub const fn new() -> Self {
        Self { markers: &[] }
    }

    pub const fn with_markers(markers: &'a [&'a str]) -> Self {
        Self { markers }
    }

    /// Decodes `raw`, trying `hint` first and the fallback chain afterwards.
    ///
    /// An unknown hint is just a failed candidate. When nothing works the
    /// error lists every attempted encoding in order.
    pub fn detect_and_decode(&self, raw: &[u8], hint: Option<&str>) -> Result<Decoded> {
        let bom = Encoding::for_bom(raw);
        let mut tried_encodings = Vec::new();
        let mut attempted: Vec<&'static Encoding> = Vec::new();

        if let Some(label) = hint {
            tried_encodings.push(label.to_owned());
            match resolve(label) {
                Some(encoding) => {
                    attempted.push(encoding);
                    if let Some(text) = self.try_candidate(raw, bom, encoding) {
                        return Ok(Decoded { text, encoding });
                    }
                }
                None => debug!("encoding hint '{label}' is not a known encoding"),
            }
        }

        let candidates = bom.map(|(encoding, _)| encoding).into_iter().chain(fallback_chain());
        for encoding in candidates {
            if attempted.contains(&encoding) {
                continue;
            }
            attempted.push(encoding);
            tried_encodings.push(encoding.name().to_owned());
            if let Some(text) = self.try_candidate(raw, bom, encoding) {
                return Ok(Decoded { text, encoding });
            }
        }

        Err(Error::EncodingExhausted { tried_encodings })
    }

    fn try_candidate(
        &self,
        raw: &[u8],
        bom: Option<(&'static Encoding, usize)>,
        encoding: &'static Encoding,
    ) -> Option<String> {
        let body = match bom {
            Some((bom_encoding, length)) if bom_encoding == encoding => &raw[length..],
            _ => raw,
        };
        let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) else {
            debug!("{} rejected: malformed byte sequence", encoding.name());
            return None;
        };
        // Only single byte code pages turn stray bytes into C1 controls
        let c1 = encoding
            .is_single_byte()
            .then(|| text.chars().find(|c| ('\u{80}'..='\u{9f}').contains(c)))
            .flatten();
        if let Some(ch) = c1 {
            debug!(
                "{} rejected: control character U+{:04X} in text",
                encoding.name(),
                ch as u32
            );
            return None;
        }
        for marker in self.markers {
            let expected = count_bytes(body, marker.as_bytes());
            if expected > 0 && text.matches(marker).count() != expected {
                debug!("{} rejected: mangles '{marker}' markers", encoding.name());
                return None;
            }
        }
        debug!("decoded input as {}", encoding.name());
        Some(text.into_owned())
    }
}

/// Counts non-overlapping occurrences of `needle` in `haystack`.
fn count_bytes(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut index = 0;
    while index + needle.len() <= haystack.len() {
        if &haystack[index..index + needle.len()] == needle {
            count += 1;
            index += needle.len();
        } else {
            index += 1;
        }
    }
    count
}

/// Returns likely legacy encodings for an ISO-639-1 language code.
///
/// The result is meant to be used as the hint for a parse.
pub fn guess_from_lang(lang: &str) -> &'static [&'static str] {
    match lang {
        "sl" | "hr" | "cs" | "pl" | "hu" => &["windows-1250"],
        "ko" => &["EUC-KR"],
        "ja" => &["Shift_JIS"],
        "ar" | "fa" => &["windows-1256"],
        "el" => &["windows-1253"],
        "zh" => &["Big5", "GBK"],
        "he" => &["windows-1255"],
        "ru" => &["KOI8-R"],
        "es" => &["windows-1252"],
        "bg" | "mk" | "sr" => &["windows-1251"],
        "th" => &["windows-874"],
        "uk" => &["KOI8-U"],
        "vi" => &["windows-1258"],
        _ => &[],
    }
}

/// Encodes `text`, dropping characters `encoding` cannot represent.
///
/// UTF-16 encodings produce UTF-8, as every WHATWG encoder does.
pub fn encode_lossy(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    let encoding = encoding.output_encoding();
    if encoding == UTF_8 {
        return text.as_bytes().to_vec();
    }

    let mut encoder = encoding.new_encoder();
    let mut output = Vec::with_capacity(text.len());
    let mut remaining = text;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(remaining.len())
            .unwrap_or(remaining.len() * 4);
        output.reserve(needed);
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(remaining, &mut output, true);
        remaining = &remaining[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(ch) => {
                debug!("dropping {ch:?}, not representable in {}", encoding.name())
            }
        }
    }
    output
}
