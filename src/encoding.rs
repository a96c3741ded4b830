use std::fmt;
use std::sync::LazyLock;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;

use crate::error::EncodingError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

static COOKIE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)^[ \t\x0c]*#.*?coding[:=][ \t]*([-\w.]+)")
        .unwrap_or_else(|err| panic!("invalid COOKIE_REGEX regex: {err}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Override,
    Bom,
    CodingCookie,
    AssumedUtf8,
    Default,
    Detector,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Override => "override",
            EncodingSource::Bom => "bom",
            EncodingSource::CodingCookie => "coding-cookie",
            EncodingSource::AssumedUtf8 => "assumed-utf8",
            EncodingSource::Default => "default",
            EncodingSource::Detector => "detector",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct EncodingDecision {
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
}

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub decision: EncodingDecision,
    pub had_bom: bool,
}

impl DecodedText {
    /// Encodes `text` back into the encoding this buffer was read with.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingError> {
        let encoding = self.decision.encoding;
        let (bytes, used, had_errors) = encoding.encode(text);
        if had_errors || used != encoding {
            return Err(EncodingError::Unencodable(encoding.name().to_string()));
        }
        let mut out = Vec::with_capacity(bytes.len() + UTF8_BOM.len());
        if self.had_bom && encoding == UTF_8 {
            out.extend_from_slice(UTF8_BOM);
        }
        out.extend_from_slice(&bytes);
        Ok(out)
    }
}

/// Resolution order: override, BOM, PEP 263 cookie, valid UTF-8, configured
/// default, detector.
#[derive(Debug, Clone, Default)]
pub struct EncodingStrategy {
    override_encoding: Option<&'static Encoding>,
    default_encoding: Option<&'static Encoding>,
}

impl EncodingStrategy {
    pub fn new(
        override_label: Option<&str>,
        default_label: Option<&str>,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            override_encoding: override_label.map(lookup).transpose()?,
            default_encoding: default_label.map(lookup).transpose()?,
        })
    }

    pub fn describe(&self) -> String {
        match (self.override_encoding, self.default_encoding) {
            (Some(enc), _) => format!("override {}, auto-detect disabled", enc.name()),
            (None, Some(enc)) => {
                format!("auto-detect (BOM → coding cookie → UTF-8 → {})", enc.name())
            }
            (None, None) => "auto-detect (BOM → coding cookie → UTF-8 → detector)".to_string(),
        }
    }

    pub fn decide(&self, bytes: &[u8]) -> Result<EncodingDecision, EncodingError> {
        if let Some(encoding) = self.override_encoding {
            return Ok(EncodingDecision {
                encoding,
                source: EncodingSource::Override,
            });
        }
        if let Some(encoding) = detect_bom(bytes) {
            return Ok(EncodingDecision {
                encoding,
                source: EncodingSource::Bom,
            });
        }
        if let Some(label) = coding_cookie(bytes) {
            return Ok(EncodingDecision {
                encoding: lookup(&label)?,
                source: EncodingSource::CodingCookie,
            });
        }
        if std::str::from_utf8(bytes).is_ok() {
            return Ok(EncodingDecision {
                encoding: UTF_8,
                source: EncodingSource::AssumedUtf8,
            });
        }
        if let Some(encoding) = self.default_encoding {
            return Ok(EncodingDecision {
                encoding,
                source: EncodingSource::Default,
            });
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        Ok(EncodingDecision {
            encoding: detector.guess(None, true),
            source: EncodingSource::Detector,
        })
    }

    /// Decodes `bytes`, refusing input that does not decode cleanly.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedText, EncodingError> {
        let decision = self.decide(bytes)?;
        let had_bom = decision.encoding == UTF_8 && bytes.starts_with(UTF8_BOM);
        let (cow, had_errors) = decision.encoding.decode_with_bom_removal(bytes);
        if had_errors {
            return Err(EncodingError::Malformed(decision.encoding.name().to_string()));
        }
        Ok(DecodedText {
            text: cow.into_owned(),
            decision,
            had_bom,
        })
    }
}

/// Resolves a WHATWG label or a Python codec name (`latin_1`, `utf-8-sig`).
fn lookup(label: &str) -> Result<&'static Encoding, EncodingError> {
    let trimmed = label.trim();
    Encoding::for_label(trimmed.as_bytes())
        .or_else(|| Encoding::for_label(python_codec_name(trimmed).as_bytes()))
        .ok_or_else(|| EncodingError::UnknownLabel(trimmed.to_string()))
}

fn python_codec_name(label: &str) -> String {
    let normal = label.to_ascii_lowercase().replace('_', "-");
    let has_prefix = |name: &str| normal == name || normal.starts_with(&format!("{name}-"));
    if has_prefix("utf-8") || has_prefix("utf8") {
        return "utf-8".to_string();
    }
    if ["latin-1", "iso-latin-1", "iso-8859-1", "iso8859-1", "l1"]
        .iter()
        .any(|name| has_prefix(name))
    {
        return "iso-8859-1".to_string();
    }
    normal
}

fn detect_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    Encoding::for_bom(bytes).map(|(encoding, _)| encoding)
}

/// PEP 263 declaration from the first two lines, if any.
fn coding_cookie(bytes: &[u8]) -> Option<String> {
    for line in bytes.split(|byte| *byte == b'\n').take(2) {
        if let Some(caps) = COOKIE_REGEX.captures(line) {
            return Some(String::from_utf8_lossy(&caps[1]).into_owned());
        }
        let trimmed = line.trim_ascii_start();
        if !trimmed.is_empty() && !trimmed.starts_with(b"#") {
            break;
        }
    }
    None
}
