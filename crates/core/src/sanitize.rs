//! Model output sanitisation and parsing.
//!
//! Small models frequently wrap their JSON in markdown code fences even when told not to. The
//! sanitiser strips the known fence markers and the parser decodes what is left. Anything that
//! still fails to decode becomes the fallback record rather than an error, so raw output always
//! reaches the user.

use crate::constants::CODE_FENCE_MARKERS;
use crate::report::MedicalReport;

/// Outcome of parsing one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    /// The output decoded into a valid report.
    Structured(MedicalReport),
    /// The output did not decode; the fallback record carries the raw text.
    Fallback(MedicalReport),
}

impl ParsedOutput {
    pub fn report(&self) -> &MedicalReport {
        match self {
            ParsedOutput::Structured(report) | ParsedOutput::Fallback(report) => report,
        }
    }

    pub fn into_report(self) -> MedicalReport {
        match self {
            ParsedOutput::Structured(report) | ParsedOutput::Fallback(report) => report,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedOutput::Structured(_))
    }
}

/// Removes every markdown fence marker and trims surrounding whitespace.
///
/// Only the markers themselves are removed; text between and around them is kept.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE_MARKERS
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
        .trim()
        .to_string()
}

/// Sanitises and decodes a model response.
///
/// On failure the fallback record is returned with `raw` (not the sanitised text) as its only
/// treatment plan entry.
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    let cleaned = strip_code_fences(raw);
    match MedicalReport::from_json(&cleaned) {
        Ok(report) => ParsedOutput::Structured(report),
        Err(e) => {
            tracing::warn!("model output did not parse as a report: {}", e);
            ParsedOutput::Fallback(MedicalReport::fallback(raw))
        }
    }
}
