//! Error types for the rewrite workflow and its caller-side helpers.
//!
//! Per-range failures are recovered inside the workflow; only a formatter
//! that cannot be invoked at all escapes `run`.

use thiserror::Error;

/// Failure reported by a [`crate::formatter::Formatter`] for one call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The correction tool cannot be invoked (missing or misconfigured).
    #[error("formatter unavailable: {0}")]
    Unavailable(String),

    /// The tool ran but rejected this input or produced invalid output.
    #[error("formatting failed: {0}")]
    Failed(String),
}

/// Fatal errors from [`crate::workflow::RewriteWorkflow::run`].
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("formatter '{formatter}' unavailable: {reason}")]
    FormatterUnavailable { formatter: String, reason: String },
}

/// Problems with caller-supplied ranges, either when resolving a selection or
/// when writing rewritten text back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid range '{0}'; expected START:END byte offsets")]
    InvalidSpec(String),

    #[error("range {start}:{end} is outside the buffer ({len} bytes)")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("range {start}:{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },

    #[error("ranges {first} and {second} overlap")]
    Overlap { first: String, second: String },

    #[error("range belongs to buffer '{found}', expected '{expected}'")]
    ForeignBuffer { expected: String, found: String },

    #[error("buffer changed since range {start}:{end} was read")]
    Stale { start: usize, end: usize },
}

/// The text encoding of a buffer could not be settled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unknown encoding '{0}'")]
    UnknownLabel(String),

    #[error("input is not valid {0}")]
    Malformed(String),

    #[error("rewritten text cannot be encoded as {0}")]
    Unencodable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_message_names_formatter() {
        let err = WorkflowError::FormatterUnavailable {
            formatter: "autopep8".into(),
            reason: "not found".into(),
        };
        let text = err.to_string();
        assert!(text.contains("autopep8"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn selection_errors_render_offsets() {
        let err = SelectionError::OutOfBounds {
            start: 4,
            end: 12,
            len: 8,
        };
        assert_eq!(err.to_string(), "range 4:12 is outside the buffer (8 bytes)");
    }
}
