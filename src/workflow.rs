//! Diff-gated rewriting of caller-supplied text ranges.
//!
//! [`RewriteWorkflow::run`] formats each range independently, classifies the
//! result, and either hands back the ranges to write or a preview diff. It
//! never touches the caller's buffer.

use serde::Serialize;

use crate::diff;
use crate::error::{FormatError, WorkflowError};
use crate::formatter::Formatter;
use crate::options::{FormatOptions, Mode, StyleArgs};

/// Byte span inside a named buffer. `buffer` also labels preview diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRange {
    pub buffer: String,
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(buffer: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            buffer: buffer.into(),
            start,
            end,
        }
    }

    pub fn whole(buffer: impl Into<String>, text: &str) -> Self {
        Self::new(buffer, 0, text.len())
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A range together with the text that was read from it.
#[derive(Debug, Clone)]
pub struct SourceRange {
    pub range: TextRange,
    pub text: String,
}

impl SourceRange {
    pub fn new(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// The entire buffer as a single range.
    pub fn whole(buffer: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            range: TextRange::whole(buffer, &text),
            text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteResult {
    pub range: TextRange,
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub rewritten: String,
    pub changed: bool,
    pub changed_lines: usize,
    pub significant: bool,
    pub failure: Option<String>,
}

/// A range to write back, with the text it replaces so the caller can check
/// the buffer has not moved underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRange {
    pub range: TextRange,
    pub original: String,
    pub rewritten: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeBody {
    Unchanged,
    Applied(Vec<AppliedRange>),
    Preview(String),
}

#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub results: Vec<RewriteResult>,
    pub body: OutcomeBody,
}

impl WorkflowOutcome {
    pub fn any_changed(&self) -> bool {
        !matches!(self.body, OutcomeBody::Unchanged)
    }

    pub fn applied_ranges(&self) -> &[AppliedRange] {
        match &self.body {
            OutcomeBody::Applied(ranges) => ranges,
            _ => &[],
        }
    }

    pub fn diff_text(&self) -> &str {
        match &self.body {
            OutcomeBody::Preview(text) => text,
            _ => "",
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RewriteResult> {
        self.results.iter().filter(|result| result.failure.is_some())
    }
}

/// Runs one formatter over batches of ranges. Holds no state between runs.
pub struct RewriteWorkflow<'f, F: Formatter + ?Sized> {
    formatter: &'f F,
}

impl<'f, F: Formatter + ?Sized> RewriteWorkflow<'f, F> {
    pub fn new(formatter: &'f F) -> Self {
        Self { formatter }
    }

    pub fn run(
        &self,
        ranges: &[SourceRange],
        options: &FormatOptions,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let style = options.style_args();
        let mut results = Vec::with_capacity(ranges.len());

        for source in ranges {
            let (rewritten, failure) = self.rewrite(&source.text, &style)?;
            results.push(classify(source, rewritten, failure, options));
        }

        let body = if !results.iter().any(|result| result.significant) {
            OutcomeBody::Unchanged
        } else {
            match options.mode {
                Mode::Apply => OutcomeBody::Applied(
                    results
                        .iter()
                        .filter(|result| result.changed)
                        .map(|result| AppliedRange {
                            range: result.range.clone(),
                            original: result.original.clone(),
                            rewritten: result.rewritten.clone(),
                        })
                        .collect(),
                ),
                Mode::Preview => {
                    let mut text = String::new();
                    for result in results.iter().filter(|result| result.changed) {
                        text.push_str(&diff::preview_diff(
                            &result.original,
                            &result.rewritten,
                            &result.range.buffer,
                        ));
                    }
                    OutcomeBody::Preview(text)
                }
            }
        };

        Ok(WorkflowOutcome { results, body })
    }

    fn rewrite(
        &self,
        text: &str,
        style: &StyleArgs,
    ) -> Result<(Option<String>, Option<String>), WorkflowError> {
        if text.is_empty() {
            return Ok((None, None));
        }
        match self.formatter.format(text, style) {
            Ok(out) if out.is_empty() => Ok((None, Some("formatter returned no output".into()))),
            Ok(out) => Ok((Some(out), None)),
            Err(FormatError::Failed(reason)) => Ok((None, Some(reason))),
            Err(FormatError::Unavailable(reason)) => Err(WorkflowError::FormatterUnavailable {
                formatter: self.formatter.name().to_string(),
                reason,
            }),
        }
    }
}

fn classify(
    source: &SourceRange,
    rewritten: Option<String>,
    failure: Option<String>,
    options: &FormatOptions,
) -> RewriteResult {
    let rewritten = rewritten.unwrap_or_else(|| source.text.clone());
    let changed = rewritten != source.text;
    let changed_lines = if changed {
        diff::changed_lines(&source.text, &rewritten)
    } else {
        0
    };
    let significant = match options.mode {
        Mode::Apply => changed,
        Mode::Preview => changed && changed_lines >= options.preview_threshold,
    };
    RewriteResult {
        range: source.range.clone(),
        original: source.text.clone(),
        rewritten,
        changed,
        changed_lines,
        significant,
        failure,
    }
}
