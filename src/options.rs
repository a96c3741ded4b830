use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SELECTION_THRESHOLD: usize = 3;
pub const DEFAULT_FILES_THRESHOLD: usize = 6;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Preview,
    Apply,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Preview => "preview",
            Mode::Apply => "apply",
        })
    }
}

/// Ordered list of rule identifiers or identifier prefixes (`E2`, `W291`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeList(Vec<String>);

impl CodeList {
    pub fn parse(raw: &str) -> Self {
        Self::from_items(raw.split(','))
    }

    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut codes = Vec::new();
        for item in items {
            let code = item.as_ref().trim().to_ascii_uppercase();
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }
        Self(codes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    fn matches(&self, code: &str) -> bool {
        self.0.iter().any(|prefix| code.starts_with(prefix.as_str()))
    }
}

/// Decides whether a rule code is enabled under an ignore/select pair.
#[derive(Clone, Copy, Debug)]
pub struct CodeFilter<'a> {
    ignore: &'a CodeList,
    select: &'a CodeList,
}

impl<'a> CodeFilter<'a> {
    pub fn new(ignore: &'a CodeList, select: &'a CodeList) -> Self {
        Self { ignore, select }
    }

    pub fn is_enabled(&self, code: &str) -> bool {
        if !self.select.is_empty() && !self.select.matches(code) {
            return false;
        }
        !self.ignore.matches(code)
    }
}

/// Significance bars for preview mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewThresholds {
    /// Single buffer or selection invocations.
    pub selection: usize,
    /// Whole-file batches.
    pub files: usize,
}

impl Default for PreviewThresholds {
    fn default() -> Self {
        Self {
            selection: DEFAULT_SELECTION_THRESHOLD,
            files: DEFAULT_FILES_THRESHOLD,
        }
    }
}

/// Everything one workflow invocation needs to know about the requested style.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    pub mode: Mode,
    pub ignore: CodeList,
    pub select: CodeList,
    pub aggressive: u8,
    pub max_line_length: Option<usize>,
    /// Minimum changed-line count for a preview diff to be surfaced.
    pub preview_threshold: usize,
}

impl FormatOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ignore: CodeList::default(),
            select: CodeList::default(),
            aggressive: 0,
            max_line_length: None,
            preview_threshold: DEFAULT_SELECTION_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.preview_threshold = threshold;
        self
    }

    pub fn style_args(&self) -> StyleArgs {
        StyleArgs::derive(self)
    }
}

/// Formatter-facing vocabulary derived from [`FormatOptions`].
///
/// Preview and apply differ only in `verbosity`, which never changes the
/// corrected text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleArgs {
    pub ignore: CodeList,
    pub select: CodeList,
    pub aggressive: u8,
    pub max_line_length: Option<usize>,
    pub verbosity: u8,
}

impl StyleArgs {
    pub fn derive(options: &FormatOptions) -> Self {
        Self {
            ignore: options.ignore.clone(),
            select: options.select.clone(),
            aggressive: options.aggressive,
            max_line_length: options.max_line_length,
            verbosity: match options.mode {
                Mode::Apply => 0,
                Mode::Preview => 2,
            },
        }
    }

    pub fn filter(&self) -> CodeFilter<'_> {
        CodeFilter::new(&self.ignore, &self.select)
    }

    /// Command-line flags in autopep8's vocabulary.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.ignore.is_empty() {
            args.push(format!("--ignore={}", self.ignore.joined()));
        }
        if !self.select.is_empty() {
            args.push(format!("--select={}", self.select.joined()));
        }
        for _ in 0..self.aggressive {
            args.push("--aggressive".to_string());
        }
        if let Some(limit) = self.max_line_length {
            args.push(format!("--max-line-length={limit}"));
        }
        if self.verbosity > 0 {
            args.push(format!("-{}", "v".repeat(self.verbosity as usize)));
        }
        args
    }
}
