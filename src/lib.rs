//! Diff-gated, selection-scoped rewriting for external Python style
//! correctors.
//!
//! [`workflow::RewriteWorkflow`] is the engine: callers hand it text ranges
//! and [`options::FormatOptions`], and get back either the ranges to write or
//! a preview diff. Everything else in the crate is caller-side plumbing used by
//! the `pepgate` binary: selections, encodings, target files, settings and the
//! change log.

pub mod diff;
pub mod encoding;
pub mod error;
pub mod files;
pub mod formatter;
pub mod logging;
pub mod normalize;
pub mod options;
pub mod selection;
pub mod settings;
pub mod source;
pub mod workflow;

pub use error::{FormatError, WorkflowError};
pub use formatter::{BuiltinFormatter, CommandFormatter, Formatter};
pub use options::{FormatOptions, Mode, StyleArgs};
pub use workflow::{
    AppliedRange, OutcomeBody, RewriteResult, RewriteWorkflow, SourceRange, TextRange,
    WorkflowOutcome,
};
