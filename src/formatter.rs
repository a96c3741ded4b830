//! The correction capability the workflow delegates to.
//!
//! A formatter is a pure text-to-text function: it must never touch files.
//! [`CommandFormatter`] drives an external autopep8-compatible executable over
//! stdin/stdout; [`BuiltinFormatter`] fixes a handful of whitespace rules
//! in-process.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use crate::error::FormatError;
use crate::normalize::fix_whitespace;
use crate::options::StyleArgs;

pub const DEFAULT_PROGRAM: &str = "autopep8";

pub trait Formatter {
    fn format(&self, text: &str, style: &StyleArgs) -> Result<String, FormatError>;

    fn name(&self) -> &str {
        "formatter"
    }
}

impl<F> Formatter for F
where
    F: Fn(&str, &StyleArgs) -> Result<String, FormatError>,
{
    fn format(&self, text: &str, style: &StyleArgs) -> Result<String, FormatError> {
        self(text, style)
    }
}

/// Runs `<program> [args] [style flags] -`, feeding the text on stdin.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: PathBuf,
    args: Vec<String>,
    label: String,
}

impl CommandFormatter {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = program.display().to_string();
        Self {
            program,
            args,
            label,
        }
    }

    pub fn autopep8() -> Self {
        Self::new(DEFAULT_PROGRAM, Vec::new())
    }

    pub fn command_line(&self, style: &StyleArgs) -> Vec<String> {
        let mut line = self.args.clone();
        line.extend(style.to_cli_args());
        line.push("-".to_string());
        line
    }
}

impl Formatter for CommandFormatter {
    fn format(&self, text: &str, style: &StyleArgs) -> Result<String, FormatError> {
        let mut child = Command::new(&self.program)
            .args(self.command_line(style))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    FormatError::Unavailable(format!("cannot run {}: {err}", self.label))
                }
                _ => FormatError::Failed(format!("spawning {}: {err}", self.label)),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| FormatError::Failed("stdin was not captured".into()))?;
        let input = text.to_owned();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|err| FormatError::Failed(format!("waiting for {}: {err}", self.label)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => {
                return Err(FormatError::Failed(format!(
                    "writing to {}: {err}",
                    self.label
                )));
            }
            Err(_) => return Err(FormatError::Failed("stdin writer panicked".into())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("no diagnostics");
            return Err(FormatError::Failed(format!(
                "{} exited with {}: {reason}",
                self.label, output.status
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| FormatError::Failed(format!("{} produced non-UTF-8 output", self.label)))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// In-process whitespace corrector (W291, W292, W293, W391).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFormatter;

impl Formatter for BuiltinFormatter {
    fn format(&self, text: &str, style: &StyleArgs) -> Result<String, FormatError> {
        Ok(fix_whitespace(text, &style.filter()).unwrap_or_else(|| text.to_string()))
    }

    fn name(&self) -> &str {
        "builtin"
    }
}
