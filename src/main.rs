use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use pepgate::diff;
use pepgate::encoding::EncodingStrategy;
use pepgate::files::{self, TargetQuery, is_python_path};
use pepgate::formatter::Formatter;
use pepgate::logging::ChangeLog;
use pepgate::options::{CodeList, FormatOptions, Mode};
use pepgate::selection::{self, RangeSpec};
use pepgate::settings::{self, FormatterSetting, Settings};
use pepgate::source::{self, SourceFile, WriteOptions};
use pepgate::workflow::{
    OutcomeBody, RewriteResult, RewriteWorkflow, SourceRange, WorkflowOutcome,
};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Buffer(cmd) => handle_buffer(cmd)?,
        Command::Files(cmd) => handle_files(cmd)?,
        Command::Save(cmd) => handle_save(cmd)?,
        Command::Log(cmd) => handle_log(cmd)?,
    }

    Ok(())
}

/// Settings, formatter and encoding resolved once per invocation.
struct Session {
    settings: Settings,
    settings_path: Option<PathBuf>,
    formatter: Box<dyn Formatter>,
    encoding: EncodingStrategy,
    log: ChangeLog,
    json: bool,
}

impl Session {
    fn open(style: &StyleFlags, output: &OutputFlags) -> Result<Self> {
        let cwd = env::current_dir().context("resolving current directory")?;
        let (settings, settings_path) = settings::load_settings(style.settings.as_deref(), &cwd)?;
        let formatter = style.formatter_setting(&settings).build();
        let encoding = EncodingStrategy::new(
            style.encoding.as_deref(),
            settings.default_encoding.as_deref(),
        )?;
        Ok(Self {
            settings,
            settings_path,
            formatter,
            encoding,
            log: ChangeLog::default(),
            json: output.json,
        })
    }

    fn options(&self, style: &StyleFlags, mode: Mode, threshold: usize) -> FormatOptions {
        let mut options =
            FormatOptions::new(mode).with_threshold(style.threshold.unwrap_or(threshold));
        options.ignore = style
            .ignore
            .as_deref()
            .map(CodeList::parse)
            .unwrap_or_else(|| self.settings.ignore_codes());
        options.select = style
            .select
            .as_deref()
            .map(CodeList::parse)
            .unwrap_or_else(|| self.settings.select_codes());
        options.aggressive = if style.aggressive > 0 {
            style.aggressive
        } else {
            self.settings.aggressive
        };
        options.max_line_length = style.max_line_length.or(self.settings.max_line_length);
        options
    }

    fn run(&self, ranges: &[SourceRange], options: &FormatOptions) -> Result<WorkflowOutcome> {
        let outcome = RewriteWorkflow::new(self.formatter.as_ref()).run(ranges, options)?;
        for failed in outcome.failures() {
            eprintln!(
                "warning: skipped {}:{}..{} ({})",
                failed.range.buffer,
                failed.range.start,
                failed.range.end,
                failed.failure.as_deref().unwrap_or("unknown failure")
            );
        }
        Ok(outcome)
    }

    fn record<W: Write>(
        &self,
        out: &mut W,
        command: &str,
        path: &Path,
        action: &str,
        summary: &str,
    ) -> Result<()> {
        self.record_with(out, command, path, action, summary, JsonMap::new())
    }

    /// Appends to the change log and, with `--json`, writes the event to `out`.
    fn record_with<W: Write>(
        &self,
        out: &mut W,
        command: &str,
        path: &Path,
        action: &str,
        summary: &str,
        extra: JsonMap<String, JsonValue>,
    ) -> Result<()> {
        if let Err(err) = self.log.record(command, path, action, summary) {
            eprintln!("warning: change log not updated: {err:#}");
        }
        if !self.json {
            return Ok(());
        }
        let mut event = JsonMap::new();
        event.insert("command".into(), JsonValue::String(command.to_string()));
        event.insert("path".into(), JsonValue::String(path.display().to_string()));
        event.insert("action".into(), JsonValue::String(action.to_string()));
        event.insert("line_summary".into(), JsonValue::String(summary.to_string()));
        for (key, value) in extra {
            event.insert(key, value);
        }
        writeln!(out, "{}", JsonValue::Object(event))?;
        Ok(())
    }

    fn print_summary(&self, command: &str, options: &FormatOptions, details: &[String]) {
        eprintln!("command: {command}");
        eprintln!("mode: {}", options.mode);
        eprintln!("formatter: {}", self.formatter.name());
        eprintln!(
            "settings: {}",
            self.settings_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "(defaults)".to_string())
        );
        if !options.ignore.is_empty() {
            eprintln!("ignore: {}", options.ignore.joined());
        }
        if !options.select.is_empty() {
            eprintln!("select: {}", options.select.joined());
        }
        eprintln!("preview threshold: {} lines", options.preview_threshold);
        eprintln!("encoding strategy: {}", self.encoding.describe());
        for detail in details {
            eprintln!("{detail}");
        }
        eprintln!("---");
    }
}

fn handle_buffer(cmd: BufferCommand) -> Result<()> {
    let session = Session::open(&cmd.style, &cmd.output)?;
    let (bytes, label) = match &cmd.input {
        Some(path) => (
            fs::read(path).with_context(|| format!("reading {}", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("reading buffer from stdin")?;
            (buf, "<stdin>".to_string())
        }
    };
    let mut out = io::stdout().lock();
    run_buffer(&session, &cmd, &bytes, label, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Runs one buffer through the workflow. Diffs, JSON events and a buffer bound
/// for stdout go to `out`, in the buffer's own encoding.
fn run_buffer<W: Write>(
    session: &Session,
    cmd: &BufferCommand,
    bytes: &[u8],
    label: String,
    out: &mut W,
) -> Result<()> {
    let mode = cmd.output.mode();
    let options = session.options(&cmd.style, mode, session.settings.thresholds().selection);
    let to_stdout = cmd.stdout || cmd.input.is_none();
    if to_stdout && cmd.output.json && mode == Mode::Apply {
        bail!("--json cannot be combined with writing the buffer to stdout");
    }

    let name = cmd.name.clone().unwrap_or(label);
    let decoded = session
        .encoding
        .decode(bytes)
        .with_context(|| format!("decoding {name}"))?;
    let text = decoded.text.as_str();

    let specs = cmd
        .ranges
        .iter()
        .map(|raw| selection::parse_range_spec(raw))
        .collect::<Result<Vec<RangeSpec>, _>>()?;
    let ranges = selection::resolve_selections(&name, text, &specs)?;

    if cmd.output.verbose {
        session.print_summary(
            "buffer",
            &options,
            &[
                format!("buffer: {name} ({} bytes, {})", bytes.len(), decoded.decision.source),
                format!("ranges: {}", ranges.len()),
            ],
        );
    }

    let outcome = session.run(&ranges, &options)?;
    let log_path = PathBuf::from(&name);
    match &outcome.body {
        OutcomeBody::Unchanged => {
            eprintln!("pepgate: no issues to fix");
            let extra = results_extra(&outcome.results, None)?;
            session.record_with(out, "buffer", &log_path, "no-op", "no change", extra)?;
            if to_stdout && mode == Mode::Apply {
                out.write_all(bytes)?;
            }
        }
        OutcomeBody::Preview(diff_text) => {
            let extra = results_extra(&outcome.results, Some(diff_text))?;
            let summary = changed_lines_summary(&outcome);
            session.record_with(out, "buffer", &log_path, "preview", &summary, extra)?;
            if !cmd.output.json {
                diff::write_diff(out, diff_text, cmd.output.color.should_color())?;
            }
        }
        OutcomeBody::Applied(applied) => {
            let new_text = selection::splice(&name, text, applied)?;
            let summary = diff::summarize_lines(text, &new_text);
            match (&cmd.input, to_stdout) {
                (Some(path), false) => {
                    let source = SourceFile {
                        path: path.clone(),
                        decoded: decoded.clone(),
                    };
                    let backup =
                        source::write_source(&source, &new_text, &cmd.output.write_options())?;
                    report_backup(path, backup);
                }
                _ => {
                    let encoded = decoded
                        .encode(&new_text)
                        .with_context(|| format!("encoding {name}"))?;
                    out.write_all(&encoded)?;
                }
            }
            eprintln!("pepgate: issues fixed");
            let extra = results_extra(&outcome.results, None)?;
            session.record_with(out, "buffer", &log_path, "applied", &summary, extra)?;
        }
    }
    Ok(())
}

fn handle_files(cmd: FilesCommand) -> Result<()> {
    let session = Session::open(&cmd.style, &cmd.output)?;
    let mut out = io::stdout().lock();
    run_files(&session, &cmd, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run_files<W: Write>(session: &Session, cmd: &FilesCommand, out: &mut W) -> Result<()> {
    let mode = cmd.output.mode();
    let options = session.options(&cmd.style, mode, session.settings.thresholds().files);
    let entries = files::resolve_targets(&TargetQuery {
        paths: cmd.paths.clone(),
        globs: cmd.globs.clone(),
        include_hidden: cmd.include_hidden,
        exclude: cmd.exclude.clone(),
    })?;

    if cmd.output.verbose {
        let total_bytes: u64 = entries.iter().map(|entry| entry.metadata.len).sum();
        session.print_summary(
            "files",
            &options,
            &[format!("resolved files: {} ({total_bytes} bytes)", entries.len())],
        );
    }

    let mut stats = CommandStats::default();
    let mut sources = Vec::with_capacity(entries.len());
    for entry in &entries {
        if entry.metadata.is_probably_binary {
            eprintln!("skipping {} (suspected binary file)", entry.path.display());
            stats.skipped += 1;
            let reason = "suspected binary file";
            session.record(out, "files", &entry.path, "skipped", reason)?;
            continue;
        }
        match source::read_source(entry, &session.encoding) {
            Ok(source) => sources.push(source),
            Err(err) => {
                eprintln!("skipping {}: {err:#}", entry.path.display());
                stats.skipped += 1;
                let reason = "encoding unresolved";
                session.record(out, "files", &entry.path, "skipped", reason)?;
            }
        }
    }

    let ranges: Vec<SourceRange> = sources
        .iter()
        .map(|source| SourceRange::whole(source.path.display().to_string(), source.text()))
        .collect();
    for source in &sources {
        eprintln!("pepgate: formatting {}", source.path.display());
    }
    let outcome = session.run(&ranges, &options)?;
    let by_name: HashMap<&str, &SourceFile> = ranges
        .iter()
        .zip(&sources)
        .map(|(range, source)| (range.range.buffer.as_str(), source))
        .collect();

    match &outcome.body {
        OutcomeBody::Unchanged => {
            eprintln!("pepgate: no issues to fix");
        }
        OutcomeBody::Preview(diff_text) => {
            if !cmd.output.json {
                diff::write_diff(out, diff_text, cmd.output.color.should_color())?;
            }
        }
        OutcomeBody::Applied(applied) => {
            let write_options = cmd.output.write_options();
            for item in applied {
                let name = item.range.buffer.as_str();
                let Some(source) = by_name.get(name) else {
                    bail!("rewritten range refers to unknown file {name}");
                };
                let new_text =
                    selection::splice(name, source.text(), std::slice::from_ref(item))?;
                let backup = source::write_source(source, &new_text, &write_options)?;
                report_backup(&source.path, backup);
                writeln!(out, "applied {}", source.path.display())?;
            }
            eprintln!("pepgate: issues fixed");
        }
    }

    for result in &outcome.results {
        let path = Path::new(&result.range.buffer);
        if !result.changed {
            stats.no_op += 1;
            let summary = result.failure.as_deref().unwrap_or("no change");
            session.record(out, "files", path, "no-op", summary)?;
            continue;
        }
        let summary = diff::summarize_lines(&result.original, &result.rewritten);
        match &outcome.body {
            OutcomeBody::Applied(_) => {
                stats.applied += 1;
                session.record(out, "files", path, "applied", &summary)?;
            }
            OutcomeBody::Preview(_) => {
                stats.previewed += 1;
                let file_diff =
                    diff::preview_diff(&result.original, &result.rewritten, &result.range.buffer);
                let extra = results_extra(std::slice::from_ref(result), Some(&file_diff))?;
                session.record_with(out, "files", path, "preview", &summary, extra)?;
            }
            OutcomeBody::Unchanged => {
                stats.below_threshold += 1;
                session.record(out, "files", path, "below-threshold", &summary)?;
            }
        }
    }
    stats.print("files");
    Ok(())
}

fn handle_save(cmd: SaveCommand) -> Result<()> {
    let session = Session::open(&cmd.style, &cmd.output)?;
    let mut out = io::stdout().lock();
    run_save(&session, &cmd, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Format-on-save hook. Quietly does nothing unless enabled (or forced) and
/// the path is a Python source.
fn run_save<W: Write>(session: &Session, cmd: &SaveCommand, out: &mut W) -> Result<()> {
    if !session.settings.format_on_save && !cmd.force {
        if cmd.output.verbose {
            eprintln!("format on save is disabled; nothing to do");
        }
        return Ok(());
    }
    if !is_python_path(&cmd.path) {
        return Ok(());
    }

    let threshold = session.settings.thresholds().selection;
    let options = session.options(&cmd.style, Mode::Apply, threshold);
    let entry = files::file_entry(&cmd.path)?;
    let source = source::read_source(&entry, &session.encoding)?;
    let name = source.path.display().to_string();
    let ranges = [SourceRange::whole(name.clone(), source.text())];
    let outcome = session.run(&ranges, &options)?;

    if !outcome.any_changed() {
        return session.record(out, "save", &source.path, "no-op", "no change");
    }
    let new_text = selection::splice(&name, source.text(), outcome.applied_ranges())?;
    let summary = diff::summarize_lines(source.text(), &new_text);
    let backup = source::write_source(&source, &new_text, &cmd.output.write_options())?;
    report_backup(&source.path, backup);
    eprintln!("pepgate: issues fixed");
    session.record(out, "save", &source.path, "applied", &summary)
}

fn handle_log(cmd: LogCommand) -> Result<()> {
    let entries = ChangeLog::default().read_recent(cmd.tail)?;
    if entries.is_empty() {
        println!("change log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "[{}] {:<7} {:<15} {:<12} {}",
            entry.timestamp, entry.command, entry.action, entry.line_summary, entry.path
        );
    }
    Ok(())
}

fn changed_lines_summary(outcome: &WorkflowOutcome) -> String {
    let touched: usize = outcome
        .results
        .iter()
        .filter(|result| result.changed)
        .map(|result| result.changed_lines)
        .sum();
    format!("{touched} lines")
}

/// Per-range results, plus the diff when one was rendered, for `--json` events.
fn results_extra(
    results: &[RewriteResult],
    diff_text: Option<&str>,
) -> Result<JsonMap<String, JsonValue>> {
    let mut map = JsonMap::new();
    map.insert("ranges".into(), serde_json::to_value(results)?);
    if let Some(text) = diff_text {
        map.insert("diff".into(), JsonValue::String(text.to_string()));
    }
    Ok(map)
}

fn report_backup(path: &Path, backup: Option<PathBuf>) {
    if let Some(bak) = backup {
        eprintln!("backup saved: {} -> {}", path.display(), bak.display());
    }
}

#[derive(Default)]
struct CommandStats {
    applied: usize,
    previewed: usize,
    below_threshold: usize,
    skipped: usize,
    no_op: usize,
}

impl CommandStats {
    fn print(&self, label: &str) {
        let total =
            self.applied + self.previewed + self.below_threshold + self.skipped + self.no_op;
        if total == 0 {
            return;
        }
        eprintln!(
            "{label} summary: applied={}, previewed={}, below-threshold={}, skipped={}, no-op={}",
            self.applied, self.previewed, self.below_threshold, self.skipped, self.no_op
        );
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "pepgate",
    version,
    about = "Diff-gated Python style correction for buffers, selections and files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Correct a buffer (file or stdin), optionally limited to byte ranges.
    Buffer(BufferCommand),
    /// Correct whole Python files and directories.
    Files(FilesCommand),
    /// Format-on-save hook: rewrite a file in place when enabled in settings.
    Save(SaveCommand),
    /// Show recent change-log entries.
    Log(LogCommand),
}

#[derive(Debug, Clone, Args)]
struct StyleFlags {
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    settings: Option<PathBuf>,
    #[arg(long, value_name = "CODES")]
    ignore: Option<String>,
    #[arg(long, value_name = "CODES")]
    select: Option<String>,
    #[arg(long, short = 'a', action = ArgAction::Count)]
    aggressive: u8,
    #[arg(long = "max-line-length", value_name = "N")]
    max_line_length: Option<usize>,
    /// `builtin`, or a program speaking autopep8's stdin/stdout protocol.
    #[arg(long, value_name = "NAME")]
    formatter: Option<String>,
    #[arg(
        long = "formatter-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        requires = "formatter"
    )]
    formatter_args: Vec<String>,
    /// Changed lines needed before a preview diff is shown.
    #[arg(long, value_name = "LINES")]
    threshold: Option<usize>,
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,
}

impl StyleFlags {
    fn formatter_setting(&self, settings: &Settings) -> FormatterSetting {
        match &self.formatter {
            Some(name) if self.formatter_args.is_empty() || name == "builtin" => {
                FormatterSetting::Named(name.clone())
            }
            Some(name) => FormatterSetting::Command {
                command: PathBuf::from(name),
                args: self.formatter_args.clone(),
            },
            None => settings.formatter.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct OutputFlags {
    /// Write corrections instead of previewing a diff.
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_backup: bool,
    #[arg(long = "undo-log", value_name = "DIR", value_hint = ValueHint::DirPath)]
    undo_log: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorChoice,
    #[arg(long, short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,
}

impl OutputFlags {
    fn mode(&self) -> Mode {
        if self.apply { Mode::Apply } else { Mode::Preview }
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            no_backup: self.no_backup,
            undo_dir: self.undo_log.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct BufferCommand {
    #[command(flatten)]
    style: StyleFlags,
    #[command(flatten)]
    output: OutputFlags,
    /// File holding the buffer; stdin when omitted.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
    /// Buffer name used in diff headers.
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
    /// Selected byte range START:END (END may be empty); repeatable.
    #[arg(long = "range", value_name = "START:END")]
    ranges: Vec<String>,
    /// Print the rewritten buffer instead of writing the input file.
    #[arg(long, action = ArgAction::SetTrue)]
    stdout: bool,
}

#[derive(Debug, Args)]
struct FilesCommand {
    #[command(flatten)]
    style: StyleFlags,
    #[command(flatten)]
    output: OutputFlags,
    #[arg(value_name = "PATH", value_hint = ValueHint::AnyPath)]
    paths: Vec<PathBuf>,
    #[arg(long = "glob", value_name = "GLOB")]
    globs: Vec<String>,
    #[arg(long = "include-hidden", action = ArgAction::SetTrue)]
    include_hidden: bool,
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

#[derive(Debug, Args)]
struct SaveCommand {
    #[command(flatten)]
    style: StyleFlags,
    #[command(flatten)]
    output: OutputFlags,
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    path: PathBuf,
    /// Run even when `format_on_save` is off.
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

#[derive(Debug, Args)]
struct LogCommand {
    #[arg(long, default_value_t = 20)]
    tail: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pepgate::BuiltinFormatter;
    use tempfile::tempdir;

    fn builtin_session(log_root: &Path, settings: Settings) -> Session {
        Session {
            settings,
            settings_path: None,
            formatter: Box::new(BuiltinFormatter),
            encoding: EncodingStrategy::default(),
            log: ChangeLog::in_dir(log_root.join(".pepgate")),
            json: false,
        }
    }

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).expect("parse").command
    }

    fn buffer_cmd(args: &[&str]) -> BufferCommand {
        match parse(args) {
            Command::Buffer(cmd) => cmd,
            other => panic!("expected buffer command, got {other:?}"),
        }
    }

    fn save_cmd(path: &Path, force: bool) -> SaveCommand {
        let path = path.to_str().expect("utf-8 path");
        let mut args = vec!["pepgate", "save", "--no-backup", path];
        if force {
            args.push("--force");
        }
        match parse(&args) {
            Command::Save(cmd) => cmd,
            other => panic!("expected save command, got {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn buffer_ranges_and_apply_parse() {
        let cli = Cli::try_parse_from([
            "pepgate", "buffer", "--input", "a.py", "--range", "0:4", "--range", "10:", "--apply",
            "--ignore", "E501",
        ])
        .expect("parse");
        let Command::Buffer(cmd) = cli.command else {
            panic!("expected buffer command");
        };
        assert_eq!(cmd.ranges, vec!["0:4", "10:"]);
        assert_eq!(cmd.output.mode(), Mode::Apply);
        assert_eq!(cmd.style.ignore.as_deref(), Some("E501"));
    }

    #[test]
    fn formatter_args_select_command_formatter() {
        let cli = Cli::try_parse_from([
            "pepgate",
            "files",
            "src",
            "--formatter",
            "/opt/autopep8",
            "--formatter-arg",
            "--experimental",
        ])
        .expect("parse");
        let Command::Files(cmd) = cli.command else {
            panic!("expected files command");
        };
        assert_eq!(
            cmd.style.formatter_setting(&Settings::default()),
            FormatterSetting::Command {
                command: PathBuf::from("/opt/autopep8"),
                args: vec!["--experimental".into()],
            }
        );
        assert_eq!(cmd.output.mode(), Mode::Preview);
    }

    #[test]
    fn cli_codes_override_settings() {
        let temp = tempdir().expect("temp dir");
        let Command::Save(cmd) = parse(&["pepgate", "save", "a.py", "--select", "W2", "-aa"])
        else {
            panic!("expected save command");
        };
        let session = builtin_session(
            temp.path(),
            Settings {
                ignore: Some(settings::Codes::Joined("E501".into())),
                select: Some(settings::Codes::Joined("E".into())),
                aggressive: 1,
                ..Settings::default()
            },
        );
        let options = session.options(&cmd.style, Mode::Apply, 3);
        assert_eq!(options.select, CodeList::parse("W2"));
        assert_eq!(options.ignore, CodeList::parse("E501"));
        assert_eq!(options.aggressive, 2);
        assert_eq!(options.preview_threshold, 3);
    }

    #[test]
    fn save_respects_format_on_save_and_extension() {
        let temp = tempdir().expect("temp dir");
        let py = temp.path().join("mod.py");
        let txt = temp.path().join("notes.txt");
        fs::write(&py, "x = 1   \n").expect("seed py");
        fs::write(&txt, "x = 1   \n").expect("seed txt");
        let mut sink = Vec::<u8>::new();

        let disabled = builtin_session(temp.path(), Settings::default());
        run_save(&disabled, &save_cmd(&py, false), &mut sink).expect("disabled save");
        assert_eq!(fs::read_to_string(&py).expect("read py"), "x = 1   \n");

        let enabled = builtin_session(
            temp.path(),
            Settings {
                format_on_save: true,
                ..Settings::default()
            },
        );
        run_save(&enabled, &save_cmd(&txt, true), &mut sink).expect("txt save");
        assert_eq!(fs::read_to_string(&txt).expect("read txt"), "x = 1   \n");

        run_save(&enabled, &save_cmd(&py, false), &mut sink).expect("enabled save");
        assert_eq!(fs::read_to_string(&py).expect("read py"), "x = 1\n");
        assert!(!temp.path().join("mod.py.bak").exists());

        fs::write(&py, "y = 2 \n").expect("reseed py");
        run_save(&disabled, &save_cmd(&py, true), &mut sink).expect("forced save");
        assert_eq!(fs::read_to_string(&py).expect("read py"), "y = 2\n");
    }

    #[test]
    fn files_apply_writes_only_changed_files() {
        let temp = tempdir().expect("temp dir");
        let pkg = temp.path().join("pkg");
        fs::create_dir(&pkg).expect("pkg dir");
        let clean = pkg.join("a.py");
        let dirty = pkg.join("b.py");
        fs::write(&clean, "x = 1\n").expect("seed a");
        fs::write(&dirty, "y = 2  \n").expect("seed b");

        let session = builtin_session(temp.path(), Settings::default());
        let Command::Files(cmd) =
            parse(&["pepgate", "files", "--apply", pkg.to_str().expect("utf-8 path")])
        else {
            panic!("expected files command");
        };
        let mut out = Vec::<u8>::new();
        run_files(&session, &cmd, &mut out).expect("files run");

        assert_eq!(fs::read_to_string(&clean).expect("read a"), "x = 1\n");
        assert_eq!(fs::read_to_string(&dirty).expect("read b"), "y = 2\n");
        assert_eq!(
            fs::read_to_string(pkg.join("b.py.bak")).expect("backup"),
            "y = 2  \n"
        );
        assert!(!pkg.join("a.py.bak").exists());

        let printed = String::from_utf8(out).expect("utf-8 output");
        assert_eq!(printed, format!("applied {}\n", dirty.display()));

        let actions: Vec<(String, String)> = session
            .log
            .read_recent(10)
            .expect("change log")
            .into_iter()
            .map(|entry| (entry.path, entry.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                (clean.display().to_string(), "no-op".to_string()),
                (dirty.display().to_string(), "applied".to_string()),
            ]
        );
    }

    #[test]
    fn stdout_buffer_keeps_source_encoding() {
        let temp = tempdir().expect("temp dir");
        let session = builtin_session(temp.path(), Settings::default());
        let cmd = buffer_cmd(&["pepgate", "buffer", "--apply"]);

        let untouched = b"# coding: latin1\nname = \"\xe9\"\n";
        let mut out = Vec::<u8>::new();
        run_buffer(&session, &cmd, untouched, "<stdin>".into(), &mut out).expect("unchanged run");
        assert_eq!(out, untouched);

        let dirty = b"# coding: latin-1\nname = \"\xe9\"   \n";
        let mut out = Vec::<u8>::new();
        run_buffer(&session, &cmd, dirty, "<stdin>".into(), &mut out).expect("applied run");
        assert_eq!(out, b"# coding: latin-1\nname = \"\xe9\"\n");
    }

    #[test]
    fn buffer_preview_writes_labeled_diff() {
        let temp = tempdir().expect("temp dir");
        let session = builtin_session(temp.path(), Settings::default());
        let cmd = buffer_cmd(&["pepgate", "buffer", "--name", "demo.py", "--color", "never"]);
        let mut out = Vec::<u8>::new();
        run_buffer(&session, &cmd, b"a = 1 \nb = 2 \nc = 3 \n", "<stdin>".into(), &mut out)
            .expect("preview run");
        let printed = String::from_utf8(out).expect("utf-8 output");
        assert!(printed.starts_with("--- original:demo.py\n+++ fixed:demo.py\n"), "{printed}");
    }

    #[test]
    fn buffer_json_event_carries_range_results() {
        let temp = tempdir().expect("temp dir");
        let mut session = builtin_session(temp.path(), Settings::default());
        session.json = true;
        let cmd = buffer_cmd(&["pepgate", "buffer", "--json", "--range", "0:7"]);
        let mut out = Vec::<u8>::new();
        run_buffer(&session, &cmd, b"x = 1 \ny = 2 \n", "<stdin>".into(), &mut out)
            .expect("json run");
        let event: JsonValue = serde_json::from_slice(&out).expect("json event");
        assert_eq!(event["action"], "no-op");
        assert_eq!(event["ranges"][0]["range"]["end"], 7);
        assert_eq!(event["ranges"][0]["changed"], true);
        assert_eq!(event["ranges"][0]["changed_lines"], 1);
    }
}
