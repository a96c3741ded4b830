use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const LOG_DIR: &str = ".pepgate";
const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeLogEntry {
    pub timestamp: String,
    pub command: String,
    pub path: String,
    pub action: String,
    #[serde(rename = "lines")]
    pub line_summary: String,
}

/// Append-only JSONL log of what each command did to each buffer.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    dir: PathBuf,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::in_dir(LOG_DIR)
    }
}

impl ChangeLog {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn record(
        &self,
        command: &str,
        path: &Path,
        action: &str,
        line_summary: &str,
    ) -> Result<()> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".into());
        let entry = ChangeLogEntry {
            timestamp,
            command: command.to_string(),
            path: path.display().to_string(),
            action: action.to_string(),
            line_summary: line_summary.to_string(),
        };
        let json = serde_json::to_string(&entry)?;

        fs::create_dir_all(&self.dir).with_context(|| format!("creating {}", self.dir.display()))?;
        let log_path = self.path();
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .with_context(|| format!("opening {}", log_path.display()))?;
        writeln!(file, "{json}")?;
        truncate_log(&log_path)?;
        Ok(())
    }

    /// The newest `tail` entries, oldest first. Unparseable lines are skipped.
    pub fn read_recent(&self, tail: usize) -> Result<Vec<ChangeLogEntry>> {
        let log_path = self.path();
        let file = match fs::File::open(&log_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", log_path.display()));
            }
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Ok(entry) = serde_json::from_str::<ChangeLogEntry>(&line) {
                entries.push(entry);
            }
        }
        let skip = entries.len().saturating_sub(tail);
        Ok(entries.split_off(skip))
    }
}

fn truncate_log(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let reader = BufReader::new(file);
    let lines: Vec<_> = reader.lines().collect::<Result<_, _>>()?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_and_reads_back_entries() {
        let temp = tempdir().expect("temp dir");
        let log = ChangeLog::in_dir(temp.path().join("log"));
        log.record("files", Path::new("a.py"), "applied", "+1 -1")
            .expect("record a");
        log.record("files", Path::new("b.py"), "no-op", "no change")
            .expect("record b");

        let recent = log.read_recent(1).expect("read");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].path, "b.py");
        assert_eq!(recent[0].action, "no-op");

        let raw = fs::read_to_string(log.path()).expect("raw log");
        assert!(raw.contains("\"lines\":\"+1 -1\""));
    }

    #[test]
    fn missing_log_reads_empty() {
        let temp = tempdir().expect("temp dir");
        let log = ChangeLog::in_dir(temp.path().join("absent"));
        assert!(log.read_recent(10).expect("read").is_empty());
    }

    #[test]
    fn log_is_bounded() {
        let temp = tempdir().expect("temp dir");
        let log = ChangeLog::in_dir(temp.path());
        let seeded: String = (0..MAX_ENTRIES + 5)
            .map(|idx| format!("{{\"n\":{idx}}}\n"))
            .collect();
        fs::write(log.path(), seeded).expect("seed");
        log.record("save", Path::new("x.py"), "applied", "+0 -0")
            .expect("record");
        let raw = fs::read_to_string(log.path()).expect("raw log");
        assert_eq!(raw.lines().count(), MAX_ENTRIES);
        assert!(raw.lines().last().is_some_and(|line| line.contains("x.py")));
    }
}
