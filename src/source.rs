use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::diff;
use crate::encoding::{DecodedText, EncodingStrategy};
use crate::files::FileEntry;

/// A file read into memory and decoded.
pub struct SourceFile {
    pub path: PathBuf,
    pub decoded: DecodedText,
}

impl SourceFile {
    pub fn text(&self) -> &str {
        &self.decoded.text
    }
}

pub fn read_source(entry: &FileEntry, encoding: &EncodingStrategy) -> Result<SourceFile> {
    let bytes = fs::read(&entry.path)
        .with_context(|| format!("failed to read {}", entry.path.display()))?;
    let decoded = encoding
        .decode(&bytes)
        .with_context(|| format!("decoding {}", entry.path.display()))?;
    Ok(SourceFile {
        path: entry.path.clone(),
        decoded,
    })
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub no_backup: bool,
    pub undo_dir: Option<PathBuf>,
}

/// Writes `new_text` over the file in its original encoding. Returns the
/// backup path when one was made.
pub fn write_source(
    source: &SourceFile,
    new_text: &str,
    options: &WriteOptions,
) -> Result<Option<PathBuf>> {
    let encoded = source
        .decoded
        .encode(new_text)
        .with_context(|| format!("encoding {}", source.path.display()))?;
    if let Some(dir) = options.undo_dir.as_deref() {
        write_undo_patch(dir, &source.path, source.text(), new_text)?;
    }
    let backup = create_backup_if_needed(&source.path, options.no_backup)?;
    write_via_temp(&source.path, &encoded)
        .with_context(|| format!("writing {}", source.path.display()))?;
    Ok(backup)
}

fn create_backup_if_needed(path: &Path, no_backup: bool) -> Result<Option<PathBuf>> {
    if no_backup || !path.exists() {
        return Ok(None);
    }

    let mut attempt = 0usize;
    loop {
        let candidate = backup_candidate(path, attempt);
        if !candidate.exists() {
            fs::copy(path, &candidate)
                .with_context(|| format!("creating backup {}", candidate.display()))?;
            return Ok(Some(candidate));
        }
        attempt += 1;
    }
}

fn backup_candidate(path: &Path, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("pepgate_file");
    let suffix = if index == 0 {
        ".bak".to_string()
    } else {
        format!(".bak{index}")
    };
    path.with_file_name(format!("{name}{suffix}"))
}

fn write_via_temp(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let base_dir = parent.unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".pepgate-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp file {}", temp_path.display()))?;
    }
    if let Ok(meta) = fs::metadata(path) {
        let _ = fs::set_permissions(&temp_path, meta.permissions());
    }
    fs::rename(&temp_path, path).or_else(|err| {
        let _ = fs::remove_file(&temp_path);
        Err(err).with_context(|| format!("replacing {}", path.display()))
    })?;
    Ok(())
}

fn write_undo_patch(dir: &Path, path: &Path, old_text: &str, new_text: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating undo dir {}", dir.display()))?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let file_name = format!(
        "{}_{}.patch",
        sanitize(&timestamp),
        sanitize(&path.display().to_string())
    );
    let patch_path = dir.join(file_name);
    fs::write(&patch_path, diff::undo_patch(old_text, new_text))
        .with_context(|| format!("writing undo patch {}", patch_path.display()))?;
    Ok(())
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect()
}
