use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use glob::glob;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

const BINARY_CHECK_BYTES: usize = 4096;
const PYTHON_EXTENSIONS: &[&str] = &["py", "pyw"];

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub len: u64,
    pub is_probably_binary: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TargetQuery {
    pub paths: Vec<PathBuf>,
    pub globs: Vec<String>,
    pub include_hidden: bool,
    pub exclude: Vec<String>,
}

/// Expands paths, directories and globs into the Python sources they name.
pub fn resolve_targets(query: &TargetQuery) -> Result<Vec<FileEntry>> {
    let exclude = build_exclude_globs(&query.exclude)?;
    let mut entries = Vec::new();

    for path in &query.paths {
        append_path(path, query.include_hidden, exclude.as_ref(), &mut entries)
            .with_context(|| format!("processing target {}", path.display()))?;
    }

    for pattern in &query.globs {
        let matches =
            glob(pattern).map_err(|err| anyhow!("invalid glob pattern '{pattern}': {err}"))?;
        for entry in matches {
            let path =
                entry.map_err(|err| anyhow!("error reading matches for '{pattern}': {err}"))?;
            append_path(&path, query.include_hidden, exclude.as_ref(), &mut entries)
                .with_context(|| format!("processing match {}", path.display()))?;
        }
    }

    if entries.is_empty() {
        bail!("no Python files matched; pass a .py file, a directory, or --glob");
    }

    dedup_by_path(&mut entries);
    Ok(entries)
}

pub fn is_python_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            PYTHON_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

pub fn file_entry(path: &Path) -> Result<FileEntry> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    Ok(FileEntry {
        path: path.to_path_buf(),
        metadata: FileMetadata {
            len: metadata.len(),
            is_probably_binary: detect_binary(path)?,
        },
    })
}

fn append_path(
    path: &Path,
    include_hidden: bool,
    exclude: Option<&GlobSet>,
    acc: &mut Vec<FileEntry>,
) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        return walk_directory(path, include_hidden, exclude, acc);
    }

    if metadata.is_file() && is_python_path(path) && !is_excluded(path, exclude) {
        acc.push(file_entry(path)?);
    }

    Ok(())
}

fn walk_directory(
    dir: &Path,
    include_hidden: bool,
    exclude: Option<&GlobSet>,
    acc: &mut Vec<FileEntry>,
) -> Result<()> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || include_hidden || !is_hidden(entry));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !is_python_path(&path) || is_excluded(&path, exclude) {
            continue;
        }
        acc.push(file_entry(&path)?);
    }

    Ok(())
}

fn is_excluded(path: &Path, exclude: Option<&GlobSet>) -> bool {
    exclude.is_some_and(|set| set.is_match(normalize_slashes(path).as_str()))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn normalize_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn dedup_by_path(entries: &mut Vec<FileEntry>) {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries.dedup_by(|a, b| a.path == b.path);
}

fn detect_binary(path: &Path) -> Result<bool> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("opening '{}' for binary detection", path.display()))?;
    let mut buf = [0u8; BINARY_CHECK_BYTES];
    let read = file.read(&mut buf)?;
    Ok(buf[..read].contains(&0))
}

fn build_exclude_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).map_err(|err| anyhow!("invalid exclude glob '{pattern}': {err}"))?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|err| anyhow!("unable to build exclude globs: {err}"))
}
