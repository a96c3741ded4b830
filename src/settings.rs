//! User settings, read from `pepgate.yaml`/`pepgate.json` or an explicit path.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::formatter::{BuiltinFormatter, CommandFormatter, DEFAULT_PROGRAM, Formatter};
use crate::options::{
    CodeList, DEFAULT_FILES_THRESHOLD, DEFAULT_SELECTION_THRESHOLD, PreviewThresholds,
};

pub const SETTINGS_CANDIDATES: &[&str] = &["pepgate.yaml", "pepgate.yml", "pepgate.json"];

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Codes {
    Joined(String),
    List(Vec<String>),
}

impl Codes {
    pub fn to_list(&self) -> CodeList {
        match self {
            Codes::Joined(raw) => CodeList::parse(raw),
            Codes::List(items) => CodeList::from_items(items),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FormatterSetting {
    Named(String),
    Command {
        command: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for FormatterSetting {
    fn default() -> Self {
        FormatterSetting::Named(DEFAULT_PROGRAM.to_string())
    }
}

impl FormatterSetting {
    pub fn build(&self) -> Box<dyn Formatter> {
        match self {
            FormatterSetting::Named(name) if name == "builtin" => Box::new(BuiltinFormatter),
            FormatterSetting::Named(name) => Box::new(CommandFormatter::new(name, Vec::new())),
            FormatterSetting::Command { command, args } => {
                Box::new(CommandFormatter::new(command, args.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ignore: Option<Codes>,
    pub select: Option<Codes>,
    pub format_on_save: bool,
    pub preview_threshold: usize,
    pub files_preview_threshold: usize,
    pub aggressive: u8,
    pub max_line_length: Option<usize>,
    pub formatter: FormatterSetting,
    pub default_encoding: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore: None,
            select: None,
            format_on_save: false,
            preview_threshold: DEFAULT_SELECTION_THRESHOLD,
            files_preview_threshold: DEFAULT_FILES_THRESHOLD,
            aggressive: 0,
            max_line_length: None,
            formatter: FormatterSetting::default(),
            default_encoding: None,
        }
    }
}

impl Settings {
    pub fn ignore_codes(&self) -> CodeList {
        self.ignore.as_ref().map(Codes::to_list).unwrap_or_default()
    }

    pub fn select_codes(&self) -> CodeList {
        self.select.as_ref().map(Codes::to_list).unwrap_or_default()
    }

    pub fn thresholds(&self) -> PreviewThresholds {
        PreviewThresholds {
            selection: self.preview_threshold,
            files: self.files_preview_threshold,
        }
    }
}

/// Loads `explicit` if given, otherwise the first settings file found in
/// `dir`, otherwise defaults. The returned path is the file actually read.
pub fn load_settings(explicit: Option<&Path>, dir: &Path) -> Result<(Settings, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((read_settings(path)?, Some(path.to_path_buf())));
    }
    for name in SETTINGS_CANDIDATES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            let settings = read_settings(&candidate)?;
            return Ok((settings, Some(candidate)));
        }
    }
    Ok((Settings::default(), None))
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    let data = fs::read(path).with_context(|| format!("reading settings {}", path.display()))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Settings::default());
    }
    let settings = if path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing settings {}", path.display()))?
    } else {
        serde_yaml::from_slice(&data)
            .with_context(|| format!("parsing settings {}", path.display()))?
    };
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn yaml_settings_with_joined_codes() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("pepgate.yaml");
        fs::write(
            &path,
            "ignore: E501, W6\nformat_on_save: true\nfiles_preview_threshold: 10\n",
        )
        .expect("write");
        let settings = read_settings(&path).expect("parse");
        assert_eq!(settings.ignore_codes(), CodeList::parse("E501,W6"));
        assert!(settings.select_codes().is_empty());
        assert!(settings.format_on_save);
        assert_eq!(
            settings.thresholds(),
            PreviewThresholds {
                selection: DEFAULT_SELECTION_THRESHOLD,
                files: 10
            }
        );
    }

    #[test]
    fn json_settings_with_list_and_command() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("custom.json");
        let raw = r#"{
            "select": ["E2", "W"],
            "formatter": {"command": "/opt/autopep8", "args": ["--experimental"]}
        }"#;
        fs::write(&path, raw).expect("write");
        let settings = read_settings(&path).expect("parse");
        assert_eq!(settings.select_codes(), CodeList::parse("E2,W"));
        assert_eq!(
            settings.formatter,
            FormatterSetting::Command {
                command: PathBuf::from("/opt/autopep8"),
                args: vec!["--experimental".into()],
            }
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("pepgate.yaml");
        fs::write(&path, "ignroe: E501\n").expect("write");
        assert!(read_settings(&path).is_err());
    }

    #[test]
    fn discovery_falls_back_to_defaults() {
        let temp = tempdir().expect("temp dir");
        let (settings, source) = load_settings(None, temp.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert!(source.is_none());

        fs::write(temp.path().join("pepgate.yml"), "formatter: builtin\n").expect("write");
        let (settings, source) = load_settings(None, temp.path()).expect("load");
        assert_eq!(settings.formatter, FormatterSetting::Named("builtin".into()));
        assert_eq!(source, Some(temp.path().join("pepgate.yml")));
        assert_eq!(settings.formatter.build().name(), "builtin");
    }
}
