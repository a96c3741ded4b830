use std::io::{self, Write};

use similar::{DiffTag, TextDiff};

pub const DIFF_CONTEXT: usize = 3;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Unified diff of two full texts; empty when they are equal.
pub fn unified_diff(original: &str, modified: &str, left: &str, right: &str) -> String {
    if original == modified {
        return String::new();
    }
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(original, modified);
    diff.unified_diff()
        .context_radius(DIFF_CONTEXT)
        .header(left, right)
        .to_string()
}

/// Diff of one rewritten buffer, labeled the way previews are labeled.
pub fn preview_diff(original: &str, modified: &str, name: &str) -> String {
    unified_diff(
        original,
        modified,
        &format!("original:{name}"),
        &format!("fixed:{name}"),
    )
}

/// Number of lines touched by the line diff: each non-equal op counts the
/// larger of its old and new spans.
pub fn changed_lines(original: &str, modified: &str) -> usize {
    if original == modified {
        return 0;
    }
    let diff = TextDiff::from_lines(original, modified);
    diff.ops()
        .iter()
        .map(|op| {
            let (tag, old, new) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => 0,
                _ => old.len().max(new.len()),
            }
        })
        .sum()
}

/// `+added -removed` summary used in change-log entries.
pub fn summarize_lines(original: &str, modified: &str) -> String {
    let diff = TextDiff::from_lines(original, modified);
    let mut added = 0usize;
    let mut removed = 0usize;
    for op in diff.ops() {
        let (tag, old, new) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {}
            DiffTag::Delete => removed += old.len(),
            DiffTag::Insert => added += new.len(),
            DiffTag::Replace => {
                removed += old.len();
                added += new.len();
            }
        }
    }
    format!("+{added} -{removed}")
}

/// Patch that turns `modified` back into `original`.
pub fn undo_patch(original: &str, modified: &str) -> String {
    diffy::create_patch(modified, original).to_string()
}

/// Writes a unified diff, with ANSI colors when `colorize` is set.
pub fn write_diff<W: Write>(out: &mut W, diff_text: &str, colorize: bool) -> io::Result<()> {
    if !colorize {
        return out.write_all(diff_text.as_bytes());
    }
    for line in diff_text.split_inclusive('\n') {
        let color = if line.starts_with("---") || line.starts_with("+++") {
            BOLD
        } else if line.starts_with("@@") {
            CYAN
        } else if line.starts_with('-') {
            RED
        } else if line.starts_with('+') {
            GREEN
        } else {
            ""
        };
        if color.is_empty() {
            out.write_all(line.as_bytes())?;
        } else {
            let body = line.trim_end_matches('\n');
            write!(out, "{color}{body}{RESET}")?;
            if line.ends_with('\n') {
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_diff_uses_original_and_fixed_labels() {
        let diff = preview_diff("x=1\n", "x = 1\n", "demo.py");
        assert!(diff.starts_with("--- original:demo.py\n+++ fixed:demo.py\n"));
        assert!(diff.contains("@@ -1 +1 @@"));
        assert!(diff.contains("-x=1\n"));
        assert!(diff.contains("+x = 1\n"));
    }

    #[test]
    fn equal_texts_produce_no_diff() {
        assert!(unified_diff("a\n", "a\n", "l", "r").is_empty());
        assert_eq!(changed_lines("a\n", "a\n"), 0);
    }

    #[test]
    fn changed_lines_counts_replacements_and_insertions() {
        assert_eq!(changed_lines("a\nb\nc\n", "a\nB\nc\n"), 1);
        assert_eq!(changed_lines("a\nb\n", "a\n\n\nb\n"), 2);
        assert_eq!(changed_lines("a\nb\nc\n", "A\nB\n"), 3);
    }

    #[test]
    fn summary_counts_both_sides() {
        assert_eq!(summarize_lines("a\nb\n", "a\nc\nd\n"), "+2 -1");
    }

    #[test]
    fn undo_patch_restores_original() {
        let patch_text = undo_patch("x=1\n", "x = 1\n");
        let patch = diffy::Patch::from_str(&patch_text).expect("parse undo patch");
        let restored = diffy::apply("x = 1\n", &patch).expect("apply undo patch");
        assert_eq!(restored, "x=1\n");
    }

    #[test]
    fn colored_output_wraps_changed_lines() {
        let mut out = Vec::new();
        write_diff(&mut out, "-old\n+new\n same\n", true).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("\x1b[31m-old\x1b[0m\n"));
        assert!(text.contains("\x1b[32m+new\x1b[0m\n"));
        assert!(text.ends_with(" same\n"));
    }
}
