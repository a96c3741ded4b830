use crate::options::CodeFilter;

pub const TRAILING_WHITESPACE: &str = "W291";
pub const NO_NEWLINE_AT_EOF: &str = "W292";
pub const WHITESPACE_ON_BLANK_LINE: &str = "W293";
pub const BLANK_LINE_AT_EOF: &str = "W391";

/// Fixes the whitespace rules enabled by `filter`; line endings are preserved.
/// Returns `None` when nothing needed fixing.
pub fn fix_whitespace(text: &str, filter: &CodeFilter<'_>) -> Option<String> {
    let fix_trailing = filter.is_enabled(TRAILING_WHITESPACE);
    let fix_blank = filter.is_enabled(WHITESPACE_ON_BLANK_LINE);
    let fix_eol = filter.is_enabled(NO_NEWLINE_AT_EOF);
    let fix_blank_eof = filter.is_enabled(BLANK_LINE_AT_EOF);

    let mut lines: Vec<(String, &str)> = Vec::new();

    for chunk in text.split_inclusive('\n') {
        let (body, ending) = split_ending(chunk);
        let trailing = count_trailing_ws(body);
        let mut line = body.to_string();
        if trailing > 0 {
            let blank = trailing == body.chars().count();
            if (blank && fix_blank) || (!blank && fix_trailing) {
                let trimmed_len = body.trim_end_matches([' ', '\t', '\x0c']).len();
                line.truncate(trimmed_len);
            }
        }
        lines.push((line, ending));
    }

    let trailing_blank = lines
        .iter()
        .rev()
        .take_while(|(line, _)| line.trim().is_empty())
        .count();
    if fix_blank_eof && trailing_blank > 0 && trailing_blank < lines.len() {
        lines.truncate(lines.len() - trailing_blank);
    }

    let missing_newline = lines
        .last()
        .is_some_and(|(line, ending)| ending.is_empty() && !line.is_empty());
    if fix_eol && missing_newline {
        let newline = dominant_ending(&lines);
        if let Some(last) = lines.last_mut() {
            last.1 = newline;
        }
    }

    let mut cleaned = String::with_capacity(text.len());
    for (line, ending) in &lines {
        cleaned.push_str(line);
        cleaned.push_str(ending);
    }

    (cleaned != text).then_some(cleaned)
}

fn split_ending(chunk: &str) -> (&str, &str) {
    if let Some(body) = chunk.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = chunk.strip_suffix('\n') {
        (body, "\n")
    } else {
        (chunk, "")
    }
}

fn dominant_ending(lines: &[(String, &str)]) -> &'static str {
    let crlf = lines.iter().filter(|(_, ending)| *ending == "\r\n").count();
    let lf = lines.iter().filter(|(_, ending)| *ending == "\n").count();
    if crlf > lf { "\r\n" } else { "\n" }
}

fn count_trailing_ws(line: &str) -> usize {
    line.chars()
        .rev()
        .take_while(|c| matches!(c, ' ' | '\t' | '\x0c'))
        .count()
}
