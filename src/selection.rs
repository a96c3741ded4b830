use crate::error::SelectionError;
use crate::workflow::{AppliedRange, SourceRange, TextRange};

/// A requested span; `end == None` runs to the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: usize,
    pub end: Option<usize>,
}

pub fn parse_range_spec(raw: &str) -> Result<RangeSpec, SelectionError> {
    let invalid = || SelectionError::InvalidSpec(raw.to_string());
    let (start, end) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let start = start.trim().parse::<usize>().map_err(|_| invalid())?;
    let end = match end.trim() {
        "" => None,
        value => Some(value.parse::<usize>().map_err(|_| invalid())?),
    };
    if end.is_some_and(|end| end < start) {
        return Err(invalid());
    }
    Ok(RangeSpec { start, end })
}

/// Turns selection specs into ranges over `text`.
///
/// No selection, or a single empty one (a bare cursor), selects the whole
/// buffer.
pub fn resolve_selections(
    buffer: &str,
    text: &str,
    specs: &[RangeSpec],
) -> Result<Vec<SourceRange>, SelectionError> {
    let cursor_only = match specs {
        [] => true,
        [only] => only.end == Some(only.start),
        _ => false,
    };
    if cursor_only {
        return Ok(vec![SourceRange::whole(buffer, text)]);
    }

    let mut ranges = Vec::with_capacity(specs.len());
    for spec in specs {
        let end = spec.end.unwrap_or(text.len());
        check_bounds(text, spec.start, end)?;
        ranges.push(SourceRange::new(
            TextRange::new(buffer, spec.start, end),
            &text[spec.start..end],
        ));
    }
    let spans: Vec<&TextRange> = ranges.iter().map(|source| &source.range).collect();
    check_overlap(&spans)?;
    Ok(ranges)
}

/// Writes `applied` back into `text`, which must still be the buffer the
/// ranges were read from.
pub fn splice(
    buffer: &str,
    text: &str,
    applied: &[AppliedRange],
) -> Result<String, SelectionError> {
    let mut ordered: Vec<&AppliedRange> = applied.iter().collect();
    ordered.sort_by_key(|item| (item.range.start, item.range.end));

    for item in &ordered {
        let range = &item.range;
        if range.buffer != buffer {
            return Err(SelectionError::ForeignBuffer {
                expected: buffer.to_string(),
                found: range.buffer.clone(),
            });
        }
        check_bounds(text, range.start, range.end)?;
        if text[range.start..range.end] != item.original {
            return Err(SelectionError::Stale {
                start: range.start,
                end: range.end,
            });
        }
    }
    let spans: Vec<&TextRange> = ordered.iter().map(|item| &item.range).collect();
    check_overlap(&spans)?;

    let mut output = text.to_string();
    for item in ordered.iter().rev() {
        output.replace_range(item.range.start..item.range.end, &item.rewritten);
    }
    Ok(output)
}

fn check_bounds(text: &str, start: usize, end: usize) -> Result<(), SelectionError> {
    if start > end || end > text.len() {
        return Err(SelectionError::OutOfBounds {
            start,
            end,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(SelectionError::NotCharBoundary { start, end });
    }
    Ok(())
}

fn check_overlap(ranges: &[&TextRange]) -> Result<(), SelectionError> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| (range.start, range.end));
    for pair in sorted.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if second.start < first.end {
            return Err(SelectionError::Overlap {
                first: format!("{}:{}", first.start, first.end),
                second: format!("{}:{}", second.start, second.end),
            });
        }
    }
    Ok(())
}
