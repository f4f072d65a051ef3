//! Minimal Java `.properties` reader and bundle merge.
//!
//! Supports `#`/`!` comments, `=`/`:`/whitespace separators, backslash line
//! continuation and the usual escapes including `\uXXXX`. Keys keep the order
//! of their first definition; values take the last.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{io_err, SnapshotError};

pub type Properties = IndexMap<String, String>;

/// Parse properties text.
pub fn parse(text: &str) -> Properties {
    let mut props = Properties::new();
    for logical in logical_lines(text) {
        let (key, value) = split_pair(&logical);
        props.insert(unescape(key), unescape(value));
    }
    props
}

/// Merge the files of a bundle in order; later definitions override.
pub fn merge_bundle<P: AsRef<Path>>(paths: &[P]) -> Result<Properties, SnapshotError> {
    let mut merged = Properties::new();
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        merged.extend(parse(&text));
    }
    Ok(merged)
}

/// Render properties back to text, one `key=value` per line.
pub fn to_text(props: &Properties) -> String {
    let mut out = String::new();
    for (key, value) in props {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Join continuation lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_start();
        let joined = match current.take() {
            Some(mut prefix) => {
                prefix.push_str(line);
                prefix
            }
            None => {
                if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                    continue;
                }
                line.to_owned()
            }
        };

        if ends_with_continuation(&joined) {
            let mut trimmed = joined;
            trimmed.pop();
            current = Some(trimmed);
        } else {
            lines.push(joined);
        }
    }
    if let Some(rest) = current {
        lines.push(rest);
    }
    lines
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .map(str::trim_start)
                    .unwrap_or(rest);
                return (&line[..i], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut pending_high: Option<u16> = None;

    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_surrogate(&mut out, &mut pending_high);
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u16::from_str_radix(&hex, 16) {
                    Ok(unit) if (0xD800..0xDC00).contains(&unit) => {
                        flush_surrogate(&mut out, &mut pending_high);
                        pending_high = Some(unit);
                        continue;
                    }
                    Ok(unit) => {
                        if let Some(high) = pending_high.take() {
                            let decoded = char::decode_utf16([high, unit])
                                .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER));
                            out.extend(decoded);
                        } else {
                            out.push(char::from_u32(unit.into()).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        continue;
                    }
                    Err(_) => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
        flush_surrogate(&mut out, &mut pending_high);
    }
    flush_surrogate(&mut out, &mut pending_high);
    out
}

fn flush_surrogate(out: &mut String, pending: &mut Option<u16>) {
    if pending.take().is_some() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
