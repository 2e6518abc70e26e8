//! NPath: dotted textual addresses into an attribute-set tree.
//!
//! Grammar: an optional run of leading `@` (scope-layer targeting by
//! depth), then dot-separated segments. A segment is either a bare
//! identifier (`[A-Za-z_][A-Za-z0-9_']*`) or a double-quoted string with
//! `\n \r \t \" \\` escapes, so names containing dots stay addressable:
//! `foo."bar.baz"`.

use std::fmt;

use crate::EditError;

/// One path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// Written quoted in the path text.
    pub quoted: bool,
}

/// A parsed NPath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NPath {
    /// Number of leading `@`: zero targets the value tree, `n > 0` targets
    /// the n-th scope layer met while unwrapping the edit target.
    pub depth: usize,
    pub segments: Vec<Segment>,
}

impl NPath {
    pub fn parse(input: &str) -> Result<NPath, EditError> {
        let mut chars = input.char_indices().peekable();
        let mut depth = 0;
        while let Some((_, '@')) = chars.peek() {
            chars.next();
            depth += 1;
        }

        let mut segments = Vec::new();
        loop {
            match chars.peek() {
                Some((_, '"')) => {
                    chars.next();
                    segments.push(Segment {
                        name: parse_quoted(&mut chars, input)?,
                        quoted: true,
                    });
                }
                Some(&(start, c)) if is_bare_start(c) => {
                    let mut end = start + c.len_utf8();
                    chars.next();
                    while let Some(&(i, c)) = chars.peek() {
                        if is_bare_continue(c) {
                            chars.next();
                            end = i + c.len_utf8();
                        } else {
                            break;
                        }
                    }
                    segments.push(Segment {
                        name: input[start..end].to_string(),
                        quoted: false,
                    });
                }
                Some(&(i, c)) => {
                    return Err(EditError::InvalidNPath(format!(
                        "unexpected character `{}` at offset {}",
                        c, i
                    )));
                }
                None => {
                    return Err(EditError::InvalidNPath("empty path segment".into()));
                }
            }

            match chars.next() {
                Some((_, '.')) => continue,
                Some((i, c)) => {
                    return Err(EditError::InvalidNPath(format!(
                        "expected `.` but found `{}` at offset {}",
                        c, i
                    )));
                }
                None => break,
            }
        }

        if segments.is_empty() {
            return Err(EditError::InvalidNPath("path has no segments".into()));
        }
        Ok(NPath { depth, segments })
    }
}

fn parse_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    input: &str,
) -> Result<String, EditError> {
    let mut name = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(name),
            Some((i, '\\')) => match chars.next() {
                Some((_, 'n')) => name.push('\n'),
                Some((_, 'r')) => name.push('\r'),
                Some((_, 't')) => name.push('\t'),
                Some((_, '"')) => name.push('"'),
                Some((_, '\\')) => name.push('\\'),
                Some((_, other)) => {
                    return Err(EditError::InvalidNPath(format!(
                        "unknown escape `\\{}` at offset {}",
                        other, i
                    )));
                }
                None => {
                    return Err(EditError::InvalidNPath("unterminated escape".into()));
                }
            },
            Some((_, c)) => name.push(c),
            None => {
                return Err(EditError::InvalidNPath(format!(
                    "unterminated quoted segment in `{}`",
                    input
                )));
            }
        }
    }
}

fn is_bare_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_bare_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '\''
}

/// True when `name` needs no quoting as a path segment.
pub fn is_bare_segment(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_bare_start(c) => {}
        _ => return false,
    }
    chars.all(is_bare_continue)
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.quoted && is_bare_segment(&self.name) {
            return f.write_str(&self.name);
        }
        f.write_str("\"")?;
        for c in self.name.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{}", c)?,
            }
        }
        f.write_str("\"")
    }
}

impl fmt::Display for NPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            f.write_str("@")?;
        }
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}
