//! Non-semantic formatting content attached to tree nodes.
//!
//! The gaps between sibling tokens in the CST carry everything that makes a
//! config file look the way its author left it: blank lines, line breaks,
//! comments, separator commas. The builder classifies each gap into a
//! sequence of [`Trivia`] and attaches it as `before`/`after` on the nodes
//! either side, so the rebuild engine can put the gap back.

/// One piece of formatting content inside a token gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trivia {
    /// An empty line. Always preceded by a [`Trivia::LineBreak`] (the break
    /// that ended the previous line); each additional `BlankLine` adds one
    /// more empty line.
    BlankLine,
    /// A single line break.
    LineBreak,
    /// A separator comma (lambda pattern entries).
    Comma,
    /// A `# ...` comment running to end of line.
    LineComment {
        /// Full comment text including the leading `#`.
        text: String,
        /// Shares the start line with the preceding token.
        inline: bool,
        /// A `#!` interpreter line at the very start of the file.
        shebang: bool,
    },
    /// A `/* ... */` comment, possibly spanning lines.
    BlockComment {
        /// Comment text with the common interior indentation stripped.
        /// Interior lines are separated by `\n`.
        text: String,
        /// A `/** ... */` doc comment.
        doc: bool,
        /// Width stripped from interior lines, relative to the comment's
        /// start column, so rendering at a new indent keeps the gutter
        /// aligned.
        inner_indent: usize,
        /// Shares the start line with the preceding token.
        inline: bool,
    },
}

impl Trivia {
    /// True for comments; the rebuild engine forces multiline layout on
    /// containers whose members carry any of these.
    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            Trivia::LineComment { .. } | Trivia::BlockComment { .. }
        )
    }

    /// True for `LineBreak`/`BlankLine`.
    pub fn is_vertical(&self) -> bool {
        matches!(self, Trivia::LineBreak | Trivia::BlankLine)
    }
}

/// Classify a whitespace run by its newline count: zero newlines is an
/// inline gap (no trivia), one is a line break, `n >= 2` is a line break
/// followed by `n - 1` blank lines.
pub fn from_whitespace(ws: &str) -> Vec<Trivia> {
    let newlines = ws.bytes().filter(|&b| b == b'\n').count();
    match newlines {
        0 => Vec::new(),
        1 => vec![Trivia::LineBreak],
        n => {
            let mut out = Vec::with_capacity(n);
            out.push(Trivia::LineBreak);
            for _ in 1..n {
                out.push(Trivia::BlankLine);
            }
            out
        }
    }
}

/// Classify a comment lexeme.
///
/// `start_col` is the column the comment starts at in the original source,
/// used to record block comment gutters relative to their own indentation.
pub fn from_comment(text: &str, start_col: usize, at_file_start: bool, inline: bool) -> Trivia {
    if text.starts_with('#') {
        Trivia::LineComment {
            text: text.to_string(),
            inline,
            shebang: at_file_start && text.starts_with("#!"),
        }
    } else {
        let doc = text.starts_with("/**") && !text.starts_with("/**/");
        let (normalized, inner_indent) = normalize_block(text, start_col);
        Trivia::BlockComment {
            text: normalized,
            doc,
            inner_indent,
            inline,
        }
    }
}

/// Strip the minimum common leading indentation from the interior lines of
/// a block comment, recording the stripped width relative to `start_col`.
fn normalize_block(text: &str, start_col: usize) -> (String, usize) {
    let mut lines = text.split('\n');
    let first = match lines.next() {
        Some(first) => first,
        None => return (String::new(), 0),
    };
    let interior: Vec<&str> = lines.collect();
    if interior.is_empty() {
        return (text.to_string(), 0);
    }

    let min_indent = interior
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(text.len());
    out.push_str(first);
    for line in &interior {
        out.push('\n');
        if line.trim().is_empty() {
            continue;
        }
        out.push_str(&line[min_indent.min(line.len())..]);
    }
    (out, min_indent.saturating_sub(start_col))
}

/// True if any member of the slice is a comment.
pub fn contains_comment(trivia: &[Trivia]) -> bool {
    trivia.iter().any(Trivia::is_comment)
}

/// True if the slice contains a blank line.
pub fn contains_blank_line(trivia: &[Trivia]) -> bool {
    trivia.iter().any(|t| matches!(t, Trivia::BlankLine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_classification() {
        assert!(from_whitespace("   ").is_empty());
        assert_eq!(from_whitespace("\n  "), vec![Trivia::LineBreak]);
        assert_eq!(
            from_whitespace("\n\n"),
            vec![Trivia::LineBreak, Trivia::BlankLine]
        );
        assert_eq!(
            from_whitespace(" \n \n \n "),
            vec![Trivia::LineBreak, Trivia::BlankLine, Trivia::BlankLine]
        );
    }

    #[test]
    fn line_comment_classification() {
        let t = from_comment("# note", 2, false, true);
        assert_eq!(
            t,
            Trivia::LineComment {
                text: "# note".to_string(),
                inline: true,
                shebang: false,
            }
        );
    }

    #[test]
    fn shebang_only_at_file_start() {
        match from_comment("#!/usr/bin/env nix", 0, true, false) {
            Trivia::LineComment { shebang, .. } => assert!(shebang),
            other => panic!("unexpected trivia: {other:?}"),
        }
        match from_comment("#!not-a-shebang", 0, false, false) {
            Trivia::LineComment { shebang, .. } => assert!(!shebang),
            other => panic!("unexpected trivia: {other:?}"),
        }
    }

    #[test]
    fn block_comment_indent_normalization() {
        // Comment starting at column 2 with a gutter aligned at column 5.
        let t = from_comment("/* a\n     b\n     c */", 2, false, false);
        match t {
            Trivia::BlockComment {
                text,
                inner_indent,
                doc,
                inline,
            } => {
                assert_eq!(text, "/* a\nb\nc */");
                assert_eq!(inner_indent, 3);
                assert!(!doc);
                assert!(!inline);
            }
            other => panic!("unexpected trivia: {other:?}"),
        }
    }

    #[test]
    fn doc_block_comment() {
        match from_comment("/** doc */", 0, false, false) {
            Trivia::BlockComment { doc, .. } => assert!(doc),
            other => panic!("unexpected trivia: {other:?}"),
        }
    }
}
