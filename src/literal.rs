//! Template literal descriptors handed to the pipeline by the host.

use std::ops::Range;

use serde::Serialize;

use crate::error::{SqltplError, SqltplResult};
use crate::tree::NodeId;

/// Line break style of a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    /// Style of the first line break in `source`.
    pub fn detect(source: &str) -> Self {
        match source.find('\n') {
            Some(idx) if source[..idx].ends_with('\r') => LineEnding::Crlf,
            _ => LineEnding::Lf,
        }
    }

    /// Convert `text` to `\n` line breaks.
    pub fn normalize(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::Crlf => text.replace("\r\n", "\n"),
        }
    }

    /// Convert `\n` line breaks in `text` to this style.
    pub fn apply(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

/// One `${...}` expression inside a template literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    /// Expression source between `${` and `}`.
    pub source: String,
    /// Byte range of `source` in the file.
    pub span: Range<usize>,
}

impl Slot {
    pub fn new(source: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            source: source.into(),
            span,
        }
    }

    /// Source text of the expression, without surrounding whitespace.
    pub fn render(&self) -> &str {
        self.source.trim()
    }
}

/// A template literal: static segments interleaved with expression slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Literal {
    /// Node of the literal in the syntax tree.
    pub node: NodeId,
    /// Identifier the literal is tagged with, if any.
    pub tag: Option<String>,
    segments: Vec<String>,
    slots: Vec<Slot>,
    /// Byte range from the opening to the closing backtick, inclusive.
    pub span: Range<usize>,
    /// Line breaks the rewritten literal is written back with. Segments
    /// always use `\n`.
    pub line_ending: LineEnding,
}

impl Literal {
    /// Build a literal, checking that there is exactly one more segment
    /// than there are slots.
    pub fn new(
        node: NodeId,
        tag: Option<String>,
        segments: Vec<String>,
        slots: Vec<Slot>,
        span: Range<usize>,
    ) -> SqltplResult<Self> {
        if segments.len() != slots.len() + 1 {
            return Err(SqltplError::InvalidLiteral(format!(
                "{} segments for {} expressions",
                segments.len(),
                slots.len()
            )));
        }
        Ok(Self {
            node,
            tag,
            segments,
            slots,
            span,
            line_ending: LineEnding::Lf,
        })
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn has_expressions(&self) -> bool {
        !self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_invariant() {
        let ok = Literal::new(
            NodeId(1),
            None,
            vec!["select ".into(), " from t".into()],
            vec![Slot::new("col", 9..12)],
            0..20,
        );
        assert!(ok.is_ok());

        let err = Literal::new(NodeId(1), None, vec!["a".into()], vec![Slot::new("x", 0..1)], 0..5)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid literal: 1 segments for 1 expressions");
    }

    #[test]
    fn test_line_ending() {
        assert_eq!(LineEnding::detect("a\r\nb\n"), LineEnding::Crlf);
        assert_eq!(LineEnding::detect("a\nb\r\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a"), LineEnding::Lf);
        assert_eq!(LineEnding::Crlf.normalize("a\r\nb"), "a\nb");
        assert_eq!(LineEnding::Crlf.apply("a\nb"), "a\r\nb");
    }

    #[test]
    fn test_slot_render_trims() {
        assert_eq!(Slot::new("  user.id ", 0..10).render(), "user.id");
    }
}
