//! Replacement patches for rewritten literals.

use std::ops::Range;

use serde::Serialize;

use crate::error::SqltplResult;
use crate::joiner;
use crate::literal::Literal;
use crate::tree::Position;

/// One proposed edit: replace `span` of the source with `replacement`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    pub span: Range<usize>,
    pub replacement: String,
    /// Where the literal starts, for reporting.
    pub start: Position,
}

/// Build the patch for a literal whose new content is `text` (sentinel
/// form, `\n` line breaks). The span runs from the opening to the closing
/// backtick; the tag is not part of it. Line breaks are written in the
/// literal's own style.
pub fn emit(literal: &Literal, start: Position, text: &str) -> SqltplResult<Patch> {
    let text = literal.line_ending.apply(text);
    let content = joiner::delinearize(&text, literal.slots())?;
    Ok(Patch {
        span: literal.span.clone(),
        replacement: format!("`{}`", content),
        start,
    })
}

/// Apply patches to `source`.
///
/// Patches overlapping one applied earlier (in source order) are left out;
/// their count is returned so the caller can run another pass.
pub fn apply_patches(source: &str, patches: &[Patch]) -> (String, usize) {
    let mut ordered: Vec<&Patch> = patches.iter().collect();
    ordered.sort_by_key(|p| (p.span.start, p.span.end));

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    let mut skipped = 0;

    for patch in ordered {
        if patch.span.start < cursor || patch.span.end > source.len() {
            skipped += 1;
            continue;
        }
        output.push_str(&source[cursor..patch.span.start]);
        output.push_str(&patch.replacement);
        cursor = patch.span.end;
    }
    output.push_str(&source[cursor..]);

    (output, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{LineEnding, Slot};
    use crate::tree::NodeId;

    fn patch(span: Range<usize>, replacement: &str) -> Patch {
        Patch {
            span,
            replacement: replacement.to_string(),
            start: Position::default(),
        }
    }

    #[test]
    fn test_emit_restores_slots() {
        let source = "q = sql`select ${ col } from t`";
        let literal = Literal::new(
            NodeId(2),
            Some("sql".into()),
            vec!["select ".into(), " from t".into()],
            vec![Slot::new(" col ", 17..22)],
            7..source.len(),
        )
        .unwrap();

        let patch = emit(&literal, Position::default(), "SELECT \"sqltpl_slot\" FROM t").unwrap();
        assert_eq!(patch.span, 7..source.len());
        assert_eq!(patch.replacement, "`SELECT ${col} FROM t`");
    }

    #[test]
    fn test_emit_writes_crlf() {
        let literal = Literal::new(
            NodeId(1),
            Some("sql".into()),
            vec!["\nselect ".into(), "\n".into()],
            vec![Slot::new("a\r\n.b", 10..16)],
            0..20,
        )
        .unwrap()
        .with_line_ending(LineEnding::Crlf);

        let patch = emit(&literal, Position::default(), "\nSELECT\n    \"sqltpl_slot\"\n").unwrap();
        assert_eq!(patch.replacement, "`\r\nSELECT\r\n    ${a\r\n.b}\r\n`");
    }

    #[test]
    fn test_emit_refuses_lost_slot() {
        let literal = Literal::new(
            NodeId(2),
            None,
            vec!["a".into(), "b".into()],
            vec![Slot::new("x", 0..1)],
            0..8,
        )
        .unwrap();
        assert!(emit(&literal, Position::default(), "ab").is_err());
    }

    #[test]
    fn test_apply_patches() {
        let source = "let a = `x`; let b = `y`;";
        let patches = vec![patch(21..24, "`Y`"), patch(8..11, "`X`")];
        let (output, skipped) = apply_patches(source, &patches);
        assert_eq!(output, "let a = `X`; let b = `Y`;");
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_apply_patches_skips_overlap() {
        let source = "`a ${`b`} c`";
        let patches = vec![patch(0..12, "`A ${`b`} C`"), patch(5..8, "`B`")];
        let (output, skipped) = apply_patches(source, &patches);
        assert_eq!(output, "`A ${`b`} C`");
        assert_eq!(skipped, 1);
    }
}
