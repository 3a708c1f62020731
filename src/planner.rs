//! Composing the final literal text from formatter output.

use crate::config::Config;
use crate::fmt::verbatim_lines;

/// Result of planning one literal.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteDecision {
    /// Formatting would not change the literal.
    Unchanged,
    /// New literal content, still in sentinel form.
    Replace(String),
}

/// Indent every line of `text` by `spaces` columns.
///
/// The first line is left alone, blank interior lines stay empty, and a
/// blank last line gets two columns less so the closing backtick sits at
/// the statement's own indentation. Lines continuing a multi-line string
/// are copied as they are.
pub fn reindent(text: &str, spaces: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let verbatim = verbatim_lines(text);
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 || verbatim.get(idx).copied().unwrap_or(false) {
                line.to_string()
            } else if idx == last && line.is_empty() {
                " ".repeat(spaces.saturating_sub(2))
            } else if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", " ".repeat(spaces), line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decide how the literal `original` should read after formatting.
///
/// Both texts are in sentinel form, so the comparison ignores how the
/// expressions are spelled in source.
pub fn plan(original: &str, formatted: &str, indentation: usize, config: &Config) -> RewriteDecision {
    let mut candidate = formatted.to_string();

    if config.ignore_start_with_new_line
        && original.starts_with('\n')
        && !candidate.starts_with('\n')
    {
        candidate.insert(0, '\n');
    }

    if config.match_indentation && indentation > 0 {
        candidate = reindent(&candidate, indentation);
    }

    if candidate == original {
        RewriteDecision::Unchanged
    } else {
        RewriteDecision::Replace(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reindent() {
        assert_eq!(
            reindent("\nSELECT\n    *\n\nFROM\n    t\n", 6),
            "\n      SELECT\n          *\n\n      FROM\n          t\n    "
        );
    }

    #[test]
    fn test_reindent_keeps_first_line() {
        assert_eq!(reindent("SELECT\n    1", 2), "SELECT\n      1");
    }

    #[test]
    fn test_reindent_skips_string_continuation() {
        assert_eq!(
            reindent("\nSELECT\n    'a\nb' AS x,\n    \"multi\n  line\"\n", 2),
            "\n  SELECT\n      'a\nb' AS x,\n      \"multi\n  line\"\n"
        );
    }

    #[test]
    fn test_reindent_untokenizable_text() {
        assert_eq!(reindent("a 'b\nc", 2), "a 'b\n  c");
    }

    #[test]
    fn test_reindent_small_indentation() {
        assert_eq!(reindent("a\nb\n", 1), "a\n b\n");
    }

    #[test]
    fn test_plan_replace_when_different() {
        let config = Config::builder().match_indentation(false).build();
        assert_eq!(
            plan("select  *\nfrom t", "select *\nfrom t", 0, &config),
            RewriteDecision::Replace("select *\nfrom t".to_string())
        );
    }

    #[test]
    fn test_plan_unchanged_when_equal() {
        let config = Config::default();
        let original = "\n  SELECT\n      *\n  FROM\n      t\n";
        let formatted = "SELECT\n    *\nFROM\n    t\n";
        assert_eq!(plan(original, formatted, 2, &config), RewriteDecision::Unchanged);
    }

    #[test]
    fn test_plan_restores_leading_newline() {
        let config = Config::builder().match_indentation(false).build();
        assert_eq!(
            plan("\nselect 1", "SELECT 1", 0, &config),
            RewriteDecision::Replace("\nSELECT 1".to_string())
        );

        let config = Config::builder()
            .match_indentation(false)
            .ignore_start_with_new_line(false)
            .build();
        assert_eq!(
            plan("\nselect 1", "SELECT 1", 0, &config),
            RewriteDecision::Replace("SELECT 1".to_string())
        );
    }

    #[test]
    fn test_plan_zero_indentation_is_not_applied() {
        let config = Config::default();
        assert_eq!(
            plan("x", "SELECT\n    1\n", 0, &config),
            RewriteDecision::Replace("SELECT\n    1\n".to_string())
        );
    }
}
