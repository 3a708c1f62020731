//! The rewrite pipeline.
//!
//! [`Engine::process`] handles one literal: classify, linearize, format,
//! resolve indentation, plan and emit a patch. [`Engine::check`] and
//! [`Engine::fix`] run it over every literal of a source file.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::classifier::{Classification, QueryClassifier, QueryHeuristic, SkipReason, SqlParserHeuristic};
use crate::config::Config;
use crate::error::{SqltplError, SqltplResult};
use crate::fmt::{QueryFormatter, SqlFormatter};
use crate::joiner;
use crate::literal::Literal;
use crate::patch::{self, Patch};
use crate::planner::{self, RewriteDecision};
use crate::scanner::{self, Dialect, ScanResult};
use crate::tree::{Position, SyntaxTree};

/// Message attached to every rewrite proposal.
pub const FORMAT_MESSAGE: &str = "Format the query";

/// Upper bound on [`Engine::fix`] passes.
pub const MAX_FIX_PASSES: usize = 10;

/// What happened to one literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Skipped(SkipReason),
    Unchanged,
    Rewrite(Patch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    /// The literal would be reformatted.
    Rewrite,
    /// The literal could not be processed and was left alone.
    Error,
}

/// One reportable literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

impl Finding {
    fn rewrite(patch: Patch) -> Self {
        Self {
            kind: FindingKind::Rewrite,
            line: patch.start.line,
            column: patch.start.column,
            message: FORMAT_MESSAGE.to_string(),
            patch: Some(patch),
        }
    }

    fn error(start: Position, err: &SqltplError) -> Self {
        Self {
            kind: FindingKind::Error,
            line: start.line,
            column: start.column,
            message: err.to_string(),
            patch: None,
        }
    }
}

/// Findings for one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    /// Template literals seen, in scope or not.
    pub literals: usize,
    /// Literals left alone because they were out of scope.
    pub skipped: usize,
}

impl Report {
    pub fn patches(&self) -> impl Iterator<Item = &Patch> {
        self.findings.iter().filter_map(|f| f.patch.as_ref())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.kind == FindingKind::Error)
    }

    pub fn has_changes(&self) -> bool {
        self.patches().next().is_some()
    }
}

/// Result of [`Engine::fix`].
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutput {
    pub output: String,
    /// Passes that applied at least one patch.
    pub passes: usize,
    /// Per-literal errors from the final pass.
    pub errors: Vec<Finding>,
}

impl FixOutput {
    pub fn changed(&self) -> bool {
        self.passes > 0
    }
}

/// Formats the query literals of a source file.
pub struct Engine<F = SqlFormatter, H = SqlParserHeuristic> {
    config: Config,
    formatter: F,
    heuristic: H,
}

impl Engine {
    /// Engine with the built-in formatter and heuristic.
    pub fn new(config: Config) -> SqltplResult<Self> {
        let heuristic = SqlParserHeuristic::new(config.placeholder_rule.as_deref())?;
        Ok(Self::with_collaborators(config, SqlFormatter::new(), heuristic))
    }
}

impl<F: QueryFormatter, H: QueryHeuristic> Engine<F, H> {
    pub fn with_collaborators(config: Config, formatter: F, heuristic: H) -> Self {
        Self {
            config,
            formatter,
            heuristic,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the pipeline for one literal of `tree`.
    pub fn process(&self, tree: &SyntaxTree, literal: &Literal) -> SqltplResult<Outcome> {
        let classifier = QueryClassifier::new(&self.config, &self.heuristic);
        if let Classification::OutOfScope(reason) = classifier.classify(literal) {
            debug!(%reason, "literal out of scope");
            return Ok(Outcome::Skipped(reason));
        }

        let linearized = joiner::linearize(literal.segments())?;
        let formatted = self
            .formatter
            .format(&linearized.text, &self.config.formatter)?;
        trace!(%formatted, "formatter output");

        let indentation = tree.resolve_indentation(literal.node);
        match planner::plan(&linearized.text, &formatted, indentation, &self.config) {
            RewriteDecision::Unchanged => {
                debug!("literal already formatted");
                Ok(Outcome::Unchanged)
            }
            RewriteDecision::Replace(text) => {
                let start = tree.node(literal.node).start;
                let patch = patch::emit(literal, start, &text)?;
                debug!(line = start.line, column = start.column, "literal needs formatting");
                Ok(Outcome::Rewrite(patch))
            }
        }
    }

    /// Process every literal of a TypeScript (or plain JavaScript) source.
    pub fn check(&self, source: &str) -> SqltplResult<Report> {
        self.check_as(source, Dialect::default())
    }

    /// Process every literal of `source`, parsed as `dialect`.
    ///
    /// Failures scoped to one literal become [`FindingKind::Error`]
    /// findings; only scan failures fail the call.
    pub fn check_as(&self, source: &str, dialect: Dialect) -> SqltplResult<Report> {
        let ScanResult { tree, literals, .. } = scanner::scan_as(source, dialect)?;
        let mut report = Report {
            literals: literals.len(),
            ..Default::default()
        };

        for literal in &literals {
            let start = tree.node(literal.node).start;
            match self.process(&tree, literal) {
                Ok(Outcome::Rewrite(patch)) => report.findings.push(Finding::rewrite(patch)),
                Ok(Outcome::Skipped(_)) => report.skipped += 1,
                Ok(Outcome::Unchanged) => {}
                Err(err) if err.is_literal_scoped() => {
                    warn!(line = start.line, column = start.column, error = %err, "literal left untouched");
                    report.findings.push(Finding::error(start, &err));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }

    /// [`Engine::fix_as`] for a TypeScript (or plain JavaScript) source.
    pub fn fix(&self, source: &str) -> SqltplResult<FixOutput> {
        self.fix_as(source, Dialect::default())
    }

    /// Apply patches until the source is stable.
    ///
    /// A literal nested in another literal's expression overlaps the outer
    /// patch and is handled on a later pass. Literals still changing after
    /// [`MAX_FIX_PASSES`] are reported as errors.
    pub fn fix_as(&self, source: &str, dialect: Dialect) -> SqltplResult<FixOutput> {
        let mut output = source.to_string();
        let mut passes = 0;

        loop {
            let report = self.check_as(&output, dialect)?;
            let patches: Vec<Patch> = report.patches().cloned().collect();
            let mut errors: Vec<Finding> = report.errors().cloned().collect();
            if patches.is_empty() {
                return Ok(FixOutput {
                    output,
                    passes,
                    errors,
                });
            }
            if passes == MAX_FIX_PASSES {
                let err = SqltplError::NotConverged { passes };
                for patch in &patches {
                    warn!(line = patch.start.line, column = patch.start.column, "literal keeps changing");
                    errors.push(Finding::error(patch.start, &err));
                }
                errors.sort_by_key(|f| (f.line, f.column));
                return Ok(FixOutput {
                    output,
                    passes,
                    errors,
                });
            }

            let (next, skipped) = patch::apply_patches(&output, &patches);
            if next == output {
                return Ok(FixOutput {
                    output,
                    passes,
                    errors,
                });
            }
            passes += 1;
            debug!(pass = passes, applied = patches.len() - skipped, skipped, "applied patches");
            output = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt::{FormatError, FormatterOptions};
    use crate::literal::Slot;
    use crate::tree::{NodeId, NodeKind};
    use pretty_assertions::assert_eq;

    fn engine(config: Config) -> Engine {
        Engine::new(config).unwrap()
    }

    fn never(_: &str) -> bool {
        false
    }

    fn fixed(source: &str) -> String {
        engine(Config::default()).fix(source).unwrap().output
    }

    #[test]
    fn test_formats_tagged_literal() {
        let source = "const q = sql`\n  select  *\n  from t\n`;\n";
        assert_eq!(
            fixed(source),
            "const q = sql`\n  SELECT\n      *\n  FROM\n      t\n`;\n"
        );
    }

    #[test]
    fn test_idempotent() {
        let source = "function f() {\n    return sql`\n      select a, b\n      from t where id = ${id}\n    `;\n}\n";
        let once = fixed(source);
        let engine = engine(Config::default());
        let report = engine.check(&once).unwrap();
        assert!(!report.has_changes(), "{:?}", report);
        assert_eq!(engine.fix(&once).unwrap().passes, 0);
    }

    #[test]
    fn test_expressions_preserved_in_order() {
        let source = "const q = sql`\nselect ${ columns } from ${table}\nwhere a = ${ user.id } and b = ${fn(1, 2)}\n`;";
        let output = fixed(source);
        let positions: Vec<usize> = ["${columns}", "${table}", "${user.id}", "${fn(1, 2)}"]
            .iter()
            .map(|e| output.find(e).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", output);
        assert_eq!(output.matches("${").count(), 4);
    }

    #[test]
    fn test_sentinel_in_literal_is_left_alone() {
        let source = "const q = sql`\nselect \"sqltpl_slot\", ${a} from t\n`;";
        let engine = engine(Config::default());
        let report = engine.check(source).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, FindingKind::Error);
        assert_eq!(engine.fix(source).unwrap().output, source);
    }

    #[test]
    fn test_indentation_follows_statement_column() {
        let source = "    const q = sql`\nselect 1\n`;";
        let output = fixed(source);
        assert_eq!(output, "    const q = sql`\n      SELECT\n          1\n    `;");
    }

    #[test]
    fn test_leading_newline_kept() {
        let formatter = |text: &str, _: &FormatterOptions| Ok::<_, FormatError>(text.trim().to_string());
        let config = Config::builder().match_indentation(false).build();
        let engine = Engine::with_collaborators(config, formatter, never);
        let report = engine.check("x = sql`\nselect  1\n`").unwrap();
        let patch = report.patches().next().unwrap();
        assert_eq!(patch.replacement, "`\nselect  1`");
    }

    #[test]
    fn test_replace_scenario() {
        let formatter = |_: &str, _: &FormatterOptions| Ok::<_, FormatError>("select *\nfrom t".to_string());
        let engine = Engine::with_collaborators(Config::default(), formatter, never);

        let mut tree = SyntaxTree::new();
        let node = tree.push(NodeKind::TemplateLiteral, tree.root(), Position::default());
        let literal = Literal::new(node, Some("sql".into()), vec!["select  *\nfrom t".into()], vec![], 0..18).unwrap();

        let outcome = engine.process(&tree, &literal).unwrap();
        let Outcome::Rewrite(patch) = outcome else {
            panic!("expected a rewrite, got {:?}", outcome);
        };
        assert_eq!(patch.replacement, "`select *\nfrom t`");
        assert_eq!(patch.span, 0..18);
    }

    #[test]
    fn test_tagless_scenario() {
        let formatter = |_: &str, _: &FormatterOptions| Ok::<_, FormatError>("SELECT 1".to_string());
        let engine = Engine::with_collaborators(Config::default(), formatter, |_: &str| true);
        let mut tree = SyntaxTree::new();
        let node = tree.push(NodeKind::TemplateLiteral, tree.root(), Position::default());
        let literal = Literal::new(node, None, vec!["hello world".into()], vec![], 0..13).unwrap();
        assert_eq!(
            engine.process(&tree, &literal).unwrap(),
            Outcome::Skipped(SkipReason::Tagless)
        );
    }

    #[test]
    fn test_single_slot_scenario() {
        let config = Config::builder().ignore_inline(false).match_indentation(false).build();
        let engine = engine(config);
        let source = "q = sql`select ${colName} from t`";
        let output = engine.fix(source).unwrap().output;
        assert_eq!(output, "q = sql`SELECT\n    ${colName}\nFROM\n    t\n`");
    }

    #[test]
    fn test_formatter_error_is_a_finding() {
        let formatter = |_: &str, _: &FormatterOptions| Err::<String, _>(FormatError::new(3, "boom"));
        let engine = Engine::with_collaborators(Config::default(), formatter, never);
        let report = engine.check("a = sql`\nselect 1\n`\nb = sql`\nselect 2\n`").unwrap();
        assert_eq!(report.errors().count(), 2);
        assert_eq!(report.findings[1].line, 4);
        assert_eq!(report.findings[1].message, "Format error at offset 3: boom");
    }

    #[test]
    fn test_dropped_sentinel_is_a_finding() {
        let formatter = |_: &str, _: &FormatterOptions| Ok::<_, FormatError>("SELECT 1".to_string());
        let engine = Engine::with_collaborators(Config::default(), formatter, never);
        let mut tree = SyntaxTree::new();
        let node = tree.push(NodeKind::TemplateLiteral, tree.root(), Position::default());
        let literal = Literal::new(
            node,
            Some("sql".into()),
            vec!["select ".into(), "\nfrom t".into()],
            vec![Slot::new("a", 0..1)],
            0..20,
        )
        .unwrap();
        assert!(matches!(
            engine.process(&tree, &literal),
            Err(SqltplError::SentinelCountMismatch {
                expected: 1,
                found: 0
            })
        ));
    }

    #[test]
    fn test_nested_literals_fixed_over_passes() {
        let source = "const q = sql`\nselect * from t\nwhere ${cond ? sql`\na = 1\n` : sql`\nb = 2\n`}\n`;";
        let engine = engine(Config::default());
        let result = engine.fix(source).unwrap();
        assert_eq!(result.passes, 2);
        assert!(result.output.contains("sql`\n  a = 1\n`"), "{}", result.output);
        assert!(!engine.check(&result.output).unwrap().has_changes());
    }

    #[test]
    fn test_multiline_comment_and_string_settle() {
        let engine = engine(Config::default());
        let sources = [
            "sql`\n  select /* a\n  b */ 1\n`",
            "sql`\n  select 'a\nb' as x\n`",
            "function f() {\n  return sql`\n    select $$one\n  two$$, tags[1] from t\n  `;\n}\n",
        ];
        for source in sources {
            let once = engine.fix(source).unwrap();
            assert_eq!(once.passes, 1, "{}", once.output);
            assert!(once.errors.is_empty(), "{:?}", once.errors);
            let again = engine.fix(&once.output).unwrap();
            assert_eq!(again.passes, 0, "{}", again.output);
        }
    }

    #[test]
    fn test_multiline_string_content_preserved() {
        let output = fixed("sql`\n  select 'a\nb' as x\n`");
        assert_eq!(output, "sql`\n  SELECT\n      'a\nb' AS x\n`");
    }

    #[test]
    fn test_unsettled_literal_is_reported() {
        let formatter = |text: &str, _: &FormatterOptions| Ok::<_, FormatError>(format!("{} x", text));
        let engine = Engine::with_collaborators(Config::default(), formatter, never);
        let result = engine.fix("q = sql`\nselect 1\n`").unwrap();
        assert_eq!(result.passes, MAX_FIX_PASSES);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 1);
        assert_eq!(
            result.errors[0].message,
            "Literal did not settle after 10 formatting passes"
        );
    }

    #[test]
    fn test_crlf_source() {
        let source = "const q = sql`\r\n  select 1\r\n`;\r\n";
        let engine = engine(Config::default());
        let result = engine.fix(source).unwrap();
        assert_eq!(result.output, "const q = sql`\r\n  SELECT\r\n      1\r\n`;\r\n");
        assert_eq!(engine.fix(&result.output).unwrap().passes, 0);
    }

    #[test]
    fn test_javascript_dialect() {
        let source = "const el = <p>{sql`\nselect 1\n`}</p>;\n";
        let result = engine(Config::default()).fix_as(source, Dialect::JavaScript).unwrap();
        assert_eq!(result.output, "const el = <p>{sql`\n  SELECT\n      1\n`}</p>;\n");
    }

    #[test]
    fn test_scan_error_fails_check() {
        let engine = engine(Config::default());
        assert!(matches!(engine.check("sql`oops"), Err(SqltplError::Scan { .. })));
    }

    #[test]
    fn test_skipped_literals_counted() {
        let report = engine(Config::default()).check("a = `x`; b = sql`y`").unwrap();
        assert_eq!(report.literals, 2);
        assert_eq!(report.skipped, 2);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_literal_node_follows_its_statement() {
        let result = scanner::scan("const q = sql`\nselect 1\n`").unwrap();
        assert_eq!(result.literals[0].node, NodeId(2));
    }
}
