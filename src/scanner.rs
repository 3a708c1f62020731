//! Source scanner for JavaScript and TypeScript files using tree-sitter.
//!
//! Parses a file with the grammar for its dialect and walks the concrete
//! syntax tree, recording:
//! - Every template literal, split into raw segments and `${...}` slots
//! - The tag of a tagged template, when it is a bare identifier
//! - The statement-like ancestors of each literal, for indentation

use std::path::Path;

use tracing::trace;
use tree_sitter::{Language, Node, Parser};

use crate::error::{SqltplError, SqltplResult};
use crate::literal::{LineEnding, Literal, Slot};
use crate::tree::{NodeId, NodeKind, Position, SyntaxTree};

/// Grammar a source file is parsed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// JavaScript, JSX included.
    JavaScript,
    #[default]
    TypeScript,
    /// TypeScript with JSX.
    Tsx,
}

impl Dialect {
    /// Pick the dialect from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" | "jsx" | "mjs" | "cjs" => Some(Dialect::JavaScript),
            "ts" | "mts" | "cts" => Some(Dialect::TypeScript),
            "tsx" => Some(Dialect::Tsx),
            _ => None,
        }
    }

    fn language(self) -> Language {
        match self {
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Everything found in one source file.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub tree: SyntaxTree,
    /// Literals in order of their opening backtick.
    pub literals: Vec<Literal>,
    /// Line break style of the file.
    pub line_ending: LineEnding,
}

/// Scan TypeScript (or plain JavaScript) `source` for template literals.
pub fn scan(source: &str) -> SqltplResult<ScanResult> {
    scan_as(source, Dialect::default())
}

/// Scan `source` with the grammar of `dialect`.
///
/// Files with syntax errors are refused: a tree recovered from an error
/// can place literals under the wrong statement.
pub fn scan_as(source: &str, dialect: Dialect) -> SqltplResult<ScanResult> {
    let mut parser = Parser::new();
    parser
        .set_language(&dialect.language())
        .map_err(|e| SqltplError::Grammar(e.to_string()))?;
    let parsed = parser
        .parse(source, None)
        .ok_or_else(|| SqltplError::Grammar("parser returned no tree".to_string()))?;

    let root = parsed.root_node();
    if root.has_error() {
        return Err(syntax_error(source, root));
    }

    let mut visitor = LiteralVisitor::new(source);
    let program = visitor.tree.root();
    visitor.visit(root, program)?;

    let mut literals = visitor.literals;
    literals.sort_by_key(|l| l.span.start);
    trace!(?dialect, literals = literals.len(), nodes = visitor.tree.len(), "scanned source");
    Ok(ScanResult {
        tree: visitor.tree,
        literals,
        line_ending: visitor.line_ending,
    })
}

/// Syntax tree node kinds recorded in the [`SyntaxTree`].
fn node_kind(kind: &str) -> Option<NodeKind> {
    match kind {
        "expression_statement" => Some(NodeKind::ExpressionStatement),
        "lexical_declaration" | "variable_declaration" => Some(NodeKind::VariableDeclaration),
        "return_statement" => Some(NodeKind::ReturnStatement),
        "template_string" => Some(NodeKind::TemplateLiteral),
        "statement_block" | "class_body" | "switch_case" | "switch_default"
        | "method_definition" | "field_definition" | "public_field_definition" => {
            Some(NodeKind::Statement)
        }
        k if k.ends_with("_statement") || k.ends_with("_declaration") => Some(NodeKind::Statement),
        _ => None,
    }
}

/// Walks the concrete syntax tree collecting literals
struct LiteralVisitor<'s> {
    source: &'s str,
    tree: SyntaxTree,
    literals: Vec<Literal>,
    line_ending: LineEnding,
}

impl<'s> LiteralVisitor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            tree: SyntaxTree::new(),
            literals: Vec::new(),
            line_ending: LineEnding::detect(source),
        }
    }

    fn visit(&mut self, node: Node<'_>, parent: NodeId) -> SqltplResult<()> {
        let current = match node_kind(node.kind()) {
            Some(kind) => {
                let id = self.tree.push(kind, parent, position(self.source, node));
                if kind == NodeKind::TemplateLiteral {
                    self.literal(node, id)?;
                }
                id
            }
            None => parent,
        };

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, current)?;
        }
        Ok(())
    }

    /// Record the template literal at `node`.
    fn literal(&mut self, node: Node<'_>, id: NodeId) -> SqltplResult<()> {
        let (start, end) = (node.start_byte(), node.end_byte());
        let mut segments = Vec::new();
        let mut slots = Vec::new();
        let mut cursor = start + 1;

        let mut walker = node.walk();
        for child in node.named_children(&mut walker) {
            if child.kind() != "template_substitution" {
                continue;
            }
            // `${` ... `}`
            let expr = child.start_byte() + 2..child.end_byte() - 1;
            segments.push(self.line_ending.normalize(&self.source[cursor..child.start_byte()]));
            slots.push(Slot::new(&self.source[expr.clone()], expr));
            cursor = child.end_byte();
        }
        segments.push(self.line_ending.normalize(&self.source[cursor..end - 1]));

        let literal = Literal::new(id, tag(self.source, node), segments, slots, start..end)?
            .with_line_ending(self.line_ending);
        self.literals.push(literal);
        Ok(())
    }
}

/// The tag of the template at `node`: a bare identifier called with it.
fn tag(source: &str, node: Node<'_>) -> Option<String> {
    let call = node.parent().filter(|p| p.kind() == "call_expression")?;
    if call.child_by_field_name("arguments")?.id() != node.id() {
        return None;
    }
    let function = call
        .child_by_field_name("function")
        .filter(|f| f.kind() == "identifier")?;
    Some(source[function.byte_range()].to_string())
}

/// Start of `node`, with the column counted in characters.
fn position(source: &str, node: Node<'_>) -> Position {
    let offset = node.start_byte();
    let point = node.start_position();
    let line_start = offset - point.column;
    Position {
        line: point.row + 1,
        column: source[line_start..offset].chars().count(),
        offset,
    }
}

/// Error for the first error or missing node below `root`.
fn syntax_error(source: &str, root: Node<'_>) -> SqltplError {
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        if node.is_error() || node.is_missing() {
            let pos = position(source, node);
            let message = if node.is_missing() {
                format!("missing {}", node.kind())
            } else {
                "syntax error".to_string()
            };
            return SqltplError::scan(pos.line, pos.column, message);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        pending.extend(children.into_iter().rev());
    }
    SqltplError::scan(1, 0, "syntax error")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indentation(source: &str) -> Vec<usize> {
        let result = scan(source).unwrap();
        result
            .literals
            .iter()
            .map(|l| result.tree.resolve_indentation(l.node))
            .collect()
    }

    #[test]
    fn test_tagged_literal() {
        let result = scan("const q = sql`select ${a}, ${ b } from t`;").unwrap();
        assert_eq!(result.literals.len(), 1);
        let literal = &result.literals[0];
        assert_eq!(literal.tag.as_deref(), Some("sql"));
        assert_eq!(literal.segments(), &["select ", ", ", " from t"]);
        assert_eq!(literal.slots()[1].source, " b ");
        assert_eq!(literal.slots()[1].render(), "b");
        assert_eq!(literal.slots()[1].span, 29..32);
        assert_eq!(literal.span, 13..41);
    }

    #[test]
    fn test_member_and_keyword_tags() {
        let result = scan("db.sql`a`;\nfunction f() { return `b`; }").unwrap();
        assert_eq!(result.literals.len(), 2);
        assert!(result.literals.iter().all(|l| l.tag.is_none()));
    }

    #[test]
    fn test_variable_declaration_anchor() {
        let source = "function f() {\n    const q = sql`\n      select 1\n    `;\n}\n";
        assert_eq!(indentation(source), vec![6]);
    }

    #[test]
    fn test_return_anchor() {
        let source = "async function f() {\n  return sql`select 1`;\n}";
        assert_eq!(indentation(source), vec![4]);
    }

    #[test]
    fn test_return_type_annotation() {
        let source = "async function find(id: number): Promise<User[]> {\n  return sql`\n    select 1\n  `;\n}";
        assert_eq!(indentation(source), vec![4]);

        let source = "function one(): { id: number } {\n  return sql`select 1`;\n}";
        assert_eq!(indentation(source), vec![4]);
    }

    #[test]
    fn test_expression_statement_anchor() {
        assert_eq!(indentation("await pool.query(sql`select 1`)"), vec![2]);
    }

    #[test]
    fn test_export_const() {
        let result = scan("export const q = sql`select 1`;").unwrap();
        let literal = &result.literals[0];
        let decl = result.tree.parent(literal.node).unwrap();
        assert_eq!(result.tree.node(decl).kind, NodeKind::VariableDeclaration);
        let export = result.tree.parent(decl).unwrap();
        assert_eq!(result.tree.node(export).kind, NodeKind::Statement);
        assert_eq!(result.tree.resolve_indentation(literal.node), 9);
    }

    #[test]
    fn test_class_property_falls_back_to_literal_column() {
        let source = "class Repo {\n  query = sql`select 1`\n}";
        assert_eq!(indentation(source), vec![12]);
    }

    #[test]
    fn test_method_body() {
        let source = "class Repo {\n  private find(): string {\n    return sql`select 1`\n  }\n}";
        assert_eq!(indentation(source), vec![6]);
    }

    #[test]
    fn test_braceless_if_body() {
        let source = "function f() {\nif (ready)\n  run(sql`select 1`)\nelse\n  return sql`select 2`\n}";
        assert_eq!(indentation(source), vec![4, 4]);
    }

    #[test]
    fn test_if_header_is_not_an_anchor() {
        let source = "  if (sql`select 1`) {}";
        assert_eq!(indentation(source), vec![8]);
    }

    #[test]
    fn test_newline_ends_statement() {
        let source = "let a = 1\n    foo(sql`select 1`)";
        assert_eq!(indentation(source), vec![6]);
    }

    #[test]
    fn test_continued_expression_keeps_statement() {
        let source = "const q = db\n    .query(sql`select 1`)";
        assert_eq!(indentation(source), vec![2]);
    }

    #[test]
    fn test_arrow_function_body() {
        let source = "items.map((id: number) => {\n    return sql`select ${id}`\n})";
        assert_eq!(indentation(source), vec![6]);
    }

    #[test]
    fn test_object_literal() {
        let source = "const queries = {\n  users: sql`select 1`,\n}";
        assert_eq!(indentation(source), vec![2]);
    }

    #[test]
    fn test_nested_literal() {
        let source = "const q = sql`select ${cond ? sql`a` : sql`b`} from t`";
        let result = scan(source).unwrap();
        assert_eq!(result.literals.len(), 3);
        let outer = &result.literals[0];
        let inner = &result.literals[1];
        assert_eq!(outer.slots().len(), 1);
        assert_eq!(outer.slots()[0].source, "cond ? sql`a` : sql`b`");
        assert_eq!(result.tree.parent(inner.node), Some(outer.node));
        assert_eq!(result.tree.resolve_indentation(inner.node), 2);
    }

    #[test]
    fn test_switch_case() {
        let source = "switch (kind) {\n  case 'a':\n    foo(sql`select 1`)\n}";
        assert_eq!(indentation(source), vec![6]);
    }

    #[test]
    fn test_jsx_in_javascript() {
        let source = "const el = <div title={sql`select 1`} />;";
        let result = scan_as(source, Dialect::JavaScript).unwrap();
        assert_eq!(result.literals.len(), 1);
        assert_eq!(result.tree.resolve_indentation(result.literals[0].node), 2);
    }

    #[test]
    fn test_crlf_segments_are_normalized() {
        let result = scan("const q = sql`\r\n  select ${a}\r\n`;\r\n").unwrap();
        assert_eq!(result.line_ending, LineEnding::Crlf);
        let literal = &result.literals[0];
        assert_eq!(literal.segments(), &["\n  select ", "\n"]);
        assert_eq!(literal.line_ending, LineEnding::Crlf);
    }

    #[test]
    fn test_unterminated_template_is_an_error() {
        assert!(matches!(scan("const q = sql`select"), Err(SqltplError::Scan { .. })));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = scan("const a = 1;\nconst = sql`x`;").unwrap_err();
        assert!(matches!(err, SqltplError::Scan { line: 2, .. }), "{}", err);
    }

    #[test]
    fn test_comments_and_strings_hide_templates() {
        let source = "// sql`a`\nconst s = 'sql`b`' /* `c` */\nconst q = sql`d`";
        let result = scan(source).unwrap();
        assert_eq!(result.literals.len(), 1);
        assert_eq!(result.literals[0].segments(), &["d"]);
    }

    #[test]
    fn test_unbalanced_brace_is_an_error() {
        assert!(matches!(scan("}"), Err(SqltplError::Scan { .. })));
    }

    #[test]
    fn test_dialect_from_path() {
        assert_eq!(Dialect::from_path(Path::new("a/b.mjs")), Some(Dialect::JavaScript));
        assert_eq!(Dialect::from_path(Path::new("db.ts")), Some(Dialect::TypeScript));
        assert_eq!(Dialect::from_path(Path::new("App.tsx")), Some(Dialect::Tsx));
        assert_eq!(Dialect::from_path(Path::new("README.md")), None);
    }
}
