//! Arena-indexed syntax tree of the constructs enclosing each literal.
//!
//! Only what indentation resolution needs is recorded: the statement-like
//! ancestors of a literal (and outer literals, for templates nested inside
//! `${...}`), each with its starting position and a parent index.

use serde::Serialize;

/// Index of a node in a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Program,
    ExpressionStatement,
    VariableDeclaration,
    ReturnStatement,
    /// Any other statement (`if`, `for`, `function`, `export`, blocks ...).
    Statement,
    TemplateLiteral,
}

impl NodeKind {
    /// Statements whose column anchors the indentation of nested queries.
    pub fn anchors_indentation(self) -> bool {
        matches!(
            self,
            NodeKind::ExpressionStatement | NodeKind::VariableDeclaration | NodeKind::ReturnStatement
        )
    }
}

/// Start of a node in the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    /// 1-based line.
    pub line: usize,
    /// 0-based column, in characters.
    pub column: usize,
    /// Byte offset.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub start: Position,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
}

impl Default for SyntaxTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxTree {
    /// Create a tree holding only the program root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Program,
                parent: None,
                start: Position {
                    line: 1,
                    column: 0,
                    offset: 0,
                },
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a node below `parent`.
    ///
    /// # Panics
    ///
    /// If `parent` does not belong to this tree.
    pub fn push(&mut self, kind: NodeKind, parent: NodeId, start: Position) -> NodeId {
        assert!(parent.0 < self.nodes.len(), "parent {:?} out of range", parent);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            start,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over the ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Column at which the content of the literal at `id` is re-aligned.
    ///
    /// The nearest expression statement, variable declaration or return
    /// statement gives its own column plus two. Without one, the literal's
    /// column minus one is used.
    pub fn resolve_indentation(&self, id: NodeId) -> usize {
        self.ancestors(id)
            .map(|ancestor| self.node(ancestor))
            .find(|node| node.kind.anchors_indentation())
            .map(|node| node.start.column + 2)
            .unwrap_or_else(|| self.node(id).start.column.saturating_sub(1))
    }
}

/// Iterator returned by [`SyntaxTree::ancestors`].
///
/// Parents always have a smaller index than their children, so the walk is
/// bounded by the number of nodes.
pub struct Ancestors<'t> {
    tree: &'t SyntaxTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}
