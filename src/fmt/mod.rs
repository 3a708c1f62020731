//! Query formatting.
//!
//! [`QueryFormatter`] is the seam the rewrite pipeline formats through.
//! [`SqlFormatter`] is the built-in implementation: clause keywords start
//! their own line and clause bodies are indented one level below them.
//! Slot sentinels are quoted identifiers, so they pass through untouched.

mod token;


use serde::{Deserialize, Serialize};
use thiserror::Error;

use token::{Spanned, Token};

pub use token::tokenize;

/// Lines of `text` that begin inside a string literal or quoted identifier.
///
/// Their leading whitespace belongs to the query's data, so re-indenting
/// must leave them alone. Text that does not tokenize has none.
pub fn verbatim_lines(text: &str) -> Vec<bool> {
    let mut verbatim = vec![false; text.split('\n').count()];
    let Ok(tokens) = tokenize(text) else {
        return verbatim;
    };
    for Spanned { token, offset } in tokens {
        if let Token::Str(s) | Token::QuotedIdent(s) = token {
            let first = text[..offset].matches('\n').count();
            let breaks = s.matches('\n').count();
            verbatim[first + 1..=first + breaks].fill(true);
        }
    }
    verbatim
}

/// The formatter rejected the query text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Format error at offset {offset}: {message}")]
pub struct FormatError {
    pub offset: usize,
    pub message: String,
}

impl FormatError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Letter case applied to keywords or function names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCase {
    #[default]
    Unchanged,
    Lower,
    Upper,
    Capitalize,
}

impl KeywordCase {
    pub fn apply(self, word: &str) -> String {
        match self {
            KeywordCase::Unchanged => word.to_string(),
            KeywordCase::Lower => word.to_lowercase(),
            KeywordCase::Upper => word.to_uppercase(),
            KeywordCase::Capitalize => {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            }
        }
    }
}

/// Options handed to the formatter unchanged from the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    /// Spaces per indentation level.
    pub spaces: usize,
    /// Indent with tabs instead of spaces.
    pub tabs: bool,
    pub keyword_case: KeywordCase,
    pub function_case: KeywordCase,
    /// Drop `--` and `/* */` comments.
    pub strip_comments: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            spaces: 4,
            tabs: false,
            keyword_case: KeywordCase::Upper,
            function_case: KeywordCase::Unchanged,
            strip_comments: false,
        }
    }
}

/// Formats query text.
///
/// Implementations must keep every `"sqltpl_slot"` quoted identifier in
/// place: no duplication, no removal, no reordering.
pub trait QueryFormatter {
    fn format(&self, query: &str, options: &FormatterOptions) -> Result<String, FormatError>;
}

impl<F> QueryFormatter for F
where
    F: Fn(&str, &FormatterOptions) -> Result<String, FormatError>,
{
    fn format(&self, query: &str, options: &FormatterOptions) -> Result<String, FormatError> {
        self(query, options)
    }
}

/// Built-in SQL pretty-printer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlFormatter;

impl SqlFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl QueryFormatter for SqlFormatter {
    fn format(&self, query: &str, options: &FormatterOptions) -> Result<String, FormatError> {
        let tokens = tokenize(query)?;
        if tokens.is_empty() {
            return Ok(String::new());
        }
        let output = Layout::new(&tokens, options).run()?;
        tracing::trace!("Formatted query:\n{}", output);
        Ok(output)
    }
}

const KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CONFLICT", "CREATE", "CROSS",
    "DEFAULT", "DELETE", "DESC", "DISTINCT", "DO", "DROP", "ELSE", "END", "EXCEPT", "EXISTS",
    "FALSE", "FROM", "FULL", "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT",
    "INTO", "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOT", "NOTHING",
    "NULL", "NULLS", "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "RECURSIVE",
    "RETURNING", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TRUE", "UNION", "UPDATE", "USING",
    "VALUES", "WHEN", "WHERE", "WINDOW", "WITH",
];

const JOIN_MODIFIERS: &[&str] = &["LEFT", "RIGHT", "FULL", "INNER", "CROSS", "NATURAL", "OUTER"];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// How the body of the current clause is laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Clause {
    None,
    /// Comma separated items, one per line.
    List,
    /// Conditions, one `AND` / `OR` per line.
    Condition,
    /// Body continues on the keyword's line.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClauseLayout {
    Body(Clause),
    Inline,
    Join,
    SetOperation,
}

#[derive(Debug)]
struct Frame {
    /// Parenthesised subquery (or the top level): clause keywords break lines.
    subquery: bool,
    /// Opened by `[` rather than `(`.
    bracket: bool,
    level: usize,
    open_level: usize,
    open_offset: usize,
    clause: Clause,
}

/// Line buffer with per-line indentation levels.
struct Writer<'o> {
    options: &'o FormatterOptions,
    lines: Vec<String>,
    current: String,
    level: usize,
    glue: bool,
}

impl<'o> Writer<'o> {
    fn new(options: &'o FormatterOptions) -> Self {
        Self {
            options,
            lines: Vec::new(),
            current: String::new(),
            level: 0,
            glue: false,
        }
    }

    fn indent(&self, level: usize) -> String {
        if self.options.tabs {
            "\t".repeat(level)
        } else {
            " ".repeat(level * self.options.spaces)
        }
    }

    fn newline(&mut self, level: usize) {
        if !self.current.is_empty() {
            let line = format!("{}{}", self.indent(self.level), self.current);
            self.lines.push(line);
            self.current.clear();
        }
        self.level = level;
        self.glue = false;
    }

    fn write(&mut self, text: &str, space: bool) {
        if space && !self.glue && !self.current.is_empty() {
            self.current.push(' ');
        }
        self.current.push_str(text);
        self.glue = false;
    }

    fn finish(mut self) -> String {
        let level = self.level;
        self.newline(level);
        let mut output = self.lines.join("\n");
        output.push('\n');
        output
    }
}

struct Layout<'a, 'o> {
    tokens: &'a [Spanned<'a>],
    options: &'o FormatterOptions,
    writer: Writer<'o>,
    frames: Vec<Frame>,
    between_pending: bool,
}

impl<'a, 'o> Layout<'a, 'o> {
    fn new(tokens: &'a [Spanned<'a>], options: &'o FormatterOptions) -> Self {
        Self {
            tokens,
            options,
            writer: Writer::new(options),
            frames: vec![Frame {
                subquery: true,
                bracket: false,
                level: 0,
                open_level: 0,
                open_offset: 0,
                clause: Clause::None,
            }],
            between_pending: false,
        }
    }

    fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn token(&self, idx: usize) -> Option<Token<'a>> {
        self.tokens.get(idx).map(|s| s.token)
    }

    fn run(mut self) -> Result<String, FormatError> {
        let mut idx = 0;
        while idx < self.tokens.len() {
            idx += self.step(idx)?;
        }
        if self.frames.len() > 1 {
            let top = self.top();
            let message = if top.bracket { "unclosed bracket" } else { "unclosed parenthesis" };
            return Err(FormatError::new(top.open_offset, message));
        }
        Ok(self.writer.finish())
    }

    /// Lay out the token at `idx`; returns how many tokens were consumed.
    fn step(&mut self, idx: usize) -> Result<usize, FormatError> {
        let Spanned { token, offset } = self.tokens[idx];
        let prev = if idx > 0 { self.token(idx - 1) } else { None };

        match token {
            Token::Word(word) => return Ok(self.word(idx, word)),
            Token::Comma => {
                self.writer.write(",", false);
                if self.top().subquery && self.top().clause == Clause::List {
                    let level = self.top().level + 1;
                    self.writer.newline(level);
                }
            }
            Token::OpenParen => self.open_paren(idx, offset),
            Token::CloseParen => self.close_paren(offset)?,
            Token::OpenBracket => self.open_bracket(offset),
            Token::CloseBracket => self.close_bracket(offset)?,
            Token::Semicolon => {
                self.writer.write(";", false);
                if idx + 1 < self.tokens.len() {
                    self.writer.newline(0);
                    self.top_mut().clause = Clause::None;
                }
            }
            Token::Dot => {
                self.writer.write(".", false);
                self.writer.glue = true;
            }
            Token::Operator(op) => {
                let unary = (op == "-" || op == "+") && is_operand_boundary(prev);
                if op == "::" {
                    self.writer.write(op, false);
                    self.writer.glue = true;
                } else {
                    self.writer.write(op, true);
                    self.writer.glue = unary;
                }
            }
            Token::LineComment(text) => {
                if !self.options.strip_comments {
                    self.writer.write(text.trim_end(), true);
                    let level = self.writer.level;
                    self.writer.newline(level);
                }
            }
            Token::BlockComment(text) => {
                if !self.options.strip_comments {
                    let text = self.rebase_comment(text);
                    self.writer.write(&text, true);
                }
            }
            Token::QuotedIdent(text) | Token::Str(text) | Token::Number(text) | Token::Param(text) => {
                self.writer.write(text, true);
            }
        }
        Ok(1)
    }

    fn word(&mut self, idx: usize, word: &str) -> usize {
        if self.top().subquery
            && let Some((words, layout)) = self.match_clause(idx)
        {
            let text = self.tokens[idx..idx + words]
                .iter()
                .map(|s| self.options.keyword_case.apply(s.token.text()))
                .collect::<Vec<_>>()
                .join(" ");
            self.clause(&text, layout);
            return words;
        }

        let upper = word.to_ascii_uppercase();
        if upper == "BETWEEN" {
            self.between_pending = true;
        }

        if (upper == "AND" || upper == "OR")
            && self.top().subquery
            && self.top().clause == Clause::Condition
        {
            if upper == "AND" && self.between_pending {
                self.between_pending = false;
            } else {
                let level = self.top().level + 1;
                self.writer.newline(level);
            }
        }

        let text = if is_keyword(word) {
            self.options.keyword_case.apply(word)
        } else if self.is_call(idx + 1) {
            self.options.function_case.apply(word)
        } else {
            word.to_string()
        };
        self.writer.write(&text, true);
        1
    }

    fn clause(&mut self, text: &str, layout: ClauseLayout) {
        let base = self.top().level;
        self.between_pending = false;
        match layout {
            ClauseLayout::Body(clause) => {
                self.writer.newline(base);
                self.writer.write(text, true);
                self.writer.newline(base + 1);
                self.top_mut().clause = clause;
            }
            ClauseLayout::Inline => {
                self.writer.newline(base);
                self.writer.write(text, true);
                self.top_mut().clause = Clause::Inline;
            }
            ClauseLayout::Join => {
                self.writer.newline(base + 1);
                self.writer.write(text, true);
            }
            ClauseLayout::SetOperation => {
                self.writer.newline(base);
                self.writer.write(text, true);
                self.writer.newline(base);
                self.top_mut().clause = Clause::None;
            }
        }
    }

    /// Recognise a (possibly multi-word) clause keyword at `idx`.
    fn match_clause(&self, idx: usize) -> Option<(usize, ClauseLayout)> {
        let word_at = |i: usize| match self.token(i) {
            Some(Token::Word(w)) => Some(w.to_ascii_uppercase()),
            _ => None,
        };
        let first = word_at(idx)?;
        let second = word_at(idx + 1);
        let second = second.as_deref();

        let layout = match (first.as_str(), second) {
            ("GROUP", Some("BY")) | ("ORDER", Some("BY")) => {
                return Some((2, ClauseLayout::Body(Clause::List)));
            }
            ("INSERT", Some("INTO")) | ("DELETE", Some("FROM")) | ("ON", Some("CONFLICT")) => {
                return Some((2, ClauseLayout::Inline));
            }
            ("UNION", Some("ALL")) | ("UNION", Some("DISTINCT")) => {
                return Some((2, ClauseLayout::SetOperation));
            }
            ("SELECT", _) | ("FROM", _) | ("SET", _) | ("RETURNING", _) | ("VALUES", _) => {
                ClauseLayout::Body(Clause::List)
            }
            ("WHERE", _) | ("HAVING", _) => ClauseLayout::Body(Clause::Condition),
            ("LIMIT", _) | ("OFFSET", _) | ("UPDATE", _) | ("WITH", _) | ("WINDOW", _) => {
                ClauseLayout::Inline
            }
            ("UNION", _) | ("INTERSECT", _) | ("EXCEPT", _) => ClauseLayout::SetOperation,
            ("JOIN", _) => ClauseLayout::Join,
            (modifier, _) if JOIN_MODIFIERS.contains(&modifier) => {
                let mut end = idx + 1;
                while let Some(next) = word_at(end) {
                    if next == "JOIN" {
                        return Some((end - idx + 1, ClauseLayout::Join));
                    }
                    if !JOIN_MODIFIERS.contains(&next.as_str()) {
                        break;
                    }
                    end += 1;
                }
                return None;
            }
            _ => return None,
        };
        Some((1, layout))
    }

    /// Whether the parenthesis at `paren` opens a function call's arguments.
    fn is_call(&self, paren: usize) -> bool {
        if !matches!(self.token(paren), Some(Token::OpenParen)) || paren == 0 {
            return false;
        }
        let callee = matches!(self.token(paren - 1), Some(Token::Word(w)) if !is_keyword(w));
        // `INSERT INTO users (id, name)` names columns, it is not a call
        let after_into = paren >= 2
            && matches!(self.token(paren - 2), Some(t) if t.is_word("INTO") || t.is_word("TABLE"));
        callee && !after_into
    }

    fn open_paren(&mut self, idx: usize, offset: usize) {
        let call = self.is_call(idx);
        self.writer.write("(", !call);
        self.writer.glue = true;

        let subquery = matches!(
            self.token(idx + 1),
            Some(t) if t.is_word("SELECT") || t.is_word("WITH")
        );
        let open_level = self.writer.level;
        self.frames.push(Frame {
            subquery,
            bracket: false,
            level: open_level + 1,
            open_level,
            open_offset: offset,
            clause: Clause::None,
        });
    }

    fn close_paren(&mut self, offset: usize) -> Result<(), FormatError> {
        if self.frames.len() == 1 || self.top().bracket {
            return Err(FormatError::new(offset, "unbalanced closing parenthesis"));
        }
        if let Some(frame) = self.frames.pop()
            && frame.subquery
        {
            self.writer.newline(frame.open_level);
        }
        self.writer.write(")", false);
        Ok(())
    }

    /// `tags[1]`, `ARRAY[1, 2]`: glued to the operand before it.
    fn open_bracket(&mut self, offset: usize) {
        self.writer.write("[", false);
        self.writer.glue = true;
        let open_level = self.writer.level;
        self.frames.push(Frame {
            subquery: false,
            bracket: true,
            level: open_level + 1,
            open_level,
            open_offset: offset,
            clause: Clause::None,
        });
    }

    fn close_bracket(&mut self, offset: usize) -> Result<(), FormatError> {
        if !self.top().bracket {
            return Err(FormatError::new(offset, "unbalanced closing bracket"));
        }
        self.frames.pop();
        self.writer.write("]", false);
        Ok(())
    }

    /// Continuation lines of a block comment, re-based on the current line's
    /// indentation so that re-indenting the output is stable.
    fn rebase_comment(&self, text: &str) -> String {
        let prefix = format!("{} ", self.writer.indent(self.writer.level));
        let mut lines = text.split('\n');
        let mut output = lines.next().unwrap_or_default().to_string();
        for line in lines {
            output.push('\n');
            let line = line.trim();
            if !line.is_empty() {
                output.push_str(&prefix);
                output.push_str(line);
            }
        }
        output
    }
}

/// Whether a sign after `prev` is unary.
fn is_operand_boundary(prev: Option<Token<'_>>) -> bool {
    match prev {
        None => true,
        Some(Token::Operator(_) | Token::OpenParen | Token::OpenBracket | Token::Comma) => true,
        Some(Token::Word(w)) => is_keyword(w),
        _ => false,
    }
}
