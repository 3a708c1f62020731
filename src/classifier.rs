//! Deciding whether a template literal holds a query worth formatting.

use regex::Regex;
use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::config::Config;
use crate::error::{SqltplError, SqltplResult};
use crate::joiner;
use crate::literal::Literal;

/// Guesses whether untagged text is a query.
///
/// Answers `false` whenever it cannot tell.
pub trait QueryHeuristic {
    fn looks_like_query(&self, text: &str) -> bool;
}

impl<F> QueryHeuristic for F
where
    F: Fn(&str) -> bool,
{
    fn looks_like_query(&self, text: &str) -> bool {
        self(text)
    }
}

/// Text is a query when it parses as SQL.
///
/// Slot sentinels are quoted identifiers and parse as values. Anything the
/// placeholder rule matches is replaced by an identifier first, so
/// driver-specific placeholders do not make the parse fail.
#[derive(Debug, Clone, Default)]
pub struct SqlParserHeuristic {
    placeholder: Option<Regex>,
}

impl SqlParserHeuristic {
    pub fn new(placeholder_rule: Option<&str>) -> SqltplResult<Self> {
        let placeholder = placeholder_rule
            .map(Regex::new)
            .transpose()
            .map_err(|e| SqltplError::Config(format!("invalid placeholder_rule: {}", e)))?;
        Ok(Self { placeholder })
    }
}

impl QueryHeuristic for SqlParserHeuristic {
    fn looks_like_query(&self, text: &str) -> bool {
        let text = match &self.placeholder {
            Some(rule) => rule.replace_all(text, "placeholder"),
            None => text.into(),
        };
        if text.trim().is_empty() {
            return false;
        }
        matches!(
            Parser::parse_sql(&PostgreSqlDialect {}, &text),
            Ok(statements) if !statements.is_empty()
        )
    }
}

/// Why a literal was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// No marker tag while tagless literals are ignored.
    Tagless,
    /// Has expressions while expressions are ignored.
    HasExpressions,
    /// Untagged and the heuristic does not see a query.
    NotQuery,
    /// Single line while inline literals are ignored.
    Inline,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::Tagless => "no sql tag",
            SkipReason::HasExpressions => "contains expressions",
            SkipReason::NotQuery => "does not look like a query",
            SkipReason::Inline => "single line",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    InScope,
    OutOfScope(SkipReason),
}

impl Classification {
    pub fn is_in_scope(self) -> bool {
        self == Classification::InScope
    }
}

/// Gates literals on configuration and shape.
pub struct QueryClassifier<'c, H> {
    config: &'c Config,
    heuristic: &'c H,
}

impl<'c, H: QueryHeuristic> QueryClassifier<'c, H> {
    pub fn new(config: &'c Config, heuristic: &'c H) -> Self {
        Self { config, heuristic }
    }

    pub fn classify(&self, literal: &Literal) -> Classification {
        let marked = self.config.is_marker(literal.tag.as_deref());

        if self.config.ignore_tagless && !marked {
            return Classification::OutOfScope(SkipReason::Tagless);
        }

        if self.config.ignore_expressions && literal.has_expressions() {
            return Classification::OutOfScope(SkipReason::HasExpressions);
        }

        let text = joiner::join(literal.segments());

        if !marked && !self.heuristic.looks_like_query(&text) {
            return Classification::OutOfScope(SkipReason::NotQuery);
        }

        if self.config.ignore_inline && !text.contains('\n') {
            return Classification::OutOfScope(SkipReason::Inline);
        }

        Classification::InScope
    }
}
