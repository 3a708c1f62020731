//! # sqltpl — SQL formatting for template literals
//!
//! Finds SQL queries embedded in JavaScript / TypeScript template literals
//! (located with tree-sitter) and rewrites them in a consistent layout, re-indented to the statement
//! that holds them. Interpolated expressions survive untouched.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqltpl::prelude::*;
//!
//! let source = "const q = sql`\n  select id from users\n`;";
//! let fixed = sqltpl::fix(source, Config::default())?;
//! // const q = sql`
//! //   SELECT
//! //       id
//! //   FROM
//! //       users
//! // `;
//! ```
//!
//! ## Pipeline
//!
//! | Step | Module | Function |
//! |------|--------|----------|
//! | scan | [`scanner`] | parse the host file, collect literals and statements |
//! | classify | [`classifier`] | skip untagged, inline or non-query literals |
//! | linearize | [`joiner`] | join segments around a slot sentinel |
//! | format | [`fmt`] | lay out the query |
//! | indent | [`tree`] | find the enclosing statement's column |
//! | plan | [`planner`] | re-indent, detect no-ops |
//! | emit | [`patch`] | restore expressions, build the edit |

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod fmt;
pub mod joiner;
pub mod literal;
pub mod patch;
pub mod planner;
pub mod scanner;
pub mod tree;

pub mod prelude {
    pub use crate::classifier::{Classification, QueryHeuristic, SkipReason, SqlParserHeuristic};
    pub use crate::config::Config;
    pub use crate::engine::{Engine, Finding, FindingKind, FixOutput, Outcome, Report};
    pub use crate::error::{SqltplError, SqltplResult};
    pub use crate::fmt::{FormatError, FormatterOptions, KeywordCase, QueryFormatter, SqlFormatter};
    pub use crate::literal::{LineEnding, Literal, Slot};
    pub use crate::patch::Patch;
    pub use crate::scanner::Dialect;
    pub use crate::tree::{NodeId, NodeKind, Position, SyntaxTree};
}

use config::Config;
use engine::{Engine, Report};
use error::SqltplResult;

/// Report the literals of `source` that would be reformatted.
pub fn check(source: &str, config: Config) -> SqltplResult<Report> {
    Engine::new(config)?.check(source)
}

/// Reformat every query literal of `source`.
pub fn fix(source: &str, config: Config) -> SqltplResult<String> {
    Ok(Engine::new(config)?.fix(source)?.output)
}
