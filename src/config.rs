//! Run configuration.
//!
//! Resolved once before any literal is processed and read-only afterwards.
//! Loaded from `sqltpl.toml` (or the user config directory) and overridable
//! through the builder, which is what the CLI flags go through.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SqltplError, SqltplResult};
use crate::fmt::FormatterOptions;

/// Name of the project-local configuration file.
pub const CONFIG_FILE: &str = "sqltpl.toml";

/// Options controlling which literals are formatted and how the result is
/// re-anchored in the surrounding code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Skip literals that contain any `${...}` expression.
    pub ignore_expressions: bool,

    /// Skip literals without a line break.
    pub ignore_inline: bool,

    /// Skip literals that are not tagged with one of [`Config::tags`].
    pub ignore_tagless: bool,

    /// Restore a leading newline that the formatter dropped.
    pub ignore_start_with_new_line: bool,

    /// Re-indent formatted output to the enclosing statement.
    pub match_indentation: bool,

    /// Regex matching query placeholders, used by the query heuristic.
    pub placeholder_rule: Option<String>,

    /// Tag identifiers that mark a literal as SQL.
    pub tags: Vec<String>,

    /// Passed verbatim to the query formatter.
    pub formatter: FormatterOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignore_expressions: false,
            ignore_inline: true,
            ignore_tagless: true,
            ignore_start_with_new_line: true,
            match_indentation: true,
            placeholder_rule: None,
            tags: vec!["sql".to_string()],
            formatter: FormatterOptions::default(),
        }
    }
}

impl Config {
    /// Create a new configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Whether `tag` counts as an explicit SQL marker.
    pub fn is_marker(&self, tag: Option<&str>) -> bool {
        tag.is_some_and(|t| self.tags.iter().any(|m| m == t))
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> SqltplResult<Self> {
        toml::from_str(content).map_err(|e| SqltplError::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> SqltplResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SqltplError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Find the configuration for `dir`: `sqltpl.toml` there, then the user
    /// config directory, then defaults.
    pub fn discover(dir: &Path) -> SqltplResult<Self> {
        match Self::discover_path(dir) {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    fn discover_path(dir: &Path) -> Option<PathBuf> {
        let local = dir.join(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|d| d.join("sqltpl").join("config.toml"))
            .filter(|p| p.is_file())
    }
}

/// Builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn ignore_expressions(mut self, yes: bool) -> Self {
        self.config.ignore_expressions = yes;
        self
    }

    pub fn ignore_inline(mut self, yes: bool) -> Self {
        self.config.ignore_inline = yes;
        self
    }

    pub fn ignore_tagless(mut self, yes: bool) -> Self {
        self.config.ignore_tagless = yes;
        self
    }

    pub fn ignore_start_with_new_line(mut self, yes: bool) -> Self {
        self.config.ignore_start_with_new_line = yes;
        self
    }

    pub fn match_indentation(mut self, yes: bool) -> Self {
        self.config.match_indentation = yes;
        self
    }

    /// Set the placeholder regex
    pub fn placeholder_rule(mut self, rule: impl Into<String>) -> Self {
        self.config.placeholder_rule = Some(rule.into());
        self
    }

    /// Replace the marker tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the formatter options
    pub fn formatter(mut self, options: FormatterOptions) -> Self {
        self.config.formatter = options;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}
