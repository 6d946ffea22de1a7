//! Error-type matchers deciding between commit and rollback.

use crate::errors::{ErrorType, FlowError};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone)]
enum Pattern {
    /// `db.connection`
    Exact(String),
    /// `db.*`, `*timeout`
    Glob(Regex),
    /// `db.error+`: the type or any subtype
    Hierarchy(String),
}

impl Pattern {
    fn parse(raw: &str) -> Result<Self, FlowError> {
        if let Some(base) = raw.strip_suffix('+') {
            let base = base.trim();
            if base.is_empty() || base.contains('*') {
                return Err(FlowError::configuration(format!(
                    "invalid hierarchy pattern '{raw}'"
                )));
            }
            return Ok(Self::Hierarchy(base.to_string()));
        }
        if raw.contains('*') {
            let escaped: Vec<String> = raw.split('*').map(regex::escape).collect();
            let regex = Regex::new(&format!("^{}$", escaped.join(".*")))
                .map_err(|e| FlowError::configuration(format!("invalid pattern '{raw}': {e}")))?;
            return Ok(Self::Glob(regex));
        }
        Ok(Self::Exact(raw.to_string()))
    }

    fn matches(&self, error_type: &ErrorType) -> bool {
        match self {
            Self::Exact(name) => error_type.name() == name,
            Self::Glob(regex) => regex.is_match(error_type.name()),
            Self::Hierarchy(name) => error_type.is_a(name),
        }
    }
}

/// Matches error types against a comma separated list of patterns.
///
/// Supported forms: an exact name, a glob where `*` matches any run of
/// characters, and `name+` matching `name` and every type descending from
/// it. The filter matches when any pattern matches.
#[derive(Debug, Clone)]
pub struct ExceptionFilter {
    source: String,
    patterns: Vec<Pattern>,
}

impl ExceptionFilter {
    /// Parses a filter expression.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty expression or an invalid pattern.
    pub fn new(expression: &str) -> Result<Self, FlowError> {
        let patterns = expression
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Pattern::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(FlowError::configuration(
                "exception filter must contain at least one pattern",
            ));
        }
        Ok(Self {
            source: expression.to_string(),
            patterns,
        })
    }

    /// Returns true if any pattern matches `error_type`.
    #[must_use]
    pub fn matches(&self, error_type: &ErrorType) -> bool {
        self.patterns.iter().any(|p| p.matches(error_type))
    }

    /// Returns the expression the filter was parsed from.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for ExceptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Rollback and commit filters of an execution template.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilters {
    /// Errors that force a rollback.
    pub rollback: Option<ExceptionFilter>,
    /// Errors that still allow a commit.
    pub commit: Option<ExceptionFilter>,
}

impl TransactionFilters {
    /// No filters: every failure rolls back.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses optional rollback and commit expressions.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either expression is invalid.
    pub fn from_expressions(
        rollback: Option<&str>,
        commit: Option<&str>,
    ) -> Result<Self, FlowError> {
        Ok(Self {
            rollback: rollback.map(ExceptionFilter::new).transpose()?,
            commit: commit.map(ExceptionFilter::new).transpose()?,
        })
    }

    /// Sets the rollback filter.
    #[must_use]
    pub fn with_rollback(mut self, filter: ExceptionFilter) -> Self {
        self.rollback = Some(filter);
        self
    }

    /// Sets the commit filter.
    #[must_use]
    pub fn with_commit(mut self, filter: ExceptionFilter) -> Self {
        self.commit = Some(filter);
        self
    }

    /// Decides whether a failure of `error_type` rolls back.
    ///
    /// Rollback wins when both filters match.
    #[must_use]
    pub fn should_rollback(&self, error_type: &ErrorType) -> bool {
        match (&self.rollback, &self.commit) {
            (None, None) => true,
            (Some(rollback), None) => rollback.matches(error_type),
            (None, Some(commit)) => !commit.matches(error_type),
            (Some(rollback), Some(commit)) => {
                rollback.matches(error_type) || !commit.matches(error_type)
            }
        }
    }
}
