//! Query evaluation against library records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::Model;

/// How a single `field:term` part is matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Substring,
    Regexp,
    Numeric,
    Boolean,
    Path,
}

/// Inclusive numeric range written as `N`, `N..M`, `N..` or `..M`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl NumericRange {
    pub fn parse(term: &str) -> Option<Self> {
        let term = term.trim();
        match term.split_once("..") {
            Some((low, high)) => {
                let low = parse_bound(low)?;
                let high = parse_bound(high)?;
                if low.is_none() && high.is_none() {
                    return None;
                }
                Some(Self { low, high })
            }
            None => {
                let value = term.parse::<f64>().ok()?;
                Some(Self {
                    low: Some(value),
                    high: Some(value),
                })
            }
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low.is_none_or(|low| value >= low) && self.high.is_none_or(|high| value <= high)
    }
}

/// `Some(None)` for an empty bound, `None` for an unparsable one.
fn parse_bound(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    raw.parse::<f64>().ok().map(Some)
}

/// Interpret a human-written boolean.
pub fn str2bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on" | "t"
    )
}

#[derive(Clone, Debug)]
pub enum Query {
    True,
    /// Case-insensitive substring; `pattern` is stored lowercased.
    Substring { field: String, pattern: String },
    Regexp { field: String, regex: Regex },
    /// `range` is `None` when the term was not numeric; such a query matches nothing.
    Numeric {
        field: String,
        range: Option<NumericRange>,
    },
    Boolean { field: String, value: bool },
    /// The item at `path`, or every item below it when it names a directory.
    Path { path: PathBuf },
    /// Matches when any of the per-field queries matches.
    AnyField(Vec<Query>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Build the query for one field and term.
    pub fn field(kind: QueryKind, field: &str, term: &str) -> Result<Self> {
        let field = field.to_string();
        let query = match kind {
            QueryKind::Substring => Query::Substring {
                field,
                pattern: term.to_lowercase(),
            },
            QueryKind::Regexp => Query::Regexp {
                field,
                regex: Regex::new(term).with_context(|| format!("invalid regex {term:?}"))?,
            },
            QueryKind::Numeric => Query::Numeric {
                field,
                range: NumericRange::parse(term),
            },
            QueryKind::Boolean => Query::Boolean {
                field,
                value: str2bool(term),
            },
            QueryKind::Path => Query::Path {
                path: normalize_path(Path::new(term)),
            },
        };
        Ok(query)
    }

    pub fn matches(&self, model: &dyn Model) -> bool {
        match self {
            Query::True => true,
            Query::Substring { field, pattern } => model.get(field).is_some()
                && model.formatted(field).to_lowercase().contains(pattern.as_str()),
            Query::Regexp { field, regex } => {
                model.get(field).is_some() && regex.is_match(&model.formatted(field))
            }
            Query::Numeric { field, range } => {
                let Some(range) = range else {
                    return false;
                };
                model
                    .get(field)
                    .and_then(|value| value.as_f64())
                    .is_some_and(|value| range.contains(value))
            }
            Query::Boolean { field, value } => match model.get(field) {
                Some(crate::Value::Boolean(v)) => v == *value,
                Some(other) => other.as_f64().is_some_and(|v| (v != 0.0) == *value),
                None => false,
            },
            Query::Path { path } => match model.get("path") {
                Some(crate::Value::Text(item_path)) => {
                    normalize_path(Path::new(&item_path)).starts_with(path)
                }
                _ => false,
            },
            Query::AnyField(queries) | Query::Or(queries) => {
                queries.iter().any(|q| q.matches(model))
            }
            Query::And(queries) => queries.iter().all(|q| q.matches(model)),
            Query::Not(query) => !query.matches(model),
        }
    }
}

/// Drop trailing separators and `.` components so prefix checks compare whole components.
fn normalize_path(path: &Path) -> PathBuf {
    path.components().collect()
}
