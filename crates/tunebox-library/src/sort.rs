//! Ordering of query results.

use std::cmp::Ordering;

use crate::model::{Model, Value};

/// Order by a single field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSort {
    pub field: String,
    pub ascending: bool,
    /// Compare text values ignoring case.
    pub case_insensitive: bool,
}

impl FieldSort {
    pub fn new(field: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
            case_insensitive: true,
        }
    }

    fn compare(&self, a: &dyn Model, b: &dyn Model) -> Ordering {
        let ord = compare_values(
            a.get(&self.field).unwrap_or(Value::Null),
            b.get(&self.field).unwrap_or(Value::Null),
            self.case_insensitive,
        );
        if self.ascending { ord } else { ord.reverse() }
    }
}

fn compare_values(a: Value, b: Value, case_insensitive: bool) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Text(a), Value::Text(b)) => {
            if case_insensitive {
                a.to_lowercase().cmp(&b.to_lowercase())
            } else {
                a.cmp(&b)
            }
        }
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(&b),
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Lexicographic combination of field sorts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    criteria: Vec<FieldSort>,
}

impl Sort {
    pub fn new(criteria: Vec<FieldSort>) -> Self {
        Self { criteria }
    }

    /// Parse a sort string such as `"artist+ album+ disc+ track+"`.
    ///
    /// A field without a `+`/`-` suffix sorts ascending.
    pub fn parse(spec: &str) -> Self {
        let criteria = spec
            .split_whitespace()
            .map(|token| {
                if let Some(field) = token.strip_suffix('-') {
                    FieldSort::new(field.to_lowercase(), false)
                } else {
                    FieldSort::new(token.trim_end_matches('+').to_lowercase(), true)
                }
            })
            .filter(|sort| !sort.field.is_empty())
            .collect();
        Self { criteria }
    }

    pub fn criteria(&self) -> &[FieldSort] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn compare(&self, a: &dyn Model, b: &dyn Model) -> Ordering {
        self.criteria
            .iter()
            .map(|sort| sort.compare(a, b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Stable in-place sort.
    pub fn sort<M: Model>(&self, models: &mut [M]) {
        if self.is_empty() {
            return;
        }
        models.sort_by(|a, b| self.compare(a, b));
    }
}
