//! Parsing of query strings into [`Query`] values.
//!
//! A query is a list of parts. Each part is either a term (`beatles`,
//! `artist:beatles`, `title::^Come`, `year:1960..1970`), a negated term
//! (`^live`, `-genre:jazz`), a sort criterion (`year-`, `album+`) or a
//! standalone `,` separating alternatives.

use anyhow::Result;

use crate::model::Schema;
use crate::query::{Query, QueryKind};
use crate::sort::{FieldSort, Sort};

/// Marker that turns a term into a regular expression.
const REGEX_PREFIX: &str = ":";

/// Split a query part into `(key, term, kind)`.
///
/// `key` is `None` when the term applies to every search field. A colon
/// escaped as `\:` never separates the key and is unescaped in the term.
pub fn parse_query_part(part: &str, schema: &Schema) -> (Option<String>, String, QueryKind) {
    let part = part.trim();
    let (key, term) = split_key(part);
    let key = key.map(str::to_lowercase);
    let term = term.replace("\\:", ":");

    if let Some(pattern) = term.strip_prefix(REGEX_PREFIX) {
        return (key, pattern.to_string(), QueryKind::Regexp);
    }

    let kind = key
        .as_deref()
        .and_then(|key| schema.field_type(key))
        .map_or(QueryKind::Substring, |ty| ty.query_kind());
    (key, term, kind)
}

/// Find the first unescaped colon preceded by at least one non-space character.
fn split_key(part: &str) -> (Option<&str>, &str) {
    let mut prev = None;
    for (idx, ch) in part.char_indices() {
        if ch.is_whitespace() {
            break;
        }
        if ch == ':' && idx > 0 && prev != Some('\\') {
            return (Some(&part[..idx]), &part[idx + 1..]);
        }
        prev = Some(ch);
    }
    (None, part)
}

/// Build the query for one term part.
pub fn construct_query_part(schema: &Schema, part: &str) -> Result<Query> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(Query::True);
    }

    if let Some(rest) = negated(part) {
        return Ok(Query::Not(Box::new(construct_query_part(schema, rest)?)));
    }

    let (key, term, kind) = parse_query_part(part, schema);
    match key {
        Some(key) => Query::field(kind, &key, &term),
        None => {
            let queries = schema
                .search_fields
                .iter()
                .map(|field| {
                    let kind = match schema.field_type(field).map(|ty| ty.query_kind()) {
                        // Unkeyed terms match paths textually.
                        Some(QueryKind::Path) if kind == QueryKind::Substring => {
                            QueryKind::Substring
                        }
                        _ => kind,
                    };
                    Query::field(kind, field, &term)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Query::AnyField(queries))
        }
    }
}

fn negated(part: &str) -> Option<&str> {
    let rest = part.strip_prefix('^').or_else(|| part.strip_prefix('-'))?;
    (!rest.is_empty()).then_some(rest)
}

/// Recognise `field+` / `field-` sort parts.
fn sort_part(part: &str) -> Option<FieldSort> {
    if part.len() < 2 || part.contains(':') || part.contains(char::is_whitespace) {
        return None;
    }
    let (field, ascending) = if let Some(field) = part.strip_suffix('+') {
        (field, true)
    } else {
        (part.strip_suffix('-')?, false)
    };
    if field.starts_with(['^', '-']) {
        return None;
    }
    Some(FieldSort::new(field.to_lowercase(), ascending))
}

/// Combine term parts into an `And` query; no parts means everything matches.
pub fn query_from_strings<S: AsRef<str>>(schema: &Schema, parts: &[S]) -> Result<Query> {
    let subqueries = parts
        .iter()
        .map(|part| construct_query_part(schema, part.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    if subqueries.is_empty() {
        return Ok(Query::True);
    }
    Ok(Query::And(subqueries))
}

/// Parse a full query, separating sort criteria and `,` alternatives.
pub fn parse_sorted_query<S: AsRef<str>>(
    schema: &Schema,
    parts: &[S],
) -> Result<(Query, Option<Sort>)> {
    let mut groups: Vec<Vec<String>> = vec![Vec::new()];
    let mut sorts = Vec::new();

    for part in parts {
        let part = part.as_ref().trim();
        if let Some(sort) = sort_part(part) {
            sorts.push(sort);
            continue;
        }
        let (term, ends_group) = match part.strip_suffix(',') {
            Some(term) if !term.ends_with('\\') => (term, true),
            _ => (part, false),
        };
        if !term.is_empty() {
            if let Some(current) = groups.last_mut() {
                current.push(term.to_string());
            }
        }
        if ends_group {
            groups.push(Vec::new());
        }
    }

    // A trailing separator leaves an empty group that should not match everything.
    if groups.len() > 1 && groups.last().is_some_and(|g| g.is_empty()) {
        groups.pop();
    }

    let query = if groups.len() == 1 {
        query_from_strings(schema, &groups[0])?
    } else {
        Query::Or(
            groups
                .iter()
                .map(|group| query_from_strings(schema, group))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    let sort = (!sorts.is_empty()).then(|| Sort::new(sorts));
    Ok((query, sort))
}

/// Split a line into words using shell-style quoting.
///
/// Returns `None` on an unterminated quote or a trailing backslash.
pub fn split_words(input: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        c => current.push(c),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            c @ ('"' | '\\' | '$' | '`') => current.push(c),
                            '\n' => {}
                            c => {
                                current.push('\\');
                                current.push(c);
                            }
                        },
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next()? {
                    '\n' => {}
                    c => current.push(c),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
