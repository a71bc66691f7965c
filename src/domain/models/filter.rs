//! Scalar filter expressions.
//!
//! Filters are built as a typed tree and only rendered to the store's
//! boolean expression syntax at the edge, so user supplied literals never
//! reach the store unescaped. Range bounds are inclusive.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::{FieldValue, Record};
use crate::domain::errors::{DomainError, DomainResult};

/// Longest string literal accepted in a filter.
pub const MAX_LITERAL_LEN: usize = 65_535;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// A boolean predicate over scalar fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    /// Inclusive numeric range
    Between {
        field: String,
        low: FieldValue,
        high: FieldValue,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
    },
    /// `%` matches any run of characters, `_` exactly one
    Like { field: String, pattern: String },
    And { clauses: Vec<FilterExpr> },
    Or { clauses: Vec<FilterExpr> },
    Not { clause: Box<FilterExpr> },
}

impl FilterExpr {
    pub fn compare(field: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Self::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: &str, value: impl Into<FieldValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn between(field: &str, low: impl Into<FieldValue>, high: impl Into<FieldValue>) -> Self {
        Self::Between {
            field: field.to_string(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn in_list<V: Into<FieldValue>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Self::Like {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Conjunction of every expression in `clauses`.
    pub fn all(clauses: impl IntoIterator<Item = Self>) -> Self {
        Self::And {
            clauses: clauses.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And { mut clauses } => {
                clauses.push(other);
                Self::And { clauses }
            }
            first => Self::And {
                clauses: vec![first, other],
            },
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or { mut clauses } => {
                clauses.push(other);
                Self::Or { clauses }
            }
            first => Self::Or {
                clauses: vec![first, other],
            },
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not {
            clause: Box::new(self),
        }
    }

    /// Reject expressions that could not be rendered safely.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::Compare { field, value, .. } => {
                validate_identifier(field)?;
                validate_literal(value)
            }
            Self::Between { field, low, high } => {
                validate_identifier(field)?;
                validate_literal(low)?;
                validate_literal(high)?;
                let (Some(lo), Some(hi)) = (low.as_f64(), high.as_f64()) else {
                    return Err(DomainError::ValidationFailed(format!(
                        "range bounds on '{field}' must be numeric"
                    )));
                };
                if lo > hi {
                    return Err(DomainError::ValidationFailed(format!(
                        "range on '{field}' is empty: {low} > {high}"
                    )));
                }
                Ok(())
            }
            Self::In { field, values } => {
                validate_identifier(field)?;
                if values.is_empty() {
                    return Err(DomainError::ValidationFailed(format!(
                        "'in' list for '{field}' is empty"
                    )));
                }
                values.iter().try_for_each(validate_literal)
            }
            Self::Like { field, pattern } => {
                validate_identifier(field)?;
                validate_literal(&FieldValue::Str(pattern.clone()))
            }
            Self::And { clauses } | Self::Or { clauses } => {
                if clauses.is_empty() {
                    return Err(DomainError::ValidationFailed(
                        "boolean group has no clauses".to_string(),
                    ));
                }
                clauses.iter().try_for_each(Self::validate)
            }
            Self::Not { clause } => clause.validate(),
        }
    }

    /// Render to the store's boolean expression syntax.
    pub fn render(&self) -> String {
        match self {
            Self::Compare { field, op, value } => {
                format!("{field} {} {}", op.symbol(), render_literal(value))
            }
            Self::Between { field, low, high } => format!(
                "({} <= {field} <= {})",
                render_literal(low),
                render_literal(high)
            ),
            Self::In { field, values } => {
                let items: Vec<String> = values.iter().map(render_literal).collect();
                format!("{field} in [{}]", items.join(", "))
            }
            Self::Like { field, pattern } => {
                format!("{field} like {}", quote(pattern))
            }
            Self::And { clauses } => join_clauses(clauses, " and "),
            Self::Or { clauses } => join_clauses(clauses, " or "),
            Self::Not { clause } => format!("not ({})", clause.render()),
        }
    }

    /// Evaluate against a record. Missing fields never match.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Compare { field, op, value } => {
                lookup(record, field).is_some_and(|actual| {
                    compare_values(&actual, value).is_some_and(|ord| op.holds(ord))
                })
            }
            Self::Between { field, low, high } => lookup(record, field).is_some_and(|actual| {
                compare_values(&actual, low).is_some_and(|ord| ord != Ordering::Less)
                    && compare_values(&actual, high).is_some_and(|ord| ord != Ordering::Greater)
            }),
            Self::In { field, values } => lookup(record, field).is_some_and(|actual| {
                values
                    .iter()
                    .any(|v| compare_values(&actual, v) == Some(Ordering::Equal))
            }),
            Self::Like { field, pattern } => lookup(record, field)
                .as_ref()
                .and_then(FieldValue::as_str)
                .is_some_and(|text| like_matches(text, pattern)),
            Self::And { clauses } => clauses.iter().all(|c| c.matches(record)),
            Self::Or { clauses } => clauses.iter().any(|c| c.matches(record)),
            Self::Not { clause } => !clause.matches(record),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn join_clauses(clauses: &[FilterExpr], separator: &str) -> String {
    let rendered: Vec<String> = clauses.iter().map(FilterExpr::render).collect();
    format!("({})", rendered.join(separator))
}

fn lookup(record: &Record, field: &str) -> Option<FieldValue> {
    match record.scalar(field) {
        Some(value) => Some(value.clone()),
        None if field == "id" => record.id.map(FieldValue::Int),
        None => None,
    }
}

fn compare_values(actual: &FieldValue, expected: &FieldValue) -> Option<Ordering> {
    match (actual, expected) {
        (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
        (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
        (FieldValue::Str(_), _) | (_, FieldValue::Str(_)) => None,
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn validate_identifier(field: &str) -> DomainResult<()> {
    let mut chars = field.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(DomainError::ValidationFailed(format!(
            "invalid field name in filter: {field:?}"
        )))
    }
}

fn validate_literal(value: &FieldValue) -> DomainResult<()> {
    match value {
        FieldValue::Float(v) if !v.is_finite() => Err(DomainError::ValidationFailed(format!(
            "non-finite number in filter: {v}"
        ))),
        FieldValue::Str(s) if s.chars().count() > MAX_LITERAL_LEN => Err(
            DomainError::ValidationFailed("string literal in filter is too long".to_string()),
        ),
        FieldValue::Str(s) if s.chars().any(char::is_control) => Err(
            DomainError::ValidationFailed("control characters are not allowed in filter literals".to_string()),
        ),
        _ => Ok(()),
    }
}

fn render_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Float(v) => format!("{v:?}"),
        FieldValue::Str(s) => quote(s),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, t));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}
