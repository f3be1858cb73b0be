//! Filter and update expressions.

use serde_json::Value;

use crate::document::{ID_FIELD, lookup, lookup_mut};
use crate::{Result, StoreError};

/// Predicate selecting documents in a collection.
///
/// Field names may be dotted paths. `ElemMatch` evaluates its inner filter
/// against each element of an array field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals the given value.
    Eq { field: String, value: Value },
    /// At least one element of the array matches the inner filter.
    ElemMatch { array: String, filter: Box<Filter> },
    /// All inner filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// Creates a filter matching every document.
    pub fn all() -> Self {
        Filter::All
    }

    /// Creates an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an equality filter on `_id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        Filter::eq(ID_FIELD, id.into())
    }

    /// Creates an element-match filter on an array field.
    pub fn elem_match(array: impl Into<String>, filter: Filter) -> Self {
        Filter::ElemMatch {
            array: array.into(),
            filter: Box::new(filter),
        }
    }

    /// Combines this filter with another one.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            filter => Filter::And(vec![filter, other]),
        }
    }

    /// Returns true if the document satisfies this filter.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => lookup(document, field) == Some(value),
            Filter::ElemMatch { array, filter } => lookup(document, array)
                .and_then(Value::as_array)
                .is_some_and(|elements| elements.iter().any(|e| filter.matches(e))),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }

    /// Returns the `_id` this filter pins, if any.
    ///
    /// Backends use it to narrow a lookup to a single key.
    pub fn pinned_id(&self) -> Option<&str> {
        match self {
            Filter::Eq { field, value } if field == ID_FIELD => value.as_str(),
            Filter::And(filters) => filters.iter().find_map(Filter::pinned_id),
            _ => None,
        }
    }

    /// Index of the first element of `array` matched by this filter's
    /// `ElemMatch` clause on that array.
    pub fn matched_position(&self, document: &Value, array: &str) -> Option<usize> {
        match self {
            Filter::ElemMatch { array: a, filter } if a == array => lookup(document, array)
                .and_then(Value::as_array)
                .and_then(|elements| elements.iter().position(|e| filter.matches(e))),
            Filter::And(filters) => filters
                .iter()
                .find_map(|f| f.matched_position(document, array)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::All => write!(f, "{{}}"),
            Filter::Eq { field, value } => write!(f, "{{{field}: {value}}}"),
            Filter::ElemMatch { array, filter } => {
                write!(f, "{{{array}: {{$elemMatch: {filter}}}}}")
            }
            Filter::And(filters) => {
                write!(f, "{{$and: [")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{filter}")?;
                }
                write!(f, "]}}")
            }
        }
    }
}

/// Mutation applied to the first document matched by a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Adds `by` to an integer field; a missing field starts at zero.
    Inc { field: String, by: i64 },
    /// Adds `by` to a field of the array element selected by the filter's
    /// `ElemMatch` clause (the positional `$` operator).
    IncMatched { array: String, field: String, by: i64 },
    /// Appends a value to an array field, creating the array if missing.
    Push { array: String, value: Value },
}

impl Update {
    /// Creates an increment update.
    pub fn inc(field: impl Into<String>, by: i64) -> Self {
        Update::Inc {
            field: field.into(),
            by,
        }
    }

    /// Creates a positional increment update.
    pub fn inc_matched(array: impl Into<String>, field: impl Into<String>, by: i64) -> Self {
        Update::IncMatched {
            array: array.into(),
            field: field.into(),
            by,
        }
    }

    /// Creates a push update.
    pub fn push(array: impl Into<String>, value: impl Into<Value>) -> Self {
        Update::Push {
            array: array.into(),
            value: value.into(),
        }
    }

    /// Applies the update in place.
    ///
    /// `filter` is the filter that selected the document; positional updates
    /// use it to locate the array element.
    pub fn apply(&self, collection: &str, document: &mut Value, filter: &Filter) -> Result<()> {
        let invalid = |reason: String| StoreError::InvalidUpdate {
            collection: collection.to_string(),
            reason,
        };

        match self {
            Update::Inc { field, by } => {
                let target = lookup_mut(document, field)
                    .ok_or_else(|| invalid(format!("cannot traverse path '{field}'")))?;
                increment(target, *by).map_err(|reason| invalid(format!("{field}: {reason}")))
            }
            Update::IncMatched { array, field, by } => {
                let position = filter.matched_position(document, array).ok_or_else(|| {
                    invalid(format!("no element of '{array}' matched the filter"))
                })?;
                let element = lookup_mut(document, array)
                    .and_then(Value::as_array_mut)
                    .and_then(|elements| elements.get_mut(position))
                    .ok_or_else(|| invalid(format!("'{array}' is not an array")))?;
                let target = lookup_mut(element, field)
                    .ok_or_else(|| invalid(format!("cannot traverse path '{array}.{field}'")))?;
                increment(target, *by)
                    .map_err(|reason| invalid(format!("{array}.$.{field}: {reason}")))
            }
            Update::Push { array, value } => {
                let target = lookup_mut(document, array)
                    .ok_or_else(|| invalid(format!("cannot traverse path '{array}'")))?;
                match target {
                    Value::Null => {
                        *target = Value::Array(vec![value.clone()]);
                        Ok(())
                    }
                    Value::Array(elements) => {
                        elements.push(value.clone());
                        Ok(())
                    }
                    _ => Err(invalid(format!("'{array}' is not an array"))),
                }
            }
        }
    }
}

impl std::fmt::Display for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Inc { field, by } => write!(f, "{{$inc: {{{field}: {by}}}}}"),
            Update::IncMatched { array, field, by } => {
                write!(f, "{{$inc: {{{array}.$.{field}: {by}}}}}")
            }
            Update::Push { array, value } => write!(f, "{{$push: {{{array}: {value}}}}}"),
        }
    }
}

fn increment(target: &mut Value, by: i64) -> std::result::Result<(), String> {
    let current = match target {
        Value::Null => 0,
        Value::Number(n) => n.as_i64().ok_or("not an integer")?,
        _ => return Err("not a number".to_string()),
    };
    let next = current.checked_add(by).ok_or("integer overflow")?;
    *target = Value::from(next);
    Ok(())
}
