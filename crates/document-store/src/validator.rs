//! Per-collection validation rules, checked by the store on every write.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::lookup;

/// A single rule attached to a collection's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// The integer field must be present and at least `minimum`.
    Minimum { field: String, minimum: i64 },
}

impl FieldRule {
    fn check(&self, document: &Value) -> Result<(), RuleViolation> {
        match self {
            FieldRule::Minimum { field, minimum } => {
                let ok = lookup(document, field)
                    .and_then(Value::as_i64)
                    .is_some_and(|v| v >= *minimum);
                if ok {
                    Ok(())
                } else {
                    Err(RuleViolation {
                        field: field.clone(),
                        rule: self.clone(),
                    })
                }
            }
        }
    }
}

impl std::fmt::Display for FieldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRule::Minimum { minimum, .. } => write!(f, "must be >= {minimum}"),
        }
    }
}

/// A rejected rule and the field it guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub field: String,
    pub rule: FieldRule,
}

/// Set of rules a collection enforces on every inserted or updated document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub rules: Vec<FieldRule>,
}

impl Validator {
    /// Creates a validator with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a minimum-value rule.
    pub fn minimum(mut self, field: impl Into<String>, minimum: i64) -> Self {
        self.rules.push(FieldRule::Minimum {
            field: field.into(),
            minimum,
        });
        self
    }

    /// Returns true if no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks a document against every rule, returning the first violation.
    pub fn check(&self, document: &Value) -> Result<(), RuleViolation> {
        self.rules.iter().try_for_each(|rule| rule.check(document))
    }
}
