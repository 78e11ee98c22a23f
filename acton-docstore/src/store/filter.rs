//! Filter predicates and ordering for document queries
//!
//! Filters are plain data: every backend interprets the same tree, the
//! in-memory store by evaluating it against JSON documents and SurrealDB by
//! rendering it to a `WHERE` clause.
//!
//! # Example
//!
//! ```rust
//! use acton_docstore::store::{Filter, FilterCondition};
//!
//! let mut filter = Filter::eq("status", "active");
//! filter &= Filter::gte("age", 18);
//! filter &= Filter::from(FilterCondition::like("email", "%@example.com"));
//! assert_eq!(filter.conditions().count(), 3);
//! ```

use serde_json::Value;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching with `%` and `_` wildcards (LIKE)
    Like,
    /// Value is in a list (IN)
    In,
    /// Field is missing or null
    IsNull,
    /// Field is present and not null
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A single comparison of a document field against a value
///
/// Field names may use dots to reach into nested objects (`"address.city"`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: Value,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Create an equality condition (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Equal, value)
    }

    /// Create a not-equal condition (field != value)
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value)
    }

    /// Create a greater-than condition (field > value)
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value)
    }

    /// Create a greater-than-or-equal condition (field >= value)
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value)
    }

    /// Create a less-than condition (field < value)
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::LessThan, value)
    }

    /// Create a less-than-or-equal condition (field <= value)
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value)
    }

    /// Create a LIKE pattern condition
    ///
    /// `%` matches any run of characters and `_` matches exactly one.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, Value::String(pattern.into()))
    }

    /// Create an IN list condition
    pub fn in_list<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        Self::new(field, FilterOperator::In, Value::Array(values))
    }

    /// Create an IS NULL condition (missing fields count as null)
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, Value::Null)
    }

    /// Create an IS NOT NULL condition
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, Value::Null)
    }
}

/// A predicate over documents
///
/// `Filter::all()` (an empty conjunction) matches every document and is the
/// identity for [`Filter::and`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// A single field comparison
    Condition(FilterCondition),
    /// All inner filters must match
    And(Vec<Filter>),
    /// At least one inner filter must match
    Or(Vec<Filter>),
    /// The inner filter must not match
    Not(Box<Filter>),
}

impl Filter {
    /// A filter matching every document
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Whether this filter trivially matches every document
    pub fn is_all(&self) -> bool {
        match self {
            Self::And(inner) => inner.iter().all(Filter::is_all),
            _ => false,
        }
    }

    /// Shorthand for an equality condition
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::eq(field, value))
    }

    /// Shorthand for a not-equal condition
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::ne(field, value))
    }

    /// Shorthand for a greater-than condition
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::gt(field, value))
    }

    /// Shorthand for a greater-than-or-equal condition
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::gte(field, value))
    }

    /// Shorthand for a less-than condition
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::lt(field, value))
    }

    /// Shorthand for a less-than-or-equal condition
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::lte(field, value))
    }

    /// Conjoin two filters, flattening nested conjunctions
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        if other.is_all() {
            return self;
        }
        if self.is_all() {
            return other;
        }
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjoin two filters, flattening nested disjunctions
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Negate this filter
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Iterate over every leaf condition in the tree
    pub fn conditions(&self) -> Box<dyn Iterator<Item = &FilterCondition> + '_> {
        match self {
            Self::Condition(condition) => Box::new(std::iter::once(condition)),
            Self::And(inner) | Self::Or(inner) => {
                Box::new(inner.iter().flat_map(|filter| filter.conditions()))
            }
            Self::Not(inner) => inner.conditions(),
        }
    }

    /// Equality conditions reachable through conjunctions only
    ///
    /// These seed the document created by an upsert.
    pub(crate) fn equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            Self::Condition(FilterCondition {
                field,
                operator: FilterOperator::Equal,
                value,
            }) => vec![(field.as_str(), value)],
            Self::And(inner) => inner.iter().flat_map(Filter::equalities).collect(),
            _ => Vec::new(),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<FilterCondition> for Filter {
    fn from(condition: FilterCondition) -> Self {
        Self::Condition(condition)
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitAndAssign for Filter {
    fn bitand_assign(&mut self, rhs: Filter) {
        let current = std::mem::take(self);
        *self = current.and(rhs);
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

/// Translate a SQL LIKE pattern (`%` any run, `_` one character) into an
/// anchored regular expression
pub(crate) fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::from("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {

    #[test]
    fn test_like_to_regex() {
        assert_eq!(like_to_regex("a%b_"), "(?s)^a.*b.$");
        assert_eq!(like_to_regex("1.5"), "(?s)^1\\.5$");
    }

    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_display() {
        assert_eq!(format!("{}", FilterOperator::Equal), "=");
        assert_eq!(format!("{}", FilterOperator::Like), "LIKE");
        assert_eq!(format!("{}", FilterOperator::IsNotNull), "IS NOT NULL");
    }

    #[test]
    fn test_order_direction_display() {
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
        assert_eq!(format!("{}", OrderDirection::Descending), "desc");
        assert_eq!(OrderDirection::default(), OrderDirection::Ascending);
    }

    #[test]
    fn test_condition_constructors() {
        let condition = FilterCondition::in_list("tier", ["gold", "silver"]);
        assert_eq!(condition.operator, FilterOperator::In);
        assert_eq!(condition.value, json!(["gold", "silver"]));

        let condition = FilterCondition::is_null("deleted_at");
        assert_eq!(condition.value, Value::Null);
    }

    #[test]
    fn test_all_is_identity_for_and() {
        let filter = Filter::eq("a", 1);
        assert_eq!(Filter::all().and(filter.clone()), filter);
        assert_eq!(filter.clone().and(Filter::all()), filter);
        assert!(Filter::all().and(Filter::all()).is_all());
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::eq("a", 1) & Filter::eq("b", 2) & Filter::eq("c", 3);
        match filter {
            Filter::And(inner) => assert_eq!(inner.len(), 3),
            other => panic!("expected a conjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_bitand_assign() {
        let mut filter = Filter::eq("is_deleted", false);
        filter &= Filter::gt("age", 30);
        assert_eq!(filter.conditions().count(), 2);
    }

    #[test]
    fn test_or_flattens_and_negate_unwraps() {
        let filter = Filter::eq("a", 1) | Filter::eq("b", 2) | Filter::eq("c", 3);
        match &filter {
            Filter::Or(inner) => assert_eq!(inner.len(), 3),
            other => panic!("expected a disjunction, got {:?}", other),
        }
        assert_eq!(filter.clone().negate().negate(), filter);
    }

    #[test]
    fn test_equalities_skip_disjunctions() {
        let filter = Filter::eq("name", "orders") & (Filter::eq("x", 1) | Filter::eq("y", 2));
        let equalities = filter.equalities();
        assert_eq!(equalities, vec![("name", &json!("orders"))]);
    }
}
