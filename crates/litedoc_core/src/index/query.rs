//! Query predicates.

use crate::collation::Collation;
use litedoc_bson::{Document, Expr, Value, ValueType};
use std::cmp::Ordering;
use std::fmt;

/// Comparison applied to each value an expression produces.
///
/// Range operators only match values of the operand's type family: all
/// numbers form one family, every other [`ValueType`] is its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Matches everything.
    All,
    /// Equal under the collation.
    Eq(Value),
    /// Strictly less.
    Lt(Value),
    /// Less or equal.
    Lte(Value),
    /// Strictly greater.
    Gt(Value),
    /// Greater or equal.
    Gte(Value),
    /// Inclusive range. Empty when the lower bound exceeds the upper.
    Between(Value, Value),
    /// String prefix under the collation.
    StartsWith(String),
    /// Equal to any of the listed values.
    In(Vec<Value>),
    /// Not equal.
    Not(Value),
}

/// How the per-value results of a multi-valued expression combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantifier {
    /// Plain comparison; for several values behaves like `Any`.
    #[default]
    Single,
    /// At least one value matches.
    Any,
    /// The expression yields at least one value and all of them match.
    All,
}

/// Result order, applied to the keys of the scanned index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Smallest key first.
    #[default]
    Ascending,
    /// Largest key first.
    Descending,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("IS ANYTHING"),
            Self::Eq(v) => write!(f, "= {v}"),
            Self::Not(v) => write!(f, "!= {v}"),
            Self::Lt(v) => write!(f, "< {v}"),
            Self::Lte(v) => write!(f, "<= {v}"),
            Self::Gt(v) => write!(f, "> {v}"),
            Self::Gte(v) => write!(f, ">= {v}"),
            Self::Between(lo, hi) => write!(f, "BETWEEN {lo} AND {hi}"),
            Self::StartsWith(prefix) => write!(f, "LIKE {:?}", format!("{prefix}%")),
            Self::In(values) => {
                f.write_str("IN [")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A filter over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expression: Expr,
    operator: Operator,
    quantifier: Quantifier,
    order: Order,
    skip: usize,
    limit: Option<usize>,
}

pub(crate) fn family(value: &Value) -> ValueType {
    let kind = value.value_type();
    if kind.is_number() {
        ValueType::Int32
    } else {
        kind
    }
}

impl Operator {
    /// True if `value` satisfies the operator.
    #[must_use]
    pub fn matches(&self, value: &Value, collation: &Collation) -> bool {
        let cmp = |other: &Value| collation.compare_values(value, other);
        let same = |other: &Value| family(value) == family(other);
        match self {
            Self::All => true,
            Self::Eq(v) => cmp(v) == Ordering::Equal,
            Self::Not(v) => cmp(v) != Ordering::Equal,
            Self::Lt(v) => same(v) && cmp(v) == Ordering::Less,
            Self::Lte(v) => same(v) && cmp(v) != Ordering::Greater,
            Self::Gt(v) => same(v) && cmp(v) == Ordering::Greater,
            Self::Gte(v) => same(v) && cmp(v) != Ordering::Less,
            Self::Between(lo, hi) => {
                (same(lo) || same(hi))
                    && cmp(lo) != Ordering::Less
                    && cmp(hi) != Ordering::Greater
            }
            Self::StartsWith(prefix) => value
                .as_str()
                .is_some_and(|text| collation.starts_with(text, prefix)),
            Self::In(values) => values.iter().any(|v| cmp(v) == Ordering::Equal),
        }
    }
}

impl Query {
    /// Query with an explicit operator.
    #[must_use]
    pub fn new(expression: Expr, operator: Operator) -> Self {
        Self {
            expression,
            operator,
            quantifier: Quantifier::Single,
            order: Order::Ascending,
            skip: 0,
            limit: None,
        }
    }

    /// Every document, in `_id` order.
    #[must_use]
    pub fn all() -> Self {
        Self::new(Expr::id(), Operator::All)
    }

    /// `expression == value`.
    #[must_use]
    pub fn eq(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Eq(value.into()))
    }

    /// `expression < value`.
    #[must_use]
    pub fn lt(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Lt(value.into()))
    }

    /// `expression <= value`.
    #[must_use]
    pub fn lte(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Lte(value.into()))
    }

    /// `expression > value`.
    #[must_use]
    pub fn gt(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Gt(value.into()))
    }

    /// `expression >= value`.
    #[must_use]
    pub fn gte(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Gte(value.into()))
    }

    /// `low <= expression <= high`.
    #[must_use]
    pub fn between(expression: Expr, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Between(low.into(), high.into()))
    }

    /// String values beginning with `prefix`.
    #[must_use]
    pub fn starts_with(expression: Expr, prefix: impl Into<String>) -> Self {
        Self::new(expression, Operator::StartsWith(prefix.into()))
    }

    /// `expression` equal to one of `values`.
    #[must_use]
    pub fn in_values<V: Into<Value>>(expression: Expr, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(
            expression,
            Operator::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// `expression != value`.
    #[must_use]
    pub fn not(expression: Expr, value: impl Into<Value>) -> Self {
        Self::new(expression, Operator::Not(value.into()))
    }

    /// Matches if any value of a multi-valued expression matches.
    #[must_use]
    pub fn any(mut self) -> Self {
        self.quantifier = Quantifier::Any;
        self
    }

    /// Matches only if every value of a multi-valued expression matches.
    #[must_use]
    pub fn every(mut self) -> Self {
        self.quantifier = Quantifier::All;
        self
    }

    /// Sets the result order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Largest key first.
    #[must_use]
    pub fn descending(self) -> Self {
        self.order(Order::Descending)
    }

    /// Skips the first `n` results.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Returns at most `n` results.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// The filtered expression.
    #[must_use]
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// The comparison.
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// The quantifier.
    #[must_use]
    pub fn quantifier(&self) -> Quantifier {
        self.quantifier
    }

    /// The result order.
    #[must_use]
    pub fn result_order(&self) -> Order {
        self.order
    }

    /// Results skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skip
    }

    /// Result limit.
    #[must_use]
    pub fn limited(&self) -> Option<usize> {
        self.limit
    }

    /// Evaluates the query against a document.
    #[must_use]
    pub fn matches(&self, document: &Document, collation: &Collation) -> bool {
        let values = self.expression.evaluate(document);
        match self.quantifier {
            Quantifier::Single | Quantifier::Any => values
                .iter()
                .any(|v| self.operator.matches(v, collation)),
            Quantifier::All => {
                !values.is_empty() && values.iter().all(|v| self.operator.matches(v, collation))
            }
        }
    }

    /// Applies skip and limit to an ordered result list.
    pub(crate) fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.skip);
        match self.limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }
}

/// Renders `expression [ANY|ALL] operator` followed by any order, skip and
/// limit, e.g. `$.tags[*] ANY = "a" LIMIT 2`.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        match self.quantifier {
            Quantifier::Single => {}
            Quantifier::Any => f.write_str(" ANY")?,
            Quantifier::All => f.write_str(" ALL")?,
        }
        write!(f, " {}", self.operator)?;
        if self.order == Order::Descending {
            f.write_str(" DESC")?;
        }
        if self.skip > 0 {
            write!(f, " SKIP {}", self.skip)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
