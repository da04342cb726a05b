//! Specification descriptor, combinators and evaluation.

use super::predicate::Predicate;
use super::rule::{BusinessRule, RuleArg};
use super::{SpecError, SpecResult};
use crate::model::entity::{Entity, EntityRef};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

static RULE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:\-]*$").expect("valid rule name regex"));
static INCLUDE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid include path regex")
});

/// Sort direction for one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

struct OrderKey<T> {
    compare: Comparator<T>,
    direction: OrderDirection,
}

impl<T> OrderKey<T> {
    fn compare(&self, left: &T, right: &T) -> Ordering {
        let ordering = (self.compare)(left, right);
        match self.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        }
    }
}

impl<T> Clone for OrderKey<T> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
            direction: self.direction,
        }
    }
}

enum Query<T> {
    Predicate(Predicate<T>),
    Rule(BusinessRule),
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Predicate(predicate) => Self::Predicate(predicate.clone()),
            Self::Rule(rule) => Self::Rule(rule.clone()),
        }
    }
}

/// Composable query descriptor.
///
/// Builders consume and return `self`, so a descriptor is immutable once it
/// has been handed to a repository.
pub struct Specification<T> {
    query: Query<T>,
    ordering: Vec<OrderKey<T>>,
    maximum_results: Option<usize>,
    include_paths: BTreeSet<String>,
}

impl<T> Specification<T> {
    /// Wraps a boolean predicate over `T`.
    pub fn lambda<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_predicate(Predicate::leaf(f))
    }

    /// Matches every candidate.
    pub fn all() -> Self {
        Self::lambda(|_| true)
    }

    pub fn from_predicate(predicate: Predicate<T>) -> Self {
        Self {
            query: Query::Predicate(predicate),
            ordering: Vec::new(),
            maximum_results: None,
            include_paths: BTreeSet::new(),
        }
    }

    /// Builds a descriptor that carries only a named business rule.
    pub fn business_rule<I>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<RuleArg>,
    {
        Self {
            query: Query::Rule(BusinessRule::new(
                name,
                args.into_iter().map(Into::into).collect(),
            )),
            ordering: Vec::new(),
            maximum_results: None,
            include_paths: BTreeSet::new(),
        }
    }

    /// Logical AND of both descriptors.
    ///
    /// # Errors
    /// - `InvalidArgument` when either operand is a business rule.
    pub fn and(self, other: Self) -> SpecResult<Self> {
        self.combine(other, "and", |left, right| {
            Predicate::And(Box::new(left), Box::new(right))
        })
    }

    /// Logical OR of both descriptors.
    ///
    /// # Errors
    /// - `InvalidArgument` when either operand is a business rule.
    pub fn or(self, other: Self) -> SpecResult<Self> {
        self.combine(other, "or", |left, right| {
            Predicate::Or(Box::new(left), Box::new(right))
        })
    }

    /// Logical negation. Ordering, cap and includes are kept.
    ///
    /// # Errors
    /// - `InvalidArgument` when the operand is a business rule.
    pub fn not(self) -> SpecResult<Self> {
        let Self {
            query,
            ordering,
            maximum_results,
            include_paths,
        } = self;
        let predicate = match query {
            Query::Predicate(predicate) => predicate,
            Query::Rule(rule) => return Err(rule_operand_error("not", &rule)),
        };
        Ok(Self {
            query: Query::Predicate(Predicate::Not(Box::new(predicate))),
            ordering,
            maximum_results,
            include_paths,
        })
    }

    /// Appends an ordering key at the lowest precedence.
    ///
    /// The first call sets the primary key; later calls only break ties left
    /// by earlier keys.
    pub fn order_by<K, F>(mut self, key: F, direction: OrderDirection) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering.push(OrderKey {
            compare: Arc::new(move |left, right| key(left).cmp(&key(right))),
            direction,
        });
        self
    }

    /// Same as `order_by`; reads better after the first key.
    pub fn then_by<K, F>(self, key: F, direction: OrderDirection) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.order_by(key, direction)
    }

    /// Caps the final result count. `0` always yields an empty result.
    pub fn set_maximum_results(mut self, maximum: usize) -> Self {
        self.maximum_results = Some(maximum);
        self
    }

    /// Records an eager-load hint for stores with graph support.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.include_paths.insert(path.into());
        self
    }

    pub fn predicate(&self) -> Option<&Predicate<T>> {
        match &self.query {
            Query::Predicate(predicate) => Some(predicate),
            Query::Rule(_) => None,
        }
    }

    pub fn rule(&self) -> Option<&BusinessRule> {
        match &self.query {
            Query::Predicate(_) => None,
            Query::Rule(rule) => Some(rule),
        }
    }

    pub fn is_business_rule(&self) -> bool {
        matches!(self.query, Query::Rule(_))
    }

    pub fn maximum_results(&self) -> Option<usize> {
        self.maximum_results
    }

    pub fn include_paths(&self) -> &BTreeSet<String> {
        &self.include_paths
    }

    pub fn order_key_count(&self) -> usize {
        self.ordering.len()
    }

    /// Checks rule names and include paths.
    pub fn validate(&self) -> SpecResult<()> {
        if let Query::Rule(rule) = &self.query {
            if !RULE_NAME_RE.is_match(rule.name.as_str()) {
                return Err(SpecError::InvalidArgument(format!(
                    "business rule name `{}` is not a valid identifier",
                    rule.name
                )));
            }
        }
        for path in &self.include_paths {
            if !INCLUDE_PATH_RE.is_match(path) {
                return Err(SpecError::InvalidArgument(format!(
                    "include path `{path}` is not a dotted member path"
                )));
            }
        }
        Ok(())
    }

    /// Returns whether one candidate satisfies the predicate.
    ///
    /// Business-rule descriptors match nothing.
    pub fn matches(&self, candidate: &T) -> bool {
        match &self.query {
            Query::Predicate(predicate) => predicate.matches(candidate),
            Query::Rule(_) => false,
        }
    }

    /// Compares two candidates through the ordering chain.
    pub fn compare(&self, left: &T, right: &T) -> Ordering {
        self.ordering
            .iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Short loggable summary.
    pub fn describe(&self) -> String {
        let kind = match &self.query {
            Query::Predicate(predicate) => format!("predicate leaves={}", predicate.leaf_count()),
            Query::Rule(rule) => format!("business_rule name={}", rule.name),
        };
        let cap = self
            .maximum_results
            .map_or_else(|| "none".to_string(), |value| value.to_string());
        format!(
            "kind={kind} order_keys={} cap={cap} includes={}",
            self.ordering.len(),
            self.include_paths.len()
        )
    }

    fn combine(
        self,
        other: Self,
        op: &str,
        join: impl FnOnce(Predicate<T>, Predicate<T>) -> Predicate<T>,
    ) -> SpecResult<Self> {
        let left = match self.query {
            Query::Predicate(predicate) => predicate,
            Query::Rule(rule) => return Err(rule_operand_error(op, &rule)),
        };
        let right = match other.query {
            Query::Predicate(predicate) => predicate,
            Query::Rule(rule) => return Err(rule_operand_error(op, &rule)),
        };

        let mut ordering = self.ordering;
        ordering.extend(other.ordering);
        let mut include_paths = self.include_paths;
        include_paths.extend(other.include_paths);

        Ok(Self {
            query: Query::Predicate(join(left, right)),
            ordering,
            maximum_results: min_cap(self.maximum_results, other.maximum_results),
            include_paths,
        })
    }
}

impl<T: Entity> Specification<T> {
    /// Filters, stably orders and truncates `candidates`.
    ///
    /// Ties left by the whole ordering chain keep the input order, which is
    /// the store-native order. Business-rule descriptors return the input
    /// unchanged.
    pub fn apply(&self, mut candidates: Vec<EntityRef<T>>) -> Vec<EntityRef<T>> {
        let predicate = match &self.query {
            Query::Predicate(predicate) => predicate,
            Query::Rule(_) => return candidates,
        };

        candidates.retain(|candidate| predicate.matches(&candidate.read()));
        if !self.ordering.is_empty() {
            candidates.sort_by(|left, right| self.compare(&left.read(), &right.read()));
        }
        if let Some(maximum) = self.maximum_results {
            candidates.truncate(maximum);
        }
        candidates
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            ordering: self.ordering.clone(),
            maximum_results: self.maximum_results,
            include_paths: self.include_paths.clone(),
        }
    }
}

impl<T> Debug for Specification<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Specification({})", self.describe())
    }
}

/// Free-function form of [`Specification::and`].
pub fn and<T>(left: Specification<T>, right: Specification<T>) -> SpecResult<Specification<T>> {
    left.and(right)
}

/// Free-function form of [`Specification::or`].
pub fn or<T>(left: Specification<T>, right: Specification<T>) -> SpecResult<Specification<T>> {
    left.or(right)
}

/// Free-function form of [`Specification::not`].
pub fn not<T>(inner: Specification<T>) -> SpecResult<Specification<T>> {
    inner.not()
}

fn min_cap(left: Option<usize>, right: Option<usize>) -> Option<usize> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left.min(right)),
        (left, None) => left,
        (None, right) => right,
    }
}

fn rule_operand_error(op: &str, rule: &BusinessRule) -> SpecError {
    SpecError::InvalidArgument(format!(
        "`{op}` needs predicate operands, got business rule `{}`",
        rule.name
    ))
}

#[cfg(test)]
mod tests {
    use super::{OrderDirection, Specification};
    use crate::spec::SpecError;
    use std::cmp::Ordering;

    #[test]
    fn composition_keeps_the_smallest_cap() {
        let left = Specification::<i32>::lambda(|v| *v > 0).set_maximum_results(5);
        let right = Specification::<i32>::lambda(|v| *v < 100).set_maximum_results(2);
        let composed = left.and(right).expect("predicate operands compose");
        assert_eq!(composed.maximum_results(), Some(2));

        let negated = Specification::<i32>::lambda(|v| *v > 0)
            .set_maximum_results(3)
            .not()
            .expect("predicate operand negates");
        assert_eq!(negated.maximum_results(), Some(3));
        assert!(negated.matches(&-1));
    }

    #[test]
    fn business_rule_operands_are_rejected() {
        let rule = Specification::<i32>::business_rule("top_sellers", [10]);
        let err = rule
            .clone()
            .or(Specification::lambda(|_| true))
            .expect_err("rule operand must fail");
        assert!(matches!(err, SpecError::InvalidArgument(message) if message.contains("top_sellers")));
        assert!(rule.not().is_err());
    }

    #[test]
    fn ordering_chain_breaks_ties_left_to_right() {
        let spec = Specification::<(i32, &'static str)>::all()
            .order_by(|v| v.0, OrderDirection::Ascending)
            .then_by(|v| v.1, OrderDirection::Descending);

        assert_eq!(spec.compare(&(1, "a"), &(2, "z")), Ordering::Less);
        assert_eq!(spec.compare(&(2, "a"), &(2, "b")), Ordering::Greater);
        assert_eq!(spec.compare(&(2, "b"), &(2, "b")), Ordering::Equal);
        assert_eq!(spec.order_key_count(), 2);
    }

    #[test]
    fn validate_rejects_malformed_rule_names_and_include_paths() {
        assert!(Specification::<i32>::business_rule("by-owner", [1]).validate().is_ok());
        assert!(Specification::<i32>::business_rule("", Vec::<i64>::new())
            .validate()
            .is_err());
        assert!(Specification::<i32>::all().include("Orders.Lines").validate().is_ok());
        assert!(Specification::<i32>::all().include("Orders..Lines").validate().is_err());
    }

    #[test]
    fn describe_mentions_cap_and_kind() {
        let description = Specification::<i32>::all().set_maximum_results(4).describe();
        assert!(description.contains("kind=predicate"));
        assert!(description.contains("cap=4"));
    }
}
