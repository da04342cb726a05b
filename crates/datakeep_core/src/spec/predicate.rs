//! Predicate tree and its interpreter.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Boolean predicate over `T`, kept as an explicit tree so stores can
/// inspect or translate it.
pub enum Predicate<T> {
    Leaf(Arc<dyn Fn(&T) -> bool + Send + Sync>),
    And(Box<Predicate<T>>, Box<Predicate<T>>),
    Or(Box<Predicate<T>>, Box<Predicate<T>>),
    Not(Box<Predicate<T>>),
}

impl<T> Predicate<T> {
    pub fn leaf<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::Leaf(Arc::new(f))
    }

    /// Evaluates the tree against one candidate.
    pub fn matches(&self, candidate: &T) -> bool {
        match self {
            Self::Leaf(f) => f(candidate),
            Self::And(left, right) => left.matches(candidate) && right.matches(candidate),
            Self::Or(left, right) => left.matches(candidate) || right.matches(candidate),
            Self::Not(inner) => !inner.matches(candidate),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::And(left, right) | Self::Or(left, right) => {
                left.leaf_count() + right.leaf_count()
            }
            Self::Not(inner) => inner.leaf_count(),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Leaf(f) => Self::Leaf(Arc::clone(f)),
            Self::And(left, right) => Self::And(left.clone(), right.clone()),
            Self::Or(left, right) => Self::Or(left.clone(), right.clone()),
            Self::Not(inner) => Self::Not(inner.clone()),
        }
    }
}

impl<T> Debug for Predicate<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(_) => write!(f, "Leaf"),
            Self::And(left, right) => write!(f, "And({left:?}, {right:?})"),
            Self::Or(left, right) => write!(f, "Or({left:?}, {right:?})"),
            Self::Not(inner) => write!(f, "Not({inner:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Predicate;

    #[test]
    fn combinators_follow_boolean_logic() {
        let small = Predicate::leaf(|value: &i32| *value < 3);
        let large = Predicate::leaf(|value: &i32| *value > 5);
        let either = Predicate::Or(Box::new(small.clone()), Box::new(large));
        let middle = Predicate::Not(Box::new(either.clone()));

        assert!(either.matches(&1));
        assert!(either.matches(&7));
        assert!(!either.matches(&4));
        assert!(middle.matches(&4));
        assert!(!Predicate::And(Box::new(small), Box::new(middle)).matches(&4));
        assert_eq!(either.leaf_count(), 2);
    }
}
