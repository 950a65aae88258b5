//! Data-driven argument substitution.
//!
//! A replacement function that patches content rather than behavior consults a
//! [`SubstitutionTable`]: an ordered list of rules, each a predicate over the call's
//! arguments and a rewrite applied when it holds. Rules see the arguments as left by the
//! rules before them, and the hook then falls through to the original with the result.

use std::fmt;

type Predicate<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;
type Rewrite<A> = Box<dyn Fn(&mut A) + Send + Sync>;

/// One `{predicate, substitute}` pair.
pub struct SubstitutionRule<A> {
    name: String,
    predicate: Predicate<A>,
    substitute: Rewrite<A>,
}

impl<A> SubstitutionRule<A> {
    /// Creates a rule.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&A) -> bool + Send + Sync + 'static,
        substitute: impl Fn(&mut A) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            substitute: Box::new(substitute),
        }
    }

    /// Label used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the rule, returning whether it matched.
    pub fn apply(&self, args: &mut A) -> bool {
        if (self.predicate)(args) {
            (self.substitute)(args);
            true
        } else {
            false
        }
    }
}

impl<A> fmt::Debug for SubstitutionRule<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubstitutionRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered substitution rules over argument set `A`.
///
/// # Examples
///
/// ```rust
/// use soshim::hook::SubstitutionTable;
///
/// let table = SubstitutionTable::new()
///     .rule("zero to one", |v: &u32| *v == 0, |v| *v = 1)
///     .rule("one to two", |v: &u32| *v == 1, |v| *v = 2);
///
/// let mut value = 0;
/// assert_eq!(table.apply(&mut value), 2);
/// assert_eq!(value, 2);
/// ```
pub struct SubstitutionTable<A> {
    rules: Vec<SubstitutionRule<A>>,
}

impl<A> SubstitutionTable<A> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule.
    #[must_use]
    pub fn rule(
        mut self,
        name: impl Into<String>,
        predicate: impl Fn(&A) -> bool + Send + Sync + 'static,
        substitute: impl Fn(&mut A) + Send + Sync + 'static,
    ) -> Self {
        self.push(SubstitutionRule::new(name, predicate, substitute));
        self
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: SubstitutionRule<A>) {
        self.rules.push(rule);
    }

    /// Applies every rule in order, returning how many matched.
    pub fn apply(&self, args: &mut A) -> usize {
        let mut matched = 0;
        for rule in &self.rules {
            if rule.apply(args) {
                log::debug!("substitution '{}' applied", rule.name());
                matched += 1;
            }
        }
        matched
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule labels in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(SubstitutionRule::name)
    }
}

impl<A> Default for SubstitutionTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for SubstitutionTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pair {
        left: usize,
        right: usize,
    }

    #[test]
    fn test_rules_see_previous_rewrites() {
        let table = SubstitutionTable::new()
            .rule("a", |p: &Pair| p.left == 1, |p| p.left = 2)
            .rule("b", |p: &Pair| p.left == 2, |p| p.right = 9);
        let mut pair = Pair { left: 1, right: 0 };
        assert_eq!(table.apply(&mut pair), 2);
        assert_eq!(pair, Pair { left: 2, right: 9 });
    }

    #[test]
    fn test_no_match_leaves_arguments() {
        let table = SubstitutionTable::new().rule("never", |_: &Pair| false, |p| p.left = 0);
        let mut pair = Pair { left: 5, right: 6 };
        assert_eq!(table.apply(&mut pair), 0);
        assert_eq!(pair, Pair { left: 5, right: 6 });
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["never"]);
        assert_eq!(table.len(), 1);
    }
}
