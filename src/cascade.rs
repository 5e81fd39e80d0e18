//! First-match rule lists.
//!
//! A cascade is an ordered list of named `(predicate, outcome)` rules plus a
//! fallback. Rules are evaluated top to bottom and the first predicate that
//! holds decides the outcome, so priority order is data that can be listed and
//! tested rather than a chain of nested conditionals.

use std::fmt;

type Predicate<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

struct Rule<C, T> {
    name: String,
    predicate: Predicate<C>,
    outcome: T,
}

pub struct Cascade<C, T> {
    rules: Vec<Rule<C, T>>,
    fallback_name: String,
    fallback: T,
}

/// Outcome of a cascade evaluation and the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<'a, T> {
    pub outcome: T,
    pub rule: &'a str,
    /// Position of the rule; the fallback sits after the last rule.
    pub position: usize,
}

impl<C, T: Clone> Cascade<C, T> {
    pub fn new(fallback_name: impl Into<String>, fallback: T) -> Self {
        Self {
            rules: Vec::new(),
            fallback_name: fallback_name.into(),
            fallback,
        }
    }

    /// Append a rule after the existing ones.
    pub fn rule<F>(mut self, name: impl Into<String>, outcome: T, predicate: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name: name.into(),
            predicate: Box::new(predicate),
            outcome,
        });
        self
    }

    pub fn evaluate(&self, ctx: &C) -> Decision<'_, T> {
        for (position, rule) in self.rules.iter().enumerate() {
            if (rule.predicate)(ctx) {
                return Decision {
                    outcome: rule.outcome.clone(),
                    rule: &rule.name,
                    position,
                };
            }
        }
        Decision {
            outcome: self.fallback.clone(),
            rule: &self.fallback_name,
            position: self.rules.len(),
        }
    }

    /// Rule names in evaluation order, fallback last.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .map(|r| r.name.as_str())
            .chain(std::iter::once(self.fallback_name.as_str()))
            .collect()
    }

    /// Number of rules, not counting the fallback.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<C, T: fmt::Debug> fmt::Debug for Cascade<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for rule in &self.rules {
            list.entry(&(rule.name.as_str(), &rule.outcome));
        }
        list.entry(&(self.fallback_name.as_str(), &self.fallback));
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_cascade() -> Cascade<i32, &'static str> {
        Cascade::new("zero", "zero")
            .rule("negative", "neg", |x: &i32| *x < 0)
            .rule("large", "large", |x: &i32| *x > 100)
            .rule("positive", "pos", |x: &i32| *x > 0)
    }

    #[test]
    fn first_matching_rule_wins() {
        let c = sign_cascade();
        let d = c.evaluate(&500);
        assert_eq!(d.outcome, "large");
        assert_eq!(d.rule, "large");
        assert_eq!(d.position, 1);
        assert_eq!(c.evaluate(&5).outcome, "pos");
    }

    #[test]
    fn falls_back_when_nothing_matches() {
        let c = sign_cascade();
        let d = c.evaluate(&0);
        assert_eq!(d.outcome, "zero");
        assert_eq!(d.position, c.len());
    }

    #[test]
    fn rule_names_follow_insertion_order() {
        assert_eq!(
            sign_cascade().rule_names(),
            vec!["negative", "large", "positive", "zero"]
        );
    }
}
