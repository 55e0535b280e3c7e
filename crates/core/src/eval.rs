//! Evaluation dimensions and the per-question requirement multiset.
//!
//! Each question carries a multiset of `(dimension, remaining_attempts)`
//! pairs. A failed evaluation decrements the failed dimension; a dimension
//! at zero is removed; the set becoming empty is the answer-side
//! termination signal (give up gracefully with the best answer so far).

use serde::{Deserialize, Serialize};

/// A quality dimension a candidate answer can be judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalDimension {
    /// The answer commits to a position instead of hedging.
    Definitive,
    /// The answer reflects current information where recency matters.
    Freshness,
    /// The answer covers multiple items where the question asks for them.
    Plurality,
    /// Claims are backed by the sources actually visited.
    Attribution,
    /// All parts of a multi-part question are addressed.
    Completeness,
    /// Catch-all holistic judgement; always present for the original question.
    Strict,
}

impl std::fmt::Display for EvalDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvalDimension::Definitive => "definitive",
            EvalDimension::Freshness => "freshness",
            EvalDimension::Plurality => "plurality",
            EvalDimension::Attribution => "attribution",
            EvalDimension::Completeness => "completeness",
            EvalDimension::Strict => "strict",
        };
        write!(f, "{s}")
    }
}

/// The remaining-attempts multiset for one question.
///
/// Decrements never go below zero; a dimension reaching zero is removed.
/// Sub-questions carry an empty set (their answers are not evaluated).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalRequirements {
    remaining: Vec<(EvalDimension, u32)>,
}

impl EvalRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension with a number of attempts. Adding an existing
    /// dimension replaces its attempt count.
    pub fn insert(&mut self, dimension: EvalDimension, attempts: u32) {
        self.remaining.retain(|(d, _)| *d != dimension);
        if attempts > 0 {
            self.remaining.push((dimension, attempts));
        }
    }

    pub fn contains(&self, dimension: EvalDimension) -> bool {
        self.remaining.iter().any(|(d, _)| *d == dimension)
    }

    pub fn attempts(&self, dimension: EvalDimension) -> Option<u32> {
        self.remaining.iter().find(|(d, _)| *d == dimension).map(|(_, n)| *n)
    }

    /// Decrement a dimension, removing it at zero. Returns the remaining
    /// attempts, or `None` if the dimension was absent or is now removed.
    pub fn decrement(&mut self, dimension: EvalDimension) -> Option<u32> {
        let idx = self.remaining.iter().position(|(d, _)| *d == dimension)?;
        let (_, n) = &mut self.remaining[idx];
        *n = n.saturating_sub(1);
        if *n == 0 {
            self.remaining.remove(idx);
            None
        } else {
            Some(self.remaining[idx].1)
        }
    }

    /// Empty set — the graceful-termination signal.
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The dimensions still in play, in the order given by `order`,
    /// followed by any present dimensions the order omits.
    pub fn ordered(&self, order: &[EvalDimension]) -> Vec<EvalDimension> {
        let mut out: Vec<EvalDimension> =
            order.iter().copied().filter(|d| self.contains(*d)).collect();
        for (d, _) in &self.remaining {
            if !out.contains(d) {
                out.push(*d);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_removes_at_zero() {
        let mut req = EvalRequirements::new();
        req.insert(EvalDimension::Strict, 2);
        assert_eq!(req.decrement(EvalDimension::Strict), Some(1));
        assert_eq!(req.decrement(EvalDimension::Strict), None);
        assert!(!req.contains(EvalDimension::Strict));
        assert!(req.is_exhausted());
    }

    #[test]
    fn decrement_absent_dimension_is_none() {
        let mut req = EvalRequirements::new();
        req.insert(EvalDimension::Freshness, 1);
        assert_eq!(req.decrement(EvalDimension::Plurality), None);
        assert!(req.contains(EvalDimension::Freshness));
    }

    #[test]
    fn insert_replaces_existing() {
        let mut req = EvalRequirements::new();
        req.insert(EvalDimension::Strict, 3);
        req.insert(EvalDimension::Strict, 1);
        assert_eq!(req.attempts(EvalDimension::Strict), Some(1));
    }

    #[test]
    fn insert_zero_attempts_is_noop() {
        let mut req = EvalRequirements::new();
        req.insert(EvalDimension::Strict, 0);
        assert!(req.is_exhausted());
    }

    #[test]
    fn ordered_respects_fixed_order() {
        let mut req = EvalRequirements::new();
        req.insert(EvalDimension::Strict, 1);
        req.insert(EvalDimension::Freshness, 1);
        req.insert(EvalDimension::Completeness, 1);
        let order = [
            EvalDimension::Freshness,
            EvalDimension::Plurality,
            EvalDimension::Attribution,
            EvalDimension::Completeness,
            EvalDimension::Strict,
        ];
        assert_eq!(
            req.ordered(&order),
            vec![EvalDimension::Freshness, EvalDimension::Completeness, EvalDimension::Strict]
        );
    }
}
