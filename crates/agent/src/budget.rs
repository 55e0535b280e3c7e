//! Budget & clock — token, step, and wall-clock accounting for one session.
//!
//! Single-writer: the controller owns the clock and mutates it between
//! steps, so plain `&mut` access suffices. `tokens_used` is monotone
//! non-decreasing; `total_steps` never resets; `step_count` resets on
//! replanning.

use std::time::{Duration, Instant};

/// Tracks consumption against the session's budgets.
#[derive(Debug)]
pub struct BudgetClock {
    token_budget: u64,
    tokens_used: u64,
    /// Fraction of the token budget available to the regular loop; the
    /// remainder is reserved for the beast-mode attempt.
    beast_ratio: f64,
    step_limit: u32,
    step_count: u32,
    total_step_count: u32,
    start: Instant,
    deadline: Instant,
}

impl BudgetClock {
    pub fn new(token_budget: u64, step_limit: u32, max_duration: Duration, beast_ratio: f64) -> Self {
        let start = Instant::now();
        Self {
            token_budget,
            tokens_used: 0,
            beast_ratio,
            step_limit,
            step_count: 0,
            total_step_count: 0,
            start,
            deadline: start + max_duration,
        }
    }

    /// Record tokens consumed by any LLM call, successful or not.
    pub fn record_tokens(&mut self, n: u64) {
        self.tokens_used += n;
    }

    /// Advance both step counters. Returns the new total step count.
    pub fn tick_step(&mut self) -> u32 {
        self.step_count += 1;
        self.total_step_count += 1;
        self.total_step_count
    }

    /// Replanning resets the per-plan counter only.
    pub fn reset_step_count(&mut self) {
        self.step_count = 0;
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn remaining(&self) -> u64 {
        self.token_budget.saturating_sub(self.tokens_used)
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn total_steps(&self) -> u32 {
        self.total_step_count
    }

    /// Gate #2: the regular loop stops at `beast_ratio` of the budget.
    pub fn over_beast_threshold(&self) -> bool {
        self.tokens_used as f64 >= self.beast_ratio * self.token_budget as f64
    }

    /// Gate #3.
    pub fn step_limit_exceeded(&self) -> bool {
        self.total_step_count >= self.step_limit
    }

    /// Gate #4.
    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(budget: u64) -> BudgetClock {
        BudgetClock::new(budget, 10, Duration::from_secs(60), 0.85)
    }

    #[test]
    fn tokens_are_monotone() {
        let mut c = clock(1000);
        c.record_tokens(100);
        c.record_tokens(0);
        c.record_tokens(50);
        assert_eq!(c.tokens_used(), 150);
        assert_eq!(c.remaining(), 850);
    }

    #[test]
    fn beast_threshold_at_85_percent() {
        let mut c = clock(10_000);
        c.record_tokens(8_499);
        assert!(!c.over_beast_threshold());
        c.record_tokens(1);
        assert!(c.over_beast_threshold());
    }

    #[test]
    fn total_steps_survive_replan_reset() {
        let mut c = clock(1000);
        c.tick_step();
        c.tick_step();
        c.tick_step();
        assert_eq!(c.step_count(), 3);
        assert_eq!(c.total_steps(), 3);
        c.reset_step_count();
        assert_eq!(c.step_count(), 0);
        assert_eq!(c.total_steps(), 3);
        c.tick_step();
        assert_eq!(c.total_steps(), 4);
    }

    #[test]
    fn step_limit_gate() {
        let mut c = BudgetClock::new(1000, 2, Duration::from_secs(60), 0.85);
        assert!(!c.step_limit_exceeded());
        c.tick_step();
        c.tick_step();
        assert!(c.step_limit_exceeded());
    }

    #[test]
    fn deadline_gate() {
        let c = BudgetClock::new(1000, 10, Duration::from_millis(0), 0.85);
        assert!(c.deadline_exceeded());
        let c2 = clock(1000);
        assert!(!c2.deadline_exceeded());
    }

    #[test]
    fn remaining_saturates() {
        let mut c = clock(100);
        c.record_tokens(500);
        assert_eq!(c.remaining(), 0);
    }
}
