//! Session token budget
//!
//! The ledger only ever grows: `record` is its single mutator and there is no
//! refund path, because a failed or rejected turn has still consumed tokens.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};

/// Cumulative token consumption of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    tokens_used: u64,
    runs: u64,
    session_ceiling: u64,
}

impl BudgetLedger {
    pub fn new(session_ceiling: u64) -> Self {
        Self {
            tokens_used: 0,
            runs: 0,
            session_ceiling,
        }
    }

    /// Restore a persisted ledger
    pub fn restore(tokens_used: u64, runs: u64, session_ceiling: u64) -> Self {
        Self {
            tokens_used,
            runs,
            session_ceiling,
        }
    }

    /// Pre-flight check.
    ///
    /// Fails when `tokens_used + estimated` meets or exceeds the ceiling. The
    /// check does not cap the next call, so a single call may overshoot.
    pub fn check_run_budget(&self, estimated: u64) -> Result<(), EngineError> {
        let projected = self.tokens_used.saturating_add(estimated);
        if projected >= self.session_ceiling {
            tracing::warn!(
                used = self.tokens_used,
                estimated,
                ceiling = self.session_ceiling,
                "Session budget exhausted"
            );
            return Err(EngineError::BudgetExceeded {
                used: self.tokens_used,
                ceiling: self.session_ceiling,
            });
        }
        Ok(())
    }

    /// Add a finished run's tokens
    pub fn record(&mut self, tokens: u64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        self.runs += 1;
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn session_ceiling(&self) -> u64 {
        self.session_ceiling
    }

    pub fn remaining(&self) -> u64 {
        self.session_ceiling.saturating_sub(self.tokens_used)
    }

    /// Human-readable usage line, e.g. `1,234/100,000 tokens (1.2%)`
    pub fn summary(&self) -> String {
        let pct = if self.session_ceiling == 0 {
            0.0
        } else {
            self.tokens_used as f64 / self.session_ceiling as f64 * 100.0
        };
        format!(
            "{}/{} tokens ({:.1}%)",
            group_thousands(self.tokens_used),
            group_thousands(self.session_ceiling),
            pct
        )
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fresh_ledger_allows_run() {
        let ledger = BudgetLedger::new(100);
        assert!(ledger.check_run_budget(0).is_ok());
        assert_eq!(ledger.remaining(), 100);
    }

    #[test]
    fn test_exactly_at_ceiling_refuses() {
        let mut ledger = BudgetLedger::new(100);
        ledger.record(100);
        let err = ledger.check_run_budget(0).unwrap_err();
        assert!(matches!(
            err,
            EngineError::BudgetExceeded {
                used: 100,
                ceiling: 100
            }
        ));
        assert_eq!(ledger.remaining(), 0);
    }

    #[test]
    fn test_estimate_counts_toward_check() {
        let mut ledger = BudgetLedger::new(100);
        ledger.record(60);
        assert!(ledger.check_run_budget(39).is_ok());
        assert!(ledger.check_run_budget(40).is_err());
    }

    #[test]
    fn test_overshoot_is_recorded() {
        let mut ledger = BudgetLedger::new(100);
        ledger.record(250);
        assert_eq!(ledger.tokens_used(), 250);
        assert_eq!(ledger.remaining(), 0);
        assert_eq!(ledger.runs(), 1);
    }

    #[test]
    fn test_summary_format() {
        let mut ledger = BudgetLedger::new(100_000);
        ledger.record(1234);
        assert_eq!(ledger.summary(), "1,234/100,000 tokens (1.2%)");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    proptest! {
        #[test]
        fn prop_tokens_used_is_running_sum(
            records in proptest::collection::vec(0u64..50_000, 0..40)
        ) {
            let mut ledger = BudgetLedger::new(1_000_000);
            let mut expected = 0u64;
            let mut previous = 0u64;
            for t in &records {
                ledger.record(*t);
                expected += t;
                prop_assert_eq!(ledger.tokens_used(), expected);
                prop_assert!(ledger.tokens_used() >= previous);
                previous = ledger.tokens_used();
            }
            prop_assert_eq!(ledger.runs(), records.len() as u64);
        }

        #[test]
        fn prop_check_fails_iff_projection_meets_ceiling(
            used in 0u64..10_000,
            estimated in 0u64..10_000,
            ceiling in 1u64..20_000,
        ) {
            let mut ledger = BudgetLedger::new(ceiling);
            ledger.record(used);
            let result = ledger.check_run_budget(estimated);
            prop_assert_eq!(result.is_err(), used + estimated >= ceiling);
        }
    }
}
