//! Run-all-and-report aggregation of pair outcomes.

use std::time::Duration;

use tracing::info;

use crate::{Error, Result};

/// Result of probing one pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairOutcome {
    /// Pod the probe ran in
    pub source: String,
    /// Pod the probe was aimed at
    pub target: String,
    /// Whether the probe eventually succeeded
    pub passed: bool,
    /// Attempts spent, including the successful one
    pub attempts: u32,
    /// Wall time across all attempts
    pub duration: Duration,
    /// Last error when the pair failed
    pub error: Option<String>,
}

impl PairOutcome {
    pub fn passed(source: &str, target: &str, attempts: u32, duration: Duration) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            passed: true,
            attempts,
            duration,
            error: None,
        }
    }

    pub fn failed(
        source: &str,
        target: &str,
        attempts: u32,
        duration: Duration,
        error: String,
    ) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            passed: false,
            attempts,
            duration,
            error: Some(error),
        }
    }

    /// `source -> target`
    pub fn label(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }
}

/// Every pair outcome from one probe run, in pair order
#[derive(Clone, Debug, Default)]
pub struct ProbeReport {
    outcomes: Vec<PairOutcome>,
}

impl ProbeReport {
    pub fn new(outcomes: Vec<PairOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[PairOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// Log a PASS/FAIL line per pair and a totals line
    pub fn log_summary(&self) {
        let total_duration: Duration = self.outcomes.iter().map(|o| o.duration).sum();

        info!("========================================");
        info!("  CONNECTIVITY");
        info!("========================================");
        for o in &self.outcomes {
            let tag = if o.passed { "PASS" } else { "FAIL" };
            info!(
                "  {tag}  {:40} {} attempt(s) {:.1}s",
                o.label(),
                o.attempts,
                o.duration.as_secs_f64()
            );
            if let Some(ref e) = o.error {
                let truncated: String = e.chars().take(200).collect();
                info!("        -> {truncated}");
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed ({:.1}s total)",
            self.passed(),
            self.failed(),
            total_duration.as_secs_f64()
        );
        info!("========================================");
    }

    /// Conjunction of all pair outcomes. Fails listing every failing pair.
    pub fn finish(&self) -> Result<()> {
        let failed = self.failed();
        if failed == 0 {
            return Ok(());
        }

        let pairs: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(PairOutcome::label)
            .collect();
        Err(Error::ProbeFailed {
            failed,
            total: self.total(),
            pairs: pairs.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(s: &str, t: &str) -> PairOutcome {
        PairOutcome::passed(s, t, 1, Duration::from_millis(20))
    }

    fn bad(s: &str, t: &str) -> PairOutcome {
        PairOutcome::failed(s, t, 10, Duration::from_secs(3), "command exited with code 7".into())
    }

    #[test]
    fn empty_report_passes() {
        let report = ProbeReport::default();
        assert_eq!(report.total(), 0);
        assert!(report.finish().is_ok());
    }

    #[test]
    fn last_pair_passing_does_not_mask_earlier_failures() {
        let report = ProbeReport::new(vec![bad("a", "b"), ok("a", "c"), ok("b", "c")]);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.finish(),
            Err(Error::ProbeFailed { failed: 1, total: 3, .. })
        ));
    }

    #[test]
    fn failure_lists_every_failing_pair() {
        let report = ProbeReport::new(vec![bad("a", "b"), ok("a", "c"), bad("b", "c")]);
        let msg = report.finish().unwrap_err().to_string();
        assert!(msg.contains("a -> b, b -> c"), "got: {}", msg);
    }

    #[test]
    fn long_errors_do_not_break_the_summary() {
        let mut outcome = bad("a", "b");
        outcome.error = Some("é".repeat(500));
        ProbeReport::new(vec![outcome]).log_summary();
    }
}
