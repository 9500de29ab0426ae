//! Assessment scoring for completed executions.

use drill_core::{AssessmentReport, Execution};

const PASS_THRESHOLD: u32 = 80;

/// Score a completed execution: `round(100 * passed / total)` over the
/// scenario's step count, so skipped and failed steps both cost points.
/// An empty scenario scores 100.
pub fn build(execution: &Execution, total_steps: usize) -> AssessmentReport {
    let score = if total_steps == 0 {
        100
    } else {
        (100.0 * f64::from(execution.passed_steps) / total_steps as f64).round() as u32
    };

    AssessmentReport {
        score,
        passed: score >= PASS_THRESHOLD,
        summary: format!(
            "Executed {} steps. {} passed.",
            execution.steps.len(),
            execution.passed_steps
        ),
        artifacts: vec![format!("execution-log:{}", execution.id)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::ExecutionMode;
    use proptest::prelude::*;

    fn execution_with(passed: u32) -> Execution {
        let mut execution = Execution::pending("scn", ExecutionMode::Assessment, None);
        execution.passed_steps = passed;
        execution
    }

    #[test]
    fn half_passed_scores_fifty() {
        let report = build(&execution_with(1), 2);
        assert_eq!(report.score, 50);
        assert!(!report.passed);
    }

    #[test]
    fn empty_scenario_scores_hundred() {
        let report = build(&execution_with(0), 0);
        assert_eq!(report.score, 100);
        assert!(report.passed);
    }

    #[test]
    fn four_of_five_meets_the_bar() {
        let report = build(&execution_with(4), 5);
        assert_eq!(report.score, 80);
        assert!(report.passed);
    }

    proptest! {
        #[test]
        fn score_matches_formula(total in 1usize..40, passed in 0u32..40) {
            let passed = passed.min(total as u32);
            let report = build(&execution_with(passed), total);
            let expected = (100.0 * f64::from(passed) / total as f64).round() as u32;
            prop_assert_eq!(report.score, expected);
            prop_assert!(report.score <= 100);
            prop_assert_eq!(report.passed, report.score >= 80);
        }
    }
}
