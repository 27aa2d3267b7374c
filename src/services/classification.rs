//! Learner classification rules.
//!
//! Everything here is pure: callers load completed attempts, map them to
//! [`AttemptView`]s and every monitoring view goes through [`classify`].

use std::collections::HashMap;
use uuid::Uuid;

use crate::database::models::QuizAttempt;
use crate::types::LearnerStatus;

/// Failed attempts within one module at which a learner counts as struggling
pub const STRUGGLING_FAILURE_THRESHOLD: usize = 5;

/// Minimum per-module average score for the strict "active" bar
pub const ACTIVE_SCORE_THRESHOLD: f64 = 85.0;

/// The slice of a completed attempt the rules look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptView {
    /// `None` when the quiz no longer resolves to a module
    pub module_id: Option<Uuid>,
    pub score: f64,
    pub passed: bool,
}

impl AttemptView {
    pub fn from_attempt(attempt: &QuizAttempt, module_id: Option<Uuid>) -> Self {
        Self {
            module_id,
            score: attempt.score.unwrap_or(0.0),
            passed: attempt.passed,
        }
    }
}

/// Failed attempts per module. Attempts without a module are skipped.
pub fn failures_by_module(attempts: &[AttemptView]) -> HashMap<Uuid, usize> {
    let mut failures = HashMap::new();
    for attempt in attempts.iter().filter(|a| !a.passed) {
        if let Some(module_id) = attempt.module_id {
            *failures.entry(module_id).or_insert(0) += 1;
        }
    }
    failures
}

/// Mean score per touched module, pass or fail
pub fn average_score_by_module(attempts: &[AttemptView]) -> HashMap<Uuid, f64> {
    let mut sums: HashMap<Uuid, (f64, usize)> = HashMap::new();
    for attempt in attempts {
        if let Some(module_id) = attempt.module_id {
            let entry = sums.entry(module_id).or_insert((0.0, 0));
            entry.0 += attempt.score;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(module_id, (sum, count))| (module_id, sum / count as f64))
        .collect()
}

pub fn is_stuck_in(attempts: &[AttemptView], module_id: Uuid) -> bool {
    failures_by_module(attempts).get(&module_id).copied().unwrap_or(0) >= STRUGGLING_FAILURE_THRESHOLD
}

pub fn is_struggling(attempts: &[AttemptView]) -> bool {
    failures_by_module(attempts)
        .values()
        .any(|&count| count >= STRUGGLING_FAILURE_THRESHOLD)
}

/// Every touched module averages at least [`ACTIVE_SCORE_THRESHOLD`].
/// False when no attempt resolves to a module.
pub fn meets_score_bar(attempts: &[AttemptView]) -> bool {
    let averages = average_score_by_module(attempts);
    !averages.is_empty() && averages.values().all(|&avg| avg >= ACTIVE_SCORE_THRESHOLD)
}

/// First matching rule wins: no attempts is inactive, five failures in any one
/// module is struggling, anything else is active.
///
/// Learners below the score bar are still active; there is no separate
/// "learning" bucket. [`meets_score_bar`] reports the strict bar on its own.
pub fn classify(attempts: &[AttemptView]) -> LearnerStatus {
    if attempts.is_empty() {
        return LearnerStatus::Inactive;
    }
    if is_struggling(attempts) {
        return LearnerStatus::Struggling;
    }
    LearnerStatus::Active
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(module_id: Uuid, scores: &[f64], passing: f64) -> Vec<AttemptView> {
        scores
            .iter()
            .map(|&score| AttemptView { module_id: Some(module_id), score, passed: score >= passing })
            .collect()
    }

    #[test]
    fn no_attempts_is_inactive() {
        assert_eq!(classify(&[]), LearnerStatus::Inactive);
    }

    #[test]
    fn five_failures_in_one_module_is_struggling() {
        let m = Uuid::new_v4();
        let five = attempts(m, &[10.0, 20.0, 30.0, 40.0, 50.0], 70.0);
        assert_eq!(classify(&five), LearnerStatus::Struggling);

        let four = attempts(m, &[10.0, 20.0, 30.0, 40.0], 70.0);
        assert_eq!(classify(&four), LearnerStatus::Active);
    }

    #[test]
    fn failures_spread_across_modules_do_not_add_up() {
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut spread = attempts(m1, &[0.0; 4], 70.0);
        spread.extend(attempts(m2, &[0.0; 4], 70.0));
        assert_eq!(classify(&spread), LearnerStatus::Active);
        assert!(!is_struggling(&spread));
    }

    #[test]
    fn struggling_beats_high_scores_elsewhere() {
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut history = attempts(m1, &[100.0; 20], 70.0);
        history.extend(attempts(m2, &[0.0; 5], 70.0));
        assert_eq!(classify(&history), LearnerStatus::Struggling);
    }

    #[test]
    fn score_bar_boundary() {
        let m = Uuid::new_v4();
        assert!(meets_score_bar(&attempts(m, &[85.0, 85.0], 70.0)));
        assert!(meets_score_bar(&attempts(m, &[100.0, 70.0], 70.0)));
        assert!(!meets_score_bar(&attempts(m, &[84.9], 70.0)));
        // Below the bar still lands on active
        assert_eq!(classify(&attempts(m, &[84.9], 70.0)), LearnerStatus::Active);
    }

    #[test]
    fn score_bar_needs_every_module() {
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let mut history = attempts(m1, &[100.0], 70.0);
        history.extend(attempts(m2, &[50.0], 70.0));
        assert!(!meets_score_bar(&history));
    }

    #[test]
    fn attempts_without_module_are_skipped_but_still_count_as_activity() {
        let orphan = [AttemptView { module_id: None, score: 0.0, passed: false }; 6];
        assert!(failures_by_module(&orphan).is_empty());
        assert!(!meets_score_bar(&orphan));
        assert_eq!(classify(&orphan), LearnerStatus::Active);
    }

    #[test]
    fn stuck_is_per_module() {
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let history = attempts(m1, &[0.0; 5], 70.0);
        assert!(is_stuck_in(&history, m1));
        assert!(!is_stuck_in(&history, m2));
    }
}
