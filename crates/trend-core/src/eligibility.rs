//! Minimum bar a group must clear before it can trend.

use serde::{Deserialize, Serialize};

use crate::group::ScoredGroup;

pub const MIN_LOG_COUNT: usize = 2;
pub const MIN_AVERAGE_RATING: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRule {
    #[serde(default = "default_min_log_count")]
    pub min_log_count: usize,
    #[serde(default = "default_min_average_rating")]
    pub min_average_rating: f64,
}

impl Default for EligibilityRule {
    fn default() -> Self {
        Self {
            min_log_count: MIN_LOG_COUNT,
            min_average_rating: MIN_AVERAGE_RATING,
        }
    }
}

fn default_min_log_count() -> usize {
    MIN_LOG_COUNT
}

fn default_min_average_rating() -> f64 {
    MIN_AVERAGE_RATING
}

impl EligibilityRule {
    /// Unrated groups pass the rating check.
    pub fn accepts(&self, log_count: usize, average_rating: Option<f64>) -> bool {
        if log_count < self.min_log_count {
            return false;
        }
        match average_rating {
            Some(avg) => avg >= self.min_average_rating,
            None => true,
        }
    }

    pub fn is_eligible(&self, group: &ScoredGroup) -> bool {
        self.accepts(group.log_count(), group.average_rating())
    }
}

/// Default rule: at least two logs, and an average of 2.0 or more when rated.
pub fn is_eligible(group: &ScoredGroup) -> bool {
    EligibilityRule::default().is_eligible(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_log_never_trends() {
        let rule = EligibilityRule::default();
        for rating in [None, Some(1.0), Some(5.0)] {
            assert!(!rule.accepts(0, rating));
            assert!(!rule.accepts(1, rating));
        }
    }

    #[test]
    fn test_rating_threshold() {
        let rule = EligibilityRule::default();
        assert!(rule.accepts(2, Some(2.0)));
        assert!(!rule.accepts(2, Some(1.99)));
        assert!(rule.accepts(2, None));
        assert!(rule.accepts(50, Some(4.5)));
    }
}
