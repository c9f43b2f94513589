//! Confidence gate: decides whether a classification is filed automatically
//! or held for human review.
//!
//! The gate is a pure function of the model's confidence and the owner's
//! threshold. It never looks at the capture text or the category.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Outcome of the confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoFile,
    NeedsReview,
}

/// Threshold to apply for an owner whose profile stores `configured`.
///
/// Only an absent or non-numeric (NaN, infinite) value falls back to the
/// default; a configured `0.0` is honoured and means "file everything".
/// Out-of-range values are clamped into [0, 1].
pub fn effective_threshold(configured: Option<f64>) -> f64 {
    match configured {
        Some(t) if t.is_finite() => t.clamp(0.0, 1.0),
        _ => defaults::CONFIDENCE_THRESHOLD,
    }
}

/// Compare `confidence` against `threshold`.
///
/// Equality files automatically. A NaN confidence never does.
pub fn decide(confidence: f64, threshold: f64) -> Decision {
    if confidence >= threshold {
        Decision::AutoFile
    } else {
        Decision::NeedsReview
    }
}

/// Gate bound to one owner's threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    /// Gate for a profile value as read from storage.
    pub fn for_profile(configured: Option<f64>) -> Self {
        Self {
            threshold: effective_threshold(configured),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, confidence: f64) -> Decision {
        decide(confidence, self.threshold)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::for_profile(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_when_absent() {
        assert_eq!(effective_threshold(None), 0.6);
        assert_eq!(effective_threshold(Some(f64::NAN)), 0.6);
        assert_eq!(effective_threshold(Some(f64::INFINITY)), 0.6);
    }

    #[test]
    fn test_zero_threshold_is_respected() {
        assert_eq!(effective_threshold(Some(0.0)), 0.0);
        assert_eq!(
            ConfidenceGate::for_profile(Some(0.0)).evaluate(0.0),
            Decision::AutoFile
        );
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(effective_threshold(Some(1.5)), 1.0);
        assert_eq!(effective_threshold(Some(-0.3)), 0.0);
        assert_eq!(effective_threshold(Some(0.8)), 0.8);
    }

    #[test]
    fn test_tie_auto_files() {
        assert_eq!(decide(0.6, 0.6), Decision::AutoFile);
        assert_eq!(decide(0.599_999, 0.6), Decision::NeedsReview);
    }

    #[test]
    fn test_examples_from_default_threshold() {
        let gate = ConfidenceGate::default();
        assert_eq!(gate.threshold(), 0.6);
        assert_eq!(gate.evaluate(0.92), Decision::AutoFile);
        assert_eq!(gate.evaluate(0.45), Decision::NeedsReview);
    }

    #[test]
    fn test_full_threshold_needs_certainty() {
        let gate = ConfidenceGate::for_profile(Some(1.0));
        assert_eq!(gate.evaluate(0.999), Decision::NeedsReview);
        assert_eq!(gate.evaluate(1.0), Decision::AutoFile);
    }

    #[test]
    fn test_nan_confidence_needs_review() {
        assert_eq!(decide(f64::NAN, 0.0), Decision::NeedsReview);
    }

    #[test]
    fn test_decision_monotonic_in_confidence() {
        let steps: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        for &threshold in &steps {
            let mut seen_auto = false;
            for &confidence in &steps {
                match decide(confidence, threshold) {
                    Decision::AutoFile => seen_auto = true,
                    Decision::NeedsReview => assert!(
                        !seen_auto,
                        "needs_review at {} after auto_file below it (threshold {})",
                        confidence, threshold
                    ),
                }
            }
        }
    }

    #[test]
    fn test_decision_monotonic_in_threshold() {
        let steps: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();
        for &confidence in &steps {
            let mut seen_review = false;
            for &threshold in &steps {
                match decide(confidence, threshold) {
                    Decision::NeedsReview => seen_review = true,
                    Decision::AutoFile => assert!(!seen_review),
                }
            }
        }
    }
}
