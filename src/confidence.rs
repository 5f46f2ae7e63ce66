//! Running confidence for one domain's resolution.
//!
//! Every comparison test adds its weight to the maximum attainable score and
//! `round(similarity * weight)` to the score itself. The accumulator is reset at
//! the start of each domain so nothing leaks between domains.

use serde::Serialize;
use tracing::debug;

/// One completed comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTest {
    pub similarity: f64,
    pub weight: u32,
    pub description: String,
    pub passed: bool,
}

/// Snapshot of the accumulator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceState {
    pub confidence: u32,
    pub max_possible_confidence: u32,
    pub tests_passed: u32,
    pub total_tests: u32,
}

#[derive(Debug, Default)]
pub struct ConfidenceAccumulator {
    state: ConfidenceState,
    tests: Vec<ComparisonTest>,
}

impl ConfidenceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to zero on every counter and forget recorded tests.
    pub fn reset(&mut self) {
        self.state = ConfidenceState::default();
        self.tests.clear();
    }

    /// Record a finished test. Similarity is clamped to `0.0..=1.0`.
    pub fn record(&mut self, similarity: f64, weight: u32, description: &str) -> &ComparisonTest {
        let similarity = if similarity.is_nan() { 0.0 } else { similarity.clamp(0.0, 1.0) };
        let contribution = (similarity * weight as f64).round() as u32;

        self.state.max_possible_confidence += weight;
        self.state.total_tests += 1;

        // passed follows similarity; the counters only move on a nonzero rounded contribution
        let passed = similarity > 0.0;
        if contribution > 0 {
            self.state.confidence += contribution;
            self.state.tests_passed += 1;
        }

        debug!(
            "Test '{}': similarity {:.3} x weight {} -> +{} (confidence {}/{})",
            description,
            similarity,
            weight,
            contribution,
            self.state.confidence,
            self.state.max_possible_confidence
        );

        self.tests.push(ComparisonTest {
            similarity,
            weight,
            description: description.to_string(),
            passed,
        });
        // just pushed
        &self.tests[self.tests.len() - 1]
    }

    pub fn should_stop_early(&self, threshold: u32) -> bool {
        self.state.confidence >= threshold
    }

    /// `round(100 * confidence / max)`, 0 before any test ran.
    pub fn percentage(&self) -> u32 {
        if self.state.max_possible_confidence == 0 {
            return 0;
        }
        (100.0 * self.state.confidence as f64 / self.state.max_possible_confidence as f64).round() as u32
    }

    pub fn state(&self) -> ConfidenceState {
        self.state
    }

    pub fn tests(&self) -> &[ComparisonTest] {
        &self.tests
    }
}
