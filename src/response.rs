//! Outward-facing result documents.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::activity::ActivityCategory;
use crate::engine::Analysis;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionDetails {
    pub hands_detected: bool,
    pub hand_count: usize,
    /// Only categories with at least one detection.
    pub objects_detected: BTreeMap<&'static str, usize>,
}

/// Successful classification as returned to the monitoring client.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub category: ActivityCategory,
    pub activity: &'static str,
    pub confidence: f32,
    pub reasoning: String,
    pub method: &'static str,
    /// Seconds, rounded to milliseconds.
    pub processing_time: f64,
    pub details: DetectionDetails,
}

impl AnalysisReport {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let objects_detected = analysis
            .objects
            .nonzero_counts()
            .into_iter()
            .map(|(category, count)| (category.name(), count))
            .collect();
        Self {
            success: true,
            category: analysis.verdict.category,
            activity: analysis.verdict.category.label(),
            confidence: analysis.verdict.confidence,
            reasoning: analysis.verdict.rationale.clone(),
            method: analysis.method.label(),
            processing_time: (analysis.elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
            details: DetectionDetails {
                hands_detected: analysis.hands.detected(),
                hand_count: analysis.hands.count(),
                objects_detected,
            },
        }
    }
}

/// Failure body. Still names a category so naive clients can render something.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    pub error: String,
    pub category: ActivityCategory,
    pub activity: &'static str,
}

impl ErrorReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            category: ActivityCategory::Other,
            activity: ActivityCategory::Other.label(),
        }
    }
}
