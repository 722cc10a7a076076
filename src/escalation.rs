//! Confidence gate in front of the secondary inference path.

/// Default confidence below which a rule-based verdict is escalated.
pub const DEFAULT_ESCALATION_CONFIDENCE: f32 = 0.70;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EscalationGate {
    threshold: f32,
}

impl EscalationGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Escalate iff `confidence` is strictly below the threshold.
    pub fn should_escalate(&self, confidence: f32) -> bool {
        confidence < self.threshold
    }
}

impl Default for EscalationGate {
    fn default() -> Self {
        Self::new(DEFAULT_ESCALATION_CONFIDENCE)
    }
}
