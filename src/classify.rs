//! Rule-based activity classifier.
//!
//! Hand and object observations are reduced to a handful of booleans, then
//! matched against an ordered rule table. Categories overlap, so the table
//! order is the contract: the first matching rule wins.

use crate::activity::{ActivityCategory, ActivityVerdict};
use crate::detect::{HandObservation, ObjectCategory, ObjectObservation};
use crate::proximity::{is_near, DEFAULT_PROXIMITY_PX};

/// Booleans the rule table is written against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    pub hand_detected: bool,
    pub phone_in_hand: bool,
    pub working: bool,
    pub has_food: bool,
    pub has_drink: bool,
    pub has_bed: bool,
}

impl Signals {
    /// Derive signals from one image's observations.
    ///
    /// Phone-in-hand compares the phone box centre against the hand's wrist
    /// landmark, not the fingertip.
    pub fn derive(hands: &HandObservation, objects: &ObjectObservation, proximity_px: f32) -> Self {
        let phones = objects.get(ObjectCategory::Phone);
        let phone_in_hand = hands.positions().iter().any(|hand| {
            phones
                .iter()
                .any(|phone| is_near(phone.center, hand.wrist, proximity_px))
        });
        Self {
            hand_detected: hands.detected(),
            phone_in_hand,
            working: objects.has(ObjectCategory::Laptop)
                || objects.has(ObjectCategory::Keyboard)
                || objects.has(ObjectCategory::Mouse),
            has_food: objects.has(ObjectCategory::Food),
            has_drink: objects.has(ObjectCategory::Cup) || objects.has(ObjectCategory::Bottle),
            has_bed: objects.has(ObjectCategory::Bed),
        }
    }
}

struct Rule {
    when: fn(&Signals) -> bool,
    category: ActivityCategory,
    confidence: f32,
    rationale: &'static str,
}

const RULES: [Rule; 7] = [
    Rule {
        when: |s| s.phone_in_hand && s.working,
        category: ActivityCategory::PhoneWhileWorking,
        confidence: 0.90,
        rationale: "Phone detected near hand with computer equipment visible",
    },
    Rule {
        when: |s| s.phone_in_hand && !s.working,
        category: ActivityCategory::UsingPhone,
        confidence: 0.85,
        rationale: "Phone detected near hand, no work equipment",
    },
    Rule {
        when: |s| s.working && !s.phone_in_hand && s.hand_detected,
        category: ActivityCategory::Working,
        confidence: 0.80,
        rationale: "Hands detected with computer equipment, no phone in hand",
    },
    Rule {
        when: |s| s.has_bed && !s.hand_detected,
        category: ActivityCategory::Sleeping,
        confidence: 0.75,
        rationale: "Bed detected with no hand movement",
    },
    Rule {
        when: |s| s.has_food && s.hand_detected,
        category: ActivityCategory::Eating,
        confidence: 0.75,
        rationale: "Food detected with hand movement",
    },
    Rule {
        when: |s| s.has_drink && s.hand_detected,
        category: ActivityCategory::Drinking,
        confidence: 0.70,
        rationale: "Drink detected with hand movement",
    },
    Rule {
        when: |s| s.hand_detected,
        category: ActivityCategory::Other,
        confidence: 0.40,
        rationale: "Hands detected but unclear activity",
    },
];

const NO_MATCH: Rule = Rule {
    when: |_| true,
    category: ActivityCategory::Other,
    confidence: 0.30,
    rationale: "Insufficient detection data",
};

/// Resolve signals to a verdict. Total: every input yields a verdict.
pub fn evaluate(signals: &Signals) -> ActivityVerdict {
    let rule = RULES
        .iter()
        .find(|rule| (rule.when)(signals))
        .unwrap_or(&NO_MATCH);
    ActivityVerdict::new(rule.category, rule.confidence, rule.rationale)
}

/// Primary classifier over perception observations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuleClassifier {
    proximity_px: f32,
}

impl RuleClassifier {
    pub fn new(proximity_px: f32) -> Self {
        Self { proximity_px }
    }

    pub fn proximity_px(&self) -> f32 {
        self.proximity_px
    }

    pub fn classify(&self, hands: &HandObservation, objects: &ObjectObservation) -> ActivityVerdict {
        let signals = Signals::derive(hands, objects, self.proximity_px);
        log::debug!("rule signals: {:?}", signals);
        evaluate(&signals)
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PROXIMITY_PX)
    }
}
