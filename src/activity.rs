//! Activity vocabulary and verdicts.
//!
//! The seven categories are a closed, process-wide table. Their numeric codes
//! are part of the client contract and never change.

use serde::Serialize;

/// What the observed person is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityCategory {
    UsingPhone,
    Working,
    PhoneWhileWorking,
    Sleeping,
    Eating,
    Drinking,
    Other,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 7] = [
        ActivityCategory::UsingPhone,
        ActivityCategory::Working,
        ActivityCategory::PhoneWhileWorking,
        ActivityCategory::Sleeping,
        ActivityCategory::Eating,
        ActivityCategory::Drinking,
        ActivityCategory::Other,
    ];

    /// Numeric code in `1..=7`.
    pub fn code(self) -> u8 {
        match self {
            ActivityCategory::UsingPhone => 1,
            ActivityCategory::Working => 2,
            ActivityCategory::PhoneWhileWorking => 3,
            ActivityCategory::Sleeping => 4,
            ActivityCategory::Eating => 5,
            ActivityCategory::Drinking => 6,
            ActivityCategory::Other => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.code() == code)
    }

    /// Human-readable label shown by the monitoring client.
    pub fn label(self) -> &'static str {
        match self {
            ActivityCategory::UsingPhone => "Using phone",
            ActivityCategory::Working => "Working",
            ActivityCategory::PhoneWhileWorking => "Using phone while working",
            ActivityCategory::Sleeping => "Sleeping",
            ActivityCategory::Eating => "Eating",
            ActivityCategory::Drinking => "Drinking",
            ActivityCategory::Other => "Other",
        }
    }
}

impl Serialize for ActivityCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl std::fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.label())
    }
}

/// One classification outcome. Produced by exactly one decision path per request.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityVerdict {
    pub category: ActivityCategory,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub rationale: String,
}

impl ActivityVerdict {
    pub fn new(category: ActivityCategory, confidence: f32, rationale: impl Into<String>) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_cover_one_through_seven() {
        let codes: Vec<u8> = ActivityCategory::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7]);
        for code in 1..=7 {
            assert_eq!(ActivityCategory::from_code(code).unwrap().code(), code);
        }
        assert!(ActivityCategory::from_code(0).is_none());
        assert!(ActivityCategory::from_code(8).is_none());
    }

    #[test]
    fn category_serializes_as_code() {
        let json = serde_json::to_string(&ActivityCategory::PhoneWhileWorking).unwrap();
        assert_eq!(json, "3");
    }

    #[test]
    fn verdict_confidence_is_clamped() {
        let verdict = ActivityVerdict::new(ActivityCategory::Other, 1.7, "x");
        assert_eq!(verdict.confidence, 1.0);
    }
}
