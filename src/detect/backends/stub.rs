use anyhow::Result;

use crate::detect::backend::{HandDetector, ObjectDetector};
use crate::detect::result::{HandObservation, ObjectObservation};
use crate::frame::DecodedImage;

/// Stub hand detector. Returns a preset observation for every image.
///
/// The default reports no hands, which makes every request fall through to
/// the secondary inference path.
#[derive(Clone, Debug, Default)]
pub struct StubHandDetector {
    observation: HandObservation,
}

impl StubHandDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(observation: HandObservation) -> Self {
        Self { observation }
    }
}

impl HandDetector for StubHandDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &DecodedImage) -> Result<HandObservation> {
        Ok(self.observation.clone())
    }
}

/// Stub object detector. Returns a preset observation for every image.
#[derive(Clone, Debug, Default)]
pub struct StubObjectDetector {
    observation: ObjectObservation,
}

impl StubObjectDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(observation: ObjectObservation) -> Self {
        Self { observation }
    }
}

impl ObjectDetector for StubObjectDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &DecodedImage) -> Result<ObjectObservation> {
        Ok(self.observation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stubs_report_nothing() {
        let image = DecodedImage::from_rgb(vec![0; 3], 1, 1).unwrap();
        let hands = StubHandDetector::new().detect(&image).unwrap();
        let objects = StubObjectDetector::new().detect(&image).unwrap();
        assert!(!hands.detected());
        assert!(objects.nonzero_counts().is_empty());
    }
}
