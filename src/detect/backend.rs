use anyhow::Result;

use crate::detect::result::{HandObservation, ObjectObservation};
use crate::frame::DecodedImage;

/// Hand-landmark detector.
///
/// Implementations own model state and are not assumed to be reentrant;
/// callers serialize access (see [`Perception`](crate::detect::Perception)).
pub trait HandDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect hands, reporting wrist and index fingertip in source-image pixels.
    fn detect(&mut self, image: &DecodedImage) -> Result<HandObservation>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Bounding-box object detector restricted to the fixed vocabulary.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect objects. Entries at or below the acceptance threshold must not
    /// appear in the result; [`ObjectObservation::insert`] enforces this.
    fn detect(&mut self, image: &DecodedImage) -> Result<ObjectObservation>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
