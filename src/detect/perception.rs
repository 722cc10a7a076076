use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::detect::backend::{HandDetector, ObjectDetector};
use crate::detect::result::{HandObservation, ObjectObservation};
use crate::frame::DecodedImage;

/// Shared pair of perception backends.
///
/// Backends are wrapped in `Mutex` because `detect` takes `&mut self`; the
/// lock serializes model invocation across concurrent requests. Cloning
/// shares the same model instances.
#[derive(Clone)]
pub struct Perception {
    hands: Arc<Mutex<dyn HandDetector>>,
    objects: Arc<Mutex<dyn ObjectDetector>>,
    hand_name: &'static str,
    object_name: &'static str,
}

impl Perception {
    pub fn new<H, O>(hands: H, objects: O) -> Self
    where
        H: HandDetector + 'static,
        O: ObjectDetector + 'static,
    {
        let hand_name = hands.name();
        let object_name = objects.name();
        Self {
            hands: Arc::new(Mutex::new(hands)),
            objects: Arc::new(Mutex::new(objects)),
            hand_name,
            object_name,
        }
    }

    pub fn hand_backend(&self) -> &'static str {
        self.hand_name
    }

    pub fn object_backend(&self) -> &'static str {
        self.object_name
    }

    /// Run both warm-up hooks.
    pub fn warm_up(&self) -> Result<()> {
        guarded(&*self.hands, "hand", self.hand_name, |detector| detector.warm_up())
            .context("hand detector warm-up failed")?;
        guarded(&*self.objects, "object", self.object_name, |detector| {
            detector.warm_up()
        })
        .context("object detector warm-up failed")?;
        Ok(())
    }

    /// Run both detectors. Either failing fails the whole observation; there
    /// is no partial result. A detector panic fails only the current call.
    pub fn observe(&self, image: &DecodedImage) -> Result<(HandObservation, ObjectObservation)> {
        let hands = guarded(&*self.hands, "hand", self.hand_name, |detector| {
            detector.detect(image)
        })
        .with_context(|| format!("hand detector '{}' failed", self.hand_name))?;
        let objects = guarded(&*self.objects, "object", self.object_name, |detector| {
            detector.detect(image)
        })
        .with_context(|| format!("object detector '{}' failed", self.object_name))?;
        Ok((hands, objects))
    }
}

/// Lock one detector and run `f` on it.
///
/// A panic inside `f` is caught and reported as an error, so the lock is
/// released unpoisoned. A lock poisoned elsewhere is recovered with a warning.
fn guarded<D, T, F>(slot: &Mutex<D>, role: &str, backend: &str, f: F) -> Result<T>
where
    D: ?Sized,
    F: FnOnce(&mut D) -> Result<T>,
{
    let mut guard = slot.lock().unwrap_or_else(|poisoned| {
        log::warn!("{} detector '{}' lock was poisoned; recovering", role, backend);
        poisoned.into_inner()
    });
    match panic::catch_unwind(AssertUnwindSafe(|| f(&mut *guard))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{} detector '{}' panicked: {}", role, backend, reason);
            Err(anyhow!("{} detector panicked: {}", role, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{StubHandDetector, StubObjectDetector};
    use crate::detect::result::{BoundingBox, HandPosition, ObjectCategory, Point};

    struct FailingObjects;

    impl ObjectDetector for FailingObjects {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _image: &DecodedImage) -> Result<ObjectObservation> {
            Err(anyhow!("model exploded"))
        }
    }

    fn image() -> DecodedImage {
        DecodedImage::from_rgb(vec![0; 12], 2, 2).unwrap()
    }

    #[test]
    fn observe_returns_both_observations() {
        let hand = HandPosition {
            wrist: Point::new(1.0, 1.0),
            fingertip: Point::new(2.0, 2.0),
        };
        let objects = ObjectObservation::empty().with(
            ObjectCategory::Laptop,
            BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
            0.9,
        );
        let perception = Perception::new(
            StubHandDetector::with(HandObservation::from_positions(vec![hand])),
            StubObjectDetector::with(objects),
        );
        let (hands, objects) = perception.observe(&image()).unwrap();
        assert_eq!(hands.count(), 1);
        assert!(objects.has(ObjectCategory::Laptop));
        assert_eq!(perception.hand_backend(), "stub");
    }

    #[test]
    fn detector_error_is_not_masked() {
        let perception = Perception::new(StubHandDetector::default(), FailingObjects);
        let err = perception.observe(&image()).unwrap_err();
        assert!(format!("{:#}", err).contains("model exploded"));
        assert!(err.to_string().contains("failing"));
    }

    struct PanicsOnce {
        calls: usize,
    }

    impl ObjectDetector for PanicsOnce {
        fn name(&self) -> &'static str {
            "panics-once"
        }

        fn detect(&mut self, _image: &DecodedImage) -> Result<ObjectObservation> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("tensor shape mismatch");
            }
            Ok(ObjectObservation::empty())
        }
    }

    #[test]
    fn detector_panic_fails_only_that_call() {
        let perception = Perception::new(StubHandDetector::default(), PanicsOnce { calls: 0 });
        let err = perception.observe(&image()).unwrap_err();
        assert!(format!("{:#}", err).contains("tensor shape mismatch"));

        for _ in 0..3 {
            let (_, objects) = perception.observe(&image()).unwrap();
            assert_eq!(objects.count(ObjectCategory::Laptop), 0);
        }
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let perception = Perception::new(StubHandDetector::default(), StubObjectDetector::default());
        let objects = perception.objects.clone();
        let _ = std::thread::spawn(move || {
            let _guard = objects.lock().unwrap();
            panic!("holder died");
        })
        .join();
        assert!(perception.objects.is_poisoned());

        assert!(perception.observe(&image()).is_ok());
        assert!(perception.warm_up().is_ok());
    }
}
