mod backend;
mod backends;
mod perception;
pub mod postprocess;
mod result;

pub use backend::{HandDetector, ObjectDetector};
pub use backends::{StubHandDetector, StubObjectDetector};
#[cfg(feature = "backend-tract")]
pub use backends::{TractHandDetector, TractObjectDetector};
pub use perception::Perception;
pub use result::{
    BoundingBox, DetectedObject, HandObservation, HandPosition, ObjectCategory, ObjectObservation,
    Point, OBJECT_ACCEPTANCE_THRESHOLD,
};
