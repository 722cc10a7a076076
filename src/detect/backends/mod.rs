pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubHandDetector, StubObjectDetector};

#[cfg(feature = "backend-tract")]
pub use tract::{TractHandDetector, TractObjectDetector};
