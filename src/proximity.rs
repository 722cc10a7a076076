//! "Object near hand" predicate.

use crate::detect::Point;

/// Default maximum pixel distance for two points to count as near.
pub const DEFAULT_PROXIMITY_PX: f32 = 150.0;

/// True iff the Euclidean distance between `a` and `b` is strictly below
/// `threshold`.
pub fn is_near(a: Point, b: Point, threshold: f32) -> bool {
    a.distance_to(b) < threshold
}
