use std::collections::BTreeMap;

/// Detections at or below this confidence never reach the classifier.
pub const OBJECT_ACCEPTANCE_THRESHOLD: f32 = 0.4;

/// A point in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Landmarks kept for one detected hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandPosition {
    pub wrist: Point,
    pub fingertip: Point,
}

/// Result of hand-landmark detection on one image.
///
/// `detected` and `count` are derived from `positions`, so they cannot drift.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandObservation {
    positions: Vec<HandPosition>,
}

impl HandObservation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: Vec<HandPosition>) -> Self {
        Self { positions }
    }

    pub fn detected(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[HandPosition] {
        &self.positions
    }
}

/// Fixed object vocabulary understood by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectCategory {
    Phone,
    Laptop,
    Keyboard,
    Mouse,
    Cup,
    Bottle,
    Food,
    Bed,
}

impl ObjectCategory {
    pub const ALL: [ObjectCategory; 8] = [
        ObjectCategory::Phone,
        ObjectCategory::Laptop,
        ObjectCategory::Keyboard,
        ObjectCategory::Mouse,
        ObjectCategory::Cup,
        ObjectCategory::Bottle,
        ObjectCategory::Food,
        ObjectCategory::Bed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectCategory::Phone => "phone",
            ObjectCategory::Laptop => "laptop",
            ObjectCategory::Keyboard => "keyboard",
            ObjectCategory::Mouse => "mouse",
            ObjectCategory::Cup => "cup",
            ObjectCategory::Bottle => "bottle",
            ObjectCategory::Food => "food",
            ObjectCategory::Bed => "bed",
        }
    }

    /// Map a COCO-80 class index onto the vocabulary.
    ///
    /// Several food classes collapse into `Food`; everything else is ignored.
    pub fn from_coco_class(class_id: usize) -> Option<Self> {
        match class_id {
            67 => Some(ObjectCategory::Phone),
            63 => Some(ObjectCategory::Laptop),
            66 => Some(ObjectCategory::Keyboard),
            64 => Some(ObjectCategory::Mouse),
            41 => Some(ObjectCategory::Cup),
            39 => Some(ObjectCategory::Bottle),
            47..=55 => Some(ObjectCategory::Food),
            59 => Some(ObjectCategory::Bed),
            _ => None,
        }
    }
}

/// Axis-aligned box in source-image pixels, `(x1, y1)` top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectedObject {
    pub bbox: BoundingBox,
    pub center: Point,
    pub confidence: f32,
}

/// Per-category object detections for one image.
///
/// Always holds every vocabulary key, possibly with no entries.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectObservation {
    entries: BTreeMap<ObjectCategory, Vec<DetectedObject>>,
}

impl ObjectObservation {
    pub fn empty() -> Self {
        Self {
            entries: ObjectCategory::ALL
                .into_iter()
                .map(|category| (category, Vec::new()))
                .collect(),
        }
    }

    /// Record a detection. Returns false when it falls at or below the
    /// acceptance threshold and was dropped.
    pub fn insert(&mut self, category: ObjectCategory, bbox: BoundingBox, confidence: f32) -> bool {
        if confidence.is_nan() || confidence <= OBJECT_ACCEPTANCE_THRESHOLD {
            return false;
        }
        self.entries.entry(category).or_default().push(DetectedObject {
            bbox,
            center: bbox.center(),
            confidence: confidence.min(1.0),
        });
        true
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, category: ObjectCategory, bbox: BoundingBox, confidence: f32) -> Self {
        self.insert(category, bbox, confidence);
        self
    }

    pub fn get(&self, category: ObjectCategory) -> &[DetectedObject] {
        self.entries
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, category: ObjectCategory) -> bool {
        !self.get(category).is_empty()
    }

    pub fn count(&self, category: ObjectCategory) -> usize {
        self.get(category).len()
    }

    /// Categories with at least one detection, in vocabulary order.
    pub fn nonzero_counts(&self) -> Vec<(ObjectCategory, usize)> {
        self.entries
            .iter()
            .filter(|(_, objects)| !objects.is_empty())
            .map(|(category, objects)| (*category, objects.len()))
            .collect()
    }
}

impl Default for ObjectObservation {
    fn default() -> Self {
        Self::empty()
    }
}
