#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use trackmate::detect::{
    BoundingBox, HandObservation, HandPosition, ObjectCategory, ObjectDetector,
    ObjectObservation, Perception, Point, StubHandDetector, StubObjectDetector,
};
use trackmate::secondary::VisionInference;
use trackmate::{DecodedImage, EncodedImage, Engine, EngineConfig};

/// Small real PNG so decoding succeeds.
pub fn png_image() -> EncodedImage {
    let image = image::RgbImage::from_pixel(32, 24, image::Rgb([90, 120, 150]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    EncodedImage::from_bytes(&out.into_inner())
}

pub fn hand_at(x: f32, y: f32) -> HandObservation {
    HandObservation::from_positions(vec![HandPosition {
        wrist: Point::new(x, y),
        fingertip: Point::new(x + 25.0, y - 70.0),
    }])
}

pub fn object_at(objects: ObjectObservation, category: ObjectCategory, cx: f32, cy: f32) -> ObjectObservation {
    objects.with(
        category,
        BoundingBox {
            x1: cx - 30.0,
            y1: cy - 30.0,
            x2: cx + 30.0,
            y2: cy + 30.0,
        },
        0.85,
    )
}

/// Inference source with a canned answer that records every call.
pub struct FakeInference {
    answer: Result<String, String>,
    pub calls: Mutex<Vec<(String, String, Duration)>>,
}

impl FakeInference {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl VisionInference for FakeInference {
    fn name(&self) -> &str {
        "Fake"
    }

    fn infer(&self, image_base64: &str, prompt: &str, timeout: Duration) -> Result<String> {
        self.calls.lock().unwrap().push((
            image_base64.to_string(),
            prompt.to_string(),
            timeout,
        ));
        self.answer.clone().map_err(|e| anyhow!(e))
    }
}

pub fn engine_with(
    hands: HandObservation,
    objects: ObjectObservation,
    inference: Arc<FakeInference>,
) -> Engine {
    Engine::new(
        EngineConfig::default(),
        Perception::new(StubHandDetector::with(hands), StubObjectDetector::with(objects)),
        inference,
    )
}

/// Object detector whose model never loads.
pub struct BrokenDetector;

impl ObjectDetector for BrokenDetector {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn detect(&mut self, _image: &DecodedImage) -> Result<ObjectObservation> {
        Err(anyhow!("weights missing"))
    }
}

/// Object detector that panics on its first call and works afterwards.
pub struct FlakyDetector {
    calls: usize,
    objects: ObjectObservation,
}

impl FlakyDetector {
    pub fn new(objects: ObjectObservation) -> Self {
        Self { calls: 0, objects }
    }
}

impl ObjectDetector for FlakyDetector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn detect(&mut self, _image: &DecodedImage) -> Result<ObjectObservation> {
        self.calls += 1;
        if self.calls == 1 {
            panic!("output tensor has unexpected rank");
        }
        Ok(self.objects.clone())
    }
}

pub fn engine_over<O: ObjectDetector + 'static>(
    hands: HandObservation,
    objects: O,
    inference: Arc<FakeInference>,
) -> Engine {
    Engine::new(
        EngineConfig::default(),
        Perception::new(StubHandDetector::with(hands), objects),
        inference,
    )
}
