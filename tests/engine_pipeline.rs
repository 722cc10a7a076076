//! End-to-end pipeline tests with fake perception and inference.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    engine_over, engine_with, hand_at, object_at, png_image, BrokenDetector, FakeInference,
    FlakyDetector,
};
use trackmate::detect::{
    HandObservation, ObjectCategory, ObjectObservation, Perception, StubHandDetector,
};
use trackmate::engine::{ERR_INVALID_IMAGE, ERR_PERCEPTION_FAILED};
use trackmate::secondary::SECONDARY_PROMPT;
use trackmate::{
    ActivityCategory, AnalysisError, DetectionMethod, EncodedImage, Engine, EngineConfig,
};

#[test]
fn phone_in_hand_without_equipment_stays_primary() {
    let inference = FakeInference::answering("2 - typing");
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Phone, 320.0, 380.0);
    let engine = engine_with(hand_at(300.0, 400.0), objects, inference.clone());

    let analysis = engine.analyze(&png_image()).unwrap();
    assert_eq!(analysis.verdict.category, ActivityCategory::UsingPhone);
    assert_eq!(analysis.verdict.confidence, 0.85);
    assert_eq!(analysis.method, DetectionMethod::Primary);
    assert_eq!(inference.call_count(), 0);
}

#[test]
fn phone_in_hand_with_laptop_is_phone_while_working() {
    let inference = FakeInference::answering("7");
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Phone, 320.0, 380.0);
    let objects = object_at(objects, ObjectCategory::Laptop, 700.0, 500.0);
    let engine = engine_with(hand_at(300.0, 400.0), objects, inference.clone());

    let analysis = engine.analyze(&png_image()).unwrap();
    assert_eq!(analysis.verdict.category, ActivityCategory::PhoneWhileWorking);
    assert_eq!(analysis.verdict.confidence, 0.90);
    assert_eq!(analysis.method, DetectionMethod::Primary);
    assert_eq!(inference.call_count(), 0);
}

#[test]
fn drink_at_threshold_confidence_does_not_escalate() {
    let inference = FakeInference::answering("1");
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Cup, 100.0, 100.0);
    let engine = engine_with(hand_at(400.0, 400.0), objects, inference.clone());

    let analysis = engine.analyze(&png_image()).unwrap();
    assert_eq!(analysis.verdict.category, ActivityCategory::Drinking);
    assert_eq!(analysis.verdict.confidence, 0.70);
    assert_eq!(analysis.method, DetectionMethod::Primary);
    assert_eq!(inference.call_count(), 0);
}

#[test]
fn empty_scene_escalates_and_uses_secondary_answer() {
    let inference = FakeInference::answering("2 - person is typing");
    let engine = engine_with(HandObservation::none(), ObjectObservation::empty(), inference.clone());

    let image = png_image();
    let analysis = engine.analyze(&image).unwrap();
    assert_eq!(analysis.method, DetectionMethod::SecondaryFallback);
    assert_eq!(analysis.verdict.category, ActivityCategory::Working);
    assert_eq!(analysis.verdict.confidence, 0.60);
    assert_eq!(analysis.verdict.rationale, "Fake: 2 - person is typing");

    let calls = inference.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, image.as_base64());
    assert_eq!(calls[0].1, SECONDARY_PROMPT);
    assert_eq!(calls[0].2, Duration::from_secs(45));
}

#[test]
fn secondary_failure_degrades_without_retry() {
    let inference = FakeInference::failing("operation timed out");
    let engine = engine_with(hand_at(10.0, 10.0), ObjectObservation::empty(), inference.clone());

    let analysis = engine.analyze(&png_image()).unwrap();
    assert_eq!(analysis.method, DetectionMethod::SecondaryFallback);
    assert_eq!(analysis.verdict.category, ActivityCategory::Other);
    assert_eq!(analysis.verdict.confidence, 0.30);
    assert_eq!(analysis.verdict.rationale, "All detection methods failed");
    assert_eq!(inference.call_count(), 1);
}

#[test]
fn configured_thresholds_are_honored() {
    let inference = FakeInference::answering("4");
    let config = EngineConfig {
        proximity_px: 10.0,
        escalation_confidence: 0.95,
        secondary_timeout: Duration::from_secs(3),
    };
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Phone, 320.0, 380.0);
    let engine = Engine::new(
        config,
        Perception::new(
            StubHandDetector::with(hand_at(300.0, 400.0)),
            trackmate::detect::StubObjectDetector::with(objects),
        ),
        inference.clone(),
    );

    // Phone is 28px away: outside the tightened radius, and every rule
    // confidence sits below 0.95, so the request escalates.
    let analysis = engine.analyze(&png_image()).unwrap();
    assert_eq!(analysis.method, DetectionMethod::SecondaryFallback);
    assert_eq!(analysis.verdict.category, ActivityCategory::Sleeping);
    assert_eq!(inference.calls.lock().unwrap()[0].2, Duration::from_secs(3));
}

#[test]
fn identical_requests_yield_identical_verdicts() {
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Food, 50.0, 50.0);
    let engine = engine_with(hand_at(60.0, 60.0), objects, FakeInference::answering("7"));
    let image = png_image();
    let first = engine.analyze(&image).unwrap();
    let second = engine.analyze(&image).unwrap();
    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.method, second.method);
}

#[test]
fn undecodable_image_fails_before_classification() {
    let inference = FakeInference::answering("1");
    let engine = engine_with(HandObservation::none(), ObjectObservation::empty(), inference.clone());
    let err = engine
        .analyze(&EncodedImage::from_transport("bm90IGFuIGltYWdl").unwrap())
        .unwrap_err();
    assert_eq!(err.downcast_ref::<AnalysisError>().unwrap().code, ERR_INVALID_IMAGE);
    assert_eq!(inference.call_count(), 0);
}

#[test]
fn perception_failure_is_distinct_and_not_escalated() {
    let inference = FakeInference::answering("1");
    let engine = engine_over(HandObservation::none(), BrokenDetector, inference.clone());
    let err = engine.analyze(&png_image()).unwrap_err();
    let analysis_err = err.downcast_ref::<AnalysisError>().unwrap();
    assert_eq!(analysis_err.code, ERR_PERCEPTION_FAILED);
    assert!(analysis_err.message.contains("weights missing"));
    assert_eq!(inference.call_count(), 0);

    // The engine keeps serving after a failed request.
    let err = engine.analyze(&png_image()).unwrap_err();
    assert!(err.downcast_ref::<AnalysisError>().is_some());
}

#[test]
fn detector_panic_does_not_outlive_its_request() {
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Laptop, 200.0, 200.0);
    let engine = Arc::new(engine_over(
        hand_at(10.0, 10.0),
        FlakyDetector::new(objects),
        FakeInference::answering("7"),
    ));

    let first = {
        let engine = engine.clone();
        std::thread::spawn(move || engine.analyze(&png_image()).map(|a| a.verdict.category))
            .join()
            .expect("worker thread survives the detector panic")
    };
    let err = first.unwrap_err();
    let analysis_err = err.downcast_ref::<AnalysisError>().unwrap();
    assert_eq!(analysis_err.code, ERR_PERCEPTION_FAILED);
    assert!(analysis_err.message.contains("unexpected rank"));

    for _ in 0..3 {
        let analysis = engine.analyze(&png_image()).unwrap();
        assert_eq!(analysis.verdict.category, ActivityCategory::Working);
    }
}

#[test]
fn engine_is_shareable_across_threads() {
    let objects = object_at(ObjectObservation::empty(), ObjectCategory::Keyboard, 200.0, 200.0);
    let engine = Arc::new(engine_with(
        hand_at(10.0, 10.0),
        objects,
        FakeInference::answering("7"),
    ));
    let image = png_image();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let image = image.clone();
            std::thread::spawn(move || engine.analyze(&image).unwrap().verdict.category)
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), ActivityCategory::Working);
    }
}
