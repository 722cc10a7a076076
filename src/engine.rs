//! Hybrid decision engine.
//!
//! decode -> perception -> rule classifier -> escalation gate ->
//! (secondary inference) -> analysis.
//!
//! The engine holds no per-request state. Perception models are shared and
//! serialized by [`Perception`]; everything else is pure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::activity::ActivityVerdict;
use crate::classify::RuleClassifier;
use crate::config::{DetectorBackendKind, DetectorSettings, TrackmateConfig};
use crate::detect::{
    HandObservation, ObjectObservation, Perception, StubHandDetector, StubObjectDetector,
};
use crate::escalation::{EscalationGate, DEFAULT_ESCALATION_CONFIDENCE};
use crate::frame::EncodedImage;
use crate::proximity::DEFAULT_PROXIMITY_PX;
use crate::secondary::{
    DisabledInference, OllamaClient, SecondaryAdapter, VisionInference,
    DEFAULT_SECONDARY_TIMEOUT,
};

pub const ERR_INVALID_IMAGE: &str = "INVALID_IMAGE";
pub const ERR_PERCEPTION_FAILED: &str = "PERCEPTION_FAILED";

/// Failure surfaced to the caller before any classification happened.
#[derive(Clone, Debug)]
pub struct AnalysisError {
    pub code: &'static str,
    pub message: String,
}

impl AnalysisError {
    fn invalid_image(err: &anyhow::Error) -> Self {
        Self {
            code: ERR_INVALID_IMAGE,
            message: format!("{:#}", err),
        }
    }

    fn perception(err: &anyhow::Error) -> Self {
        Self {
            code: ERR_PERCEPTION_FAILED,
            message: format!("{:#}", err),
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
impl std::error::Error for AnalysisError {}

/// Thresholds consumed by the engine. Passed in explicitly; never read from
/// the environment at classification time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub proximity_px: f32,
    pub escalation_confidence: f32,
    pub secondary_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proximity_px: DEFAULT_PROXIMITY_PX,
            escalation_confidence: DEFAULT_ESCALATION_CONFIDENCE,
            secondary_timeout: DEFAULT_SECONDARY_TIMEOUT,
        }
    }
}

/// Which decision path produced the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMethod {
    Primary,
    SecondaryFallback,
}

impl DetectionMethod {
    pub fn label(self) -> &'static str {
        match self {
            DetectionMethod::Primary => "primary",
            DetectionMethod::SecondaryFallback => "secondary_fallback",
        }
    }
}

/// Everything the response layer needs about one request.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub verdict: ActivityVerdict,
    pub method: DetectionMethod,
    pub elapsed: Duration,
    pub hands: HandObservation,
    pub objects: ObjectObservation,
}

pub struct Engine {
    classifier: RuleClassifier,
    gate: EscalationGate,
    perception: Perception,
    secondary: SecondaryAdapter,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        perception: Perception,
        inference: Arc<dyn VisionInference>,
    ) -> Self {
        Self {
            classifier: RuleClassifier::new(config.proximity_px),
            gate: EscalationGate::new(config.escalation_confidence),
            perception,
            secondary: SecondaryAdapter::new(inference, config.secondary_timeout),
        }
    }

    /// Build detectors and the inference client named by process configuration.
    pub fn from_config(cfg: &TrackmateConfig) -> Result<Self> {
        log::info!("detector backend: {}", cfg.detectors.backend.as_str());
        let perception = match cfg.detectors.backend {
            DetectorBackendKind::Stub => {
                log::warn!("stub detectors configured; every request will escalate");
                Perception::new(StubHandDetector::new(), StubObjectDetector::new())
            }
            DetectorBackendKind::Tract => tract_perception(&cfg.detectors)?,
        };
        perception.warm_up()?;

        let inference: Arc<dyn VisionInference> = if cfg.secondary.enabled {
            let client = OllamaClient::new(cfg.secondary.ollama.clone());
            log::info!(
                "secondary inference: {} model {} at {}",
                client.name(),
                client.settings().model,
                client.settings().url
            );
            Arc::new(client)
        } else {
            log::warn!("secondary inference disabled; escalations will degrade");
            Arc::new(DisabledInference)
        };
        Ok(Self::new(cfg.engine_config(), perception, inference))
    }

    pub fn proximity_px(&self) -> f32 {
        self.classifier.proximity_px()
    }

    pub fn escalation_confidence(&self) -> f32 {
        self.gate.threshold()
    }

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    pub fn secondary(&self) -> &SecondaryAdapter {
        &self.secondary
    }

    /// Classify one image.
    ///
    /// Errors are [`AnalysisError`]s (downcast from `anyhow`) and only occur
    /// before classification: an undecodable image or a perception failure.
    pub fn analyze(&self, image: &EncodedImage) -> Result<Analysis> {
        let started = Instant::now();
        let tag = image.digest();

        let decoded = image
            .decode()
            .map_err(|err| AnalysisError::invalid_image(&err))?;
        let (hands, objects) = self
            .perception
            .observe(&decoded)
            .map_err(|err| AnalysisError::perception(&err))?;
        log::debug!(
            "[{}] {}x{}: {} hand(s), objects {:?}",
            tag,
            decoded.width(),
            decoded.height(),
            hands.count(),
            objects.nonzero_counts()
        );

        let primary = self.classifier.classify(&hands, &objects);
        let (verdict, method) = if self.gate.should_escalate(primary.confidence) {
            log::info!(
                "[{}] primary confidence {:.2} below {:.2} ({}); escalating to {}",
                tag,
                primary.confidence,
                self.gate.threshold(),
                primary.rationale,
                self.secondary.source_name()
            );
            (
                self.secondary.classify(image),
                DetectionMethod::SecondaryFallback,
            )
        } else {
            (primary, DetectionMethod::Primary)
        };

        let elapsed = started.elapsed();
        log::info!(
            "[{}] verdict {} confidence {:.2} via {} in {:?}",
            tag,
            verdict.category,
            verdict.confidence,
            method.label(),
            elapsed
        );
        Ok(Analysis {
            verdict,
            method,
            elapsed,
            hands,
            objects,
        })
    }
}

#[cfg(feature = "backend-tract")]
fn tract_perception(settings: &DetectorSettings) -> Result<Perception> {
    use crate::detect::{TractHandDetector, TractObjectDetector};

    let hands = TractHandDetector::new(&settings.hand_model)?;
    let objects = TractObjectDetector::new(&settings.object_model)?;
    log::info!(
        "loaded hand model {} and object model {}",
        settings.hand_model.display(),
        settings.object_model.display()
    );
    Ok(Perception::new(hands, objects))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_perception(_settings: &DetectorSettings) -> Result<Perception> {
    Err(anyhow::anyhow!(
        "detector backend 'tract' requires building with --features backend-tract"
    ))
}
