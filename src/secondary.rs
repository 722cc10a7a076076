//! Secondary (vision-language) inference path.
//!
//! Used only when the rule-based verdict is not confident enough. Exactly one
//! attempt is made per request. Every failure mode (transport error, timeout,
//! non-success status, malformed body) collapses into the same degraded
//! verdict; the cause is logged, never returned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityCategory, ActivityVerdict};
use crate::frame::EncodedImage;

/// Default bound on one secondary inference call.
pub const DEFAULT_SECONDARY_TIMEOUT: Duration = Duration::from_secs(45);

/// Confidence assigned to any category parsed from a model answer.
pub const PARSED_CONFIDENCE: f32 = 0.60;
/// Confidence when the model answered but without a leading category digit.
pub const UNCERTAIN_CONFIDENCE: f32 = 0.50;
/// Confidence of the total-failure verdict.
pub const FAILURE_CONFIDENCE: f32 = 0.30;
pub const FAILURE_RATIONALE: &str = "All detection methods failed";

const PARSED_ECHO_CHARS: usize = 150;
const UNCERTAIN_ECHO_CHARS: usize = 100;

pub const SECONDARY_PROMPT: &str = "Look at this image carefully. What is the person doing RIGHT NOW?

Choose ONE number (1-7):

1 = Using phone (person is HOLDING phone in their hand)
2 = Working (using computer, typing, at desk with NO phone in hand)
3 = Phone + Work (HOLDING phone AND at computer)
4 = Sleeping
5 = Eating
6 = Drinking
7 = Other

VERY IMPORTANT:
- Look at the HANDS carefully
- If phone is IN HAND = choose 1 or 3
- If phone is on desk but NOT in hand = choose 2
- If person at computer with NO phone in hand = choose 2

Answer: First write the number (1-7), then explain what you see.";

/// A service that answers a natural-language prompt about an image.
pub trait VisionInference: Send + Sync {
    /// Label used as the rationale prefix for answers from this source.
    fn name(&self) -> &str;

    /// Ask `prompt` about a base64 image. Must not block past `timeout`.
    fn infer(&self, image_base64: &str, prompt: &str, timeout: Duration) -> Result<String>;

    /// False for sources that can never answer.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Settings for an Ollama `/api/generate` endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct OllamaSettings {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "qwen3-vl:2b".to_string(),
            temperature: 0.3,
            num_predict: 100,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Blocking Ollama client.
pub struct OllamaClient {
    settings: OllamaSettings,
}

impl OllamaClient {
    pub fn new(settings: OllamaSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OllamaSettings {
        &self.settings
    }
}

impl VisionInference for OllamaClient {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn infer(&self, image_base64: &str, prompt: &str, timeout: Duration) -> Result<String> {
        let body = serde_json::to_string(&GenerateRequest {
            model: &self.settings.model,
            prompt,
            images: [image_base64],
            stream: false,
            options: GenerateOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.num_predict,
            },
        })?;

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let response = match agent
            .post(&self.settings.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(anyhow!("secondary inference returned HTTP {}", code))
            }
            Err(err) => return Err(err).context("secondary inference request failed"),
        };
        if response.status() != 200 {
            return Err(anyhow!(
                "secondary inference returned HTTP {}",
                response.status()
            ));
        }
        let raw = response
            .into_string()
            .context("failed to read secondary inference response")?;
        let parsed: GenerateResponse =
            serde_json::from_str(&raw).context("malformed secondary inference response")?;
        Ok(parsed.response)
    }
}

/// Inference source used when the secondary path is switched off.
pub struct DisabledInference;

impl VisionInference for DisabledInference {
    fn name(&self) -> &str {
        "disabled"
    }

    fn infer(&self, _image_base64: &str, _prompt: &str, _timeout: Duration) -> Result<String> {
        Err(anyhow!("secondary inference is disabled"))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Escalation target: asks the inference source and turns its answer into a verdict.
#[derive(Clone)]
pub struct SecondaryAdapter {
    inference: Arc<dyn VisionInference>,
    timeout: Duration,
}

impl SecondaryAdapter {
    pub fn new(inference: Arc<dyn VisionInference>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    pub fn source_name(&self) -> &str {
        self.inference.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.inference.is_enabled()
    }

    /// Never fails: any error yields [`total_failure`].
    pub fn classify(&self, image: &EncodedImage) -> ActivityVerdict {
        match self
            .inference
            .infer(image.as_base64(), SECONDARY_PROMPT, self.timeout)
        {
            Ok(text) => parse_response(self.inference.name(), &text),
            Err(err) => {
                log::warn!(
                    "secondary inference via {} failed: {:#}",
                    self.inference.name(),
                    err
                );
                total_failure()
            }
        }
    }
}

/// Map a model answer to a verdict by its leading digit.
pub fn parse_response(source: &str, text: &str) -> ActivityVerdict {
    let text = text.trim();
    let leading = text
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .and_then(|d| ActivityCategory::from_code(d as u8));
    match leading {
        Some(category) => ActivityVerdict::new(
            category,
            PARSED_CONFIDENCE,
            format!("{}: {}", source, truncate_chars(text, PARSED_ECHO_CHARS)),
        ),
        None => ActivityVerdict::new(
            ActivityCategory::Other,
            UNCERTAIN_CONFIDENCE,
            format!(
                "{} uncertain: {}",
                source,
                truncate_chars(text, UNCERTAIN_ECHO_CHARS)
            ),
        ),
    }
}

pub fn total_failure() -> ActivityVerdict {
    ActivityVerdict::new(ActivityCategory::Other, FAILURE_CONFIDENCE, FAILURE_RATIONALE)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
