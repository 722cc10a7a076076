use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::escalation::DEFAULT_ESCALATION_CONFIDENCE;
use crate::proximity::DEFAULT_PROXIMITY_PX;
use crate::secondary::{OllamaSettings, DEFAULT_SECONDARY_TIMEOUT};

const DEFAULT_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_OBJECT_MODEL: &str = "yolov8n.onnx";
const DEFAULT_HAND_MODEL: &str = "hand_landmark.onnx";

#[derive(Debug, Deserialize, Default)]
struct TrackmateConfigFile {
    server: Option<ServerConfigFile>,
    thresholds: Option<ThresholdConfigFile>,
    secondary: Option<SecondaryConfigFile>,
    detectors: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdConfigFile {
    proximity_px: Option<f32>,
    escalation_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SecondaryConfigFile {
    enabled: Option<bool>,
    url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    object_model: Option<PathBuf>,
    hand_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrackmateConfig {
    pub addr: String,
    pub thresholds: ThresholdSettings,
    pub secondary: SecondarySettings,
    pub detectors: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSettings {
    pub proximity_px: f32,
    pub escalation_confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecondarySettings {
    pub enabled: bool,
    pub ollama: OllamaSettings,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorBackendKind {
    Stub,
    Tract,
}

impl DetectorBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorBackendKind::Stub => "stub",
            DetectorBackendKind::Tract => "tract",
        }
    }
}

impl Default for DetectorBackendKind {
    fn default() -> Self {
        if cfg!(feature = "backend-tract") {
            DetectorBackendKind::Tract
        } else {
            DetectorBackendKind::Stub
        }
    }
}

impl FromStr for DetectorBackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stub" => Ok(DetectorBackendKind::Stub),
            "tract" => Ok(DetectorBackendKind::Tract),
            other => Err(anyhow!(
                "unknown detector backend '{}'; expected 'stub' or 'tract'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: DetectorBackendKind,
    pub object_model: PathBuf,
    pub hand_model: PathBuf,
}

impl TrackmateConfig {
    /// Defaults, then the file named by `TRACKMATE_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKMATE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackmateConfigFile) -> Result<Self> {
        let addr = file
            .server
            .and_then(|server| server.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let thresholds = file.thresholds.unwrap_or_default();
        let thresholds = ThresholdSettings {
            proximity_px: thresholds.proximity_px.unwrap_or(DEFAULT_PROXIMITY_PX),
            escalation_confidence: thresholds
                .escalation_confidence
                .unwrap_or(DEFAULT_ESCALATION_CONFIDENCE),
        };

        let secondary = file.secondary.unwrap_or_default();
        let ollama_defaults = OllamaSettings::default();
        let secondary = SecondarySettings {
            enabled: secondary.enabled.unwrap_or(true),
            ollama: OllamaSettings {
                url: secondary.url.unwrap_or(ollama_defaults.url),
                model: secondary.model.unwrap_or(ollama_defaults.model),
                temperature: secondary.temperature.unwrap_or(ollama_defaults.temperature),
                num_predict: secondary.num_predict.unwrap_or(ollama_defaults.num_predict),
            },
            timeout: secondary
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SECONDARY_TIMEOUT),
        };

        let detectors = file.detectors.unwrap_or_default();
        let detectors = DetectorSettings {
            backend: match detectors.backend.as_deref() {
                Some(name) => name.parse()?,
                None => DetectorBackendKind::default(),
            },
            object_model: detectors
                .object_model
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OBJECT_MODEL)),
            hand_model: detectors
                .hand_model
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HAND_MODEL)),
        };

        Ok(Self {
            addr,
            thresholds,
            secondary,
            detectors,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("TRACKMATE_ADDR") {
            self.addr = addr;
        }
        if let Some(px) = parsed_env::<f32>("TRACKMATE_PROXIMITY_PX", "a number of pixels")? {
            self.thresholds.proximity_px = px;
        }
        if let Some(confidence) =
            parsed_env::<f32>("TRACKMATE_ESCALATION_CONFIDENCE", "a number in [0, 1]")?
        {
            self.thresholds.escalation_confidence = confidence;
        }
        if let Some(enabled) = non_empty_env("TRACKMATE_SECONDARY_ENABLED") {
            self.secondary.enabled = parse_bool(&enabled).ok_or_else(|| {
                anyhow!("TRACKMATE_SECONDARY_ENABLED must be true/false, got '{}'", enabled)
            })?;
        }
        if let Some(url) = non_empty_env("OLLAMA_API_URL") {
            self.secondary.ollama.url = url;
        }
        if let Some(model) = non_empty_env("OLLAMA_MODEL") {
            self.secondary.ollama.model = model;
        }
        if let Some(secs) = parsed_env::<u64>("OLLAMA_TIMEOUT", "an integer number of seconds")? {
            self.secondary.timeout = Duration::from_secs(secs);
        }
        if let Some(backend) = non_empty_env("TRACKMATE_DETECTOR_BACKEND") {
            self.detectors.backend = backend.parse()?;
        }
        if let Some(path) = non_empty_env("TRACKMATE_OBJECT_MODEL") {
            self.detectors.object_model = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("TRACKMATE_HAND_MODEL") {
            self.detectors.hand_model = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let px = self.thresholds.proximity_px;
        if !px.is_finite() || px <= 0.0 {
            return Err(anyhow!("proximity threshold must be a positive number of pixels"));
        }
        if !(0.0..=1.0).contains(&self.thresholds.escalation_confidence) {
            return Err(anyhow!("escalation confidence must be within [0, 1]"));
        }
        if self.secondary.timeout.is_zero() {
            return Err(anyhow!("secondary inference timeout must be greater than zero"));
        }
        let url = url::Url::parse(&self.secondary.ollama.url).map_err(|e| {
            anyhow!(
                "invalid secondary inference url '{}': {}",
                self.secondary.ollama.url,
                e
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "secondary inference url must be http(s), got '{}'",
                url.scheme()
            ));
        }
        if self.detectors.backend == DetectorBackendKind::Tract && !cfg!(feature = "backend-tract")
        {
            return Err(anyhow!(
                "detector backend 'tract' requires building with --features backend-tract"
            ));
        }
        Ok(())
    }

    /// Override the listen address from `--host`/`--port` style arguments.
    pub fn override_addr(&mut self, host: Option<&str>, port: Option<u16>) -> Result<()> {
        if host.is_none() && port.is_none() {
            return Ok(());
        }
        let (current_host, current_port) = self
            .addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("listen address '{}' has no port", self.addr))?;
        let host = host.unwrap_or(current_host);
        let port = match port {
            Some(port) => port,
            None => current_port
                .parse()
                .map_err(|_| anyhow!("listen address '{}' has an invalid port", self.addr))?,
        };
        self.addr = format!("{}:{}", host, port);
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            proximity_px: self.thresholds.proximity_px,
            escalation_confidence: self.thresholds.escalation_confidence,
            secondary_timeout: self.secondary.timeout,
        }
    }
}

fn read_config_file(path: &Path) -> Result<TrackmateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match non_empty_env(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_names_parse_back() {
        for kind in [DetectorBackendKind::Stub, DetectorBackendKind::Tract] {
            assert_eq!(kind.as_str().parse::<DetectorBackendKind>().unwrap(), kind);
        }
        assert!("onnx".parse::<DetectorBackendKind>().is_err());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = TrackmateConfig::from_file(TrackmateConfigFile::default()).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:5001");
        assert_eq!(cfg.thresholds.proximity_px, 150.0);
        assert_eq!(cfg.thresholds.escalation_confidence, 0.70);
        assert_eq!(cfg.secondary.timeout, Duration::from_secs(45));
        assert!(cfg.secondary.enabled);
        assert_eq!(cfg.secondary.ollama.model, "qwen3-vl:2b");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn override_addr_replaces_host_and_port_independently() {
        let mut cfg = TrackmateConfig::from_file(TrackmateConfigFile::default()).unwrap();
        cfg.override_addr(Some("127.0.0.1"), None).unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:5001");
        cfg.override_addr(None, Some(6000)).unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:6000");
        cfg.override_addr(None, None).unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:6000");
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let base = TrackmateConfig::from_file(TrackmateConfigFile::default()).unwrap();

        let mut cfg = base.clone();
        cfg.thresholds.proximity_px = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.thresholds.escalation_confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.secondary.timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.secondary.ollama.url = "ftp://example.com/api/generate".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("stub".parse::<DetectorBackendKind>().unwrap(), DetectorBackendKind::Stub);
        assert_eq!(" Tract ".parse::<DetectorBackendKind>().unwrap(), DetectorBackendKind::Tract);
        assert!("opencv".parse::<DetectorBackendKind>().is_err());
    }

    #[test]
    fn bools_parse_leniently() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
