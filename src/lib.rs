//! TrackMate activity detection
//!
//! Classifies a still image of a person at a workstation into one of seven
//! activities for a monitoring client.
//!
//! # Architecture
//!
//! Two perception signals (hand landmarks, object boxes) are fused by a
//! deterministic rule table. When the rule table is not confident enough the
//! request escalates, once, to a slower vision-language model.
//!
//! # Module Structure
//!
//! - `frame`: base64/data-URL transport decoding to RGB pixels
//! - `detect`: perception traits, observations, backends (stub, tract)
//! - `proximity`, `classify`, `escalation`: the decision core
//! - `secondary`: vision-language fallback (Ollama)
//! - `engine`: request pipeline
//! - `response`: result documents
//! - `api`: HTTP service
//! - `config`: process configuration

pub mod activity;
pub mod api;
pub mod classify;
pub mod config;
pub mod detect;
pub mod engine;
pub mod escalation;
pub mod frame;
pub mod proximity;
pub mod response;
pub mod secondary;

pub use activity::{ActivityCategory, ActivityVerdict};
pub use engine::{Analysis, AnalysisError, DetectionMethod, Engine, EngineConfig};
pub use frame::{DecodedImage, EncodedImage};
pub use response::{AnalysisReport, ErrorReport};
