// Scanner contract types — the swap-ready abstraction.
//
// Every scanner, whatever engine it runs, returns the same ScanResult shape
// with the same invariants, so the registry and the aggregation layer never
// care which detector produced a verdict. Scanners are async because hosts
// overlap scans with I/O; the CPU-bound work happens on a blocking worker.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default detection threshold when neither the call nor the configuration
/// overrides it.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default tokenizer length, matching the checkpoint's position budget.
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 512;

/// Confidence at or above which a detection is considered high risk.
pub const HIGH_RISK_CONFIDENCE: f32 = 0.85;

/// Per-call overrides. `None` fields fall back to the scanner's configured
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Detection threshold in [0, 1].
    pub threshold: Option<f32>,
    /// Attach diagnostic metadata to the result.
    pub include_metadata: bool,
    /// Tokenizer length for this call.
    pub max_token_length: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            include_metadata: true,
            max_token_length: None,
        }
    }
}

/// Coarse risk bucket over the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Derive the bucket: High for detections at or above 0.85, Medium for
    /// other detections, Low otherwise.
    pub fn from_confidence(detected: bool, confidence: f32) -> Self {
        if !detected {
            RiskLevel::Low
        } else if confidence >= HIGH_RISK_CONFIDENCE {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scanner's verdict for one call.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub is_threat_detected: bool,
    /// Calibrated confidence in [0, 1].
    pub confidence_score: f32,
    pub risk_level: RiskLevel,
    pub metadata: Option<Map<String, Value>>,
    /// Wall-clock duration of the scan call.
    pub processing_time: Duration,
}

impl ScanResult {
    /// Build a result from a probability and a threshold, deriving the
    /// detection flag and risk level so the invariants hold by construction:
    /// detected ⇔ confidence ≥ threshold.
    pub fn from_probability(
        probability: f32,
        threshold: f32,
        metadata: Option<Map<String, Value>>,
        processing_time: Duration,
    ) -> Self {
        let confidence_score = probability.clamp(0.0, 1.0);
        let is_threat_detected = confidence_score >= threshold;
        Self {
            is_threat_detected,
            confidence_score,
            risk_level: RiskLevel::from_confidence(is_threat_detected, confidence_score),
            metadata,
            processing_time,
        }
    }
}

/// Typed scan failures. Each variant carries a short stable identifier for
/// hosts and diagnostics.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The input is not valid UTF-8 text.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The scanner has no tokenizer configured.
    #[error("tokenizer unavailable")]
    TokenizerUnavailable,
    /// The classifier graph ran but failed or returned a malformed tensor.
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    /// Anything else (worker panics, poisoned locks).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ScanError {
    /// Stable string identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::InvalidInput(_) => "invalid_input",
            ScanError::TokenizerUnavailable => "tokenizer_unavailable",
            ScanError::InferenceFailed(_) => "inference_failed",
            ScanError::InternalError(_) => "internal_error",
        }
    }
}

/// Boundary guard for hosts that receive raw bytes: the core itself only
/// accepts `&str`, so invalid UTF-8 is rejected before any scan runs.
pub fn utf8_text(bytes: &[u8]) -> Result<&str, ScanError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ScanError::InvalidInput(format!("input is not valid UTF-8: {e}")))
}

/// A scanner over request text (prompts).
#[async_trait]
pub trait InputScanner: Send + Sync {
    /// The name this scanner registers under.
    fn name(&self) -> &str;

    /// Scan one text and return a verdict.
    async fn scan(&self, text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError>;
}

/// A scanner over (prompt, output) pairs. Concrete implementations live
/// outside this crate but must obey the same ScanResult invariants.
#[async_trait]
pub trait OutputScanner: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(
        &self,
        prompt: &str,
        output: &str,
        options: &ScanOptions,
    ) -> Result<ScanResult, ScanError>;
}
