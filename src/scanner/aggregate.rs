// Aggregation — fold per-scanner results into one admission decision.
//
// Pure and ordering-independent: the fold operates on a result map, and
// findings are emitted sorted by scanner name so the report is stable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::scanner::types::ScanResult;

/// Confidence cut between Medium and High severity.
const HIGH_SEVERITY_CONFIDENCE: f32 = 0.85;
/// Confidence cut between Low and Medium severity.
const MEDIUM_SEVERITY_CONFIDENCE: f32 = 0.6;

pub const DETECTED_CODE: &str = "DETECTED";
pub const CLEAR_CODE: &str = "CLEAR";
pub const DETECTED_MESSAGE: &str = "Potential threat detected in scanned content";
pub const CLEAR_MESSAGE: &str = "No threat detected";

/// Finding severity, totally ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The host-visible admission verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Review,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "Allow",
            Decision::Review => "Review",
            Decision::Block => "Block",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scanner's verdict reshaped for the host: a fixed code/message pair,
/// a severity bucket, and the scanner's metadata passed through.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub scanner: String,
    pub code: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub confidence: f32,
    pub metadata: Option<Map<String, Value>>,
}

/// The aggregate of one registry call.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub decision: Decision,
    pub max_score: f32,
    pub highest_severity: Severity,
    pub findings: Vec<Finding>,
    pub metadata: Option<Map<String, Value>>,
}

impl AggregateReport {
    /// Whether any finding was a detection. Together with
    /// `highest_severity` and `max_score` this backs the advisory
    /// header-style fields a host may expose at its boundary.
    pub fn any_detected(&self) -> bool {
        self.findings.iter().any(|f| f.severity > Severity::Info)
    }
}

/// Severity of a single result: Info when nothing was detected, otherwise
/// bucketed by confidence at 0.6 and 0.85.
pub fn severity_of(result: &ScanResult) -> Severity {
    if !result.is_threat_detected {
        Severity::Info
    } else if result.confidence_score >= HIGH_SEVERITY_CONFIDENCE {
        Severity::High
    } else if result.confidence_score >= MEDIUM_SEVERITY_CONFIDENCE {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Fold a result map into a decision:
/// Allow when nothing was detected, Block when the worst finding is Medium
/// or above, Review otherwise.
pub fn aggregate(results: &HashMap<String, ScanResult>) -> AggregateReport {
    let any_detected = results.values().any(|r| r.is_threat_detected);
    let max_score = results
        .values()
        .map(|r| r.confidence_score)
        .fold(0.0f32, f32::max);
    let highest_severity = results
        .values()
        .map(severity_of)
        .max()
        .unwrap_or(Severity::Info);

    let decision = if !any_detected {
        Decision::Allow
    } else if highest_severity >= Severity::Medium {
        Decision::Block
    } else {
        Decision::Review
    };

    let mut findings: Vec<Finding> = results
        .iter()
        .map(|(scanner, result)| {
            let (code, message) = if result.is_threat_detected {
                (DETECTED_CODE, DETECTED_MESSAGE)
            } else {
                (CLEAR_CODE, CLEAR_MESSAGE)
            };
            Finding {
                scanner: scanner.clone(),
                code,
                message,
                severity: severity_of(result),
                confidence: result.confidence_score,
                metadata: result.metadata.clone(),
            }
        })
        .collect();
    findings.sort_by(|a, b| a.scanner.cmp(&b.scanner));

    let detections = findings.iter().filter(|f| f.code == DETECTED_CODE).count();
    let mut metadata = Map::new();
    metadata.insert("scanners".to_string(), json!(results.len()));
    metadata.insert("detections".to_string(), json!(detections));

    AggregateReport {
        decision,
        max_score,
        highest_severity,
        findings,
        metadata: Some(metadata),
    }
}
