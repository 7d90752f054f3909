// Scanner registries — one named collection per scanner kind.
//
// A registry multiplexes several scanners behind a single call: members run
// sequentially in registration order and the results come back keyed by the
// canonical scanner name. Selection is case-insensitive and unknown names
// are silently skipped, so configuration written for a newer deployment
// still runs against an older one.
//
// A member that fails does not fail the batch: it contributes a dedicated
// error result marked detected at confidence 0.5 with the error code in the
// metadata, which aggregates to Review (inconclusive) rather than Allow or
// Block. See the registry tests for the contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map};
use tracing::{debug, warn};

use crate::scanner::types::{
    InputScanner, OutputScanner, ScanError, ScanOptions, ScanResult,
};

/// Confidence assigned to an inconclusive (errored) scan. Sits exactly at
/// the default threshold so the result counts as detected, and below the
/// Medium severity cut so aggregation lands on Review.
const ERROR_RESULT_CONFIDENCE: f32 = 0.5;

/// Registry of input scanners.
pub struct InputScannerRegistry {
    scanners: Vec<Arc<dyn InputScanner>>,
    index: HashMap<String, usize>,
}

impl InputScannerRegistry {
    /// Build a registry from scanners in their registration order. Names are
    /// indexed case-insensitively; a duplicate name keeps the later scanner.
    pub fn new(scanners: Vec<Arc<dyn InputScanner>>) -> Self {
        let index = build_index(scanners.iter().map(|s| s.name()));
        Self { scanners, index }
    }

    /// Canonical scanner names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.scanners.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// Run the selected scanners (all of them when `names` is `None` or
    /// empty) over `text`, sequentially in registration order.
    pub async fn scan(
        &self,
        text: &str,
        names: Option<&[String]>,
        options: &ScanOptions,
    ) -> HashMap<String, ScanResult> {
        let selected = selection_set(names);
        let mut results = HashMap::new();

        for (position, scanner) in self.scanners.iter().enumerate() {
            let key = scanner.name().to_lowercase();
            // A duplicate name leaves its earlier registration out of the
            // index, so only the canonical entry runs.
            if self.index.get(&key) != Some(&position) {
                continue;
            }
            if let Some(set) = &selected {
                if !set.contains(&key) {
                    continue;
                }
            }
            let outcome = scanner.scan(text, options).await;
            collect(&mut results, scanner.name(), outcome);
        }

        results
    }
}

/// Registry of output scanners, scanning `(prompt, output)` pairs.
pub struct OutputScannerRegistry {
    scanners: Vec<Arc<dyn OutputScanner>>,
    index: HashMap<String, usize>,
}

impl OutputScannerRegistry {
    pub fn new(scanners: Vec<Arc<dyn OutputScanner>>) -> Self {
        let index = build_index(scanners.iter().map(|s| s.name()));
        Self { scanners, index }
    }

    pub fn names(&self) -> Vec<&str> {
        self.scanners.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    pub async fn scan(
        &self,
        prompt: &str,
        output: &str,
        names: Option<&[String]>,
        options: &ScanOptions,
    ) -> HashMap<String, ScanResult> {
        let selected = selection_set(names);
        let mut results = HashMap::new();

        for (position, scanner) in self.scanners.iter().enumerate() {
            let key = scanner.name().to_lowercase();
            if self.index.get(&key) != Some(&position) {
                continue;
            }
            if let Some(set) = &selected {
                if !set.contains(&key) {
                    continue;
                }
            }
            let outcome = scanner.scan(prompt, output, options).await;
            collect(&mut results, scanner.name(), outcome);
        }

        results
    }
}

fn build_index<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (position, name) in names.enumerate() {
        if index.insert(name.to_lowercase(), position).is_some() {
            warn!(name, "duplicate scanner name; later registration wins");
        }
    }
    index
}

/// Lowercased selection set; `None` (or an empty list) means "all".
fn selection_set(names: Option<&[String]>) -> Option<HashSet<String>> {
    match names {
        None => None,
        Some(list) if list.is_empty() => None,
        Some(list) => Some(list.iter().map(|n| n.to_lowercase()).collect()),
    }
}

fn collect(
    results: &mut HashMap<String, ScanResult>,
    name: &str,
    outcome: Result<ScanResult, ScanError>,
) {
    match outcome {
        Ok(result) => {
            results.insert(name.to_string(), result);
        }
        Err(error) => {
            warn!(scanner = name, error = %error, "scanner failed; recording error result");
            results.insert(name.to_string(), error_result(&error));
        }
    }
    debug!(scanner = name, "collected scan result");
}

/// The dedicated result for a failed scan: inconclusive, not safe. Marked
/// detected at confidence 0.5 regardless of the caller's threshold (the scan
/// never completed, so the threshold never applied), carrying the stable
/// error code in metadata.
fn error_result(error: &ScanError) -> ScanResult {
    let mut metadata = Map::new();
    metadata.insert("error".to_string(), json!(error.code()));
    metadata.insert("message".to_string(), json!(error.to_string()));
    ScanResult::from_probability(
        ERROR_RESULT_CONFIDENCE,
        ERROR_RESULT_CONFIDENCE,
        Some(metadata),
        Duration::ZERO,
    )
}
