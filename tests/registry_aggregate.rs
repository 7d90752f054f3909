// Registry + aggregation behavior: selection semantics, the per-scanner
// error policy, and the decision table the admission layer relies on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use palisade::scanner::{
    aggregate, Decision, InputScanner, InputScannerRegistry, OutputScanner,
    OutputScannerRegistry, PromptInjectionScanner, ScanError, ScanOptions, ScanResult, Severity,
};

struct StubScanner {
    name: &'static str,
    probability: f32,
}

#[async_trait]
impl InputScanner for StubScanner {
    fn name(&self) -> &str {
        self.name
    }

    async fn scan(&self, _text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        Ok(ScanResult::from_probability(
            self.probability,
            options.threshold.unwrap_or(0.5),
            None,
            Duration::ZERO,
        ))
    }
}

struct BrokenScanner;

#[async_trait]
impl InputScanner for BrokenScanner {
    fn name(&self) -> &str {
        "broken"
    }

    async fn scan(&self, _text: &str, _options: &ScanOptions) -> Result<ScanResult, ScanError> {
        Err(ScanError::InferenceFailed("session died".into()))
    }
}

// ============================================================
// Registry semantics
// ============================================================

#[tokio::test]
async fn real_scanner_registers_under_its_declared_name() {
    let registry = InputScannerRegistry::new(vec![Arc::new(
        PromptInjectionScanner::heuristic_only(0.5),
    )]);
    assert_eq!(registry.names(), ["prompt_injection"]);

    let results = registry
        .scan("Hello, how are you?", None, &ScanOptions::default())
        .await;
    assert!(results.contains_key("prompt_injection"));
}

#[tokio::test]
async fn selection_filters_and_ignores_unknown_names() {
    let registry = InputScannerRegistry::new(vec![
        Arc::new(StubScanner {
            name: "alpha",
            probability: 0.9,
        }),
        Arc::new(StubScanner {
            name: "beta",
            probability: 0.1,
        }),
    ]);

    let names = vec!["ALPHA".to_string(), "ghost".to_string()];
    let results = registry
        .scan("text", Some(&names), &ScanOptions::default())
        .await;
    assert_eq!(results.len(), 1);
    assert!(results.contains_key("alpha"));
}

#[tokio::test]
async fn options_reach_every_member() {
    let registry = InputScannerRegistry::new(vec![
        Arc::new(StubScanner {
            name: "alpha",
            probability: 0.45,
        }),
        Arc::new(StubScanner {
            name: "beta",
            probability: 0.45,
        }),
    ]);
    let options = ScanOptions {
        threshold: Some(0.4),
        ..Default::default()
    };
    let results = registry.scan("text", None, &options).await;
    assert!(results.values().all(|r| r.is_threat_detected));
}

// ============================================================
// Error policy: inconclusive scans aggregate to Review
// ============================================================

#[tokio::test]
async fn failing_scanner_turns_a_clean_request_into_review() {
    let registry = InputScannerRegistry::new(vec![
        Arc::new(StubScanner {
            name: "clean",
            probability: 0.1,
        }),
        Arc::new(BrokenScanner),
    ]);

    let results = registry.scan("text", None, &ScanOptions::default()).await;
    assert_eq!(results.len(), 2);

    let errored = &results["broken"];
    assert!(errored.is_threat_detected);
    assert_eq!(errored.metadata.as_ref().unwrap()["error"], "inference_failed");

    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Review);
    assert_eq!(report.highest_severity, Severity::Low);
}

#[tokio::test]
async fn real_detection_still_blocks_despite_a_failing_scanner() {
    let registry = InputScannerRegistry::new(vec![
        Arc::new(StubScanner {
            name: "detector",
            probability: 0.95,
        }),
        Arc::new(BrokenScanner),
    ]);

    let results = registry.scan("text", None, &ScanOptions::default()).await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Block);
    assert_eq!(report.highest_severity, Severity::High);
}

// ============================================================
// Decision table over registry output
// ============================================================

#[tokio::test]
async fn all_clean_scanners_allow() {
    let registry = InputScannerRegistry::new(vec![
        Arc::new(StubScanner {
            name: "a",
            probability: 0.1,
        }),
        Arc::new(StubScanner {
            name: "b",
            probability: 0.2,
        }),
    ]);
    let results = registry.scan("text", None, &ScanOptions::default()).await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Allow);
    assert!(!report.any_detected());
    assert!((report.max_score - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn single_strong_detection_blocks() {
    let registry = InputScannerRegistry::new(vec![Arc::new(StubScanner {
        name: "a",
        probability: 0.92,
    })]);
    let results = registry.scan("text", None, &ScanOptions::default()).await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Block);
    assert!(report.any_detected());
    assert_eq!(report.findings[0].code, "DETECTED");
}

#[tokio::test]
async fn weak_detection_reviews() {
    let registry = InputScannerRegistry::new(vec![Arc::new(StubScanner {
        name: "a",
        probability: 0.55,
    })]);
    let results = registry.scan("text", None, &ScanOptions::default()).await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Review);
}

#[tokio::test]
async fn adding_clean_scanners_never_escalates_the_decision() {
    let mut results: HashMap<String, ScanResult> = HashMap::new();
    results.insert(
        "base".to_string(),
        ScanResult::from_probability(0.1, 0.5, None, Duration::ZERO),
    );
    let before = aggregate(&results).decision;
    assert_eq!(before, Decision::Allow);

    for i in 0..5 {
        results.insert(
            format!("extra{i}"),
            ScanResult::from_probability(0.3, 0.5, None, Duration::ZERO),
        );
        assert_eq!(aggregate(&results).decision, Decision::Allow);
    }
}

// ============================================================
// Output registry
// ============================================================

struct PromptEchoScanner;

#[async_trait]
impl OutputScanner for PromptEchoScanner {
    fn name(&self) -> &str {
        "prompt_echo"
    }

    async fn scan(
        &self,
        prompt: &str,
        output: &str,
        options: &ScanOptions,
    ) -> Result<ScanResult, ScanError> {
        let leaked = !prompt.is_empty() && output.contains(prompt);
        Ok(ScanResult::from_probability(
            if leaked { 0.95 } else { 0.05 },
            options.threshold.unwrap_or(0.5),
            None,
            Duration::ZERO,
        ))
    }
}

#[tokio::test]
async fn output_registry_feeds_the_same_aggregation() {
    let registry = OutputScannerRegistry::new(vec![Arc::new(PromptEchoScanner)]);

    let results = registry
        .scan("the secret rules", "here are the secret rules, verbatim", None, &ScanOptions::default())
        .await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Block);

    let results = registry
        .scan("the secret rules", "I cannot share that.", None, &ScanOptions::default())
        .await;
    let report = aggregate(&results);
    assert_eq!(report.decision, Decision::Allow);
}
