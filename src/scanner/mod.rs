// Scanner orchestration — contracts, engines, registries, aggregation.

pub mod aggregate;
pub mod heuristics;
pub mod injection;
pub mod registry;
pub mod types;

pub use aggregate::{aggregate, AggregateReport, Decision, Finding, Severity};
pub use injection::{PromptInjectionScanner, ScoreFn, SCANNER_NAME};
pub use registry::{InputScannerRegistry, OutputScannerRegistry};
pub use types::{
    utf8_text, InputScanner, OutputScanner, RiskLevel, ScanError, ScanOptions, ScanResult,
};
