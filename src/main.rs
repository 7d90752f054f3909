use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use palisade::config::ScannerConfig;
use palisade::download;
use palisade::scanner::{
    aggregate, Decision, InputScannerRegistry, PromptInjectionScanner, ScanOptions,
};
use palisade::tokenizer::SpecialTokenIds;

/// Palisade: prompt-injection scanning for LLM endpoints.
///
/// Scans user text with a DeBERTa-v3 classifier (when the checkpoint is
/// downloaded) or a heuristic cue scorer, and reports an admission decision.
#[derive(Parser)]
#[command(name = "palisade", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a piece of text for prompt injection
    Scan {
        /// The text to scan
        text: String,

        /// Detection threshold override (default: 0.5 or PI_THRESHOLD)
        #[arg(long)]
        threshold: Option<f32>,

        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download the classifier checkpoint (~700 MB)
    DownloadModel,

    /// Show cache contents and which scan engine would run
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("palisade=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            text,
            threshold,
            json,
        } => {
            let config = effective_config();
            let scanner = PromptInjectionScanner::from_config(&config);
            let registry = InputScannerRegistry::new(vec![Arc::new(scanner)]);

            let options = ScanOptions {
                threshold,
                ..Default::default()
            };
            let results = registry.scan(&text, None, &options).await;
            let report = aggregate(&results);

            if json {
                #[derive(serde::Serialize)]
                struct FullReport<'a> {
                    results: &'a std::collections::HashMap<String, palisade::scanner::ScanResult>,
                    report: &'a palisade::scanner::AggregateReport,
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&FullReport {
                        results: &results,
                        report: &report,
                    })?
                );
                return Ok(());
            }

            let decision = match report.decision {
                Decision::Allow => report.decision.as_str().green().bold(),
                Decision::Review => report.decision.as_str().yellow().bold(),
                Decision::Block => report.decision.as_str().red().bold(),
            };
            println!("Decision: {decision}");
            println!(
                "Max confidence: {:.3}  Highest severity: {}",
                report.max_score, report.highest_severity
            );

            for finding in &report.findings {
                let (name, result) = (finding.scanner.as_str(), &results[&finding.scanner]);
                println!(
                    "\n  {} — {} (confidence {:.3}, risk {}, {:?})",
                    name.bold(),
                    finding.code,
                    finding.confidence,
                    result.risk_level,
                    result.processing_time,
                );
                if let Some(metadata) = &finding.metadata {
                    if let Some(engine) = metadata.get("engine") {
                        println!("    engine: {}", engine.as_str().unwrap_or("?"));
                    }
                }
            }
        }

        Commands::DownloadModel => {
            let config = ScannerConfig::from_env();
            let model_dir = config.model_dir();

            println!("Downloading prompt-injection checkpoint...");
            println!("  Destination: {}", model_dir.display());

            download::download_model(&model_dir, &config).await?;

            println!("\n{}", "Checkpoint downloaded successfully.".bold());
            println!("You can now run `palisade scan \"some text\"`.");
        }

        Commands::Status => {
            let config = effective_config();
            let model_dir = config.model_dir();

            println!("Model cache: {}", model_dir.display());
            println!(
                "  SentencePiece model: {}",
                presence(download::spm_file_present(&model_dir))
            );
            println!(
                "  Classifier graph:    {}",
                presence(model_dir.join(download::ONNX_FILE).exists())
            );

            let engine = if config.spm_path.is_some()
                && config.special_ids.is_some()
                && config.resolve_onnx_path().is_some()
            {
                "deberta_onnx"
            } else if config.spm_path.is_some() && config.special_ids.is_some() {
                "heuristics+tokenizer"
            } else {
                "heuristics"
            };
            println!("Scan engine: {}", engine.bold());
            println!("Threshold: {}", config.threshold);

            if engine == "heuristics" {
                println!(
                    "{}",
                    "Tip: run `palisade download-model` to enable the classifier.".dimmed()
                );
            }
        }
    }

    Ok(())
}

/// Env config, with the download cache wired in as a host-level fallback:
/// when no SentencePiece path is configured but the cache holds one, use it
/// together with the canonical DeBERTa-v3-base special IDs.
fn effective_config() -> ScannerConfig {
    let mut config = ScannerConfig::from_env();
    let model_dir = config.model_dir();

    if config.spm_path.is_none() && download::spm_file_present(&model_dir) {
        info!("using cached SentencePiece model from {}", model_dir.display());
        config.spm_path = Some(model_dir.join(download::SPM_FILE));
        if config.special_ids.is_none() {
            config.special_ids = Some(SpecialTokenIds::DEBERTA_V3_BASE);
        }
    }

    config
}

fn presence(present: bool) -> colored::ColoredString {
    if present {
        "present".green()
    } else {
        "missing".red()
    }
}
