// Prompt-injection scanner: classifier when available, heuristics when not.
//
// Engine selection is decided once at construction and encoded as a variant,
// so every scan call is total: a configured tokenizer+classifier runs the
// DeBERTa model, a caller-injected scorer runs instead if one was supplied,
// and the heuristic cue formula covers the rest. A classifier that fails at
// call time is an error, never a silent heuristic downgrade — an outage
// must not masquerade as a clean verdict.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map};
use tracing::{debug, warn};

use crate::classifier::InjectionClassifier;
use crate::config::ScannerConfig;
use crate::scanner::heuristics;
use crate::scanner::types::{InputScanner, ScanError, ScanOptions, ScanResult};
use crate::tokenizer::{DebertaTokenizer, Encoding};

/// The name this scanner registers under.
pub const SCANNER_NAME: &str = "prompt_injection";

/// A caller-supplied scoring function: encoding in, injection probability
/// out. Lets hosts swap the ONNX session for another model runtime without
/// touching the scanner pipeline.
pub type ScoreFn = dyn Fn(&Encoding) -> anyhow::Result<f32> + Send + Sync;

/// The scoring engine, chosen at construction.
#[derive(Clone)]
enum Engine {
    Classifier(InjectionClassifier),
    Injected(Arc<ScoreFn>),
    Heuristic,
}

/// Prompt-injection scanner. Cheap to clone: all handles are shared and
/// immutable, so clones ride into spawn_blocking closures.
#[derive(Clone)]
pub struct PromptInjectionScanner {
    engine: Engine,
    tokenizer: Option<Arc<DebertaTokenizer>>,
    threshold: f32,
    max_len: usize,
}

impl PromptInjectionScanner {
    /// Build the scanner from configuration. Never fails: missing or broken
    /// artefacts demote the scanner to the heuristic engine with a warning,
    /// per the startup-diagnostic policy.
    pub fn from_config(config: &ScannerConfig) -> Self {
        let tokenizer = match (&config.spm_path, config.special_ids) {
            (Some(path), Some(ids)) => {
                match DebertaTokenizer::from_file(path, ids, config.max_len) {
                    Ok(t) => Some(Arc::new(t)),
                    Err(e) => {
                        warn!(
                            error = %e,
                            "tokenizer construction failed; scanner degrades to heuristics"
                        );
                        None
                    }
                }
            }
            _ => {
                debug!("tokenizer not configured (SentencePiece path or special IDs missing)");
                None
            }
        };

        let engine = if tokenizer.is_some() {
            match config.resolve_onnx_path() {
                Some(path) => match InjectionClassifier::load(&path) {
                    Ok(classifier) => Engine::Classifier(classifier),
                    Err(e) => {
                        warn!(
                            error = %e,
                            "classifier graph unavailable; scanner degrades to heuristics"
                        );
                        Engine::Heuristic
                    }
                },
                None => {
                    debug!("no classifier graph configured; using heuristic scoring");
                    Engine::Heuristic
                }
            }
        } else {
            Engine::Heuristic
        };

        Self {
            engine,
            tokenizer,
            threshold: config.threshold,
            max_len: config.max_len,
        }
    }

    /// Heuristics-only scanner, for hosts running without any model files.
    pub fn heuristic_only(threshold: f32) -> Self {
        Self {
            engine: Engine::Heuristic,
            tokenizer: None,
            threshold,
            max_len: crate::scanner::types::DEFAULT_MAX_TOKEN_LENGTH,
        }
    }

    /// Attach a tokenizer (e.g. one built over an already-loaded engine).
    pub fn with_tokenizer(mut self, tokenizer: Arc<DebertaTokenizer>) -> Self {
        self.max_len = tokenizer.max_len();
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Replace the scoring engine with a caller-supplied function. The
    /// injected path still requires a tokenizer; without one the scanner
    /// keeps falling back to heuristics.
    pub fn with_scorer(mut self, scorer: Arc<ScoreFn>) -> Self {
        self.engine = Engine::Injected(scorer);
        self
    }

    /// Encode text with the configured tokenizer.
    pub fn encode(&self, text: &str) -> Result<Encoding, ScanError> {
        match &self.tokenizer {
            Some(t) => Ok(t.encode(text)),
            None => Err(ScanError::TokenizerUnavailable),
        }
    }

    /// The full pipeline for one call; runs on a blocking worker.
    fn scan_sync(&self, text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        let threshold = options.threshold.unwrap_or(self.threshold);
        let effective_max = options.max_token_length.unwrap_or(self.max_len);
        let signal = heuristics::inspect(text);

        // Per-call max_token_length rebuilds a disposable tokenizer over the
        // shared SentencePiece handle; construction is cheap once the model
        // bytes are loaded.
        let tokenizer = match &self.tokenizer {
            Some(t) if t.max_len() == effective_max => Some(Arc::clone(t)),
            Some(t) => {
                let rebuilt = DebertaTokenizer::new(
                    Arc::clone(t.engine()),
                    t.specials(),
                    effective_max,
                    t.truncation(),
                )
                .map_err(|e| {
                    ScanError::InvalidInput(format!("max_token_length {effective_max}: {e}"))
                })?;
                Some(Arc::new(rebuilt))
            }
            None => None,
        };

        let mut seq_len = None;
        let (probability, engine_label) = match (&self.engine, &tokenizer) {
            (Engine::Classifier(classifier), Some(t)) => {
                let encoding = t.encode(text);
                seq_len = Some(encoding.real_len());
                let p = classifier
                    .score(&encoding)
                    .map_err(|e| ScanError::InferenceFailed(e.to_string()))?;
                (p, "deberta_onnx")
            }
            (Engine::Injected(scorer), Some(t)) => {
                let encoding = t.encode(text);
                seq_len = Some(encoding.real_len());
                let p = scorer(&encoding)
                    .map_err(|e| ScanError::InferenceFailed(e.to_string()))?;
                (p, "deberta_model")
            }
            (_, Some(_)) => (heuristics::probability(&signal), "heuristics+tokenizer"),
            (_, None) => (heuristics::probability(&signal), "heuristics"),
        };

        let metadata = if options.include_metadata {
            let mut map = Map::new();
            map.insert("engine".to_string(), json!(engine_label));
            map.insert("heuristic_cues".to_string(), json!(signal.cues));
            if let Some(n) = seq_len {
                map.insert("seq_len".to_string(), json!(n));
            }
            if let Some(t) = &tokenizer {
                map.insert("tokenizer_max_len".to_string(), json!(t.max_len()));
            }
            if engine_label.starts_with("heuristics") {
                map.insert("length".to_string(), json!(text.chars().count()));
            }
            Some(map)
        } else {
            None
        };

        debug!(
            engine = engine_label,
            probability,
            threshold,
            cues = signal.cues,
            "scanned input text"
        );

        Ok(ScanResult::from_probability(
            probability,
            threshold,
            metadata,
            Duration::ZERO,
        ))
    }
}

#[async_trait]
impl InputScanner for PromptInjectionScanner {
    fn name(&self) -> &str {
        SCANNER_NAME
    }

    /// Scan one text. Tokenization and inference are CPU-bound, so the work
    /// is offloaded to a blocking worker; the future resolves when the scan
    /// completes.
    async fn scan(&self, text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        let scanner = self.clone();
        let text = text.to_owned();
        let options = options.clone();
        let start = Instant::now();

        let mut result = tokio::task::spawn_blocking(move || scanner.scan_sync(&text, &options))
            .await
            .map_err(|e| ScanError::InternalError(format!("scan task panicked: {e}")))??;

        result.processing_time = start.elapsed();
        Ok(result)
    }
}
