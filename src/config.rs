// Central configuration for the scanning core.
//
// All settings come from env vars, ingested once into a plain record that is
// passed through construction — the env surface is an ingestion mechanism,
// not process-global state, and hosts can build the record programmatically
// instead. The .env file is loaded at startup by the binary via dotenvy.

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::download;
use crate::scanner::types::{DEFAULT_MAX_TOKEN_LENGTH, DEFAULT_THRESHOLD};
use crate::tokenizer::SpecialTokenIds;

/// Hugging Face repo of the shipped prompt-injection checkpoint.
pub const DEFAULT_ONNX_REPO: &str = "protectai/deberta-v3-base-prompt-injection-v2";
pub const DEFAULT_ONNX_REVISION: &str = "main";
/// Path of the graph inside the repo.
pub const DEFAULT_ONNX_FILENAME: &str = "onnx/model.onnx";

/// Scanner construction settings, with the defaults documented per field.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Path to the SentencePiece model. Absent: tokenizer disabled.
    pub spm_path: Option<PathBuf>,
    /// The five special-token IDs. Absent (any of the five env vars
    /// missing): tokenizer disabled.
    pub special_ids: Option<SpecialTokenIds>,
    /// Tokenizer length. Default 512.
    pub max_len: usize,
    /// Default detection threshold. Default 0.5.
    pub threshold: f32,
    /// Explicit path to the classifier graph. Absent: the download cache is
    /// tried as a fallback.
    pub onnx_path: Option<PathBuf>,
    /// Remote checkpoint locator, used by the download helper.
    pub onnx_repo: String,
    pub onnx_revision: String,
    pub onnx_filename: String,
    /// Override for the local model cache directory.
    pub onnx_local_path: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            spm_path: None,
            special_ids: None,
            max_len: DEFAULT_MAX_TOKEN_LENGTH,
            threshold: DEFAULT_THRESHOLD,
            onnx_path: None,
            onnx_repo: DEFAULT_ONNX_REPO.to_string(),
            onnx_revision: DEFAULT_ONNX_REVISION.to_string(),
            onnx_filename: DEFAULT_ONNX_FILENAME.to_string(),
            onnx_local_path: None,
        }
    }
}

impl ScannerConfig {
    /// Ingest configuration from the environment. Malformed numeric values
    /// fall back to the default with a warning rather than aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            spm_path: env_path("DEBERTA_SPM_PATH"),
            special_ids: special_ids_from_env(),
            max_len: env_parse("DEBERTA_MAX_LEN").unwrap_or(defaults.max_len),
            threshold: env_parse("PI_THRESHOLD").unwrap_or(defaults.threshold),
            onnx_path: env_path("PI_ONNX_PATH"),
            onnx_repo: env::var("PI_ONNX_REPO").unwrap_or(defaults.onnx_repo),
            onnx_revision: env::var("PI_ONNX_REVISION").unwrap_or(defaults.onnx_revision),
            onnx_filename: env::var("PI_ONNX_FILENAME").unwrap_or(defaults.onnx_filename),
            onnx_local_path: env_path("PI_ONNX_LOCAL_PATH"),
        }
    }

    /// The directory the download helper writes to and the classifier
    /// fallback reads from.
    pub fn model_dir(&self) -> PathBuf {
        self.onnx_local_path
            .clone()
            .unwrap_or_else(download::default_model_dir)
    }

    /// Resolve the classifier graph: the explicit path when configured,
    /// otherwise the cached download if it exists.
    pub fn resolve_onnx_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.onnx_path {
            return Some(path.clone());
        }
        let cached = self.model_dir().join(download::ONNX_FILE);
        cached.exists().then_some(cached)
    }
}

/// Read the five special-token ID vars; all must be present and valid or
/// the tokenizer stays disabled.
fn special_ids_from_env() -> Option<SpecialTokenIds> {
    let vars = [
        "DEBERTA_CLS_ID",
        "DEBERTA_SEP_ID",
        "DEBERTA_PAD_ID",
        "DEBERTA_MASK_ID",
        "DEBERTA_UNK_ID",
    ];
    if vars.iter().all(|v| env::var(v).is_err()) {
        return None;
    }

    let cls = env_parse("DEBERTA_CLS_ID")?;
    let sep = env_parse("DEBERTA_SEP_ID")?;
    let pad = env_parse("DEBERTA_PAD_ID")?;
    let mask = env_parse("DEBERTA_MASK_ID")?;
    let unk = env_parse("DEBERTA_UNK_ID")?;
    Some(SpecialTokenIds {
        pad,
        cls,
        sep,
        unk,
        mask,
    })
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring malformed configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ScannerConfig::default();
        assert_eq!(config.max_len, 512);
        assert_eq!(config.threshold, 0.5);
        assert!(config.spm_path.is_none());
        assert!(config.special_ids.is_none());
        assert!(config.onnx_path.is_none());
        assert_eq!(config.onnx_repo, DEFAULT_ONNX_REPO);
        assert_eq!(config.onnx_revision, "main");
        assert_eq!(config.onnx_filename, "onnx/model.onnx");
    }

    #[test]
    fn explicit_onnx_path_wins_over_cache() {
        let config = ScannerConfig {
            onnx_path: Some(PathBuf::from("/models/custom.onnx")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_onnx_path(),
            Some(PathBuf::from("/models/custom.onnx"))
        );
    }

    #[test]
    fn missing_cache_resolves_to_none() {
        let config = ScannerConfig {
            onnx_local_path: Some(PathBuf::from("/nonexistent/palisade-cache")),
            ..Default::default()
        };
        assert!(config.resolve_onnx_path().is_none());
    }
}
