// Checkpoint config.json assertions.
//
// The classifier never reads config.json at inference time; these checks
// exist so startup and tests can verify that the artefacts on disk belong to
// the DeBERTa-v3-base checkpoint the tokenizer's special IDs assume.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Expected values for the DeBERTa-v3-base prompt-injection checkpoint.
pub const EXPECTED_VOCAB_SIZE: u32 = 128_100;
pub const EXPECTED_PAD_TOKEN_ID: i32 = 0;
pub const EXPECTED_MAX_POSITION_EMBEDDINGS: usize = 512;

/// The subset of the checkpoint's config.json this crate asserts on.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMeta {
    pub vocab_size: u32,
    pub pad_token_id: i32,
    pub max_position_embeddings: usize,
}

impl ModelMeta {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse model config JSON")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model config: {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Verify the checkpoint matches the DeBERTa-v3-base layout.
    pub fn assert_deberta_v3_base(&self) -> Result<()> {
        if self.vocab_size != EXPECTED_VOCAB_SIZE {
            anyhow::bail!(
                "unexpected vocab_size: got {}, expected {}",
                self.vocab_size,
                EXPECTED_VOCAB_SIZE
            );
        }
        if self.pad_token_id != EXPECTED_PAD_TOKEN_ID {
            anyhow::bail!(
                "unexpected pad_token_id: got {}, expected {}",
                self.pad_token_id,
                EXPECTED_PAD_TOKEN_ID
            );
        }
        if self.max_position_embeddings != EXPECTED_MAX_POSITION_EMBEDDINGS {
            anyhow::bail!(
                "unexpected max_position_embeddings: got {}, expected {}",
                self.max_position_embeddings,
                EXPECTED_MAX_POSITION_EMBEDDINGS
            );
        }
        Ok(())
    }
}
