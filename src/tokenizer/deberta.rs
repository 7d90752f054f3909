// DeBERTa-v2/v3 tokenizer: wraps the SentencePiece engine with special-token
// framing, pair truncation, right-padding, and attention-mask construction.
//
// The classifier's accuracy depends on byte-exact token IDs, so the framing
// here follows the reference Hugging Face preprocessing: [CLS] A [SEP] for
// single sequences, [CLS] A [SEP] B [SEP] for pairs, PAD to max_len, mask 1
// for real tokens (specials included) and 0 for padding.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::spm::SentencePieceEngine;

/// The five checkpoint-specific special-token IDs. They are not stored in
/// the SentencePiece binary and must be supplied at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokenIds {
    pub pad: i32,
    pub cls: i32,
    pub sep: i32,
    pub unk: i32,
    pub mask: i32,
}

impl SpecialTokenIds {
    /// Canonical IDs for the DeBERTa-v3-base family of checkpoints.
    pub const DEBERTA_V3_BASE: SpecialTokenIds = SpecialTokenIds {
        pad: 0,
        cls: 1,
        sep: 2,
        unk: 3,
        mask: 128_000,
    };

    /// The literal-to-ID map handed to the SentencePiece engine so special
    /// substrings survive segmentation as single IDs.
    pub fn spm_literals(&self) -> Vec<(String, i32)> {
        vec![
            ("[PAD]".to_string(), self.pad),
            ("[CLS]".to_string(), self.cls),
            ("[SEP]".to_string(), self.sep),
            ("[UNK]".to_string(), self.unk),
            ("[MASK]".to_string(), self.mask),
        ]
    }
}

/// How pair encodings shed tokens when A and B together exceed the budget.
/// Truncation always drops from the back of a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationStrategy {
    /// Drop the last token of whichever side is currently longer; ties drop
    /// from A. Matches the Hugging Face default.
    #[default]
    LongestFirst,
    /// Drop from A until it is exhausted, then from B as a safety fallback.
    OnlyFirst,
}

/// A fixed-length encoded sequence: token IDs plus the parallel 0/1
/// attention mask, both exactly `max_len` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    pub input_ids: Vec<i32>,
    pub attention_mask: Vec<i32>,
}

impl Encoding {
    /// Number of positions the model should attend to (specials included).
    pub fn real_len(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }

    /// Total padded length.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Immutable tokenizer configuration over a shared SentencePiece handle.
pub struct DebertaTokenizer {
    engine: Arc<SentencePieceEngine>,
    specials: SpecialTokenIds,
    max_len: usize,
    truncation: TruncationStrategy,
}

impl DebertaTokenizer {
    /// Load the SentencePiece model from `path` and build a tokenizer with
    /// the default `LongestFirst` pair truncation.
    pub fn from_file(path: &Path, specials: SpecialTokenIds, max_len: usize) -> Result<Self> {
        let engine = SentencePieceEngine::from_file(path, &specials.spm_literals(), specials.unk)?;
        Self::new(
            Arc::new(engine),
            specials,
            max_len,
            TruncationStrategy::default(),
        )
    }

    /// Build a tokenizer over an existing engine. Fails if `max_len` cannot
    /// hold even an empty pair encoding (CLS + SEP + SEP).
    pub fn new(
        engine: Arc<SentencePieceEngine>,
        specials: SpecialTokenIds,
        max_len: usize,
        truncation: TruncationStrategy,
    ) -> Result<Self> {
        if max_len < 3 {
            bail!("max_len must be at least 3, got {max_len}");
        }
        Ok(Self {
            engine,
            specials,
            max_len,
            truncation,
        })
    }

    /// The shared SentencePiece handle, for building sibling tokenizers with
    /// a different `max_len` without re-reading the model.
    pub fn engine(&self) -> &Arc<SentencePieceEngine> {
        &self.engine
    }

    pub fn specials(&self) -> SpecialTokenIds {
        self.specials
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn truncation(&self) -> TruncationStrategy {
        self.truncation
    }

    /// Encode a single sequence: segment, frame as [CLS] A [SEP], truncate
    /// the body from the back if over budget, pad to `max_len`.
    pub fn encode(&self, text: &str) -> Encoding {
        let mut body = self.engine.encode(text);
        body.truncate(self.max_len - 2);

        let mut ids = Vec::with_capacity(self.max_len);
        ids.push(self.specials.cls);
        ids.extend_from_slice(&body);
        ids.push(self.specials.sep);
        self.finish(ids)
    }

    /// Encode a pair: segment both sides, shed tokens per the truncation
    /// strategy until they fit `max_len - 3`, frame as [CLS] A [SEP] B [SEP].
    pub fn encode_pair(&self, text_a: &str, text_b: &str) -> Encoding {
        let mut a = self.engine.encode(text_a);
        let mut b = self.engine.encode(text_b);
        let budget = self.max_len - 3;

        while a.len() + b.len() > budget {
            match self.truncation {
                TruncationStrategy::LongestFirst => {
                    if b.len() > a.len() {
                        b.pop();
                    } else {
                        a.pop();
                    }
                }
                TruncationStrategy::OnlyFirst => {
                    if a.pop().is_none() {
                        b.pop();
                    }
                }
            }
        }

        let mut ids = Vec::with_capacity(self.max_len);
        ids.push(self.specials.cls);
        ids.extend_from_slice(&a);
        ids.push(self.specials.sep);
        ids.extend_from_slice(&b);
        ids.push(self.specials.sep);
        self.finish(ids)
    }

    /// Right-pad with PAD to `max_len` and derive the attention mask.
    fn finish(&self, mut ids: Vec<i32>) -> Encoding {
        debug_assert!(ids.len() <= self.max_len);
        let real_len = ids.len();
        ids.resize(self.max_len, self.specials.pad);

        let mut attention_mask = vec![0; self.max_len];
        attention_mask[..real_len].fill(1);

        Encoding {
            input_ids: ids,
            attention_mask,
        }
    }
}
