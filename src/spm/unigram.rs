// SentencePiece Unigram segmentation engine.
//
// Loads the binary model once and segments normalized text into subword IDs
// with a Viterbi maximum-likelihood decode over piece scores. The engine is
// immutable after construction and shared read-only across scanners — the
// tokenizer layers special-token framing on top, so no BOS/EOS handling
// happens here.
//
// Preprocessing mirrors the reference Hugging Face DeBERTa pipeline: NFKC,
// control-character removal, whitespace-run collapse, then metaspace marking
// with a dummy prefix. Caller-supplied special-token literals (e.g. "[CLS]")
// are split out before segmentation so they survive as single IDs.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use super::model::ModelProto;

/// The SentencePiece whitespace marker (U+2581).
pub const METASPACE: char = '\u{2581}';

/// Score assigned to a single unknown character, relative to the worst
/// in-vocabulary piece. Any real piece beats the unknown path.
const UNK_PENALTY: f32 = 10.0;

/// Unigram segmentation engine over a parsed SentencePiece vocabulary.
pub struct SentencePieceEngine {
    /// Matchable pieces: text -> (token ID, log-probability score).
    pieces: HashMap<String, (i32, f32)>,
    /// Total piece count in the model, including control placeholders.
    vocab_size: usize,
    /// Special-token literals and their IDs, longest literal first.
    specials: Vec<(String, i32)>,
    unk_id: i32,
    unk_score: f32,
    max_piece_chars: usize,
    /// Parity-test mode: lowercase after whitespace collapse. Never set in
    /// production encoding — the shipped vocabulary is cased.
    lowercase: bool,
}

impl SentencePieceEngine {
    /// Load a model from a file path. `special_tokens` maps literal strings
    /// (e.g. `"[SEP]"`) to the IDs they must segment to; `unk_id` is the ID
    /// emitted for characters no piece covers.
    pub fn from_file(path: &Path, special_tokens: &[(String, i32)], unk_id: i32) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read SentencePiece model: {}", path.display()))?;
        Self::from_bytes(&bytes, special_tokens, unk_id)
    }

    /// Load a model from an in-memory byte stream.
    pub fn from_bytes(bytes: &[u8], special_tokens: &[(String, i32)], unk_id: i32) -> Result<Self> {
        let proto = ModelProto::from_bytes(bytes).context("failed to parse SentencePiece model")?;

        let mut pieces = HashMap::with_capacity(proto.pieces.len());
        let mut min_score = 0.0f32;
        let mut max_piece_chars = 1;

        for (index, entry) in proto.pieces.iter().enumerate() {
            if !entry.kind.is_matchable() {
                continue;
            }
            // First occurrence wins; the index is the token ID.
            pieces
                .entry(entry.piece.clone())
                .or_insert((index as i32, entry.score));
            min_score = min_score.min(entry.score);
            max_piece_chars = max_piece_chars.max(entry.piece.chars().count());
        }

        let mut specials = special_tokens.to_vec();
        specials.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        debug!(
            vocab_size = proto.pieces.len(),
            matchable = pieces.len(),
            "loaded SentencePiece model"
        );

        Ok(Self {
            pieces,
            vocab_size: proto.pieces.len(),
            specials,
            unk_id,
            unk_score: min_score - UNK_PENALTY,
            max_piece_chars,
            lowercase: false,
        })
    }

    /// Switch the engine into lowered mode (lowercase before segmentation).
    /// Used only by vocabulary parity tests; production encodings are cased.
    pub fn with_lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Number of pieces in the loaded model, control placeholders included.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Look up the ID of a vocabulary piece (e.g. `"\u{2581}hello"`).
    pub fn piece_id(&self, piece: &str) -> Option<i32> {
        self.pieces.get(piece).map(|&(id, _)| id)
    }

    /// Segment text into token IDs. Deterministic; safe to call from
    /// multiple threads concurrently.
    pub fn encode(&self, text: &str) -> Vec<i32> {
        let mut ids = Vec::new();
        for segment in self.split_specials(text) {
            match segment {
                Segment::Special(id) => ids.push(id),
                Segment::Text(raw) => self.encode_segment(raw, &mut ids),
            }
        }
        ids
    }

    /// Split the input on special-token literals so they map to single IDs.
    /// Longer literals take precedence at a given position.
    fn split_specials<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        if self.specials.is_empty() {
            return vec![Segment::Text(text)];
        }

        let mut segments = Vec::new();
        let mut seg_start = 0;
        let mut i = 0;
        while i < text.len() {
            let matched = self
                .specials
                .iter()
                .find(|(literal, _)| text[i..].starts_with(literal.as_str()));
            if let Some((literal, id)) = matched {
                if seg_start < i {
                    segments.push(Segment::Text(&text[seg_start..i]));
                }
                segments.push(Segment::Special(*id));
                i += literal.len();
                seg_start = i;
            } else {
                i += text[i..].chars().next().map_or(1, char::len_utf8);
            }
        }
        if seg_start < text.len() {
            segments.push(Segment::Text(&text[seg_start..]));
        }
        segments
    }

    fn encode_segment(&self, raw: &str, out: &mut Vec<i32>) {
        let normalized = self.normalize(raw);
        if normalized.is_empty() {
            return;
        }
        let mut marked = String::with_capacity(normalized.len() + METASPACE.len_utf8());
        marked.push(METASPACE);
        for c in normalized.chars() {
            marked.push(if c == ' ' { METASPACE } else { c });
        }
        self.viterbi(&marked, out);
    }

    /// NFKC, strip control characters, collapse whitespace runs to a single
    /// space (which also trims), and optionally lowercase.
    fn normalize(&self, raw: &str) -> String {
        let cleaned: String = raw
            .nfkc()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.lowercase {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }

    /// Maximum-likelihood segmentation. Every position is reachable through
    /// the single-character unknown transition, so the decode is total;
    /// consecutive unknown characters merge into one UNK.
    fn viterbi(&self, text: &str, out: &mut Vec<i32>) {
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = offsets.len() - 1;
        if n == 0 {
            return;
        }

        #[derive(Clone, Copy)]
        struct Node {
            score: f32,
            prev: usize,
            /// `None` marks the unknown-character transition.
            id: Option<i32>,
        }

        let mut dp: Vec<Option<Node>> = vec![None; n + 1];
        dp[0] = Some(Node {
            score: 0.0,
            prev: 0,
            id: None,
        });

        for end in 1..=n {
            let mut best: Option<Node> = None;

            let start_lo = end.saturating_sub(self.max_piece_chars);
            for start in start_lo..end {
                let Some(prev) = dp[start] else { continue };
                let piece = &text[offsets[start]..offsets[end]];
                if let Some(&(id, piece_score)) = self.pieces.get(piece) {
                    let score = prev.score + piece_score;
                    if best.is_none_or(|b| score > b.score) {
                        best = Some(Node {
                            score,
                            prev: start,
                            id: Some(id),
                        });
                    }
                }
            }

            if let Some(prev) = dp[end - 1] {
                let score = prev.score + self.unk_score;
                if best.is_none_or(|b| score > b.score) {
                    best = Some(Node {
                        score,
                        prev: end - 1,
                        id: None,
                    });
                }
            }

            dp[end] = best;
        }

        let mut reversed = Vec::new();
        let mut pos = n;
        while pos > 0 {
            let node = dp[pos].expect("unknown transition keeps every position reachable");
            reversed.push(node.id);
            pos = node.prev;
        }

        let mut last_was_unk = false;
        for id in reversed.into_iter().rev() {
            match id {
                Some(id) => {
                    out.push(id);
                    last_was_unk = false;
                }
                None => {
                    if !last_was_unk {
                        out.push(self.unk_id);
                        last_was_unk = true;
                    }
                }
            }
        }
    }
}

enum Segment<'a> {
    Text(&'a str),
    Special(i32),
}
