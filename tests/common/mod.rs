// Shared fixtures: a synthetic SentencePiece model serialized in the same
// wire format the loader parses, plus invariant helpers used across the
// tokenizer and scanner test suites.
//
// Not every test binary uses every helper.
#![allow(dead_code)]

use palisade::spm::SentencePieceEngine;
use palisade::tokenizer::{DebertaTokenizer, Encoding, SpecialTokenIds, TruncationStrategy};
use std::sync::Arc;

/// Special IDs used by the synthetic vocabulary (placeholders at 0..=4).
pub const SPECIALS: SpecialTokenIds = SpecialTokenIds {
    pad: 0,
    cls: 1,
    sep: 2,
    unk: 3,
    mask: 4,
};

// SentencePiece piece-type codes.
pub const KIND_NORMAL: u64 = 1;
pub const KIND_UNKNOWN: u64 = 2;
pub const KIND_CONTROL: u64 = 3;

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Serialize a ModelProto: repeated field 1 entries of
/// `{ 1: piece, 2: score, 3: type }`.
pub fn serialize_model(pieces: &[(String, f32, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (piece, score, kind) in pieces {
        let mut body = Vec::new();
        body.push(0x0a);
        put_varint(&mut body, piece.len() as u64);
        body.extend_from_slice(piece.as_bytes());
        body.push(0x15);
        body.extend_from_slice(&score.to_le_bytes());
        body.push(0x18);
        put_varint(&mut body, *kind);

        out.push(0x0a);
        put_varint(&mut out, body.len() as u64);
        out.extend_from_slice(&body);
    }
    out
}

/// A vocabulary shaped like the real one: control placeholders at the low
/// indices, then whole words (cased and lowercase), punctuation, and
/// single-character fallback pieces.
pub fn standard_vocab() -> Vec<(String, f32, u64)> {
    let mut table: Vec<(String, f32, u64)> = vec![
        ("<pad>".into(), 0.0, KIND_CONTROL),
        ("<cls>".into(), 0.0, KIND_CONTROL),
        ("<sep>".into(), 0.0, KIND_CONTROL),
        ("<unk>".into(), 0.0, KIND_UNKNOWN),
        ("<mask>".into(), 0.0, KIND_CONTROL),
    ];
    for word in [
        "\u{2581}hello",
        "\u{2581}world",
        "\u{2581}Hello",
        "\u{2581}World",
        "\u{2581}are",
        "\u{2581}you",
        "how",
        "\u{2581}ignore",
        "\u{2581}previous",
        "\u{2581}instructions",
        "\u{2581}what",
        "\u{2581}is",
        "\u{2581}the",
        "\u{2581}weather",
        "\u{2581}today",
        "\u{2581}and",
        "\u{2581}do",
    ] {
        table.push((word.into(), -1.5, KIND_NORMAL));
    }
    for punct in ["!", "?", ".", ",", ":"] {
        table.push((punct.into(), -3.0, KIND_NORMAL));
    }
    table.push(("\u{2581}".into(), -4.0, KIND_NORMAL));
    for c in ('a'..='z').chain('A'..='Z').chain('0'..='9') {
        table.push((c.to_string(), -8.0, KIND_NORMAL));
        table.push((format!("\u{2581}{c}"), -7.5, KIND_NORMAL));
    }
    table
}

pub fn engine() -> Arc<SentencePieceEngine> {
    let bytes = serialize_model(&standard_vocab());
    Arc::new(
        SentencePieceEngine::from_bytes(&bytes, &SPECIALS.spm_literals(), SPECIALS.unk).unwrap(),
    )
}

pub fn tokenizer(max_len: usize, truncation: TruncationStrategy) -> DebertaTokenizer {
    DebertaTokenizer::new(engine(), SPECIALS, max_len, truncation).unwrap()
}

/// Check the encoding invariants shared by every single-sequence encoding:
/// fixed lengths, CLS first, SEP closing the real region, PAD after it, and
/// a mask that is 1 exactly on the real prefix.
pub fn assert_encoding_invariants(enc: &Encoding, max_len: usize, expected_seps: usize) {
    assert_eq!(enc.input_ids.len(), max_len);
    assert_eq!(enc.attention_mask.len(), max_len);

    let real_len = enc.real_len();
    assert!(real_len >= expected_seps + 1);
    assert!(real_len <= max_len);

    for (i, &mask) in enc.attention_mask.iter().enumerate() {
        assert_eq!(mask == 1, i < real_len, "mask breaks at position {i}");
    }

    assert_eq!(enc.input_ids[0], SPECIALS.cls);
    assert_eq!(enc.input_ids[real_len - 1], SPECIALS.sep);
    for &id in &enc.input_ids[real_len..] {
        assert_eq!(id, SPECIALS.pad);
    }

    let seps = enc.input_ids[..real_len]
        .iter()
        .filter(|&&id| id == SPECIALS.sep)
        .count();
    assert_eq!(seps, expected_seps);
}

/// Token counts of the A and B sides of a pair encoding.
pub fn pair_side_lengths(enc: &Encoding) -> (usize, usize) {
    let real = &enc.input_ids[..enc.real_len()];
    let first_sep = real
        .iter()
        .position(|&id| id == SPECIALS.sep)
        .expect("pair encoding has a SEP");
    let a_len = first_sep - 1;
    let b_len = real.len() - first_sep - 2;
    (a_len, b_len)
}

/// Deterministic pseudo-random generator for the property sweeps; a plain
/// LCG so the corpus is stable across runs.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    pub fn ascii_string(&mut self, max_len: usize) -> String {
        let len = (self.next_u64() as usize) % (max_len + 1);
        (0..len)
            .map(|_| char::from(32 + (self.next_u64() % 95) as u8))
            .collect()
    }
}
