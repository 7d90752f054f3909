// DeBERTa tokenization — special-token framing over the SentencePiece engine.

pub mod deberta;

pub use deberta::{DebertaTokenizer, Encoding, SpecialTokenIds, TruncationStrategy};
