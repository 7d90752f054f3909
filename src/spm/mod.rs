// SentencePiece model loading and Unigram segmentation.

pub mod model;
pub mod unigram;

pub use unigram::SentencePieceEngine;
