// Palisade: prompt-injection scanning for LLM endpoints.
//
// This is the library root. Each module corresponds to a stage of the
// scanning pipeline, leaves first: SentencePiece segmentation, DeBERTa
// tokenization, ONNX classification, then scanner orchestration.

pub mod classifier;
pub mod config;
pub mod download;
pub mod scanner;
pub mod spm;
pub mod tokenizer;
