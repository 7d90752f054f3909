// Classifier runtime — ONNX execution of the exported DeBERTa graph.

pub mod meta;
pub mod onnx;

pub use meta::ModelMeta;
pub use onnx::{softmax_binary, InjectionClassifier};
