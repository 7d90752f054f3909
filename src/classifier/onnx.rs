// Local ONNX classifier for prompt-injection detection.
//
// Runs the exported DeBERTa-v3 binary classifier on the CPU — no API calls,
// no network dependency. Inputs are two int64 tensors of shape [1, max_len]
// (token IDs and attention mask); the output is a [1, 2] float32 logit pair
// where class 1 means injection.
//
// Exports differ in how they name their graph inputs, so the session binds
// canonical names ("input_ids", "attention_mask", "logits") when present and
// falls back to positional binding otherwise.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::debug;

use crate::tokenizer::Encoding;

const CANONICAL_INPUT_IDS: &str = "input_ids";
const CANONICAL_ATTENTION_MASK: &str = "attention_mask";
const CANONICAL_LOGITS: &str = "logits";

/// Epsilon keeping the softmax denominator away from zero.
const SOFTMAX_EPSILON: f32 = 1e-9;

/// ONNX-backed injection classifier. Holds the session behind Arc<Mutex>
/// because `ort::Session::run` takes `&mut self`; the handle is cheap to
/// clone into spawn_blocking closures, and inference is serialized through
/// the lock.
#[derive(Clone)]
pub struct InjectionClassifier {
    session: Arc<Mutex<Session>>,
    input_ids_name: String,
    attention_mask_name: String,
    logits_index: usize,
}

impl InjectionClassifier {
    /// Load the classifier graph from the given file.
    ///
    /// Call `download::download_model()` first if the file doesn't exist.
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            anyhow::bail!(
                "Classifier graph not found: {}\nRun `palisade download-model` to download it.",
                model_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("Failed to load classifier graph from {}", model_path.display())
            })?;

        let input_names: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        if input_names.len() < 2 {
            anyhow::bail!(
                "Classifier graph declares {} input(s); expected token IDs and attention mask",
                input_names.len()
            );
        }
        if output_names.is_empty() {
            anyhow::bail!("Classifier graph declares no outputs");
        }

        let has_canonical_inputs = input_names.iter().any(|n| n == CANONICAL_INPUT_IDS)
            && input_names.iter().any(|n| n == CANONICAL_ATTENTION_MASK);
        let (input_ids_name, attention_mask_name) = if has_canonical_inputs {
            (CANONICAL_INPUT_IDS.to_string(), CANONICAL_ATTENTION_MASK.to_string())
        } else {
            // Positional binding: first two inputs, in declaration order.
            (input_names[0].clone(), input_names[1].clone())
        };

        // The canonical "logits" output when the export names it, otherwise
        // the first output.
        let logits_index = output_names
            .iter()
            .position(|n| n == CANONICAL_LOGITS)
            .unwrap_or(0);

        debug!(
            input_ids = %input_ids_name,
            attention_mask = %attention_mask_name,
            logits = %output_names[logits_index],
            "Loaded classifier graph from {}",
            model_path.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_ids_name,
            attention_mask_name,
            logits_index,
        })
    }

    /// Score an encoding: run the graph once and return the probability of
    /// class 1 (injection).
    pub fn score(&self, encoding: &Encoding) -> Result<f32> {
        let len = encoding.input_ids.len();

        // The graph takes int64; token IDs are i32, widened positionally.
        let ids: Vec<i64> = encoding.input_ids.iter().map(|&id| i64::from(id)).collect();
        let mask: Vec<i64> = encoding
            .attention_mask
            .iter()
            .map(|&m| i64::from(m))
            .collect();

        let shape = [1i64, len as i64];
        let ids_tensor =
            Tensor::from_array((shape, ids)).context("Failed to create input_ids tensor")?;
        let mask_tensor =
            Tensor::from_array((shape, mask)).context("Failed to create attention_mask tensor")?;

        // Inputs are bound by the names discovered at load time, so exports
        // with unusual naming still run.
        let inputs: Vec<(String, SessionInputValue<'static>)> = vec![
            (
                self.input_ids_name.clone(),
                SessionInputValue::Owned(ids_tensor.into_dyn()),
            ),
            (
                self.attention_mask_name.clone(),
                SessionInputValue::Owned(mask_tensor.into_dyn()),
            ),
        ];

        let logits = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

            let outputs = session.run(inputs).context("ONNX inference failed")?;

            let (_shape, data) = outputs[self.logits_index]
                .try_extract_tensor::<f32>()
                .context("Failed to extract logits tensor")?;

            data.to_vec()
        };

        if logits.len() < 2 {
            anyhow::bail!(
                "Malformed logits tensor: expected [1, 2], got {} value(s)",
                logits.len()
            );
        }

        Ok(softmax_binary(logits[0], logits[1]))
    }
}

/// Numerically stable two-class softmax: probability of class 1.
pub fn softmax_binary(l0: f32, l1: f32) -> f32 {
    let m = l0.max(l1);
    let e0 = (l0 - m).exp();
    let e1 = (l1 - m).exp();
    e1 / (e0 + e1 + SOFTMAX_EPSILON)
}
