// Heuristic cue scoring — the graceful-degradation path.
//
// A fixed dictionary of injection phrasings checked as case-insensitive
// substrings. This is deliberately a compile-time constant: extending the
// list is a recompile, not a runtime feature, so detection policy can't
// drift between deployments.
//
// The probability formula is LOW PRECISION. It exists only so the scanner
// keeps producing calibrated-looking scores when no classifier is available;
// anything security-sensitive should run the model.

/// Injection cue phrases, sorted, lower-case.
pub const HEURISTIC_PHRASES: [&str; 5] = [
    "act as",
    "disregard the rules",
    "ignore previous",
    "override",
    "system:",
];

/// Phrases suggesting the text impersonates a system or role prompt.
const ADMIN_HINTS: [&str; 2] = ["system:", "you are"];

/// Base probability assigned to any text before cues are counted.
const BASE_PROBABILITY: f32 = 0.15;
/// Added per matched cue phrase.
const CUE_WEIGHT: f32 = 0.25;
/// Added when the text carries an admin hint.
const ADMIN_WEIGHT: f32 = 0.20;
/// The heuristic path never claims near-certainty.
const MAX_PROBABILITY: f32 = 0.98;

/// What the cue scorer saw in one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicSignal {
    /// Number of distinct cue phrases present.
    pub cues: usize,
    /// Text contains "system:" or "you are".
    pub admin_hint: bool,
}

/// Case-insensitive substring check over the cue dictionary.
pub fn inspect(text: &str) -> HeuristicSignal {
    let lowered = text.to_lowercase();
    let cues = HEURISTIC_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count();
    let admin_hint = ADMIN_HINTS.iter().any(|hint| lowered.contains(hint));
    HeuristicSignal { cues, admin_hint }
}

/// Map a signal to a probability: 0.15 + 0.25 per cue + 0.20 for an admin
/// hint, clamped to [0, 0.98].
pub fn probability(signal: &HeuristicSignal) -> f32 {
    let admin = if signal.admin_hint { ADMIN_WEIGHT } else { 0.0 };
    (BASE_PROBABILITY + CUE_WEIGHT * signal.cues as f32 + admin).clamp(0.0, MAX_PROBABILITY)
}
