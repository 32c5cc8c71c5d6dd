//! Caption confidence heuristic.
//!
//! The service returns free text with no score, so confidence is estimated
//! from response length, domain vocabulary hits and the model tier.

use scribe_models::{clamp_confidence, CaptionPass};

const BASE_CONFIDENCE: f64 = 0.7;
const DETAILED_RESPONSE_CHARS: usize = 100;
const DETAIL_BONUS: f64 = 0.1;
const TERM_BONUS: f64 = 0.05;
const FAST_TIER_FACTOR: f64 = 0.9;
const LARGE_MODEL_FACTOR: f64 = 1.1;
/// Parameter count (billions) at which a rich model counts as very large.
const LARGE_MODEL_BILLIONS: f64 = 70.0;

/// Model families served as the fast tier.
const FAST_FAMILIES: &[&str] = &["moondream"];

/// Domain terms that indicate a relevant caption.
pub const CONFIDENCE_TERMS: &[&str] = &[
    "chart",
    "candlestick",
    "volume",
    "price",
    "support",
    "resistance",
    "trend",
    "indicator",
];

/// Estimate confidence for a caption produced by `model`.
pub fn estimate_confidence(response: &str, model: &str) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    if response.chars().count() > DETAILED_RESPONSE_CHARS {
        confidence += DETAIL_BONUS;
    }

    let lower = response.to_lowercase();
    let terms = CONFIDENCE_TERMS.iter().filter(|t| lower.contains(*t)).count();
    confidence += terms as f64 * TERM_BONUS;

    if pass_for_model(model) == CaptionPass::Fast {
        confidence *= FAST_TIER_FACTOR;
    } else if model_size_billions(model).is_some_and(|b| b >= LARGE_MODEL_BILLIONS) {
        confidence *= LARGE_MODEL_FACTOR;
    }

    clamp_confidence(confidence)
}

/// Provenance tag for captions produced by `model`.
pub fn pass_for_model(model: &str) -> CaptionPass {
    let lower = model.to_lowercase();
    if FAST_FAMILIES.iter().any(|f| lower.contains(f)) {
        CaptionPass::Fast
    } else {
        CaptionPass::Rich
    }
}

/// Parse the size tag of a model name (`qwen2.5vl:72b` -> 72.0).
fn model_size_billions(model: &str) -> Option<f64> {
    let (_, tag) = model.rsplit_once(':')?;
    let tag = tag.to_lowercase();
    let digits = tag.split('-').next()?.strip_suffix('b')?;
    digits.parse().ok()
}
