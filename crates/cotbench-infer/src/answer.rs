//! Final-answer extraction and exact-match accuracy

use regex::Regex;
use std::sync::OnceLock;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number pattern must compile")
    })
}

/// Extract the final numeric answer from a generated text
///
/// The rule is deterministic: the LAST number appearing in the text wins,
/// with thousands separators stripped. Texts without any number yield
/// `None` and count as incorrect.
pub fn extract_final_number(text: &str) -> Option<f64> {
    let m = number_pattern().find_iter(text).last()?;
    let cleaned = m.as_str().replace(',', "");
    cleaned.parse::<f64>().ok()
}

/// Fraction of exact matches between predictions and ground truth
///
/// Lengths are expected to be aligned; a missing prediction never
/// matches. An empty batch scores 0.0.
pub fn batch_accuracy(predictions: &[Option<f64>], ground_truth: &[f64]) -> f32 {
    if ground_truth.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(ground_truth.iter())
        .filter(|(prediction, truth)| **prediction == Some(**truth))
        .count();
    correct as f32 / ground_truth.len() as f32
}
