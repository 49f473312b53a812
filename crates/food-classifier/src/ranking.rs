//! Logit ranking and low-confidence relabeling

use serde::{Deserialize, Serialize};

use crate::{ClassifierError, LabelTable};

/// Top-1 confidence (percent) below which every returned label is annotated
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 10.0;

/// Substrings that mark a label as a likely beverage
pub const BEVERAGE_KEYWORDS: [&str; 7] = ["wine", "beer", "coffee", "tea", "juice", "soda", "water"];

/// A single ranked class prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label, possibly annotated
    #[serde(rename = "class")]
    pub class_name: String,
    /// Confidence in percent (0-100), rounded to 2 decimals
    pub confidence: f64,
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;

    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

/// Indices and probabilities of the `k` most probable classes, descending.
///
/// Order among equal probabilities is unspecified.
pub fn top_k(probabilities: &[f64], k: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Probability to a percentage rounded to 2 decimals
pub fn round_confidence(probability: f64) -> f64 {
    (probability * 100.0 * 100.0).round() / 100.0
}

/// Annotation applied to labels of a low-confidence response
pub fn annotate_label(name: &str) -> String {
    let lower = name.to_lowercase();
    if BEVERAGE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        format!("🍷 {} (beverage)", name)
    } else {
        format!("❓ {} (low confidence - might not be food)", name)
    }
}

/// Convert raw logits into `k` labeled predictions.
///
/// When the top-1 confidence is under [`LOW_CONFIDENCE_THRESHOLD`], every
/// returned label is passed through [`annotate_label`].
pub fn rank(logits: &[f32], k: usize, labels: &LabelTable) -> Result<Vec<Prediction>, ClassifierError> {
    if k == 0 || k > logits.len() {
        return Err(ClassifierError::InvalidTopK {
            requested: k,
            max: logits.len(),
        });
    }

    let probabilities = softmax(logits);
    let best = top_k(&probabilities, k);

    let max_confidence = best[0].1 * 100.0;
    let low_confidence = max_confidence < LOW_CONFIDENCE_THRESHOLD;

    Ok(best
        .into_iter()
        .map(|(idx, probability)| {
            let name = labels.name_or_unknown(idx);
            Prediction {
                class_name: if low_confidence { annotate_label(&name) } else { name },
                confidence: round_confidence(probability),
            }
        })
        .collect())
}
