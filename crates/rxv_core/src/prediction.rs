//! Probability vectors and ranked predictions.

use serde::{Deserialize, Serialize};

/// Post-softmax per-class scores for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    /// Wrap per-class scores.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Scores in class index order.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no scores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the highest score; the lowest index wins ties.
    ///
    /// Scores are ordered with [`f32::total_cmp`], the same order used for
    /// ranking, so a positive NaN outranks every finite score.
    #[must_use]
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.0.iter().enumerate() {
            match best {
                Some((_, b)) if p.total_cmp(&b).is_le() => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// One labeled class score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Human-readable label (or the stringified index without a class map).
    #[serde(rename = "class")]
    pub label: String,
    /// Class index in the engine's output order.
    pub class_index: usize,
    /// Probability of this class.
    pub probability: f32,
}

/// Top-k predictions ordered by descending probability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedPrediction(Vec<Prediction>);

impl RankedPrediction {
    /// Wrap already-ranked entries.
    #[must_use]
    pub fn new(entries: Vec<Prediction>) -> Self {
        Self(entries)
    }

    /// Highest-ranked entry.
    #[must_use]
    pub fn top(&self) -> Option<&Prediction> {
        self.0.first()
    }

    /// Entries in rank order.
    #[must_use]
    pub fn entries(&self) -> &[Prediction] {
        &self.0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in rank order.
    pub fn iter(&self) -> std::slice::Iter<'_, Prediction> {
        self.0.iter()
    }

    /// Consume and return the entries.
    #[must_use]
    pub fn into_vec(self) -> Vec<Prediction> {
        self.0
    }
}

impl<'a> IntoIterator for &'a RankedPrediction {
    type Item = &'a Prediction;
    type IntoIter = std::slice::Iter<'a, Prediction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
