//! Top-k extraction and labeling.

use rxv_core::{ClassIndexMap, CoreError, Prediction, ProbabilityVector, RankedPrediction, Result};

/// Rank the `k` most probable classes.
///
/// Entries are ordered by descending probability; equal probabilities keep
/// ascending class index order. `k` larger than the number of classes
/// returns every class. Without a class map the label is the stringified
/// index.
///
/// # Errors
///
/// - [`CoreError::InvalidArgument`] if `k == 0`
/// - [`CoreError::UnknownClass`] if a selected index has no class map entry
pub fn format_top_k(
    probs: &ProbabilityVector,
    k: usize,
    class_map: Option<&ClassIndexMap>,
) -> Result<RankedPrediction> {
    if k == 0 {
        return Err(CoreError::InvalidArgument("top_k must be at least 1".to_string()));
    }

    let scores = probs.as_slice();
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort keeps ascending index order among equal scores.
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let entries = order
        .into_iter()
        .take(k)
        .map(|class_index| {
            let label = match class_map {
                Some(map) => map.label(class_index)?.to_string(),
                None => class_index.to_string(),
            };
            Ok(Prediction {
                label,
                class_index,
                probability: scores[class_index],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RankedPrediction::new(entries))
}
