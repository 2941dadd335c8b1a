//! Vector similarity calculations used by retrieval, guardrails and urgency
//! detection.

/// Calculate cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`; mismatched or empty inputs score 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Cosine distance in `[0, 2]`: 0 = identical, 2 = opposite
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Score a query vector against `(id, embedding)` candidates and return the
/// top `k` as `(id, similarity)`.
///
/// Ordering is similarity descending with id ascending as the tie-break, so
/// repeated searches over an unchanged candidate set return identical
/// rankings.
#[must_use]
pub fn rank_by_similarity(
    query: &[f32],
    candidates: &[(i64, Vec<f32>)],
    k: usize,
) -> Vec<(i64, f32)> {
    let mut scored: Vec<(i64, f32)> = candidates
        .iter()
        .map(|(id, embedding)| (*id, cosine_similarity(query, embedding)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let similarity = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!((similarity - 1.0).abs() < 0.001);

        // Orthogonal vectors
        let similarity = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(similarity.abs() < 0.001);

        // Opposite vectors
        let similarity = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((similarity + 1.0).abs() < 0.001);

        // Mismatched dimensions score zero
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_cosine_distance_range() {
        assert!((cosine_distance(&[1.0, 0.0], &[1.0, 0.0])).abs() < 0.001);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 0.001);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 0.001);
    }

    #[test]
    fn ranking_is_ordered_and_truncated() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            (10, vec![0.0, 1.0]),
            (20, vec![1.0, 0.0]),
            (30, vec![1.0, 1.0]),
        ];
        let ranked = rank_by_similarity(&query, &candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 20);
        assert_eq!(ranked[1].0, 30);
    }

    #[test]
    fn ties_break_by_id_ascending() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            (42, vec![1.0, 0.0]),
            (7, vec![1.0, 0.0]),
            (99, vec![1.0, 0.0]),
        ];
        let ranked = rank_by_similarity(&query, &candidates, 3);
        let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![7, 42, 99]);
    }

    #[test]
    fn ranking_is_stable_across_calls() {
        let query = vec![0.3, 0.7, 0.1];
        let candidates: Vec<(i64, Vec<f32>)> = (0..50)
            .map(|i| {
                let x = (i as f32).sin();
                (i, vec![x, 1.0 - x, 0.5])
            })
            .collect();
        let first = rank_by_similarity(&query, &candidates, 10);
        let second = rank_by_similarity(&query, &candidates, 10);
        assert_eq!(first, second);
    }
}
