//! Cosine similarity and nearest-key ranking.

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length, zero-magnitude, or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Indices of the `k` keys most similar to `probe`, best first.
///
/// Every key is considered; ties keep their original relative order.
pub fn nearest(keys: &[Vec<f32>], probe: &[f32], k: usize) -> Vec<usize> {
    let mut scored: Vec<(f32, usize)> = keys
        .iter()
        .enumerate()
        .map(|(index, key)| (cosine_similarity(key, probe), index))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored.into_iter().map(|(_, index)| index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_zero_vector() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] . [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        // similarity = 1 / sqrt(2) = 0.7071
        let a = vec![1.0, 1.0];
        let b = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 0.7071).abs() < 0.001);
    }

    #[test]
    fn nearest_ranks_by_similarity() {
        let keys = vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.5, 0.5, 0.0],
        ];
        let probe = vec![1.0, 0.0, 0.0];

        assert_eq!(nearest(&keys, &probe, 10), [1, 2, 0]);
    }

    #[test]
    fn nearest_respects_the_limit() {
        let keys: Vec<Vec<f32>> = (0..10).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        let probe = vec![1.0, 0.0];

        let result = nearest(&keys, &probe, 3);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], 0);
    }

    #[test]
    fn nearest_on_no_keys_is_empty() {
        assert!(nearest(&[], &[1.0, 0.0], 5).is_empty());
    }
}
