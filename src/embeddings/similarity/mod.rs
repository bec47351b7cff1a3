
use thiserror::Error;

/// Precondition failures of [`cosine_similarity`].
///
/// All indicate a data integrity problem (mixed model versions or a corrupt vector)
/// and must reach the retrieval caller instead of being scored as zero.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityError {
    #[error("Vectors must have same dimension: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("Cosine similarity is undefined for a zero vector")]
    ZeroVector,
    #[error("Cosine similarity is undefined for vectors with NaN or infinite components")]
    NonFinite,
}

/// Cosine similarity of two vectors, in `[-1, 1]` (higher is more similar)
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot_product = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot_product = x.mul_add(y, dot_product);
        norm_a = x.mul_add(x, norm_a);
        norm_b = y.mul_add(y, norm_b);
    }

    // NaN would slip through `clamp` and every threshold comparison
    if !(dot_product.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return Err(SimilarityError::NonFinite);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroVector);
    }

    let similarity = dot_product / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

/// Convert a cosine *distance* returned by a vector store into a similarity
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}
