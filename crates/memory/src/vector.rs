//! Vector distance and nearest-neighbour ranking.
//!
//! Pure-Rust implementations shared by every index engine:
//! - Cosine similarity
//! - Per-metric distances (lower = closer)
//! - Brute-force top-k ranking over a collection's records

use parley_core::index::{DistanceMetric, Hit, Record};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
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

/// Distance between two vectors under `metric`.
///
/// - cosine: `1 - cosine_similarity`, in [0, 2]
/// - l2: squared Euclidean distance
/// - ip: `1 - dot(a, b)`
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = (*x as f64) - (*y as f64);
                d * d
            })
            .sum::<f64>() as f32,
        DistanceMetric::Ip => {
            let dot: f64 = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (*x as f64) * (*y as f64))
                .sum();
            (1.0 - dot) as f32
        }
    }
}

/// Rank records by distance to a query embedding.
///
/// Returns at most `k` hits sorted by ascending distance. Ties keep the
/// records' stored order.
pub fn nearest(records: &[Record], query: &[f32], metric: DistanceMetric, k: usize) -> Vec<Hit> {
    let mut scored: Vec<(f32, &Record)> = records
        .iter()
        .map(|record| (distance(metric, &record.embedding, query), record))
        .collect();

    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(distance, record)| Hit {
            id: record.id.clone(),
            document: record.document.clone(),
            metadata: record.metadata.clone(),
            distance,
        })
        .collect()
}
