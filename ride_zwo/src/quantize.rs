//! One-dimensional k-means quantization of the smoothed power series.
//!
//! Centroids are seeded with k-means++ from a fixed-seed RNG and refined with Lloyd
//! iterations; the best of `n_init` restarts (lowest inertia) wins, so identical input
//! and seed always give identical levels.

use ndarray::Array1;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Params, ZwoError};

#[derive(Clone, Debug, PartialEq)]
pub struct Quantized {
    /// Distinct centroid values in use, ascending.
    pub levels: Vec<f64>,
    /// Input samples replaced by their centroid.
    pub series: Array1<f64>,
}

#[derive(Clone, Debug)]
struct KMeansRun {
    centroids: Vec<f64>,
    labels: Vec<usize>,
    inertia: f64,
}

pub fn quantize(data: &Array1<f64>, params: &Params) -> Result<Quantized, ZwoError> {
    if data.is_empty() {
        return Err(ZwoError::Clustering("cannot cluster an empty series".into()));
    }
    if params.n_clusters == 0 {
        return Err(ZwoError::InvalidParameter("n_clusters must be > 0".into()));
    }
    let values: Vec<f64> = data.iter().copied().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ZwoError::Clustering("series contains non-finite values".into()));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let tol = params.tol * variance(&values);
    let mut best: Option<KMeansRun> = None;
    for _ in 0..params.n_init.max(1) {
        let seeds = kmeans_plus_plus(&values, params.n_clusters, &mut rng);
        let run = lloyd(&values, seeds, params.max_iter.max(1), tol);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    let best = best.ok_or_else(|| ZwoError::Clustering("no clustering run completed".into()))?;

    let series = Array1::from_iter(best.labels.iter().map(|&l| best.centroids[l]));
    let mut levels: Vec<f64> = best.labels.iter().map(|&l| best.centroids[l]).collect();
    levels.sort_by_key(|v| OrderedFloat(*v));
    levels.dedup();
    Ok(Quantized { levels, series })
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn kmeans_plus_plus(values: &[f64], k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(values[rng.gen_range(0..values.len())]);
    let mut dist: Vec<f64> = values.iter().map(|v| (v - centroids[0]).powi(2)).collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            dist.iter()
                .position(|d| {
                    acc += d;
                    acc > target
                })
                .unwrap_or(values.len() - 1)
        } else {
            // every sample already sits on a centroid; the extra clusters collapse
            0
        };
        let c = values[pick];
        centroids.push(c);
        for (d, v) in dist.iter_mut().zip(values) {
            *d = d.min((v - c).powi(2));
        }
    }
    centroids
}

fn nearest(centroids: &[f64], value: f64) -> (usize, f64) {
    let mut best = (0, (value - centroids[0]).abs());
    for (i, c) in centroids.iter().enumerate().skip(1) {
        let d = (value - c).abs();
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn assign(values: &[f64], centroids: &[f64], labels: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (label, &v) in labels.iter_mut().zip(values) {
        let (idx, d) = nearest(centroids, v);
        *label = idx;
        inertia += d * d;
    }
    inertia
}

fn lloyd(values: &[f64], mut centroids: Vec<f64>, max_iter: usize, tol: f64) -> KMeansRun {
    let k = centroids.len();
    let mut labels = vec![0usize; values.len()];
    let mut sums = vec![0.0; k];
    let mut counts = vec![0usize; k];

    for _ in 0..max_iter {
        assign(values, &centroids, &mut labels);
        sums.iter_mut().for_each(|s| *s = 0.0);
        counts.iter_mut().for_each(|c| *c = 0);
        for (&l, &v) in labels.iter().zip(values) {
            sums[l] += v;
            counts[l] += 1;
        }

        let mut shift = 0.0;
        for ((c, &sum), &count) in centroids.iter_mut().zip(&sums).zip(&counts) {
            // empty clusters keep their previous centroid
            if count > 0 {
                let next = sum / count as f64;
                shift += (next - *c).powi(2);
                *c = next;
            }
        }
        if shift <= tol {
            break;
        }
    }

    let inertia = assign(values, &centroids, &mut labels);
    KMeansRun {
        centroids,
        labels,
        inertia,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_clusters: usize) -> Params {
        Params {
            n_clusters,
            ..Params::default()
        }
    }

    #[test]
    fn recovers_separated_levels() {
        let mut data = Vec::new();
        for level in [300.0, 100.0, 200.0] {
            data.extend(std::iter::repeat(level).take(10));
        }
        let q = quantize(&Array1::from_vec(data.clone()), &params(3)).unwrap();
        assert_eq!(q.levels, vec![100.0, 200.0, 300.0]);
        assert_eq!(q.series.to_vec(), data);
    }

    #[test]
    fn never_exceeds_cluster_count() {
        let data: Vec<f64> = (0..500).map(|i| 100.0 + i as f64 * 0.8).collect();
        let q = quantize(&Array1::from_vec(data), &params(7)).unwrap();
        assert!(q.levels.len() <= 7);
        assert!(q.levels.len() > 1);
        assert!(q.series.iter().all(|v| q.levels.contains(v)));
    }

    #[test]
    fn assigns_each_sample_to_nearest_level() {
        let data: Vec<f64> = (0..200).map(|i| 120.0 + ((i * 53) % 180) as f64).collect();
        let q = quantize(&Array1::from_vec(data.clone()), &params(4)).unwrap();
        for (orig, level) in data.iter().zip(q.series.iter()) {
            let best = q
                .levels
                .iter()
                .map(|l| (l - orig).abs())
                .fold(f64::INFINITY, f64::min);
            assert_eq!((level - orig).abs(), best);
        }
    }

    #[test]
    fn collapses_when_fewer_distinct_values() {
        let data = Array1::from_vec(vec![150.0; 40]);
        let q = quantize(&data, &params(7)).unwrap();
        assert_eq!(q.levels, vec![150.0]);
        assert!(q.series.iter().all(|&v| v == 150.0));

        let data = Array1::from_vec(vec![100.0, 250.0, 100.0, 250.0]);
        let q = quantize(&data, &params(7)).unwrap();
        assert_eq!(q.levels, vec![100.0, 250.0]);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let data: Vec<f64> = (0..300)
            .map(|i| 200.0 + 80.0 * ((i as f64) / 17.0).sin())
            .collect();
        let data = Array1::from_vec(data);
        let a = quantize(&data, &params(5)).unwrap();
        let b = quantize(&data, &params(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_series_is_an_error() {
        let err = quantize(&Array1::from_vec(Vec::new()), &params(7)).unwrap_err();
        assert!(matches!(err, ZwoError::Clustering(_)));
    }
}
