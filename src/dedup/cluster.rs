//! Density-based clustering of term embeddings.
//!
//! DBSCAN over a precomputed cosine-distance matrix. Points that no cluster
//! claims are handed back according to a [`NoiseStrategy`], so the output
//! always partitions the input terms.

use ndarray::Array2;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::error::{DedupError, DedupResult};

/// Default neighbourhood radius.
pub const DEFAULT_EPSILON: f64 = 0.3;

/// Default number of neighbours (including the point itself) for a core point.
pub const DEFAULT_MIN_POINTS: usize = 5;

/// Computes `1 - cos(a, b)`.
///
/// A zero vector has distance 1 to everything.
///
/// # Panics
///
/// Panics if vectors have different lengths.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have the same length for cosine distance"
    );

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 1.0;
    }

    1.0 - dot_product / (norm_a * norm_b)
}

/// Computes the symmetric pairwise cosine-distance matrix of the rows.
///
/// Agrees with [`cosine_distance`] for every pair, including zero rows.
pub fn pairwise_cosine_distance(embeddings: &Array2<f64>) -> Array2<f64> {
    let n = embeddings.nrows();
    let norms: Vec<f64> = embeddings
        .rows()
        .into_iter()
        .map(|row| row.dot(&row).sqrt())
        .collect();
    let mut distance_matrix = Array2::zeros((n, n));

    for i in 0..n {
        let row_i = embeddings.row(i);

        for j in (i + 1)..n {
            let dist = if norms[i] < 1e-10 || norms[j] < 1e-10 {
                1.0
            } else {
                1.0 - row_i.dot(&embeddings.row(j)) / (norms[i] * norms[j])
            };
            distance_matrix[[i, j]] = dist;
            distance_matrix[[j, i]] = dist;
        }
    }

    distance_matrix
}

/// What to do with points DBSCAN leaves unclustered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoiseStrategy {
    /// All noise points form one extra trailing cluster, in input order.
    #[default]
    Pooled,
    /// Each noise point becomes its own cluster.
    Singletons,
}

impl fmt::Display for NoiseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseStrategy::Pooled => write!(f, "pooled"),
            NoiseStrategy::Singletons => write!(f, "singletons"),
        }
    }
}

impl FromStr for NoiseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pooled" => Ok(NoiseStrategy::Pooled),
            "singletons" | "singleton" => Ok(NoiseStrategy::Singletons),
            other => Err(format!(
                "unknown noise strategy '{}', expected 'pooled' or 'singletons'",
                other
            )),
        }
    }
}

/// Raw DBSCAN output as point indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbscanOutcome {
    /// Clusters in order of discovery; members in order of assignment.
    pub clusters: Vec<Vec<usize>>,
    /// Unclaimed points, ascending.
    pub noise: Vec<usize>,
}

/// DBSCAN parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dbscan {
    pub epsilon: f64,
    pub min_points: usize,
}

impl Default for Dbscan {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            min_points: DEFAULT_MIN_POINTS,
        }
    }
}

impl Dbscan {
    pub fn new(epsilon: f64, min_points: usize) -> Self {
        Self {
            epsilon,
            min_points,
        }
    }

    /// Points strictly closer than epsilon, plus the point itself.
    fn region_query(&self, distances: &Array2<f64>, point: usize) -> Vec<usize> {
        distances
            .row(point)
            .iter()
            .enumerate()
            .filter(|&(j, &d)| j == point || d < self.epsilon)
            .map(|(j, _)| j)
            .collect()
    }

    /// Runs DBSCAN over a square distance matrix.
    pub fn fit(&self, distances: &Array2<f64>) -> DbscanOutcome {
        let n = distances.nrows();
        let mut visited = vec![false; n];
        let mut assignment: Vec<Option<usize>> = vec![None; n];
        let mut clusters: Vec<Vec<usize>> = Vec::new();

        for point in 0..n {
            if visited[point] {
                continue;
            }
            visited[point] = true;

            let neighbours = self.region_query(distances, point);
            if neighbours.len() < self.min_points {
                continue;
            }

            let cluster_id = clusters.len();
            clusters.push(vec![point]);
            assignment[point] = Some(cluster_id);

            // Points are claimed when queued, so each enters the queue once.
            let mut queue: VecDeque<usize> = VecDeque::new();
            let mut claim = |candidates: Vec<usize>, queue: &mut VecDeque<usize>| {
                for candidate in candidates {
                    // Border points, including ones seen earlier as noise.
                    if assignment[candidate].is_none() {
                        assignment[candidate] = Some(cluster_id);
                        clusters[cluster_id].push(candidate);
                        queue.push_back(candidate);
                    }
                }
            };
            claim(neighbours, &mut queue);

            while let Some(candidate) = queue.pop_front() {
                if visited[candidate] {
                    continue;
                }
                visited[candidate] = true;
                let expansion = self.region_query(distances, candidate);
                if expansion.len() >= self.min_points {
                    claim(expansion, &mut queue);
                }
            }
        }

        let noise = (0..n).filter(|&i| assignment[i].is_none()).collect();
        DbscanOutcome { clusters, noise }
    }
}

/// Groups terms by embedding density.
#[derive(Debug, Clone, Copy, Default)]
pub struct DensityClusterer {
    dbscan: Dbscan,
    noise: NoiseStrategy,
}

impl DensityClusterer {
    pub fn new(epsilon: f64, min_points: usize, noise: NoiseStrategy) -> Self {
        Self {
            dbscan: Dbscan::new(epsilon, min_points),
            noise,
        }
    }

    /// Partitions `terms` into density clusters.
    ///
    /// Every term appears in exactly one returned cluster.
    ///
    /// # Errors
    ///
    /// Returns `DedupError::InvalidInput` if the number of embeddings differs
    /// from the number of terms or the embeddings differ in length.
    pub fn cluster(
        &self,
        terms: &[String],
        embeddings: &[Vec<f64>],
    ) -> DedupResult<Vec<Vec<String>>> {
        if terms.len() != embeddings.len() {
            return Err(DedupError::InvalidInput(format!(
                "{} terms but {} embeddings",
                terms.len(),
                embeddings.len()
            )));
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = embeddings[0].len();
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(DedupError::InvalidInput(format!(
                "embedding for '{}' has {} dimensions, expected {}",
                terms[bad],
                embeddings[bad].len(),
                dimension
            )));
        }

        let flat: Vec<f64> = embeddings.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((terms.len(), dimension), flat)
            .map_err(|e| DedupError::InvalidInput(e.to_string()))?;
        let distances = pairwise_cosine_distance(&matrix);
        let outcome = self.dbscan.fit(&distances);

        tracing::info!(
            terms = terms.len(),
            clusters = outcome.clusters.len(),
            noise = outcome.noise.len(),
            epsilon = self.dbscan.epsilon,
            min_points = self.dbscan.min_points,
            "DBSCAN clustering complete"
        );

        let to_terms =
            |indices: &[usize]| -> Vec<String> { indices.iter().map(|&i| terms[i].clone()).collect() };

        let mut clusters: Vec<Vec<String>> =
            outcome.clusters.iter().map(|c| to_terms(c)).collect();
        if !outcome.noise.is_empty() {
            match self.noise {
                NoiseStrategy::Pooled => clusters.push(to_terms(&outcome.noise)),
                NoiseStrategy::Singletons => {
                    clusters.extend(outcome.noise.iter().map(|&i| vec![terms[i].clone()]))
                }
            }
        }

        tracing::debug!(?clusters, "Density clusters");
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn unit(angle_degrees: f64) -> Vec<f64> {
        let rad = angle_degrees.to_radians();
        vec![rad.cos(), rad.sin()]
    }

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).abs() < 1e-10);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-10);
        assert!((cosine_distance(&[1.0, 2.0], &[-1.0, -2.0]) - 2.0).abs() < 1e-10);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_pairwise_distance_symmetric_zero_diagonal() {
        let m = Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let d = pairwise_cosine_distance(&m);
        for i in 0..3 {
            assert_eq!(d[[i, i]], 0.0);
            for j in 0..3 {
                assert_eq!(d[[i, j]], d[[j, i]]);
            }
        }
        assert!((d[[0, 1]] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_pairwise_distance_matches_cosine_distance() {
        let rows = vec![
            vec![0.3, -1.2, 2.0],
            vec![0.0, 0.0, 0.0],
            vec![-0.5, 0.7, 0.1],
            vec![0.3, -1.2, 2.0],
        ];
        let m = Array2::from_shape_vec((4, 3), rows.concat()).unwrap();
        let d = pairwise_cosine_distance(&m);
        for i in 0..4 {
            for j in 0..4 {
                if i != j {
                    assert!((d[[i, j]] - cosine_distance(&rows[i], &rows[j])).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_dense_vocabulary_claims_each_point_once() {
        // Every point is a core point and a neighbour of every other.
        let e: Vec<Vec<f64>> = (0..50).map(|i| unit(i as f64 * 0.1)).collect();
        let m = Array2::from_shape_vec((50, 2), e.concat()).unwrap();
        let outcome = Dbscan::new(0.3, 2).fit(&pairwise_cosine_distance(&m));

        assert_eq!(outcome.clusters, vec![(0..50).collect::<Vec<usize>>()]);
        assert!(outcome.noise.is_empty());
    }

    #[test]
    fn test_gift_scenario() {
        let clusterer = DensityClusterer::new(0.3, 2, NoiseStrategy::Pooled);
        let t = terms(&["a thoughtful gift", "a great present", "a wise investment"]);
        let e = vec![unit(0.0), unit(10.0), unit(80.0)];

        let clusters = clusterer.cluster(&t, &e).unwrap();
        assert_eq!(
            clusters,
            vec![
                terms(&["a thoughtful gift", "a great present"]),
                terms(&["a wise investment"]),
            ]
        );
    }

    #[test]
    fn test_border_point_previously_noise_is_absorbed() {
        // 0 and 2 each see only 1; 1 sees both and is the only core point.
        let e = vec![unit(0.0), unit(40.0), unit(80.0)];
        let m = Array2::from_shape_vec((3, 2), e.concat()).unwrap();
        let outcome = Dbscan::new(0.3, 3).fit(&pairwise_cosine_distance(&m));

        assert_eq!(outcome.clusters, vec![vec![1, 0, 2]]);
        assert!(outcome.noise.is_empty());
    }

    #[test]
    fn test_chain_expands_through_core_points() {
        let e: Vec<Vec<f64>> = (0..6).map(|i| unit(i as f64 * 20.0)).collect();
        let m = Array2::from_shape_vec((6, 2), e.concat()).unwrap();
        let outcome = Dbscan::new(0.3, 3).fit(&pairwise_cosine_distance(&m));

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].len(), 6);
    }

    #[test]
    fn test_noise_strategies() {
        let t = terms(&["a", "b", "c", "d"]);
        let e = vec![unit(0.0), unit(5.0), unit(90.0), unit(180.0)];

        let pooled = DensityClusterer::new(0.3, 2, NoiseStrategy::Pooled)
            .cluster(&t, &e)
            .unwrap();
        assert_eq!(pooled, vec![terms(&["a", "b"]), terms(&["c", "d"])]);

        let singletons = DensityClusterer::new(0.3, 2, NoiseStrategy::Singletons)
            .cluster(&t, &e)
            .unwrap();
        assert_eq!(
            singletons,
            vec![terms(&["a", "b"]), terms(&["c"]), terms(&["d"])]
        );
    }

    #[test]
    fn test_default_min_points_leaves_small_vocabulary_pooled() {
        let t = terms(&["a", "b", "c"]);
        let e = vec![unit(0.0), unit(1.0), unit(2.0)];
        let clusters = DensityClusterer::default().cluster(&t, &e).unwrap();
        assert_eq!(clusters, vec![t]);
    }

    #[test]
    fn test_clusters_partition_terms() {
        let t: Vec<String> = (0..40).map(|i| format!("term {}", i)).collect();
        let e: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = i as f64;
                vec![(x * 0.7).sin(), (x * 1.3).cos(), (x * 0.1).sin() + 0.5]
            })
            .collect();

        for strategy in [NoiseStrategy::Pooled, NoiseStrategy::Singletons] {
            let clusters = DensityClusterer::new(0.05, 3, strategy).cluster(&t, &e).unwrap();
            let flat: Vec<&String> = clusters.iter().flatten().collect();
            let unique: HashSet<&String> = flat.iter().copied().collect();
            assert_eq!(flat.len(), t.len());
            assert_eq!(unique.len(), t.len());
            assert!(clusters.iter().all(|c| !c.is_empty()));
        }
    }

    #[test]
    fn test_zero_vector_is_noise() {
        let t = terms(&["a", "b", "zero"]);
        let e = vec![unit(0.0), unit(1.0), vec![0.0, 0.0]];
        let clusters = DensityClusterer::new(0.3, 2, NoiseStrategy::Singletons)
            .cluster(&t, &e)
            .unwrap();
        assert_eq!(clusters, vec![terms(&["a", "b"]), terms(&["zero"])]);
    }

    #[test]
    fn test_mismatched_input_rejected() {
        let clusterer = DensityClusterer::default();
        let err = clusterer.cluster(&terms(&["a", "b"]), &[unit(0.0)]).unwrap_err();
        assert!(matches!(err, DedupError::InvalidInput(_)));

        let err = clusterer
            .cluster(&terms(&["a", "b"]), &[unit(0.0), vec![1.0]])
            .unwrap_err();
        assert!(matches!(err, DedupError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_input() {
        assert!(DensityClusterer::default().cluster(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_noise_strategy_parse() {
        assert_eq!("pooled".parse::<NoiseStrategy>(), Ok(NoiseStrategy::Pooled));
        assert_eq!("Singletons".parse::<NoiseStrategy>(), Ok(NoiseStrategy::Singletons));
        assert!("none".parse::<NoiseStrategy>().is_err());
        assert_eq!(NoiseStrategy::default().to_string(), "pooled");
    }
}
