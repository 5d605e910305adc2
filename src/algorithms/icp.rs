//! Point-to-point ICP between two SBI point sets.
//!
//! Each iteration:
//! 1. Match every (already moved) source point to its nearest target point within
//!    `max_correspondence_distance`
//! 2. Solve the least-squares rigid motion of the matched pairs in closed form
//! 3. Left-compose it onto the accumulated 4x4 transform
//!
//! The loop stops once fitness and inlier RMSE both stop changing, when nothing
//! matches, or at `max_iterations`.

use crate::data::{FeaturePoint, SbiPointSet};
use crate::{Result, SbiError};
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Matrix4, Vector2};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    pub max_correspondence_distance: f64,
    pub max_iterations: usize,
    /// Convergence tolerance on the change of fitness between iterations
    pub relative_fitness: f64,
    /// Convergence tolerance on the change of inlier RMSE between iterations
    pub relative_rmse: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 100.0,
            max_iterations: 30,
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
        }
    }
}

/// In-plane rotation (degrees) plus whole-pixel shift to apply to a source volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform2D {
    pub degree: f64,
    pub shift_x: i64,
    pub shift_y: i64,
}

impl RigidTransform2D {
    pub fn identity() -> Self {
        Self {
            degree: 0.0,
            shift_x: 0,
            shift_y: 0,
        }
    }

    /// Volume-frame parameters from an ICP matrix.
    ///
    /// `target_center` is the mean of the target point set; the shifts are corrected
    /// by it since ICP works in the point sets' own frame.
    pub fn from_matrix(matrix: &Matrix4<f64>, target_center: FeaturePoint) -> Self {
        let mut degree = matrix[(1, 0)].asin().to_degrees();
        if degree.is_nan() {
            debug!(sin = matrix[(1, 0)], "Rotation outside asin domain, using 0 degrees");
            degree = 0.0;
        }

        let shift_x = round_half_even(matrix[(0, 3)]) - round_half_even(target_center.x);
        let shift_y = -round_half_even(matrix[(1, 3)]) + round_half_even(target_center.y);

        Self {
            degree: (degree * 100.0).round_ties_even() / 100.0,
            shift_x,
            shift_y,
        }
    }
}

fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Outcome of one ICP run.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Homogeneous transform taking source points onto target points
    pub matrix: Matrix4<f64>,
    /// Matched source points over all source points
    pub fitness: f64,
    pub inlier_rmse: f64,
    pub iterations: usize,
    pub transform: RigidTransform2D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Evaluation {
    fitness: f64,
    inlier_rmse: f64,
}

/// Rigid 2D alignment of a source point set onto a target point set.
///
/// The result is computed on first use and cached for the aligner's lifetime.
pub struct RigidAligner {
    source: Vec<Vector2<f64>>,
    target: Vec<Vector2<f64>>,
    target_center: FeaturePoint,
    tree: ImmutableKdTree<f64, 2>,
    config: IcpConfig,
    result: OnceLock<Registration>,
}

impl std::fmt::Debug for RigidAligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigidAligner")
            .field("source_points", &self.source.len())
            .field("target_points", &self.target.len())
            .field("config", &self.config)
            .field("computed", &self.result.get().is_some())
            .finish()
    }
}

fn to_vectors(set: &SbiPointSet) -> Vec<Vector2<f64>> {
    set.points().iter().map(|p| Vector2::new(p.x, p.y)).collect()
}

impl RigidAligner {
    pub fn new(source: &SbiPointSet, target: &SbiPointSet, config: IcpConfig) -> Result<Self> {
        if source.is_empty() || target.is_empty() {
            return Err(SbiError::EmptyPointSet);
        }

        let target_points = to_vectors(target);
        // Item ids are slice indices; SBI targets often share a row or column
        let coordinates: Vec<[f64; 2]> = target_points.iter().map(|p| [p.x, p.y]).collect();
        let tree = ImmutableKdTree::new_from_slice(&coordinates);

        Ok(Self {
            source: to_vectors(source),
            target: target_points,
            target_center: target.center(),
            tree,
            config,
            result: OnceLock::new(),
        })
    }

    pub fn registration(&self) -> &Registration {
        self.result.get_or_init(|| self.run())
    }

    pub fn transform(&self) -> RigidTransform2D {
        self.registration().transform
    }

    /// (source index, target index, squared distance) of every pair within range.
    fn correspondences(&self, moved: &[Vector2<f64>]) -> Vec<(usize, usize, f64)> {
        let max_dist_sq = self.config.max_correspondence_distance.powi(2);
        moved
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let nearest = self.tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y]);
                (nearest.distance <= max_dist_sq).then_some((i, nearest.item as usize, nearest.distance))
            })
            .collect()
    }

    fn evaluate(&self, pairs: &[(usize, usize, f64)]) -> Evaluation {
        if pairs.is_empty() {
            return Evaluation {
                fitness: 0.0,
                inlier_rmse: 0.0,
            };
        }
        let error: f64 = pairs.iter().map(|&(_, _, d)| d).sum();
        Evaluation {
            fitness: pairs.len() as f64 / self.source.len() as f64,
            inlier_rmse: (error / pairs.len() as f64).sqrt(),
        }
    }

    /// Least-squares rotation and translation taking the matched moved points onto
    /// their targets.
    fn solve(&self, moved: &[Vector2<f64>], pairs: &[(usize, usize, f64)]) -> Matrix4<f64> {
        let n = pairs.len() as f64;
        let (mut source_centroid, mut target_centroid) = (Vector2::zeros(), Vector2::zeros());
        for &(si, ti, _) in pairs {
            source_centroid += moved[si];
            target_centroid += self.target[ti];
        }
        source_centroid /= n;
        target_centroid /= n;

        // Cross-covariance H = sum (s - cs)(t - ct)^T
        let (mut h00, mut h01, mut h10, mut h11) = (0.0, 0.0, 0.0, 0.0);
        for &(si, ti, _) in pairs {
            let s = moved[si] - source_centroid;
            let t = self.target[ti] - target_centroid;
            h00 += s.x * t.x;
            h01 += s.x * t.y;
            h10 += s.y * t.x;
            h11 += s.y * t.y;
        }

        let theta = (h01 - h10).atan2(h00 + h11);
        let (sin_t, cos_t) = theta.sin_cos();
        let tx = target_centroid.x - (cos_t * source_centroid.x - sin_t * source_centroid.y);
        let ty = target_centroid.y - (sin_t * source_centroid.x + cos_t * source_centroid.y);

        let mut update = Matrix4::identity();
        update[(0, 0)] = cos_t;
        update[(0, 1)] = -sin_t;
        update[(1, 0)] = sin_t;
        update[(1, 1)] = cos_t;
        update[(0, 3)] = tx;
        update[(1, 3)] = ty;
        update
    }

    fn run(&self) -> Registration {
        let mut matrix = Matrix4::<f64>::identity();
        let mut moved = self.source.clone();
        let mut pairs = self.correspondences(&moved);
        let mut evaluation = self.evaluate(&pairs);
        let mut iterations = 0;

        while iterations < self.config.max_iterations && !pairs.is_empty() {
            let update = self.solve(&moved, &pairs);
            matrix = update * matrix;
            for p in moved.iter_mut() {
                *p = apply(&update, p);
            }
            iterations += 1;

            pairs = self.correspondences(&moved);
            let previous = evaluation;
            evaluation = self.evaluate(&pairs);

            if (previous.fitness - evaluation.fitness).abs() < self.config.relative_fitness
                && (previous.inlier_rmse - evaluation.inlier_rmse).abs() < self.config.relative_rmse
            {
                break;
            }
        }

        let transform = RigidTransform2D::from_matrix(&matrix, self.target_center);
        debug!(
            iterations,
            fitness = evaluation.fitness,
            inlier_rmse = evaluation.inlier_rmse,
            degree = transform.degree,
            shift_x = transform.shift_x,
            shift_y = transform.shift_y,
            "ICP finished"
        );

        Registration {
            matrix,
            fitness: evaluation.fitness,
            inlier_rmse: evaluation.inlier_rmse,
            iterations,
            transform,
        }
    }
}

fn apply(matrix: &Matrix4<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(
        matrix[(0, 0)] * p.x + matrix[(0, 1)] * p.y + matrix[(0, 3)],
        matrix[(1, 0)] * p.x + matrix[(1, 1)] * p.y + matrix[(1, 3)],
    )
}
