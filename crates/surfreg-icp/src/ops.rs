use std::collections::VecDeque;

use glam::DVec3;
use rand::Rng;
use rayon::prelude::*;
use surfreg_3d::tree::ClosestPoint;

use crate::search::SurfaceSearch;

/// Fixed-capacity ring buffer of the most recent convergence errors.
#[derive(Debug, Clone)]
pub(crate) struct ResidualHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl ResidualHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, dropping the oldest one when full.
    pub(crate) fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// The error stopped changing: `value` is within `tolerance` of the oldest recorded error.
    pub(crate) fn is_plateau(&self, value: f64, tolerance: f64) -> bool {
        self.is_full()
            && self
                .values
                .front()
                .is_some_and(|oldest| (value - oldest).abs() < tolerance)
    }

    /// The newest recorded error is larger than the oldest one.
    pub(crate) fn is_increasing(&self) -> bool {
        match (self.values.front(), self.values.back()) {
            (Some(oldest), Some(newest)) => self.is_full() && newest > oldest,
            _ => false,
        }
    }
}

/// Draw the warm-start slack of every query, zero when the perturbation is off.
///
/// Drawn up front on the calling thread so the sequence only depends on the seed.
pub(crate) fn draw_slacks<R: Rng>(rng: &mut R, num_points: usize, scale: f64) -> Vec<f64> {
    if scale <= 0.0 {
        return vec![0.0; num_points];
    }
    (0..num_points)
        .map(|_| scale * rng.random::<f64>())
        .collect()
}

/// Find the closest surface point of each query point.
///
/// Each query starts from its cached match of the previous iteration when there is one,
/// with its pruning radius widened by the matching slack.
///
/// # Arguments
///
/// * `search` - The surface to search.
/// * `points` - The query points.
/// * `cache` - The previous match of each query point, `None` searches without bound.
/// * `slacks` - Extra pruning radius of each query.
/// * `parallel` - Run the queries on the rayon thread pool.
///
/// PRECONDITION: `points`, `cache` and `slacks` have the same length.
pub(crate) fn find_correspondences<S: SurfaceSearch + ?Sized>(
    search: &S,
    points: &[DVec3],
    cache: &[Option<DVec3>],
    slacks: &[f64],
    parallel: bool,
) -> Vec<ClosestPoint> {
    debug_assert_eq!(points.len(), cache.len());
    debug_assert_eq!(points.len(), slacks.len());

    let query = |((point, seed), slack): ((&DVec3, &Option<DVec3>), &f64)| {
        let mut best = match seed {
            Some(candidate) => ClosestPoint::seeded(*point, *candidate, *slack),
            None => ClosestPoint::unbounded(*point),
        };
        search.find_closest_point(*point, &mut best);
        best
    };

    if parallel {
        points
            .par_iter()
            .zip(cache.par_iter())
            .zip(slacks.par_iter())
            .map(query)
            .collect()
    } else {
        points
            .iter()
            .zip(cache.iter())
            .zip(slacks.iter())
            .map(query)
            .collect()
    }
}

/// Root mean square of the match distances.
pub(crate) fn compute_rmse(matches: &[ClosestPoint]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    let sum_sq = matches.iter().map(|m| m.distance * m.distance).sum::<f64>();
    (sum_sq / matches.len() as f64).sqrt()
}
