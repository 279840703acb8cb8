use glam::DVec3;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use surfreg_3d::{
    mesh::TriangleMesh,
    pointcloud::PointCloud,
    registration::{fit_transformation, RegistrationError},
    transforms::RigidTransform,
    tree::{ClosestPoint, CovarianceTree, TreeError},
};

use crate::{
    ops::{compute_rmse, draw_slacks, find_correspondences, ResidualHistory},
    search::{LinearSearch, SphereSearch, SurfaceSearch},
};

/// Error type for mesh ICP registration.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// The moving point cloud has no point.
    #[error("Moving point cloud is empty")]
    EmptyMovingCloud,

    /// Not enough moving points to constrain a rigid transform.
    #[error("ICP requires at least {required} moving points, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points.
        required: usize,
        /// Number of points provided.
        actual: usize,
    },

    /// The parameters are not usable.
    #[error("Invalid ICP parameters: {0}")]
    InvalidParams(&'static str),

    /// Failed to build the search tree.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Failed to register the matched point sets.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// How closest points on the mesh are searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Covariance tree of oriented bounding boxes.
    #[default]
    Tree,
    /// Every triangle, skipping those whose bounding sphere is too far.
    BoundingSpheres,
    /// Every triangle.
    Linear,
}

/// Structure to define the mesh ICP parameters.
#[derive(Debug, Clone)]
pub struct MeshIcpParams {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance on the squared difference between two consecutive estimates.
    pub tolerance: f64,
    /// Number of past errors kept to detect a plateau or an oscillation.
    pub history_len: usize,
    /// Every how many iterations a growing error history flips the perturbation on or off.
    pub toggle_period: usize,
    /// Upper bound of the random slack added to the warm-start radius while perturbing.
    ///
    /// The slack only widens the part of the surface that is searched. Matches stay exact,
    /// so the registration does not depend on it nor on `seed`.
    pub perturbation_scale: f64,
    /// Seed of the perturbation random generator.
    pub seed: u64,
    /// Closest point search strategy.
    pub strategy: MatchStrategy,
    /// Run the closest point queries in parallel.
    pub parallel: bool,
}

impl Default for MeshIcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            tolerance: 1e-8,
            history_len: 4,
            toggle_period: 5,
            perturbation_scale: 1.0,
            seed: 0,
            strategy: MatchStrategy::Tree,
            parallel: true,
        }
    }
}

impl MeshIcpParams {
    fn validate(&self) -> Result<(), IcpError> {
        if self.max_iterations == 0 {
            return Err(IcpError::InvalidParams("max_iterations must be positive"));
        }
        if self.history_len == 0 {
            return Err(IcpError::InvalidParams("history_len must be positive"));
        }
        if self.toggle_period == 0 {
            return Err(IcpError::InvalidParams("toggle_period must be positive"));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(IcpError::InvalidParams("tolerance must be non negative"));
        }
        if !self.perturbation_scale.is_finite() {
            return Err(IcpError::InvalidParams("perturbation_scale must be finite"));
        }
        Ok(())
    }
}

/// States of the registration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcpState {
    /// Preparing the search structure and the warm-start cache.
    Initializing,
    /// Searching the closest surface point of each moving point.
    Matching,
    /// Solving the incremental transform and checking convergence.
    Registering,
    /// The estimate stopped changing.
    Converged,
    /// The iteration cap was hit before convergence.
    MaxIterationsReached,
}

/// Result of the mesh ICP algorithm.
///
/// The transformation maps the moving points onto the mesh.
#[derive(Debug, Clone, Serialize)]
pub struct MeshIcpResult {
    /// Estimated transformation, the one the final matches were computed with.
    pub transform: RigidTransform,
    /// Closest mesh point of each transformed moving point.
    pub matches: Vec<DVec3>,
    /// Distance between each transformed moving point and its match.
    pub residuals: Vec<f64>,
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Root mean square of the residuals.
    pub rmse: f64,
    /// Terminal state, [`IcpState::Converged`] or [`IcpState::MaxIterationsReached`].
    pub state: IcpState,
}

impl MeshIcpResult {
    /// Check if the loop converged before hitting the iteration cap.
    pub fn converged(&self) -> bool {
        self.state == IcpState::Converged
    }
}

/// Iterative Closest Point (ICP) registration of a point cloud to a triangle mesh.
///
/// # Arguments
///
/// * `mesh` - Target surface.
/// * `moving` - Points to register, expressed in the frame of the mesh.
/// * `params` - Convergence criteria and search options.
///
/// # Returns
///
/// * `result` - The transformation from the moving points to the mesh, the matched
///   surface points and their residual distances.
pub fn icp_mesh(
    mesh: &TriangleMesh,
    moving: &PointCloud,
    params: &MeshIcpParams,
) -> Result<MeshIcpResult, IcpError> {
    match params.strategy {
        MatchStrategy::Tree => {
            let tree = CovarianceTree::new(mesh.triangles().to_vec())?;
            icp_mesh_with_search(&tree, moving, params)
        }
        MatchStrategy::BoundingSpheres => {
            icp_mesh_with_search(&SphereSearch(mesh), moving, params)
        }
        MatchStrategy::Linear => icp_mesh_with_search(&LinearSearch(mesh), moving, params),
    }
}

/// Iterative Closest Point (ICP) registration against a prebuilt surface search.
///
/// Use it to register several point clouds to the same mesh with a single tree.
/// `params.strategy` is ignored.
pub fn icp_mesh_with_search<S: SurfaceSearch + ?Sized>(
    search: &S,
    moving: &PointCloud,
    params: &MeshIcpParams,
) -> Result<MeshIcpResult, IcpError> {
    params.validate()?;
    if moving.is_empty() {
        return Err(IcpError::EmptyMovingCloud);
    }
    if moving.len() < 3 {
        return Err(IcpError::InsufficientPoints {
            required: 3,
            actual: moving.len(),
        });
    }

    let points = moving.points();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut history = ResidualHistory::new(params.history_len);
    let mut cache: Vec<Option<DVec3>> = Vec::new();
    let mut transform = RigidTransform::identity();
    let mut transformed: Vec<DVec3> = Vec::new();
    let mut matches: Vec<ClosestPoint> = Vec::new();
    let mut perturb = true;
    let mut num_iterations = 0;
    let mut now = std::time::Instant::now();

    let mut state = IcpState::Initializing;
    loop {
        log::trace!("ICP state: {:?}", state);
        state = match state {
            IcpState::Initializing => {
                // no previous match: the first search of each point is unbounded
                cache = vec![None; points.len()];
                transform = RigidTransform::identity();
                IcpState::Matching
            }
            IcpState::Matching => {
                now = std::time::Instant::now();
                transformed = transform.apply_points(points);

                let scale = if perturb {
                    params.perturbation_scale
                } else {
                    0.0
                };
                let slacks = draw_slacks(&mut rng, points.len(), scale);
                matches =
                    find_correspondences(search, &transformed, &cache, &slacks, params.parallel);

                for (cached, m) in cache.iter_mut().zip(matches.iter()) {
                    *cached = Some(m.point);
                }
                IcpState::Registering
            }
            IcpState::Registering => {
                let targets = matches.iter().map(|m| m.point).collect::<Vec<_>>();
                let delta = fit_transformation(&transformed, &targets)?;
                let next = delta.transform.compose(&transform);

                let error = transform.frobenius_distance_sq(&next);
                num_iterations += 1;

                log::debug!(
                    "Iteration: {} error: {:e} rmse: {} elapsed: {:?}",
                    num_iterations,
                    error,
                    compute_rmse(&matches),
                    now.elapsed()
                );

                if error < params.tolerance || history.is_plateau(error, params.tolerance) {
                    IcpState::Converged
                } else {
                    history.push(error);

                    if num_iterations % params.toggle_period == 0 && history.is_increasing() {
                        perturb = !perturb;
                        log::debug!("Error is growing, perturbation set to {}", perturb);
                    }

                    if num_iterations >= params.max_iterations {
                        IcpState::MaxIterationsReached
                    } else {
                        transform = next;
                        IcpState::Matching
                    }
                }
            }
            IcpState::Converged | IcpState::MaxIterationsReached => break,
        };
    }

    let rmse = compute_rmse(&matches);
    log::info!(
        "ICP finished in state {:?} after {} iterations with rmse {}",
        state,
        num_iterations,
        rmse
    );

    let (matches, residuals) = matches.iter().map(|m| (m.point, m.distance)).unzip();

    Ok(MeshIcpResult {
        transform,
        matches,
        residuals,
        num_iterations,
        rmse,
        state,
    })
}
