use argh::FromArgs;
use glam::DVec3;
use std::path::PathBuf;

use surfreg::icp::{self, MatchStrategy, MeshIcpParams};
use surfreg::k3d::{mesh::TriangleMesh, pointcloud::PointCloud, transforms::RigidTransform};

#[derive(FromArgs)]
/// Register a perturbed sample of a synthetic surface back onto it
struct Args {
    /// number of grid cells per side of the surface
    #[argh(option, default = "40")]
    cells: usize,

    /// rotation angle of the perturbation in radians
    #[argh(option, default = "0.05")]
    angle: f64,

    /// translation of the perturbation along each axis
    #[argh(option, default = "0.1")]
    translation: f64,

    /// maximum number of ICP iterations
    #[argh(option, default = "200")]
    iterations: usize,

    /// convergence tolerance
    #[argh(option, default = "1e-10")]
    tolerance: f64,

    /// seed of the perturbation random generator
    #[argh(option, default = "0")]
    seed: u64,

    /// closest point search: tree, spheres or linear
    #[argh(option, default = "String::from(\"tree\")")]
    strategy: String,

    /// optional path to write the result as json
    #[argh(option)]
    output: Option<PathBuf>,
}

/// Bumpy height field over `[-1, 1]^2` scaled to `cells` units per side.
fn height_field(cells: usize) -> Result<TriangleMesh, Box<dyn std::error::Error>> {
    let n = cells + 1;
    let half = cells as f64 / 2.0;
    let mut vertices = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let x = i as f64 - half;
            let y = j as f64 - half;
            let z = 2.0 * (0.3 * x).sin() * (0.25 * y).cos() + 0.05 * x * y / half;
            vertices.push(DVec3::new(x, y, z));
        }
    }

    let mut indices = Vec::with_capacity(2 * cells * cells);
    for i in 0..cells {
        for j in 0..cells {
            let a = i * n + j;
            indices.push([a, a + n, a + n + 1]);
            indices.push([a, a + n + 1, a + 1]);
        }
    }

    Ok(TriangleMesh::new(vertices, indices)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let strategy = match args.strategy.as_str() {
        "tree" => MatchStrategy::Tree,
        "spheres" => MatchStrategy::BoundingSpheres,
        "linear" => MatchStrategy::Linear,
        other => return Err(format!("unknown strategy: {other}").into()),
    };

    let mesh = height_field(args.cells)?;
    println!("Mesh: #{} triangles", mesh.len());

    let offset = RigidTransform::from_axis_angle(
        DVec3::new(1.0, 1.0, 1.0),
        args.angle,
        DVec3::splat(args.translation),
    )?;

    // keep away from the border so every sample has its true match inside the mesh
    let margin = args.cells as f64 / 4.0;
    let moving = PointCloud::new(
        mesh.vertices()
            .iter()
            .filter(|v| v.x.abs() < margin && v.y.abs() < margin)
            .map(|v| offset.apply(*v))
            .collect(),
    );
    println!("Moving cloud: #{} points", moving.len());

    let params = MeshIcpParams {
        max_iterations: args.iterations,
        tolerance: args.tolerance,
        seed: args.seed,
        strategy,
        ..Default::default()
    };

    let now = std::time::Instant::now();
    let result = icp::icp_mesh(&mesh, &moving, &params)?;
    log::info!("Registration took {:?}", now.elapsed());

    println!(
        "ICP {:?} after {} iterations, rmse: {:e}",
        result.state, result.num_iterations, result.rmse
    );
    println!("Estimated transform: {:?}", result.transform.to_arrays());

    let recovered = result.transform.compose(&offset);
    println!(
        "Distance to the true transform: {:e}",
        recovered.frobenius_distance_sq(&RigidTransform::IDENTITY).sqrt()
    );

    if let Some(path) = args.output {
        std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
        println!("Result written to {}", path.display());
    }

    Ok(())
}
