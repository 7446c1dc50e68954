use anyhow::Context;
use clap::Parser;
use cylflow::solver::mesh::{generate_channel_with_obstacle, write_mfem};
use cylflow::solver::{run, SimulationConfig};
use nalgebra::Point2;
use std::path::{Path, PathBuf};

/// Incompressible flow past a cylinder with a Taylor-Hood projection scheme.
#[derive(Parser, Debug)]
#[command(name = "cylflow", version, about)]
struct Cli {
    /// JSON run configuration; command-line values override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// MFEM v1.0 quadrilateral mesh.
    #[arg(short, long)]
    mesh: Option<PathBuf>,

    /// Uniform refinements of the loaded mesh.
    #[arg(short, long)]
    refine: Option<usize>,

    /// Velocity polynomial degree (pressure uses one less).
    #[arg(short, long)]
    order: Option<usize>,

    #[arg(long)]
    reynolds: Option<f64>,

    #[arg(long)]
    dt: Option<f64>,

    #[arg(long)]
    final_time: Option<f64>,

    /// Steps between force rows and snapshots.
    #[arg(long)]
    vis_steps: Option<usize>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write a JSON-lines run trace to this file.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Skip velocity and pressure snapshots.
    #[arg(long)]
    no_snapshots: bool,

    /// Write a 16 x 8 channel with a unit-diameter cylinder to this path and exit.
    #[arg(long, value_name = "PATH")]
    generate: Option<PathBuf>,

    /// Cells per unit length for `--generate`.
    #[arg(long, default_value_t = 4)]
    resolution: usize,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(mesh) = self.mesh {
            config.mesh_path = mesh;
        }
        if let Some(levels) = self.refine {
            config.refine_levels = levels;
        }
        if let Some(order) = self.order {
            config.order = order;
        }
        if let Some(re) = self.reynolds {
            config.reynolds = re;
        }
        if let Some(dt) = self.dt {
            config.dt = dt;
        }
        if let Some(t) = self.final_time {
            config.final_time = t;
        }
        if let Some(n) = self.vis_steps {
            config.output_interval = n;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.trace.is_some() {
            config.trace_path = self.trace;
        }
        if self.no_snapshots {
            config.write_snapshots = false;
        }
        Ok(config)
    }
}

fn generate_mesh(path: &Path, resolution: usize) -> anyhow::Result<()> {
    let n = resolution.max(1);
    let mesh = generate_channel_with_obstacle(
        16 * n,
        8 * n,
        16.0,
        8.0,
        Point2::new(4.0, 4.0),
        0.5,
    )?;
    std::fs::write(path, write_mfem(&mesh))
        .with_context(|| format!("writing mesh to {}", path.display()))?;
    log::info!(
        "Wrote {} ({} elements, {} boundary facets)",
        path.display(),
        mesh.num_elements(),
        mesh.num_boundary_facets()
    );
    Ok(())
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    if let Some(path) = &cli.generate {
        return generate_mesh(path, cli.resolution);
    }

    let config = cli.into_config()?;
    let summary = run(config)?;
    println!(
        "Completed {} steps to t={:.4} in {:.2?}; {} force samples in {}",
        summary.steps,
        summary.final_time,
        summary.wall_time,
        summary.forces.len(),
        summary.output_dir.display()
    );
    if let Some(last) = summary.forces.last() {
        println!("Final Cd={:.6} Cl={:.6}", last.drag, last.lift);
    }
    if let Some(stats) = summary.statistics {
        println!(
            "Cd mean={:.6} std={:.3e}; Cl amplitude={:.6}",
            stats.drag_mean, stats.drag_std, stats.lift_amplitude
        );
    }
    if let Some(st) = summary.strouhal {
        println!("Strouhal number: {:.4}", st);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .init();

    if let Err(err) = try_main(cli) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
