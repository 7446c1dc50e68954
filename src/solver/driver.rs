use crate::solver::diagnostics::{
    cfl_number, cylinder_force, force_coefficients, max_speed, strouhal_number, ForceSample,
    ForceStatistics,
};
use crate::solver::error::Result;
use crate::solver::mesh::Mesh;
use crate::solver::options::SimulationConfig;
use crate::solver::output::{FieldKind, FieldSnapshot, ForceLog, FORCE_FILE};
use crate::solver::parallel::{CommOps, Communicator, SerialCommunicator};
use crate::solver::projection::{advance_with_ops, SimulationContext};
use crate::trace::{
    make_header, now_unix_ms, TraceEvent, TraceFooter, TraceMesh, TraceStepEvent, TraceWriter,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub steps: usize,
    pub final_time: f64,
    /// One sample per output step.
    pub forces: Vec<ForceSample>,
    pub non_converged_solves: usize,
    pub strouhal: Option<f64>,
    /// `None` when no output step was reached.
    pub statistics: Option<ForceStatistics>,
    pub output_dir: PathBuf,
    pub wall_time: Duration,
}

/// Loads the mesh named in `config` and runs to the final time.
pub fn run(config: SimulationConfig) -> Result<RunSummary> {
    run_with_comm(config, &SerialCommunicator)
}

pub fn run_with_comm<C: Communicator + ?Sized>(
    config: SimulationConfig,
    comm: &C,
) -> Result<RunSummary> {
    config.validate()?;
    let mut mesh = Mesh::from_file(&config.mesh_path)?;
    for level in 1..=config.refine_levels {
        mesh = mesh.refine_uniform()?;
        log::info!(
            "Refinement level {}: {} elements",
            level,
            mesh.num_elements()
        );
    }
    run_on_mesh(config, &mesh, comm)
}

/// Time loop. After every step whose index is a multiple of the output
/// interval, one force row and one velocity and pressure snapshot are
/// written; step zero is never written. Output failures are logged and the
/// run continues.
pub fn run_on_mesh<C: Communicator + ?Sized>(
    config: SimulationConfig,
    mesh: &Mesh,
    comm: &C,
) -> Result<RunSummary> {
    let started = Instant::now();
    let stats = mesh.stats();
    log::info!(
        "Mesh: {} vertices, {} elements, {} boundary facets, edge length {:.4e}..{:.4e}",
        stats.vertices,
        stats.elements,
        stats.boundary_facets,
        stats.min_edge_length,
        stats.max_edge_length
    );
    for (attr, count) in &stats.facets_per_attribute {
        log::info!("  boundary attribute {}: {} facets", attr, count);
    }

    let local_mesh = comm.partition_mesh(mesh).into_owned();
    let mut ctx = SimulationContext::new(config.clone(), local_mesh)?;

    let dt = config.dt;
    let interval = config.output_interval;
    let n_steps = config.num_steps();
    let speed = config.reference_speed();
    let viscosity = config.viscosity();

    let initial_cfl = cfl_number(ctx.discretization(), speed, dt);
    log::info!(
        "Running {} steps of dt={} to t={} (Re={}, initial CFL {:.3})",
        n_steps,
        dt,
        n_steps as f64 * dt,
        config.reynolds,
        initial_cfl
    );
    if initial_cfl > config.cfl_warn_threshold {
        log::warn!(
            "CFL {:.3} at inflow speed exceeds {:.3}; explicit convection may be unstable",
            initial_cfl,
            config.cfl_warn_threshold
        );
    }

    let root = comm.is_root();
    let output_dir = config.output_dir.clone();
    let mut output_ready = false;
    let mut force_log = None;
    if root {
        match std::fs::create_dir_all(&output_dir) {
            Ok(()) => {
                output_ready = true;
                match ForceLog::create(output_dir.join(FORCE_FILE)) {
                    Ok(file) => force_log = Some(file),
                    Err(err) => log::warn!("Force output disabled: {}", err),
                }
            }
            Err(err) => log::warn!(
                "Cannot create output directory {}: {}; output disabled",
                output_dir.display(),
                err
            ),
        }
    }

    let mut trace = match (&config.trace_path, root) {
        (Some(path), true) => match TraceWriter::create(path) {
            Ok(mut writer) => {
                let disc = ctx.discretization();
                let header = make_header(
                    config.clone(),
                    TraceMesh {
                        elements: disc.mesh.num_elements(),
                        velocity_dofs: disc.velocity.num_dofs(),
                        pressure_dofs: disc.pressure.num_dofs(),
                        min_edge_length: stats.min_edge_length,
                    },
                );
                if let Err(err) = writer.write_event(&TraceEvent::Header(header)) {
                    log::warn!("Trace header not written: {}", err);
                }
                Some(writer)
            }
            Err(err) => {
                log::warn!("Trace disabled: {}", err);
                None
            }
        },
        _ => None,
    };

    let ops = CommOps::new(comm);
    let mut forces = Vec::new();
    for _ in 0..n_steps {
        let step_started = Instant::now();
        let report = advance_with_ops(&mut ctx, &ops)?;
        let mut event = trace
            .as_ref()
            .map(|_| TraceStepEvent::from_report(&report, step_started.elapsed()));

        if report.step % interval != 0 {
            if let (Some(writer), Some(event)) = (trace.as_mut(), event) {
                if let Err(err) = writer.write_event(&TraceEvent::Step(event)) {
                    log::warn!("Trace event skipped: {}", err);
                }
            }
            continue;
        }

        let disc = ctx.discretization();
        let state = ctx.state();
        let force = cylinder_force(disc, &state.u, &state.p, viscosity);
        let (drag, lift) = force_coefficients(force, speed, config.reference_length);
        let sample = ForceSample {
            time: report.time,
            drag,
            lift,
        };
        forces.push(sample);

        let cfl = cfl_number(disc, max_speed(disc, &state.u), dt);
        if cfl > config.cfl_warn_threshold {
            log::warn!(
                "step {}: CFL {:.3} exceeds {:.3}",
                report.step,
                cfl,
                config.cfl_warn_threshold
            );
        }
        let divergence = ctx.divergence_norm();
        log::info!(
            "step {} t={:.4}: Cd={:.6} Cl={:.6} CFL={:.3} |Du|={:.3e} (its {}/{})",
            report.step,
            report.time,
            drag,
            lift,
            cfl,
            divergence,
            report.momentum.iterations,
            report.pressure.iterations
        );

        if let Some(file) = force_log.as_mut() {
            if let Err(err) = file.append(&sample) {
                log::warn!("Force row at t={} skipped: {}", report.time, err);
            }
        }
        if output_ready && config.write_snapshots {
            let index = report.step / interval;
            for (kind, space, values) in [
                (FieldKind::Velocity, &disc.velocity, &state.u),
                (FieldKind::Pressure, &disc.pressure, &state.p),
            ] {
                let snapshot = FieldSnapshot::from_field(
                    kind,
                    index,
                    report.step,
                    report.time,
                    &config.mesh_path,
                    space,
                    values,
                );
                if let Err(err) = snapshot.write(&output_dir) {
                    log::warn!("Snapshot skipped: {}", err);
                }
            }
        }

        if let (Some(writer), Some(mut event)) = (trace.as_mut(), event.take()) {
            event.cfl = Some(cfl);
            event.divergence = Some(divergence);
            event.drag = Some(drag);
            event.lift = Some(lift);
            if let Err(err) = writer.write_event(&TraceEvent::Step(event)) {
                log::warn!("Trace event skipped: {}", err);
            }
        }
    }

    let strouhal = strouhal_number(&forces, speed, config.reference_length);
    let statistics = ForceStatistics::from_samples(&forces);
    let non_converged = ctx.non_converged_solves();
    if non_converged > 0 {
        log::warn!("{} linear solves hit their iteration limit", non_converged);
    }
    match strouhal {
        Some(st) => log::info!("Strouhal number from lift: {:.4}", st),
        None => log::info!("Strouhal number: not enough lift samples"),
    }
    if let Some(stats) = &statistics {
        log::info!(
            "Cd mean {:.6} std {:.3e}; Cl mean {:.3e} std {:.3e} amplitude {:.6}",
            stats.drag_mean,
            stats.drag_std,
            stats.lift_mean,
            stats.lift_std,
            stats.lift_amplitude
        );
    }

    if let Some(mut writer) = trace {
        let footer = TraceFooter {
            closed_unix_ms: now_unix_ms(),
            steps: ctx.state().step,
            non_converged_solves: non_converged,
            strouhal,
        };
        if let Err(err) = writer.write_event(&TraceEvent::Footer(footer)) {
            log::warn!("Trace footer not written: {}", err);
        }
        if let Err(err) = writer.close() {
            log::warn!("Trace not flushed: {}", err);
        }
    }
    comm.barrier();

    Ok(RunSummary {
        steps: ctx.state().step,
        final_time: ctx.state().time,
        forces,
        non_converged_solves: non_converged,
        strouhal,
        statistics,
        output_dir,
        wall_time: started.elapsed(),
    })
}
