use cylflow::solver::error::{ConfigError, Error, MeshError};
use cylflow::solver::fem::FunctionSpace;
use cylflow::solver::mesh::{generate_channel_with_obstacle, write_mfem, Mesh};
use cylflow::solver::output::{read_force_log, FieldKind, FieldSnapshot, FORCE_FILE};
use cylflow::solver::{run, SimulationConfig};
use cylflow::trace::{read_trace, TraceEvent};
use nalgebra::Point2;
use std::path::Path;

fn write_cylinder_mesh(dir: &Path) -> std::path::PathBuf {
    let mesh = generate_channel_with_obstacle(32, 16, 8.0, 4.0, Point2::new(2.0, 2.0), 0.5)
        .expect("mesh");
    let path = dir.join("cylinder.mesh");
    std::fs::write(&path, write_mfem(&mesh)).expect("write mesh");
    path
}

#[test]
fn test_short_cylinder_run_writes_outputs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mesh_path = write_cylinder_mesh(dir.path());
    let output_dir = dir.path().join("results");
    let trace_path = dir.path().join("run.trace.jsonl");

    let config = SimulationConfig {
        mesh_path: mesh_path.clone(),
        final_time: 0.1,
        dt: 0.01,
        output_interval: 5,
        output_dir: output_dir.clone(),
        trace_path: Some(trace_path.clone()),
        ..Default::default()
    };
    let summary = run(config).expect("run");
    assert_eq!(summary.steps, 10);
    assert_eq!(summary.non_converged_solves, 0);
    assert_eq!(summary.forces.len(), 2);
    // too few samples for a shedding frequency
    assert!(summary.strouhal.is_none());
    let stats = summary.statistics.expect("force statistics");
    let mean = (summary.forces[0].drag + summary.forces[1].drag) / 2.0;
    assert!((stats.drag_mean - mean).abs() < 1e-12 * mean.abs().max(1.0));
    assert!(stats.lift_amplitude >= summary.forces[1].lift.abs());

    let rows = read_force_log(output_dir.join(FORCE_FILE)).expect("forces");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows, summary.forces);
    for row in &rows {
        assert!(row.drag.is_finite() && row.lift.is_finite());
        // impulsive start: strong positive drag, lift stays near zero by symmetry
        assert!(row.drag > 0.0, "drag {} at t={}", row.drag, row.time);
        assert!(row.lift.abs() < 0.1 * row.drag);
    }
    assert!((rows[0].time - 0.05).abs() < 1e-12);
    assert!((rows[1].time - 0.1).abs() < 1e-12);

    let mesh = Mesh::from_file(&mesh_path).expect("reload mesh");
    let velocity_nodes = FunctionSpace::new(&mesh, 2, 2).num_scalar_dofs();
    let pressure_nodes = FunctionSpace::new(&mesh, 1, 1).num_scalar_dofs();
    for index in 1..=2 {
        for kind in [FieldKind::Velocity, FieldKind::Pressure] {
            let path = output_dir.join(FieldSnapshot::file_name(kind, index));
            let snap = FieldSnapshot::load(&path).expect("snapshot");
            assert_eq!(snap.index, index);
            assert_eq!(snap.step, 5 * index);
            assert_eq!(snap.mesh, mesh_path);
            assert_eq!(snap.values.len(), snap.components * snap.coordinates.len());
            assert!(snap.values.iter().all(|v| v.is_finite()));
            let nodes = match kind {
                FieldKind::Velocity => velocity_nodes,
                FieldKind::Pressure => pressure_nodes,
            };
            assert_eq!(snap.coordinates.len(), nodes);
        }
    }
    assert!(!output_dir
        .join(FieldSnapshot::file_name(FieldKind::Velocity, 0))
        .exists());

    let events = read_trace(&trace_path).expect("trace");
    assert_eq!(events.len(), 12);
    assert!(matches!(events[0], TraceEvent::Header(_)));
    assert!(matches!(events[11], TraceEvent::Footer(_)));
    let with_forces = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::Step(s) if s.drag.is_some()))
        .count();
    assert_eq!(with_forces, 2);
}

#[test]
fn test_missing_mesh_file_is_a_mesh_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = SimulationConfig {
        mesh_path: dir.path().join("absent.mesh"),
        output_dir: dir.path().join("results"),
        ..Default::default()
    };
    assert!(matches!(
        run(config),
        Err(Error::Mesh(MeshError::Io { .. }))
    ));
    assert!(!dir.path().join("results").exists());
}

#[test]
fn test_unknown_boundary_attribute_fails_before_stepping() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mesh_path = write_cylinder_mesh(dir.path());
    let text = std::fs::read_to_string(&mesh_path).expect("read");
    let relabelled = text.replace("\n4 1 ", "\n7 1 ");
    assert_ne!(relabelled, text);
    std::fs::write(&mesh_path, relabelled).expect("write");

    let config = SimulationConfig {
        mesh_path,
        output_dir: dir.path().join("results"),
        ..Default::default()
    };
    assert!(matches!(
        run(config),
        Err(Error::Config(ConfigError::UnknownBoundaryAttribute { attribute: 7, .. }))
    ));
}

#[test]
fn test_refined_mesh_run_completes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mesh_path = write_cylinder_mesh(dir.path());
    let coarse = Mesh::from_file(&mesh_path).expect("mesh");

    let config = SimulationConfig {
        mesh_path,
        refine_levels: 1,
        dt: 0.005,
        final_time: 0.01,
        output_interval: 1,
        output_dir: dir.path().join("results"),
        write_snapshots: false,
        ..Default::default()
    };
    let summary = run(config).expect("refined run");
    assert_eq!(summary.steps, 2);
    assert_eq!(summary.forces.len(), 2);
    assert!(summary.forces.iter().all(|f| f.drag.is_finite() && f.drag > 0.0));

    let fine = coarse.refine_uniform().expect("refined");
    assert_eq!(fine.num_elements(), 4 * coarse.num_elements());
}
