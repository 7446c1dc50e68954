use cylflow::solver::diagnostics::max_speed;
use cylflow::solver::mesh::{generate_structured_rect_mesh, BoundarySides};
use cylflow::solver::options::{PressureReference, SimulationConfig};
use cylflow::solver::projection::{advance, SimulationContext};
use nalgebra::Point2;

#[test]
fn test_lid_driven_cavity_develops_primary_vortex() {
    let mesh = generate_structured_rect_mesh(8, 8, 1.0, 1.0, BoundarySides::cavity())
        .expect("mesh");
    let config = SimulationConfig {
        reynolds: 100.0,
        dt: 0.01,
        final_time: 1.0,
        inflow_velocity: [1.0, 0.0],
        pressure_reference: PressureReference::Point { x: 0.0, y: 0.0 },
        ..Default::default()
    };
    let mut ctx = SimulationContext::new(config, mesh).expect("context");

    let mut previous = ctx.state().u.clone();
    for _ in 0..100 {
        previous.copy_from_slice(&ctx.state().u);
        advance(&mut ctx).expect("step");
    }
    assert_eq!(ctx.state().step, 100);
    assert_eq!(ctx.non_converged_solves(), 0);

    let disc = ctx.discretization();
    let u = &ctx.state().u;
    assert!(u.iter().all(|v| v.is_finite()));
    assert!(ctx.state().p.iter().all(|v| v.is_finite()));

    let speed = max_speed(disc, u);
    assert!(speed <= 1.05, "max speed {} exceeds the lid speed", speed);

    // lid drags the top layer along, the return flow runs underneath
    let ns = disc.velocity.num_scalar_dofs();
    let mut centreline: Vec<(f64, f64)> = disc
        .velocity
        .dof_coords()
        .iter()
        .enumerate()
        .filter(|(_, p)| (p.x - 0.5).abs() < 1e-9 && p.y < 1.0 - 1e-9)
        .map(|(i, p)| (p.y, u[i]))
        .collect();
    centreline.sort_by(|a, b| a.0.total_cmp(&b.0));
    assert_eq!(centreline.len(), 16);
    let (top_y, top_u) = centreline[centreline.len() - 1];
    assert!(top_u > 0.2, "u_x at y={} is {}", top_y, top_u);
    let (min_y, min_u) = centreline
        .iter()
        .copied()
        .fold((0.0, f64::INFINITY), |a, b| if b.1 < a.1 { b } else { a });
    assert!(min_u < -0.01, "no return flow on the centreline (min {})", min_u);
    assert!(min_y < top_y);

    let right = disc.velocity.nearest_dof(Point2::new(0.9375, 0.875));
    assert!(u[ns + right] < 0.0, "u_y near right wall = {}", u[ns + right]);

    // approaching a steady state
    let change = u
        .iter()
        .zip(&previous)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(change < 0.01, "last step changed u by {}", change);
}
