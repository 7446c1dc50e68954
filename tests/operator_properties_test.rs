use approx::assert_abs_diff_eq;
use cylflow::solver::assembly::{Discretization, Operators};
use cylflow::solver::linear_solver::dot;
use cylflow::solver::mesh::{
    generate_channel_with_obstacle, generate_structured_rect_mesh, BoundarySides,
};
use nalgebra::{Point2, Vector2};

fn obstacle_discretization(order: usize) -> Discretization {
    let mesh = generate_channel_with_obstacle(16, 8, 4.0, 2.0, Point2::new(1.0, 1.0), 0.3)
        .expect("mesh");
    Discretization::new(mesh, order).expect("discretization")
}

#[test]
fn test_velocity_operators_are_exactly_symmetric() {
    for order in 2..=3 {
        let disc = obstacle_discretization(order);
        let ops = Operators::assemble(&disc, 0.01, 0.01);
        assert_eq!(ops.mass.max_asymmetry(), 0.0, "mass, order {}", order);
        assert_eq!(ops.stiffness.max_asymmetry(), 0.0, "stiffness, order {}", order);
        assert_eq!(ops.helmholtz.max_asymmetry(), 0.0, "helmholtz, order {}", order);
        assert_eq!(ops.pressure_laplacian.max_asymmetry(), 0.0);
    }
}

#[test]
fn test_gradient_is_divergence_transpose() {
    let disc = obstacle_discretization(2);
    let ops = Operators::assemble(&disc, 0.01, 0.01);
    assert_eq!(ops.divergence.n_rows, disc.pressure.num_dofs());
    assert_eq!(ops.divergence.n_cols, disc.velocity.num_dofs());
    assert_eq!(ops.gradient, ops.divergence.transpose());
}

#[test]
fn test_reassembly_is_bit_identical() {
    let disc = obstacle_discretization(3);
    let first = Operators::assemble(&disc, 0.02, 0.005);
    let second = Operators::assemble(&disc, 0.02, 0.005);
    assert_eq!(first.mass, second.mass);
    assert_eq!(first.stiffness, second.stiffness);
    assert_eq!(first.divergence, second.divergence);
    assert_eq!(first.helmholtz, second.helmholtz);
    assert_eq!(first.lumped_mass, second.lumped_mass);
}

#[test]
fn test_mass_integrates_domain_area() {
    let mesh = generate_structured_rect_mesh(5, 3, 2.5, 1.5, BoundarySides::channel())
        .expect("mesh");
    for order in 2..=4 {
        let disc = Discretization::new(mesh.clone(), order).expect("discretization");
        let ops = Operators::assemble(&disc, 0.1, 0.01);
        let ns = disc.velocity.num_scalar_dofs();
        // unit x-velocity only
        let mut ones = vec![0.0; 2 * ns];
        ones[..ns].fill(1.0);
        let mut m1 = vec![0.0; 2 * ns];
        ops.mass.mat_vec_mul(&ones, &mut m1);
        assert_abs_diff_eq!(dot(&ones, &m1), 3.75, epsilon = 1e-12);
        let lumped_total: f64 = ops.lumped_mass.iter().sum();
        assert_abs_diff_eq!(lumped_total, 7.5, epsilon = 1e-12);
    }
}

#[test]
fn test_constant_velocity_has_zero_divergence() {
    let disc = obstacle_discretization(2);
    let ops = Operators::assemble(&disc, 0.01, 0.01);
    let u = disc.velocity.interpolate_vector(|_| Vector2::new(0.7, -1.3));
    let mut du = vec![0.0; disc.pressure.num_dofs()];
    ops.divergence.mat_vec_mul(&u, &mut du);
    assert!(du.iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_consistent_pressure_operator_is_semidefinite() {
    let disc = obstacle_discretization(2);
    let ops = Operators::assemble(&disc, 0.01, 0.01);
    let essential = vec![false; disc.velocity.num_dofs()];
    let s = ops.consistent_pressure_operator(&essential);
    assert!(s.max_asymmetry() < 1e-12);

    let np = disc.pressure.num_dofs();
    let mut sx = vec![0.0; np];
    for seed in 0..5u64 {
        let x: Vec<f64> = (0..np)
            .map(|i| (((i as u64 + 1) * (seed + 3) * 2654435761) % 1000) as f64 / 500.0 - 1.0)
            .collect();
        s.mat_vec_mul(&x, &mut sx);
        assert!(dot(&x, &sx) >= -1e-10);
    }
}
