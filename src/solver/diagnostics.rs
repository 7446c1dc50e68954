use crate::solver::assembly::Discretization;
use crate::solver::fem::{GaussLegendre, QuadMap};
use crate::solver::mesh::attributes;
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForceSample {
    pub time: f64,
    pub drag: f64,
    pub lift: f64,
}

/// Summary of a force-coefficient history. Standard deviations are
/// population deviations over all samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForceStatistics {
    pub drag_mean: f64,
    pub drag_std: f64,
    pub lift_mean: f64,
    pub lift_std: f64,
    /// Largest `|Cl|` seen.
    pub lift_amplitude: f64,
}

impl ForceStatistics {
    pub fn from_samples(samples: &[ForceSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mean_std = |values: Vec<f64>| {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        };
        let (drag_mean, drag_std) = mean_std(samples.iter().map(|s| s.drag).collect());
        let (lift_mean, lift_std) = mean_std(samples.iter().map(|s| s.lift).collect());
        let lift_amplitude = samples.iter().map(|s| s.lift.abs()).fold(0.0, f64::max);
        Some(Self {
            drag_mean,
            drag_std,
            lift_mean,
            lift_std,
            lift_amplitude,
        })
    }
}

/// Reference coordinates of a local edge at parameter `t`, and `d(xi, eta)/dt`.
fn edge_parametrization(local_edge: usize, t: f64) -> ([f64; 2], Vector2<f64>) {
    match local_edge {
        0 => ([t, 0.0], Vector2::new(1.0, 0.0)),
        1 => ([1.0, t], Vector2::new(0.0, 1.0)),
        2 => ([1.0 - t, 1.0], Vector2::new(-1.0, 0.0)),
        _ => ([0.0, 1.0 - t], Vector2::new(0.0, -1.0)),
    }
}

/// Force exerted by the fluid on the cylinder (attribute 1):
/// `F = -int (-p I + nu (grad u + grad u^T)) n ds`, `n` pointing out of the
/// fluid.
pub fn cylinder_force(disc: &Discretization, u: &[f64], p: &[f64], viscosity: f64) -> Vector2<f64> {
    let mesh = &disc.mesh;
    let vbasis = disc.velocity.basis();
    let pbasis = disc.pressure.basis();
    let nb = vbasis.num_basis();
    let npb = pbasis.num_basis();
    let ns = disc.velocity.num_scalar_dofs();
    let line = GaussLegendre::new(disc.order() + 2);

    let mut v_values = vec![0.0; nb];
    let mut v_grads = vec![Vector2::zeros(); nb];
    let mut p_values = vec![0.0; npb];
    let mut p_grads = vec![Vector2::zeros(); npb];

    let mut force = Vector2::zeros();
    for (f, facet) in mesh.boundary().iter().enumerate() {
        if facet.attribute != attributes::CYLINDER {
            continue;
        }
        let parent = mesh.facet_parent(f);
        let e = parent.element;
        let map = QuadMap::new(mesh.element_points(e));
        let vdofs = disc.velocity.element_dofs(e);
        let pdofs = disc.pressure.element_dofs(e);

        for (&t, &w) in line.points.iter().zip(&line.weights) {
            let ([xi, eta], dref) = edge_parametrization(parent.local_edge, t);
            let jac = map.jacobian(xi, eta);
            let tangent = jac * dref;
            let ds = tangent.norm() * w;
            // counter-clockwise element: outward normal is the tangent turned clockwise
            let normal = Vector2::new(tangent.y, -tangent.x) / tangent.norm();
            let inv_jt = jac
                .try_inverse()
                .map(|m| m.transpose())
                .unwrap_or_else(Matrix2::zeros);

            vbasis.eval(xi, eta, &mut v_values, &mut v_grads);
            pbasis.eval(xi, eta, &mut p_values, &mut p_grads);

            let pressure: f64 = pdofs.iter().zip(&p_values).map(|(&d, v)| p[d] * v).sum();
            let mut grad_u = Matrix2::<f64>::zeros();
            for (j, &d) in vdofs.iter().enumerate() {
                let g = inv_jt * v_grads[j];
                // row c holds grad of component c
                grad_u[(0, 0)] += u[d] * g.x;
                grad_u[(0, 1)] += u[d] * g.y;
                grad_u[(1, 0)] += u[ns + d] * g.x;
                grad_u[(1, 1)] += u[ns + d] * g.y;
            }

            let stress = Matrix2::identity() * (-pressure) + (grad_u + grad_u.transpose()) * viscosity;
            force -= stress * normal * ds;
        }
    }
    force
}

/// `C = 2 F / (U^2 D)` with unit density.
pub fn force_coefficients(force: Vector2<f64>, speed: f64, length: f64) -> (f64, f64) {
    let scale = 2.0 / (speed * speed * length);
    (force.x * scale, force.y * scale)
}

/// Largest velocity magnitude over the velocity nodes.
pub fn max_speed(disc: &Discretization, u: &[f64]) -> f64 {
    let ns = disc.velocity.num_scalar_dofs();
    (0..ns)
        .map(|i| (u[i] * u[i] + u[ns + i] * u[ns + i]).sqrt())
        .fold(0.0, f64::max)
}

/// `dt U / h` with `h` the smallest edge divided by the polynomial degree.
pub fn cfl_number(disc: &Discretization, speed: f64, dt: f64) -> f64 {
    let h = disc.mesh.min_edge_length() / disc.order() as f64;
    dt * speed / h
}

/// Strouhal number `f D / U` from the dominant frequency of the lift series.
///
/// Uses a direct DFT of the mean-free signal; samples must be equally
/// spaced. Returns `None` for fewer than four samples or a flat signal.
pub fn strouhal_number(samples: &[ForceSample], speed: f64, length: f64) -> Option<f64> {
    let n = samples.len();
    if n < 4 {
        return None;
    }
    let spacing = samples[1].time - samples[0].time;
    if !(spacing > 0.0) {
        return None;
    }
    let mean = samples.iter().map(|s| s.lift).sum::<f64>() / n as f64;

    let mut best = (0usize, 0.0f64);
    for k in 1..=n / 2 {
        let (mut re, mut im) = (0.0, 0.0);
        for (j, s) in samples.iter().enumerate() {
            let phase = -2.0 * std::f64::consts::PI * (k * j) as f64 / n as f64;
            re += (s.lift - mean) * phase.cos();
            im += (s.lift - mean) * phase.sin();
        }
        let power = re * re + im * im;
        if power > best.1 {
            best = (k, power);
        }
    }
    if best.0 == 0 || best.1 <= 1e-24 {
        return None;
    }
    let frequency = best.0 as f64 / (n as f64 * spacing);
    Some(frequency * length / speed)
}
