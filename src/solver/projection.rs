use crate::solver::assembly::{assemble_convection, Discretization, Operators};
use crate::solver::boundary::{BoundaryConditions, EliminatedOperator};
use crate::solver::error::{Result, SolverError};
use crate::solver::linear_solver::{CgSolver, SerialOps, SolveStats, SolverOps};
use crate::solver::mesh::Mesh;
use crate::solver::options::{PressureOperator, SimulationConfig};
use nalgebra::Vector2;

/// Discrete flow state after `step` steps.
#[derive(Clone, Debug)]
pub struct FlowState {
    /// Velocity, all x-components then all y-components.
    pub u: Vec<f64>,
    pub p: Vec<f64>,
    pub time: f64,
    pub step: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct StepReport {
    pub step: usize,
    pub time: f64,
    pub momentum: SolveStats,
    pub pressure: SolveStats,
}

/// Per-step work vectors, overwritten every step.
#[derive(Clone, Debug)]
struct Scratch {
    u_star: Vec<f64>,
    rhs_u: Vec<f64>,
    convection: Vec<f64>,
    rhs_p: Vec<f64>,
    grad_p: Vec<f64>,
}

/// Everything one run needs: discretization, operators with boundary
/// conditions eliminated, solvers and state.
pub struct SimulationContext {
    config: SimulationConfig,
    disc: Discretization,
    ops: Operators,
    bcs: BoundaryConditions,
    momentum_elim: EliminatedOperator,
    pressure_elim: EliminatedOperator,
    momentum_solver: CgSolver,
    pressure_solver: CgSolver,
    inv_lumped: Vec<f64>,
    state: FlowState,
    scratch: Scratch,
    non_converged: usize,
}

impl SimulationContext {
    /// Validates `config`, builds spaces and operators and eliminates the
    /// essential DOFs. The initial velocity is zero apart from boundary values.
    pub fn new(config: SimulationConfig, mesh: Mesh) -> Result<Self> {
        config.validate()?;

        let disc = Discretization::new(mesh, config.order)?;
        log::info!(
            "Taylor-Hood Q{}/Q{}: {} velocity DOFs, {} pressure DOFs",
            config.order,
            config.order - 1,
            disc.velocity.num_dofs(),
            disc.pressure.num_dofs()
        );

        let [ux, uy] = config.inflow_velocity;
        let bcs = BoundaryConditions::build(&disc, Vector2::new(ux, uy), config.pressure_reference)?;

        let ops = Operators::assemble(&disc, config.dt, config.viscosity());
        let pressure_matrix = match config.pressure_operator {
            PressureOperator::Consistent => {
                ops.consistent_pressure_operator(bcs.velocity.mask())
            }
            PressureOperator::Laplacian => ops.pressure_laplacian.clone(),
        };

        let momentum_elim = EliminatedOperator::new(&ops.helmholtz, &bcs.velocity);
        let pressure_elim = EliminatedOperator::new(&pressure_matrix, &bcs.pressure);
        let momentum_solver = CgSolver::new(
            "momentum",
            momentum_elim.matrix.clone(),
            config.momentum_solver.clone(),
        );
        let pressure_solver = CgSolver::new(
            "pressure",
            pressure_elim.matrix.clone(),
            config.pressure_solver.clone(),
        );

        let inv_lumped = ops.lumped_mass.iter().map(|m| 1.0 / m).collect();

        let nu = disc.velocity.num_dofs();
        let np = disc.pressure.num_dofs();
        let mut u = vec![0.0; nu];
        bcs.velocity.apply(&mut u);

        Ok(Self {
            config,
            ops,
            bcs,
            momentum_elim,
            pressure_elim,
            momentum_solver,
            pressure_solver,
            inv_lumped,
            state: FlowState {
                u,
                p: vec![0.0; np],
                time: 0.0,
                step: 0,
            },
            scratch: Scratch {
                u_star: vec![0.0; nu],
                rhs_u: vec![0.0; nu],
                convection: vec![0.0; nu],
                rhs_p: vec![0.0; np],
                grad_p: vec![0.0; nu],
            },
            disc,
            non_converged: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn discretization(&self) -> &Discretization {
        &self.disc
    }

    pub fn operators(&self) -> &Operators {
        &self.ops
    }

    pub fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.bcs
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Replaces the velocity, re-imposing boundary values.
    pub fn set_velocity(&mut self, u: &[f64]) {
        self.state.u.copy_from_slice(u);
        self.bcs.velocity.apply(&mut self.state.u);
    }

    /// Linear solves that hit their iteration limit so far.
    pub fn non_converged_solves(&self) -> usize {
        self.non_converged
    }

    /// Euclidean norm of `D u` over the pressure rows that are not fixed by
    /// the reference.
    pub fn divergence_norm(&self) -> f64 {
        let mut du = vec![0.0; self.disc.pressure.num_dofs()];
        self.ops.divergence.mat_vec_mul(&self.state.u, &mut du);
        du.iter()
            .enumerate()
            .filter(|(q, _)| !self.bcs.pressure.is_essential(*q))
            .map(|(_, v)| v * v)
            .sum::<f64>()
            .sqrt()
    }
}

pub fn advance(ctx: &mut SimulationContext) -> Result<StepReport, SolverError> {
    advance_with_ops(ctx, &SerialOps)
}

/// One IMEX projection step: implicit viscous predictor with explicit
/// convection, pressure solve, lumped-mass velocity correction.
pub fn advance_with_ops<O: SolverOps>(
    ctx: &mut SimulationContext,
    ops: &O,
) -> Result<StepReport, SolverError> {
    let dt = ctx.config.dt;
    let SimulationContext {
        disc,
        ops: operators,
        bcs,
        momentum_elim,
        pressure_elim,
        momentum_solver,
        pressure_solver,
        inv_lumped,
        state,
        scratch,
        non_converged,
        ..
    } = ctx;

    // 1. H u* = M u / dt - N(u)
    assemble_convection(disc, &state.u, &mut scratch.convection);
    operators.mass.mat_vec_mul(&state.u, &mut scratch.rhs_u);
    for (r, n) in scratch.rhs_u.iter_mut().zip(&scratch.convection) {
        *r = *r / dt - n;
    }
    momentum_elim.apply_rhs(&bcs.velocity, &mut scratch.rhs_u);
    scratch.u_star.copy_from_slice(&state.u);
    let momentum = momentum_solver.solve_with_ops(ops, &scratch.rhs_u, &mut scratch.u_star)?;
    bcs.velocity.apply(&mut scratch.u_star);

    // 2. S p = D u* / dt
    operators
        .divergence
        .mat_vec_mul(&scratch.u_star, &mut scratch.rhs_p);
    for r in &mut scratch.rhs_p {
        *r /= dt;
    }
    pressure_elim.apply_rhs(&bcs.pressure, &mut scratch.rhs_p);
    let pressure = pressure_solver.solve_with_ops(ops, &scratch.rhs_p, &mut state.p)?;
    bcs.pressure.apply(&mut state.p);

    // 3. u = u* - dt M_L^-1 D^T p on free DOFs
    operators.gradient.mat_vec_mul(&state.p, &mut scratch.grad_p);
    std::mem::swap(&mut state.u, &mut scratch.u_star);
    let mask = bcs.velocity.mask();
    for i in 0..state.u.len() {
        if !mask[i] {
            state.u[i] -= dt * inv_lumped[i] * scratch.grad_p[i];
        }
    }

    *non_converged += usize::from(!momentum.converged) + usize::from(!pressure.converged);
    state.step += 1;
    state.time = state.step as f64 * dt;

    log::debug!(
        "step {} t={:.4}: momentum {} its ({:.2e}), pressure {} its ({:.2e})",
        state.step,
        state.time,
        momentum.iterations,
        momentum.residual,
        pressure.iterations,
        pressure.residual
    );

    Ok(StepReport {
        step: state.step,
        time: state.time,
        momentum,
        pressure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::{generate_structured_rect_mesh, BoundarySides};

    #[test]
    fn test_step_counter_and_time() {
        let mesh = generate_structured_rect_mesh(4, 2, 2.0, 1.0, BoundarySides::channel())
            .expect("mesh");
        let config = SimulationConfig {
            dt: 0.05,
            ..Default::default()
        };
        let mut ctx = SimulationContext::new(config, mesh).expect("context");
        for n in 1..=3 {
            let report = advance(&mut ctx).expect("step");
            assert_eq!(report.step, n);
            assert_eq!(report.time, n as f64 * 0.05);
        }
        assert_eq!(ctx.state().step, 3);
    }

    #[test]
    fn test_invalid_config_fails_before_assembly() {
        let mesh = generate_structured_rect_mesh(2, 2, 1.0, 1.0, BoundarySides::channel())
            .expect("mesh");
        let config = SimulationConfig {
            reynolds: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            SimulationContext::new(config, mesh),
            Err(crate::solver::error::Error::Config(_))
        ));
    }
}
