use crate::solver::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionerKind {
    #[default]
    Amg,
    Jacobi,
    None,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverOptions {
    pub max_iterations: usize,
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub preconditioner: PreconditionerKind,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            rel_tol: 1e-8,
            abs_tol: 1e-10,
            preconditioner: PreconditionerKind::Amg,
        }
    }
}

/// Operator of the pressure Poisson solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureOperator {
    /// `D M_L^-1 D^T` restricted to free velocity DOFs. The corrected velocity
    /// is then discretely divergence free up to the solve tolerance.
    #[default]
    Consistent,
    /// Continuous pressure stiffness matrix.
    Laplacian,
}

/// How the pressure null space is removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureReference {
    /// Zero pressure on every outlet (attribute 3) DOF.
    #[default]
    Outlet,
    /// Zero pressure at the DOF nearest to a point; for enclosed flows.
    Point { x: f64, y: f64 },
}

/// Run parameters. Every field has a default so partial JSON files work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mesh_path: PathBuf,
    /// Uniform refinements applied to the loaded mesh.
    pub refine_levels: usize,
    /// Velocity polynomial degree; pressure uses `order - 1`.
    pub order: usize,
    pub reynolds: f64,
    pub dt: f64,
    pub final_time: f64,
    /// Steps between force rows and snapshots.
    pub output_interval: usize,
    pub output_dir: PathBuf,
    pub write_snapshots: bool,
    pub inflow_velocity: [f64; 2],
    /// Cylinder diameter used to normalize force coefficients.
    pub reference_length: f64,
    pub pressure_operator: PressureOperator,
    pub pressure_reference: PressureReference,
    pub momentum_solver: LinearSolverOptions,
    pub pressure_solver: LinearSolverOptions,
    pub cfl_warn_threshold: f64,
    pub trace_path: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mesh_path: PathBuf::from("cylinder_flow.mesh"),
            refine_levels: 0,
            order: 2,
            reynolds: 100.0,
            dt: 0.01,
            final_time: 0.2,
            output_interval: 5,
            output_dir: PathBuf::from("results"),
            write_snapshots: true,
            inflow_velocity: [1.0, 0.0],
            reference_length: 1.0,
            pressure_operator: PressureOperator::default(),
            pressure_reference: PressureReference::default(),
            momentum_solver: LinearSolverOptions::default(),
            pressure_solver: LinearSolverOptions::default(),
            cfl_warn_threshold: 1.0,
            trace_path: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(ConfigError::NonPositiveTimeStep(self.dt));
        }
        if !(self.reynolds > 0.0 && self.reynolds.is_finite()) {
            return Err(ConfigError::NonPositiveReynolds(self.reynolds));
        }
        if !(self.final_time > 0.0 && self.final_time.is_finite()) {
            return Err(ConfigError::NonPositiveFinalTime(self.final_time));
        }
        if !(2..=4).contains(&self.order) {
            return Err(ConfigError::UnsupportedOrder(self.order));
        }
        if self.output_interval == 0 {
            return Err(ConfigError::ZeroOutputInterval);
        }
        for (name, value) in [
            ("reference_length", self.reference_length),
            ("cfl_warn_threshold", self.cfl_warn_threshold),
            ("momentum_solver.max_iterations", self.momentum_solver.max_iterations as f64),
            ("pressure_solver.max_iterations", self.pressure_solver.max_iterations as f64),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        Ok(())
    }

    /// Kinematic viscosity for unit inflow speed and unit length scale.
    pub fn viscosity(&self) -> f64 {
        1.0 / self.reynolds
    }

    /// `ceil(final_time / dt)`, treating ratios within 1e-9 of an integer as
    /// that integer so `0.1 / 0.01` gives 10 steps, not 11.
    pub fn num_steps(&self) -> usize {
        let ratio = self.final_time / self.dt;
        let nearest = ratio.round();
        if (ratio - nearest).abs() <= 1e-9 * nearest.max(1.0) {
            nearest as usize
        } else {
            ratio.ceil() as usize
        }
    }

    /// Speed used for force normalization and the initial CFL check.
    pub fn reference_speed(&self) -> f64 {
        let [ux, uy] = self.inflow_velocity;
        let speed = (ux * ux + uy * uy).sqrt();
        if speed > 0.0 {
            speed
        } else {
            1.0
        }
    }
}
