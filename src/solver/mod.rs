pub mod amg;
pub mod assembly;
pub mod boundary;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod fem;
pub mod linear_solver;
pub mod mesh;
pub mod options;
pub mod output;
pub mod parallel;
pub mod projection;

pub use driver::{run, run_on_mesh, run_with_comm, RunSummary};
pub use error::{ConfigError, Error, MeshError, OutputError, Result, SolverError};
pub use mesh::Mesh;
pub use options::SimulationConfig;
pub use projection::{advance, FlowState, SimulationContext, StepReport};
