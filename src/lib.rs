pub mod solver;
pub mod trace;

pub use solver::error::{Error, Result};
