pub mod basis;
pub mod element;
pub mod quadrature;
pub mod space;

pub use basis::{Lagrange1d, QuadMap, TensorBasis};
pub use element::{BasisTable, ElementQuadrature};
pub use quadrature::{GaussLegendre, QuadRule};
pub use space::FunctionSpace;
