use crate::solver::linear_solver::{self, SolverOps, SparseMatrix};
use crate::solver::mesh::Mesh;
use std::borrow::Cow;

/// Collective operations a distributed run needs from its transport.
///
/// The solver only reduces scalars and synchronizes; everything else stays
/// local to a partition.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn all_reduce_sum(&self, value: f64) -> f64;

    fn barrier(&self);

    /// The part of `mesh` owned by this rank.
    fn partition_mesh<'a>(&self, mesh: &'a Mesh) -> Cow<'a, Mesh>;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Single-process communicator: one rank owning the whole mesh.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn barrier(&self) {}

    fn partition_mesh<'a>(&self, mesh: &'a Mesh) -> Cow<'a, Mesh> {
        Cow::Borrowed(mesh)
    }
}

/// Krylov reductions routed through a communicator.
pub struct CommOps<'a, C: Communicator + ?Sized> {
    comm: &'a C,
}

impl<'a, C: Communicator + ?Sized> CommOps<'a, C> {
    pub fn new(comm: &'a C) -> Self {
        Self { comm }
    }
}

impl<C: Communicator + ?Sized> SolverOps for CommOps<'_, C> {
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local_dot = linear_solver::dot(a, b);
        self.comm.all_reduce_sum(local_dot)
    }

    fn mat_vec_mul(&self, matrix: &SparseMatrix, x: &[f64], y: &mut [f64]) {
        matrix.mat_vec_mul(x, y);
    }
}
