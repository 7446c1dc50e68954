use crate::solver::error::ConfigError;
use crate::solver::fem::{BasisTable, ElementQuadrature, FunctionSpace};
use crate::solver::linear_solver::SparseMatrix;
use crate::solver::mesh::Mesh;
use nalgebra::Vector2;
use rayon::prelude::*;

/// Mesh plus the Taylor-Hood pair built on it and the shared element
/// quadrature.
#[derive(Clone, Debug)]
pub struct Discretization {
    pub mesh: Mesh,
    /// Vector Q_k space.
    pub velocity: FunctionSpace,
    /// Scalar Q_{k-1} space.
    pub pressure: FunctionSpace,
    pub quadrature: ElementQuadrature,
    pub velocity_table: BasisTable,
    pub pressure_table: BasisTable,
}

impl Discretization {
    /// Velocity order must lie in `2..=4`.
    pub fn new(mesh: Mesh, order: usize) -> Result<Self, ConfigError> {
        if !(2..=4).contains(&order) {
            return Err(ConfigError::UnsupportedOrder(order));
        }
        let velocity = FunctionSpace::new(&mesh, order, 2);
        let pressure = FunctionSpace::new(&mesh, order - 1, 1);
        // k + 2 points per direction also covers the cubic-in-k convective term
        let quadrature = ElementQuadrature::new(&mesh, order + 2);
        let velocity_table = BasisTable::new(velocity.basis(), quadrature.rule());
        let pressure_table = BasisTable::new(pressure.basis(), quadrature.rule());
        Ok(Self {
            mesh,
            velocity,
            pressure,
            quadrature,
            velocity_table,
            pressure_table,
        })
    }

    pub fn order(&self) -> usize {
        self.velocity.order()
    }
}

/// Discrete operators. All are assembled once per run.
#[derive(Clone, Debug)]
pub struct Operators {
    /// Vector mass matrix (block diagonal).
    pub mass: SparseMatrix,
    /// Vector stiffness matrix (block diagonal).
    pub stiffness: SparseMatrix,
    /// `D[q, i] = -(psi_q, div phi_i)`, pressure rows by velocity columns.
    pub divergence: SparseMatrix,
    /// `G = D^T`.
    pub gradient: SparseMatrix,
    pub pressure_laplacian: SparseMatrix,
    /// `M / dt + nu K`.
    pub helmholtz: SparseMatrix,
    /// Row sums of the vector mass matrix.
    pub lumped_mass: Vec<f64>,
}

impl Operators {
    pub fn assemble(disc: &Discretization, dt: f64, viscosity: f64) -> Self {
        let ns = disc.velocity.num_scalar_dofs();
        let (mass_triplets, stiff_triplets) = velocity_blocks(disc);
        let mass = SparseMatrix::from_triplets(2 * ns, 2 * ns, &mass_triplets);
        let stiffness = SparseMatrix::from_triplets(2 * ns, 2 * ns, &stiff_triplets);
        let divergence = assemble_divergence(disc);
        let gradient = divergence.transpose();
        let pressure_laplacian = assemble_pressure_laplacian(disc);
        let helmholtz = SparseMatrix::linear_combination(1.0 / dt, &mass, viscosity, &stiffness);
        let lumped_mass = mass.row_sums();

        log::debug!(
            "Assembled operators: M/K nnz {}, D nnz {}, L_p nnz {}",
            mass.nnz(),
            divergence.nnz(),
            pressure_laplacian.nnz()
        );

        Self {
            mass,
            stiffness,
            divergence,
            gradient,
            pressure_laplacian,
            helmholtz,
            lumped_mass,
        }
    }

    /// `D_f M_L^-1 D_f^T`, with `D_f` the divergence without the columns of
    /// essential velocity DOFs.
    pub fn consistent_pressure_operator(&self, velocity_essential: &[bool]) -> SparseMatrix {
        let d_free = self.divergence.drop_columns(velocity_essential);
        let inv_lumped: Vec<f64> = self.lumped_mass.iter().map(|m| 1.0 / m).collect();
        d_free
            .scale_columns(&inv_lumped)
            .mat_mat_mult(&d_free.transpose())
    }
}

/// Scalar mass and stiffness element matrices, scattered into both velocity
/// component blocks.
fn velocity_blocks(disc: &Discretization) -> (Vec<(usize, usize, f64)>, Vec<(usize, usize, f64)>) {
    let table = &disc.velocity_table;
    let quad = &disc.quadrature;
    let nb = table.num_basis();
    let ns = disc.velocity.num_scalar_dofs();

    let locals: Vec<(Vec<f64>, Vec<f64>)> = (0..disc.mesh.num_elements())
        .into_par_iter()
        .map(|e| {
            let mut m = vec![0.0; nb * nb];
            let mut k = vec![0.0; nb * nb];
            let mut grads = vec![Vector2::zeros(); nb];
            for q in 0..quad.num_points() {
                let w = quad.jxw(e, q);
                let phi = table.values(q);
                quad.physical_grads(table, e, q, &mut grads);
                for i in 0..nb {
                    for j in 0..nb {
                        m[i * nb + j] += phi[i] * phi[j] * w;
                        k[i * nb + j] += grads[i].dot(&grads[j]) * w;
                    }
                }
            }
            (m, k)
        })
        .collect();

    let mut mass = Vec::with_capacity(locals.len() * 2 * nb * nb);
    let mut stiff = Vec::with_capacity(locals.len() * 2 * nb * nb);
    for (e, (m, k)) in locals.iter().enumerate() {
        let dofs = disc.velocity.element_dofs(e);
        for c in 0..2 {
            let off = c * ns;
            for i in 0..nb {
                for j in 0..nb {
                    mass.push((off + dofs[i], off + dofs[j], m[i * nb + j]));
                    stiff.push((off + dofs[i], off + dofs[j], k[i * nb + j]));
                }
            }
        }
    }
    (mass, stiff)
}

fn assemble_divergence(disc: &Discretization) -> SparseMatrix {
    let vt = &disc.velocity_table;
    let pt = &disc.pressure_table;
    let quad = &disc.quadrature;
    let nb = vt.num_basis();
    let np = pt.num_basis();
    let ns = disc.velocity.num_scalar_dofs();

    // local layout: row p, column c * nb + i
    let locals: Vec<Vec<f64>> = (0..disc.mesh.num_elements())
        .into_par_iter()
        .map(|e| {
            let mut d = vec![0.0; np * 2 * nb];
            let mut grads = vec![Vector2::zeros(); nb];
            for q in 0..quad.num_points() {
                let w = quad.jxw(e, q);
                let psi = pt.values(q);
                quad.physical_grads(vt, e, q, &mut grads);
                for p in 0..np {
                    for i in 0..nb {
                        d[p * 2 * nb + i] -= psi[p] * grads[i].x * w;
                        d[p * 2 * nb + nb + i] -= psi[p] * grads[i].y * w;
                    }
                }
            }
            d
        })
        .collect();

    let mut triplets = Vec::with_capacity(locals.len() * np * 2 * nb);
    for (e, d) in locals.iter().enumerate() {
        let pdofs = disc.pressure.element_dofs(e);
        let vdofs = disc.velocity.element_dofs(e);
        for p in 0..np {
            for c in 0..2 {
                for i in 0..nb {
                    triplets.push((pdofs[p], c * ns + vdofs[i], d[p * 2 * nb + c * nb + i]));
                }
            }
        }
    }
    SparseMatrix::from_triplets(disc.pressure.num_dofs(), 2 * ns, &triplets)
}

fn assemble_pressure_laplacian(disc: &Discretization) -> SparseMatrix {
    let table = &disc.pressure_table;
    let quad = &disc.quadrature;
    let np = table.num_basis();

    let locals: Vec<Vec<f64>> = (0..disc.mesh.num_elements())
        .into_par_iter()
        .map(|e| {
            let mut k = vec![0.0; np * np];
            let mut grads = vec![Vector2::zeros(); np];
            for q in 0..quad.num_points() {
                let w = quad.jxw(e, q);
                quad.physical_grads(table, e, q, &mut grads);
                for i in 0..np {
                    for j in 0..np {
                        k[i * np + j] += grads[i].dot(&grads[j]) * w;
                    }
                }
            }
            k
        })
        .collect();

    let mut triplets = Vec::with_capacity(locals.len() * np * np);
    for (e, k) in locals.iter().enumerate() {
        let dofs = disc.pressure.element_dofs(e);
        for i in 0..np {
            for j in 0..np {
                triplets.push((dofs[i], dofs[j], k[i * np + j]));
            }
        }
    }
    let n = disc.pressure.num_dofs();
    SparseMatrix::from_triplets(n, n, &triplets)
}

/// Explicit convective term `N(u)_i = sum_e int phi_i (u . grad) u`.
pub fn assemble_convection(disc: &Discretization, u: &[f64], out: &mut [f64]) {
    let table = &disc.velocity_table;
    let quad = &disc.quadrature;
    let nb = table.num_basis();
    let ns = disc.velocity.num_scalar_dofs();
    assert_eq!(u.len(), 2 * ns);
    assert_eq!(out.len(), 2 * ns);

    let locals: Vec<Vec<f64>> = (0..disc.mesh.num_elements())
        .into_par_iter()
        .map(|e| {
            let dofs = disc.velocity.element_dofs(e);
            let ux: Vec<f64> = dofs.iter().map(|&d| u[d]).collect();
            let uy: Vec<f64> = dofs.iter().map(|&d| u[ns + d]).collect();
            let mut local = vec![0.0; 2 * nb];
            let mut grads = vec![Vector2::zeros(); nb];
            for q in 0..quad.num_points() {
                let w = quad.jxw(e, q);
                let phi = table.values(q);
                quad.physical_grads(table, e, q, &mut grads);

                let mut vel = Vector2::zeros();
                let mut grad_ux = Vector2::zeros();
                let mut grad_uy = Vector2::zeros();
                for j in 0..nb {
                    vel += Vector2::new(ux[j], uy[j]) * phi[j];
                    grad_ux += grads[j] * ux[j];
                    grad_uy += grads[j] * uy[j];
                }
                let adv_x = vel.dot(&grad_ux) * w;
                let adv_y = vel.dot(&grad_uy) * w;
                for i in 0..nb {
                    local[i] += phi[i] * adv_x;
                    local[nb + i] += phi[i] * adv_y;
                }
            }
            local
        })
        .collect();

    out.fill(0.0);
    for (e, local) in locals.iter().enumerate() {
        let dofs = disc.velocity.element_dofs(e);
        for i in 0..nb {
            out[dofs[i]] += local[i];
            out[ns + dofs[i]] += local[nb + i];
        }
    }
}
