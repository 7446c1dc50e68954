use crate::solver::linear_solver::{axpy, SparseMatrix};
use nalgebra::{DMatrix, DVector};

/// Coupling `|a_ij| >= theta * sqrt(|a_ii a_jj|)` counts as strong.
const STRENGTH_THRESHOLD: f64 = 0.08;
/// Levels at or below this size are solved directly.
const MAX_COARSE_SIZE: usize = 200;
const MAX_LEVELS: usize = 12;
/// Stop coarsening when a level shrinks by less than this factor.
const MIN_REDUCTION: f64 = 0.9;
const SMOOTHING_SWEEPS: usize = 1;

/// Greedy aggregation on the strength graph.
///
/// Returns the aggregate of every row and the aggregate count. Rows without
/// strong neighbours (e.g. eliminated Dirichlet rows) get `usize::MAX`: they
/// are left to the smoother and have no coarse representative.
pub fn aggregate(matrix: &SparseMatrix, theta: f64) -> (Vec<usize>, usize) {
    let n = matrix.n_rows;
    let diag = matrix.diagonal();
    let strong: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            let (cols, vals) = matrix.row(i);
            cols.iter()
                .zip(vals)
                .filter(|&(&j, &v)| {
                    j != i && v.abs() >= theta * (diag[i] * diag[j]).abs().sqrt()
                })
                .map(|(&j, _)| j)
                .collect()
        })
        .collect();

    let mut aggregates = vec![usize::MAX; n];
    let mut num_aggregates = 0;

    // Pass 1: seed an aggregate at every node whose neighbourhood is still free
    for i in 0..n {
        if aggregates[i] != usize::MAX || strong[i].is_empty() {
            continue;
        }
        if strong[i].iter().any(|&j| aggregates[j] != usize::MAX) {
            continue;
        }
        aggregates[i] = num_aggregates;
        for &j in &strong[i] {
            aggregates[j] = num_aggregates;
        }
        num_aggregates += 1;
    }

    // Pass 2: attach leftovers to a neighbouring aggregate
    let snapshot = aggregates.clone();
    for i in 0..n {
        if aggregates[i] != usize::MAX || strong[i].is_empty() {
            continue;
        }
        match strong[i].iter().find(|&&j| snapshot[j] != usize::MAX) {
            Some(&j) => aggregates[i] = snapshot[j],
            None => {
                aggregates[i] = num_aggregates;
                num_aggregates += 1;
            }
        }
    }

    (aggregates, num_aggregates)
}

/// Piecewise-constant prolongation: `P_ij = 1` when row `i` is in aggregate `j`.
pub fn build_prolongation(aggregates: &[usize], num_aggregates: usize) -> SparseMatrix {
    let fine_size = aggregates.len();
    let mut p = SparseMatrix::new(fine_size, num_aggregates);
    for (i, &agg) in aggregates.iter().enumerate() {
        if agg < num_aggregates {
            p.col_indices.push(agg);
            p.values.push(1.0);
        }
        p.row_offsets[i + 1] = p.values.len();
    }
    p
}

/// `R * A * P`
pub fn galerkin_product(r: &SparseMatrix, a: &SparseMatrix, p: &SparseMatrix) -> SparseMatrix {
    r.mat_mat_mult(a).mat_mat_mult(p)
}

#[derive(Clone, Debug)]
struct AmgLevel {
    matrix: SparseMatrix,
    prolongation: SparseMatrix,
    restriction: SparseMatrix,
    inv_diag: Vec<f64>,
    omega: f64,
    r: Vec<f64>,
    coarse_b: Vec<f64>,
    coarse_x: Vec<f64>,
}

impl AmgLevel {
    fn new(matrix: SparseMatrix, prolongation: SparseMatrix) -> Self {
        let n = matrix.n_rows;
        let nc = prolongation.n_cols;
        let diag = matrix.diagonal();
        let inv_diag: Vec<f64> = diag
            .iter()
            .map(|&d| if d != 0.0 { 1.0 / d } else { 0.0 })
            .collect();

        // Gershgorin bound on the spectral radius of D^-1 A
        let rho = (0..n)
            .map(|i| {
                let (_, vals) = matrix.row(i);
                vals.iter().map(|v| v.abs()).sum::<f64>() * inv_diag[i].abs()
            })
            .fold(0.0, f64::max);
        let omega = if rho > 0.0 { 4.0 / (3.0 * rho) } else { 1.0 };

        Self {
            restriction: prolongation.transpose(),
            prolongation,
            matrix,
            inv_diag,
            omega,
            r: vec![0.0; n],
            coarse_b: vec![0.0; nc],
            coarse_x: vec![0.0; nc],
        }
    }

    /// Damped Jacobi sweeps on `A x = b`.
    fn smooth(&mut self, b: &[f64], x: &mut [f64], sweeps: usize) {
        for _ in 0..sweeps {
            self.matrix.mat_vec_mul(x, &mut self.r);
            for i in 0..x.len() {
                x[i] += self.omega * self.inv_diag[i] * (b[i] - self.r[i]);
            }
        }
    }
}

#[derive(Clone, Debug)]
enum CoarseSolver {
    Cholesky(nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>),
    Lu(nalgebra::linalg::LU<f64, nalgebra::Dyn, nalgebra::Dyn>),
}

impl CoarseSolver {
    fn new(matrix: &SparseMatrix) -> Self {
        let n = matrix.n_rows;
        let mut dense = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            let (cols, vals) = matrix.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                dense[(i, j)] = v;
            }
        }
        match dense.clone().cholesky() {
            Some(chol) => Self::Cholesky(chol),
            None => {
                log::debug!("AMG coarse matrix ({}x{}) not SPD, using LU", n, n);
                Self::Lu(dense.lu())
            }
        }
    }

    fn solve(&self, b: &[f64], x: &mut [f64]) {
        let rhs = DVector::from_column_slice(b);
        let sol = match self {
            Self::Cholesky(chol) => Some(chol.solve(&rhs)),
            Self::Lu(lu) => lu.solve(&rhs),
        };
        match sol {
            Some(sol) => x.copy_from_slice(sol.as_slice()),
            None => x.fill(0.0),
        }
    }
}

/// Aggregation AMG hierarchy applied as one symmetric V-cycle per call.
#[derive(Clone, Debug)]
pub struct AmgHierarchy {
    levels: Vec<AmgLevel>,
    coarse: CoarseSolver,
    coarse_size: usize,
}

impl AmgHierarchy {
    pub fn new(matrix: &SparseMatrix) -> Self {
        let mut levels = Vec::new();
        let mut current = matrix.clone();

        while levels.len() + 1 < MAX_LEVELS && current.n_rows > MAX_COARSE_SIZE {
            let (aggregates, n_coarse) = aggregate(&current, STRENGTH_THRESHOLD);
            if n_coarse == 0 || n_coarse as f64 > MIN_REDUCTION * current.n_rows as f64 {
                break;
            }
            let p = build_prolongation(&aggregates, n_coarse);
            let coarse = galerkin_product(&p.transpose(), &current, &p);
            levels.push(AmgLevel::new(current, p));
            current = coarse;
        }

        let sizes: Vec<usize> = levels
            .iter()
            .map(|l| l.matrix.n_rows)
            .chain(std::iter::once(current.n_rows))
            .collect();
        log::debug!("AMG hierarchy: {} levels, sizes {:?}", sizes.len(), sizes);

        Self {
            coarse_size: current.n_rows,
            coarse: CoarseSolver::new(&current),
            levels,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len() + 1
    }

    pub fn coarse_size(&self) -> usize {
        self.coarse_size
    }

    /// `z = B r` with `B` one V-cycle from a zero initial guess.
    pub fn v_cycle(&mut self, r: &[f64], z: &mut [f64]) {
        cycle(&mut self.levels, &self.coarse, r, z);
    }
}

fn cycle(levels: &mut [AmgLevel], coarse: &CoarseSolver, b: &[f64], x: &mut [f64]) {
    let Some((level, rest)) = levels.split_first_mut() else {
        coarse.solve(b, x);
        return;
    };

    x.fill(0.0);
    level.smooth(b, x, SMOOTHING_SWEEPS);

    level.matrix.mat_vec_mul(x, &mut level.r);
    for (ri, bi) in level.r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    level.restriction.mat_vec_mul(&level.r, &mut level.coarse_b);
    cycle(rest, coarse, &level.coarse_b, &mut level.coarse_x);
    level.prolongation.mat_vec_mul(&level.coarse_x, &mut level.r);
    axpy(1.0, &level.r, x);

    level.smooth(b, x, SMOOTHING_SWEEPS);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 5-point Laplacian on an `n x n` grid with Dirichlet rows on the border.
    fn poisson_2d(n: usize) -> SparseMatrix {
        let idx = |i: usize, j: usize| i + n * j;
        let mut t = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let row = idx(i, j);
                if i == 0 || j == 0 || i == n - 1 || j == n - 1 {
                    t.push((row, row, 1.0));
                    continue;
                }
                t.push((row, row, 4.0));
                for (ni, nj) in [(i - 1, j), (i + 1, j), (i, j - 1), (i, j + 1)] {
                    let col = idx(ni, nj);
                    let boundary = ni == 0 || nj == 0 || ni == n - 1 || nj == n - 1;
                    if !boundary {
                        t.push((row, col, -1.0));
                    }
                }
            }
        }
        SparseMatrix::from_triplets(n * n, n * n, &t)
    }

    #[test]
    fn test_aggregation_covers_connected_rows() {
        let a = poisson_2d(12);
        let (agg, count) = aggregate(&a, STRENGTH_THRESHOLD);
        assert!(count > 0 && count < a.n_rows / 3);
        for i in 0..12 {
            // border rows are identity rows: no coarse representative
            assert_eq!(agg[i], usize::MAX);
        }
        let interior = agg.iter().filter(|&&g| g != usize::MAX).count();
        assert_eq!(interior, 10 * 10);
    }

    #[test]
    fn test_galerkin_operator_is_symmetric() {
        let a = poisson_2d(20);
        let (agg, count) = aggregate(&a, STRENGTH_THRESHOLD);
        let p = build_prolongation(&agg, count);
        let ac = galerkin_product(&p.transpose(), &a, &p);
        assert_eq!(ac.n_rows, count);
        assert!(ac.max_asymmetry() < 1e-14);
        assert!(ac.diagonal().iter().all(|d| *d > 0.0));
    }

    #[test]
    fn test_hierarchy_has_several_levels_and_reduces_residual() {
        let a = poisson_2d(40);
        let mut amg = AmgHierarchy::new(&a);
        assert!(amg.num_levels() >= 2);
        assert!(amg.coarse_size() <= MAX_COARSE_SIZE);

        // stationary iteration x += B (b - A x)
        let n = a.n_rows;
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let mut r = b.clone();
        let mut z = vec![0.0; n];
        let r0 = crate::solver::linear_solver::norm(&r);
        for _ in 0..10 {
            amg.v_cycle(&r, &mut z);
            axpy(1.0, &z, &mut x);
            a.mat_vec_mul(&x, &mut r);
            for (ri, bi) in r.iter_mut().zip(&b) {
                *ri = bi - *ri;
            }
        }
        let r10 = crate::solver::linear_solver::norm(&r);
        assert!(r10 < 0.5 * r0, "residual {} -> {}", r0, r10);
    }
}
