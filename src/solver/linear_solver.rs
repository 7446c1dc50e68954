use crate::solver::amg::AmgHierarchy;
use crate::solver::error::SolverError;
use crate::solver::options::{LinearSolverOptions, PreconditionerKind};
use rayon::prelude::*;
use std::collections::BTreeMap;
use wide::f64x4;

/// Compressed sparse row matrix. Column indices are sorted within each row
/// and unique.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    pub values: Vec<f64>,
    pub col_indices: Vec<usize>,
    pub row_offsets: Vec<usize>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl SparseMatrix {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            values: Vec::new(),
            col_indices: Vec::new(),
            row_offsets: vec![0; n_rows + 1],
            n_rows,
            n_cols,
        }
    }

    /// Builds a matrix from `(row, col, value)` entries. Duplicates are summed
    /// in the order they appear, so the same triplet list always yields the
    /// same bits.
    pub fn from_triplets(n_rows: usize, n_cols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut order: Vec<usize> = (0..triplets.len()).collect();
        order.sort_by_key(|&t| (triplets[t].0, triplets[t].1));

        let mut mat = Self::new(n_rows, n_cols);
        mat.values.reserve(triplets.len());
        mat.col_indices.reserve(triplets.len());

        let mut row_counts = vec![0usize; n_rows];
        let mut last: Option<(usize, usize)> = None;
        for t in order {
            let (r, c, v) = triplets[t];
            debug_assert!(r < n_rows && c < n_cols);
            if last == Some((r, c)) {
                if let Some(slot) = mat.values.last_mut() {
                    *slot += v;
                }
            } else {
                mat.values.push(v);
                mat.col_indices.push(c);
                row_counts[r] += 1;
                last = Some((r, c));
            }
        }
        for i in 0..n_rows {
            mat.row_offsets[i + 1] = mat.row_offsets[i] + row_counts[i];
        }
        mat
    }

    pub fn from_diagonal(diag: &[f64]) -> Self {
        let n = diag.len();
        Self {
            values: diag.to_vec(),
            col_indices: (0..n).collect(),
            row_offsets: (0..=n).collect(),
            n_rows: n,
            n_cols: n,
        }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_offsets[i]..self.row_offsets[i + 1];
        (&self.col_indices[range.clone()], &self.values[range])
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (cols, vals) = self.row(row);
        match cols.binary_search(&col) {
            Ok(k) => vals[k],
            Err(_) => 0.0,
        }
    }

    pub fn mat_vec_mul(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols);
        assert_eq!(y.len(), self.n_rows);

        y.par_iter_mut()
            .with_min_len(512)
            .enumerate()
            .for_each(|(i, yi)| {
                let mut sum = 0.0;
                for j in self.row_offsets[i]..self.row_offsets[i + 1] {
                    sum += self.values[j] * x[self.col_indices[j]];
                }
                *yi = sum;
            });
    }

    pub fn transpose(&self) -> Self {
        let mut row_counts = vec![0usize; self.n_cols];
        for &c in &self.col_indices {
            row_counts[c] += 1;
        }
        let mut t = Self::new(self.n_cols, self.n_rows);
        for i in 0..self.n_cols {
            t.row_offsets[i + 1] = t.row_offsets[i] + row_counts[i];
        }
        t.values = vec![0.0; self.nnz()];
        t.col_indices = vec![0; self.nnz()];

        // rows are visited in order, so each transposed row comes out sorted
        let mut next = t.row_offsets.clone();
        for i in 0..self.n_rows {
            for k in self.row_offsets[i]..self.row_offsets[i + 1] {
                let j = self.col_indices[k];
                t.values[next[j]] = self.values[k];
                t.col_indices[next[j]] = i;
                next[j] += 1;
            }
        }
        t
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n_rows.min(self.n_cols))
            .map(|i| self.get(i, i))
            .collect()
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|i| self.row(i).1.iter().sum())
            .collect()
    }

    pub fn scale(&self, alpha: f64) -> Self {
        let mut out = self.clone();
        for v in &mut out.values {
            *v *= alpha;
        }
        out
    }

    /// `self * diag(s)`.
    pub fn scale_columns(&self, s: &[f64]) -> Self {
        assert_eq!(s.len(), self.n_cols);
        let mut out = self.clone();
        for (v, &c) in out.values.iter_mut().zip(&self.col_indices) {
            *v *= s[c];
        }
        out
    }

    /// Copy without the entries of the masked columns.
    pub fn drop_columns(&self, mask: &[bool]) -> Self {
        assert_eq!(mask.len(), self.n_cols);
        let mut out = Self::new(self.n_rows, self.n_cols);
        for i in 0..self.n_rows {
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                if !mask[c] {
                    out.col_indices.push(c);
                    out.values.push(v);
                }
            }
            out.row_offsets[i + 1] = out.values.len();
        }
        out
    }

    /// `alpha * a + beta * b` for matrices of equal shape.
    pub fn linear_combination(alpha: f64, a: &Self, beta: f64, b: &Self) -> Self {
        assert_eq!((a.n_rows, a.n_cols), (b.n_rows, b.n_cols));
        let mut out = Self::new(a.n_rows, a.n_cols);
        out.values.reserve(a.nnz().max(b.nnz()));
        out.col_indices.reserve(a.nnz().max(b.nnz()));
        for i in 0..a.n_rows {
            let (ca, va) = a.row(i);
            let (cb, vb) = b.row(i);
            let (mut p, mut q) = (0, 0);
            while p < ca.len() || q < cb.len() {
                let next_a = ca.get(p).copied().unwrap_or(usize::MAX);
                let next_b = cb.get(q).copied().unwrap_or(usize::MAX);
                if next_a == next_b {
                    out.col_indices.push(next_a);
                    out.values.push(alpha * va[p] + beta * vb[q]);
                    p += 1;
                    q += 1;
                } else if next_a < next_b {
                    out.col_indices.push(next_a);
                    out.values.push(alpha * va[p]);
                    p += 1;
                } else {
                    out.col_indices.push(next_b);
                    out.values.push(beta * vb[q]);
                    q += 1;
                }
            }
            out.row_offsets[i + 1] = out.values.len();
        }
        out
    }

    /// Sparse product `self * other`.
    pub fn mat_mat_mult(&self, other: &Self) -> Self {
        assert_eq!(self.n_cols, other.n_rows);
        let rows: Vec<(Vec<usize>, Vec<f64>)> = (0..self.n_rows)
            .into_par_iter()
            .map(|i| {
                let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
                let (ca, va) = self.row(i);
                for (&j, &a) in ca.iter().zip(va) {
                    let (cb, vb) = other.row(j);
                    for (&k, &b) in cb.iter().zip(vb) {
                        *acc.entry(k).or_insert(0.0) += a * b;
                    }
                }
                acc.into_iter().unzip()
            })
            .collect();

        let mut out = Self::new(self.n_rows, other.n_cols);
        for (i, (cols, vals)) in rows.into_iter().enumerate() {
            out.col_indices.extend(cols);
            out.values.extend(vals);
            out.row_offsets[i + 1] = out.values.len();
        }
        out
    }

    /// Largest `|a_ij - a_ji|` over stored entries.
    pub fn max_asymmetry(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..self.n_rows {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                worst = worst.max((v - self.get(j, i)).abs());
            }
        }
        worst
    }
}

/// Reductions and mat-vecs used by the Krylov loop. A distributed run
/// replaces these with versions that reduce across partitions.
pub trait SolverOps {
    fn dot(&self, a: &[f64], b: &[f64]) -> f64;

    fn mat_vec_mul(&self, matrix: &SparseMatrix, x: &[f64], y: &mut [f64]);

    fn norm(&self, a: &[f64]) -> f64 {
        self.dot(a, a).sqrt()
    }
}

pub struct SerialOps;

impl SolverOps for SerialOps {
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        dot(a, b)
    }

    fn mat_vec_mul(&self, matrix: &SparseMatrix, x: &[f64], y: &mut [f64]) {
        matrix.mat_vec_mul(x, y);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
    pub initial_residual: f64,
    pub converged: bool,
}

#[derive(Clone, Debug)]
enum Preconditioner {
    Identity,
    Jacobi(Vec<f64>),
    Amg(Box<AmgHierarchy>),
}

impl Preconditioner {
    fn build(kind: PreconditionerKind, matrix: &SparseMatrix) -> Self {
        match kind {
            PreconditionerKind::None => Self::Identity,
            PreconditionerKind::Jacobi => Self::Jacobi(inverse_diagonal(matrix)),
            PreconditionerKind::Amg => Self::Amg(Box::new(AmgHierarchy::new(matrix))),
        }
    }

    fn apply(&mut self, r: &[f64], z: &mut [f64]) {
        match self {
            Self::Identity => z.copy_from_slice(r),
            Self::Jacobi(inv) => {
                for ((zi, ri), d) in z.iter_mut().zip(r).zip(inv.iter()) {
                    *zi = ri * d;
                }
            }
            Self::Amg(h) => h.v_cycle(r, z),
        }
    }
}

fn inverse_diagonal(matrix: &SparseMatrix) -> Vec<f64> {
    matrix
        .diagonal()
        .into_iter()
        .map(|d| if d != 0.0 { 1.0 / d } else { 1.0 })
        .collect()
}

/// Preconditioned conjugate gradient for one SPD operator.
///
/// The operator and its preconditioner are set up once; the Krylov vectors are
/// allocated once and reused by every solve.
#[derive(Clone, Debug)]
pub struct CgSolver {
    stage: &'static str,
    operator: SparseMatrix,
    options: LinearSolverOptions,
    preconditioner: Preconditioner,
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    q: Vec<f64>,
}

impl CgSolver {
    pub fn new(stage: &'static str, operator: SparseMatrix, options: LinearSolverOptions) -> Self {
        assert_eq!(operator.n_rows, operator.n_cols, "CG needs a square operator");
        let n = operator.n_rows;
        let preconditioner = Preconditioner::build(options.preconditioner, &operator);
        Self {
            stage,
            operator,
            options,
            preconditioner,
            r: vec![0.0; n],
            z: vec![0.0; n],
            p: vec![0.0; n],
            q: vec![0.0; n],
        }
    }

    pub fn operator(&self) -> &SparseMatrix {
        &self.operator
    }

    pub fn options(&self) -> &LinearSolverOptions {
        &self.options
    }

    /// Replaces the operator and rebuilds the preconditioner.
    pub fn set_operator(&mut self, operator: SparseMatrix) {
        assert_eq!(operator.n_rows, operator.n_cols, "CG needs a square operator");
        let n = operator.n_rows;
        self.preconditioner = Preconditioner::build(self.options.preconditioner, &operator);
        self.operator = operator;
        for v in [&mut self.r, &mut self.z, &mut self.p, &mut self.q] {
            v.resize(n, 0.0);
        }
    }

    pub fn solve(&mut self, b: &[f64], x: &mut [f64]) -> Result<SolveStats, SolverError> {
        self.solve_with_ops(&SerialOps, b, x)
    }

    pub fn solve_with_ops<O: SolverOps>(
        &mut self,
        ops: &O,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats, SolverError> {
        let n = self.operator.n_rows;
        assert_eq!(b.len(), n);
        assert_eq!(x.len(), n);

        let Self {
            stage,
            operator,
            options,
            preconditioner,
            r,
            z,
            p,
            q,
        } = self;
        let stage = *stage;

        ops.mat_vec_mul(operator, x, r);
        for (ri, bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }

        let b_norm = ops.norm(b);
        let tol = (options.rel_tol * b_norm).max(options.abs_tol);
        let initial_residual = ops.norm(r);
        check_finite(stage, 0, initial_residual)?;
        if initial_residual <= tol {
            return Ok(SolveStats {
                iterations: 0,
                residual: initial_residual,
                initial_residual,
                converged: true,
            });
        }

        preconditioner.apply(r, z);
        p.copy_from_slice(z);
        let mut rz = ops.dot(r, z);
        let mut residual = initial_residual;

        for iter in 0..options.max_iterations {
            ops.mat_vec_mul(operator, p, q);
            let pq = ops.dot(p, q);
            check_finite(stage, iter, pq)?;
            if pq == 0.0 {
                break;
            }
            let alpha = rz / pq;
            axpy(alpha, p, x);
            axpy(-alpha, q, r);

            residual = ops.norm(r);
            check_finite(stage, iter + 1, residual)?;
            if residual <= tol {
                return Ok(SolveStats {
                    iterations: iter + 1,
                    residual,
                    initial_residual,
                    converged: true,
                });
            }

            preconditioner.apply(r, z);
            let rz_new = ops.dot(r, z);
            let beta = rz_new / rz;
            xpay(z, beta, p);
            rz = rz_new;
        }

        log::warn!(
            "{} solve did not converge: residual {:.3e} (target {:.3e}) after {} iterations",
            stage,
            residual,
            tol,
            options.max_iterations
        );
        Ok(SolveStats {
            iterations: options.max_iterations,
            residual,
            initial_residual,
            converged: false,
        })
    }
}

fn check_finite(stage: &'static str, iteration: usize, value: f64) -> Result<(), SolverError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SolverError::Breakdown {
            stage,
            iteration,
            residual: value,
        })
    }
}

#[inline]
fn load(s: &[f64]) -> f64x4 {
    f64x4::from([s[0], s[1], s[2], s[3]])
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let ca = a.chunks_exact(4);
    let cb = b.chunks_exact(4);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    let mut sum = f64x4::splat(0.0);
    for (x, y) in ca.zip(cb) {
        sum += load(x) * load(y);
    }
    let mut s = sum.reduce_add();
    for (x, y) in ra.iter().zip(rb) {
        s += x * y;
    }
    s
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    let va = f64x4::splat(alpha);
    let mut cy = y.chunks_exact_mut(4);
    let mut cx = x.chunks_exact(4);
    for (ys, xs) in (&mut cy).zip(&mut cx) {
        let res: [f64; 4] = (load(ys) + va * load(xs)).into();
        ys.copy_from_slice(&res);
    }
    for (yi, xi) in cy.into_remainder().iter_mut().zip(cx.remainder()) {
        *yi += alpha * xi;
    }
}

/// `y = x + beta * y`
pub fn xpay(x: &[f64], beta: f64, y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    let vb = f64x4::splat(beta);
    let mut cy = y.chunks_exact_mut(4);
    let mut cx = x.chunks_exact(4);
    for (ys, xs) in (&mut cy).zip(&mut cx) {
        let res: [f64; 4] = (load(xs) + vb * load(ys)).into();
        ys.copy_from_slice(&res);
    }
    for (yi, xi) in cy.into_remainder().iter_mut().zip(cx.remainder()) {
        *yi = xi + beta * *yi;
    }
}
