use super::basis::{QuadMap, TensorBasis};
use super::quadrature::QuadRule;
use crate::solver::mesh::Mesh;
use nalgebra::{Matrix2, Point2, Vector2};
use rayon::prelude::*;

/// Basis values and reference gradients tabulated at the points of a rule.
#[derive(Clone, Debug)]
pub struct BasisTable {
    n_basis: usize,
    values: Vec<f64>,
    grads: Vec<Vector2<f64>>,
}

impl BasisTable {
    pub fn new(basis: &TensorBasis, rule: &QuadRule) -> Self {
        let nb = basis.num_basis();
        let mut values = vec![0.0; rule.len() * nb];
        let mut grads = vec![Vector2::zeros(); rule.len() * nb];
        for (q, [xi, eta]) in rule.points.iter().enumerate() {
            basis.eval(
                *xi,
                *eta,
                &mut values[q * nb..(q + 1) * nb],
                &mut grads[q * nb..(q + 1) * nb],
            );
        }
        Self {
            n_basis: nb,
            values,
            grads,
        }
    }

    pub fn num_basis(&self) -> usize {
        self.n_basis
    }

    pub fn values(&self, q: usize) -> &[f64] {
        &self.values[q * self.n_basis..(q + 1) * self.n_basis]
    }

    pub fn ref_grads(&self, q: usize) -> &[Vector2<f64>] {
        &self.grads[q * self.n_basis..(q + 1) * self.n_basis]
    }
}

/// Per-element geometric factors at the quadrature points: `|det J| * w`
/// and `J^{-T}`, which maps reference gradients to physical ones.
#[derive(Clone, Debug)]
pub struct ElementQuadrature {
    rule: QuadRule,
    jxw: Vec<f64>,
    inv_jt: Vec<Matrix2<f64>>,
}

impl ElementQuadrature {
    pub fn new(mesh: &Mesh, points_per_direction: usize) -> Self {
        let rule = QuadRule::tensor(points_per_direction);
        let nq = rule.len();

        let per_element: Vec<(Vec<f64>, Vec<Matrix2<f64>>)> = (0..mesh.num_elements())
            .into_par_iter()
            .map(|e| {
                let map = QuadMap::new(mesh.element_points(e));
                let mut jxw = Vec::with_capacity(nq);
                let mut inv_jt = Vec::with_capacity(nq);
                for ([xi, eta], w) in rule.points.iter().zip(&rule.weights) {
                    let j = map.jacobian(*xi, *eta);
                    let det = j.determinant();
                    jxw.push(det.abs() * w);
                    // inverse transpose of [[a, b], [c, d]] is [[d, -c], [-b, a]] / det
                    inv_jt.push(
                        Matrix2::new(j[(1, 1)], -j[(1, 0)], -j[(0, 1)], j[(0, 0)]) / det,
                    );
                }
                (jxw, inv_jt)
            })
            .collect();

        let mut jxw = Vec::with_capacity(mesh.num_elements() * nq);
        let mut inv_jt = Vec::with_capacity(mesh.num_elements() * nq);
        for (w, m) in per_element {
            jxw.extend(w);
            inv_jt.extend(m);
        }

        Self { rule, jxw, inv_jt }
    }

    pub fn rule(&self) -> &QuadRule {
        &self.rule
    }

    pub fn num_points(&self) -> usize {
        self.rule.len()
    }

    pub fn jxw(&self, e: usize, q: usize) -> f64 {
        self.jxw[e * self.rule.len() + q]
    }

    pub fn inv_jt(&self, e: usize, q: usize) -> Matrix2<f64> {
        self.inv_jt[e * self.rule.len() + q]
    }

    /// Physical gradients of every basis function of `table` at point `q`.
    pub fn physical_grads(
        &self,
        table: &BasisTable,
        e: usize,
        q: usize,
        out: &mut [Vector2<f64>],
    ) {
        let m = self.inv_jt(e, q);
        for (g, r) in out.iter_mut().zip(table.ref_grads(q)) {
            *g = m * r;
        }
    }

    /// Physical location of quadrature point `q` in element `e`.
    pub fn point(&self, mesh: &Mesh, e: usize, q: usize) -> Point2<f64> {
        let [xi, eta] = self.rule.points[q];
        QuadMap::new(mesh.element_points(e)).map(xi, eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::{BoundaryFacet, Element, Mesh};
    use approx::assert_abs_diff_eq;

    fn skewed_quad() -> Mesh {
        Mesh::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.2),
                Point2::new(2.3, 1.4),
                Point2::new(-0.1, 1.0),
            ],
            vec![Element {
                attribute: 1,
                vertices: [0, 1, 2, 3],
            }],
            vec![BoundaryFacet {
                attribute: 4,
                vertices: [0, 1],
            }],
        )
        .expect("valid quad")
    }

    #[test]
    fn test_weights_sum_to_area() {
        let mesh = skewed_quad();
        let quad = ElementQuadrature::new(&mesh, 3);
        let area: f64 = (0..quad.num_points()).map(|q| quad.jxw(0, q)).sum();
        // shoelace formula
        let p = mesh.element_points(0);
        let mut shoelace = 0.0;
        for i in 0..4 {
            let a = p[i];
            let b = p[(i + 1) % 4];
            shoelace += a.x * b.y - b.x * a.y;
        }
        assert_abs_diff_eq!(area, 0.5 * shoelace, epsilon = 1e-12);
    }

    #[test]
    fn test_physical_gradient_of_linear_field() {
        // f(x, y) = 3x - 2y interpolated on Q2 is exact, so its gradient is too
        let mesh = skewed_quad();
        let basis = TensorBasis::new(2);
        let quad = ElementQuadrature::new(&mesh, 3);
        let table = BasisTable::new(&basis, quad.rule());
        let map = QuadMap::new(mesh.element_points(0));

        let mut coeffs = vec![0.0; basis.num_basis()];
        for b in 0..3 {
            for a in 0..3 {
                let [xi, eta] = basis.node(a, b);
                let p = map.map(xi, eta);
                coeffs[basis.local_index(a, b)] = 3.0 * p.x - 2.0 * p.y;
            }
        }

        let mut grads = vec![Vector2::zeros(); basis.num_basis()];
        for q in 0..quad.num_points() {
            quad.physical_grads(&table, 0, q, &mut grads);
            let g: Vector2<f64> = grads.iter().zip(&coeffs).map(|(g, c)| g * *c).sum();
            assert_abs_diff_eq!(g.x, 3.0, epsilon = 1e-11);
            assert_abs_diff_eq!(g.y, -2.0, epsilon = 1e-11);
        }
    }
}
