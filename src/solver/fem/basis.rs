use nalgebra::{Matrix2, Point2, Vector2};

/// 1D Lagrange polynomials on equispaced nodes of `[0, 1]`.
#[derive(Clone, Debug)]
pub struct Lagrange1d {
    nodes: Vec<f64>,
}

impl Lagrange1d {
    pub fn new(order: usize) -> Self {
        assert!(order >= 1, "Lagrange basis needs order >= 1");
        let nodes = (0..=order).map(|a| a as f64 / order as f64).collect();
        Self { nodes }
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn eval(&self, x: f64, values: &mut [f64], derivs: &mut [f64]) {
        let n = self.nodes.len();
        for a in 0..n {
            let xa = self.nodes[a];
            let mut value = 1.0;
            let mut deriv = 0.0;
            for b in 0..n {
                if b == a {
                    continue;
                }
                let denom = xa - self.nodes[b];
                // product rule, accumulated left to right
                deriv = deriv * (x - self.nodes[b]) / denom + value / denom;
                value *= (x - self.nodes[b]) / denom;
            }
            values[a] = value;
            derivs[a] = deriv;
        }
    }
}

/// Tensor-product Lagrange basis Q_k on the unit square.
///
/// Local function `a + (k + 1) * b` is the product of the `a`-th 1D function
/// in `xi` and the `b`-th in `eta`.
#[derive(Clone, Debug)]
pub struct TensorBasis {
    order: usize,
    line: Lagrange1d,
}

impl TensorBasis {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            line: Lagrange1d::new(order),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_basis(&self) -> usize {
        (self.order + 1) * (self.order + 1)
    }

    pub fn local_index(&self, a: usize, b: usize) -> usize {
        a + (self.order + 1) * b
    }

    /// Reference coordinates of local node `(a, b)`.
    pub fn node(&self, a: usize, b: usize) -> [f64; 2] {
        [self.line.nodes()[a], self.line.nodes()[b]]
    }

    /// Basis values and reference-space gradients at `(xi, eta)`.
    pub fn eval(&self, xi: f64, eta: f64, values: &mut [f64], grads: &mut [Vector2<f64>]) {
        let n1 = self.order + 1;
        let mut vx = vec![0.0; n1];
        let mut dx = vec![0.0; n1];
        let mut vy = vec![0.0; n1];
        let mut dy = vec![0.0; n1];
        self.line.eval(xi, &mut vx, &mut dx);
        self.line.eval(eta, &mut vy, &mut dy);
        for b in 0..n1 {
            for a in 0..n1 {
                let i = a + n1 * b;
                values[i] = vx[a] * vy[b];
                grads[i] = Vector2::new(dx[a] * vy[b], vx[a] * dy[b]);
            }
        }
    }
}

/// Bilinear map from the unit square onto a quadrilateral.
#[derive(Clone, Copy, Debug)]
pub struct QuadMap {
    corners: [Point2<f64>; 4],
}

impl QuadMap {
    pub fn new(corners: [Point2<f64>; 4]) -> Self {
        Self { corners }
    }

    pub fn map(&self, xi: f64, eta: f64) -> Point2<f64> {
        let [p0, p1, p2, p3] = self.corners;
        let c = p0.coords * ((1.0 - xi) * (1.0 - eta))
            + p1.coords * (xi * (1.0 - eta))
            + p2.coords * (xi * eta)
            + p3.coords * ((1.0 - xi) * eta);
        Point2::from(c)
    }

    /// Columns are `dx/dxi` and `dx/deta`.
    pub fn jacobian(&self, xi: f64, eta: f64) -> Matrix2<f64> {
        let [p0, p1, p2, p3] = self.corners;
        let d_xi = (p1 - p0) * (1.0 - eta) + (p2 - p3) * eta;
        let d_eta = (p3 - p0) * (1.0 - xi) + (p2 - p1) * xi;
        Matrix2::from_columns(&[d_xi, d_eta])
    }
}
