/// Gauss-Legendre rule on `[0, 1]` with `n` points (exact to degree `2n - 1`).
#[derive(Clone, Debug)]
pub struct GaussLegendre {
    pub points: Vec<f64>,
    pub weights: Vec<f64>,
}

impl GaussLegendre {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "quadrature needs at least one point");
        let mut points = vec![0.0; n];
        let mut weights = vec![0.0; n];

        // Newton iteration on P_n from the Chebyshev guess; roots come in
        // symmetric pairs on [-1, 1].
        let m = n.div_ceil(2);
        for i in 0..m {
            let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, d) = legendre(n, x);
                let dx = p / d;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre(n, x);
            let w = 2.0 / ((1.0 - x * x) * dp * dp);

            // map from [-1, 1] to [0, 1]
            points[i] = 0.5 * (1.0 - x);
            points[n - 1 - i] = 0.5 * (1.0 + x);
            weights[i] = 0.5 * w;
            weights[n - 1 - i] = 0.5 * w;
        }

        Self { points, weights }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Value and derivative of the Legendre polynomial `P_n` at `x`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Tensor-product rule on the unit square, points ordered with `x` fastest.
#[derive(Clone, Debug)]
pub struct QuadRule {
    pub points: Vec<[f64; 2]>,
    pub weights: Vec<f64>,
}

impl QuadRule {
    pub fn tensor(n: usize) -> Self {
        let line = GaussLegendre::new(n);
        let mut points = Vec::with_capacity(n * n);
        let mut weights = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                points.push([line.points[i], line.points[j]]);
                weights.push(line.weights[i] * line.weights[j]);
            }
        }
        Self { points, weights }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
