use crate::solver::assembly::Discretization;
use crate::solver::error::ConfigError;
use crate::solver::linear_solver::SparseMatrix;
use crate::solver::mesh::attributes;
use crate::solver::options::PressureReference;
use nalgebra::{Point2, Vector2};
use std::collections::BTreeMap;

/// What a boundary attribute means for the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryRole {
    /// Cylinder surface and channel walls.
    NoSlip,
    Inflow,
    /// Natural condition for velocity; carries the pressure reference.
    Outflow,
}

impl BoundaryRole {
    pub fn from_attribute(attribute: i32) -> Option<Self> {
        match attribute {
            attributes::CYLINDER | attributes::WALLS => Some(Self::NoSlip),
            attributes::INLET => Some(Self::Inflow),
            attributes::OUTLET => Some(Self::Outflow),
            _ => None,
        }
    }
}

/// Prescribed velocity on an essential boundary. Time independent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryValue {
    Zero,
    Uniform(Vector2<f64>),
}

impl BoundaryValue {
    pub fn at(&self, _point: Point2<f64>) -> Vector2<f64> {
        match self {
            Self::Zero => Vector2::zeros(),
            Self::Uniform(v) => *v,
        }
    }
}

/// Sorted essential DOFs of one field with their prescribed values.
#[derive(Clone, Debug)]
pub struct EssentialDofs {
    dofs: Vec<usize>,
    values: Vec<f64>,
    mask: Vec<bool>,
}

impl EssentialDofs {
    pub fn new(n_dofs: usize, prescribed: BTreeMap<usize, f64>) -> Self {
        let mut mask = vec![false; n_dofs];
        let mut dofs = Vec::with_capacity(prescribed.len());
        let mut values = Vec::with_capacity(prescribed.len());
        for (d, v) in prescribed {
            mask[d] = true;
            dofs.push(d);
            values.push(v);
        }
        Self { dofs, values, mask }
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn is_essential(&self, dof: usize) -> bool {
        self.mask[dof]
    }

    /// Overwrites the essential entries of `x` with their prescribed values.
    pub fn apply(&self, x: &mut [f64]) {
        for (&d, &v) in self.dofs.iter().zip(&self.values) {
            x[d] = v;
        }
    }

    /// Full-length vector holding the prescribed values, zero elsewhere.
    pub fn lifted(&self) -> Vec<f64> {
        let mut x = vec![0.0; self.mask.len()];
        self.apply(&mut x);
        x
    }
}

#[derive(Clone, Debug)]
pub struct BoundaryConditions {
    pub velocity: EssentialDofs,
    pub pressure: EssentialDofs,
}

impl BoundaryConditions {
    pub fn build(
        disc: &Discretization,
        inflow: Vector2<f64>,
        reference: PressureReference,
    ) -> Result<Self, ConfigError> {
        let mesh = &disc.mesh;
        for (&attribute, &facets) in &mesh.boundary_attributes() {
            if BoundaryRole::from_attribute(attribute).is_none() {
                return Err(ConfigError::UnknownBoundaryAttribute { attribute, facets });
            }
        }

        let space = &disc.velocity;
        let coords = space.dof_coords();
        let mut prescribed: BTreeMap<usize, BoundaryValue> = BTreeMap::new();
        // no-slip is written last so it wins at inlet corners
        for (attrs, value) in [
            (&[attributes::INLET][..], BoundaryValue::Uniform(inflow)),
            (&[attributes::CYLINDER, attributes::WALLS][..], BoundaryValue::Zero),
        ] {
            for dof in space.boundary_dofs(mesh, attrs) {
                prescribed.insert(dof, value);
            }
        }

        let ns = space.num_scalar_dofs();
        let mut velocity = BTreeMap::new();
        for (&s, value) in &prescribed {
            let v = value.at(coords[s]);
            velocity.insert(space.vector_dof(0, s), v.x);
            velocity.insert(space.vector_dof(1, s), v.y);
        }
        let velocity = EssentialDofs::new(2 * ns, velocity);

        let pressure_dofs: Vec<usize> = match reference {
            PressureReference::Outlet => {
                let dofs = disc.pressure.boundary_dofs(mesh, &[attributes::OUTLET]);
                if dofs.is_empty() {
                    return Err(ConfigError::MissingPressureReference);
                }
                dofs
            }
            PressureReference::Point { x, y } => {
                vec![disc.pressure.nearest_dof(Point2::new(x, y))]
            }
        };
        let pressure = EssentialDofs::new(
            disc.pressure.num_dofs(),
            pressure_dofs.into_iter().map(|d| (d, 0.0)).collect(),
        );

        log::info!(
            "Essential DOFs: {} velocity, {} pressure",
            velocity.len(),
            pressure.len()
        );
        Ok(Self { velocity, pressure })
    }
}

/// Operator with essential rows and columns replaced by the identity.
///
/// The removed columns are kept in `coupling` (free rows by essential
/// columns); since boundary values never change, their contribution to the
/// right-hand side is computed once.
#[derive(Clone, Debug)]
pub struct EliminatedOperator {
    pub matrix: SparseMatrix,
    pub coupling: SparseMatrix,
    lift: Vec<f64>,
}

impl EliminatedOperator {
    pub fn new(a: &SparseMatrix, essential: &EssentialDofs) -> Self {
        assert_eq!(a.n_rows, a.n_cols);
        let mask = essential.mask();
        let n = a.n_rows;
        let mut matrix = SparseMatrix::new(n, n);
        let mut coupling = SparseMatrix::new(n, n);

        for i in 0..n {
            if mask[i] {
                matrix.col_indices.push(i);
                matrix.values.push(1.0);
            } else {
                let (cols, vals) = a.row(i);
                for (&j, &v) in cols.iter().zip(vals) {
                    if mask[j] {
                        coupling.col_indices.push(j);
                        coupling.values.push(v);
                    } else {
                        matrix.col_indices.push(j);
                        matrix.values.push(v);
                    }
                }
            }
            matrix.row_offsets[i + 1] = matrix.values.len();
            coupling.row_offsets[i + 1] = coupling.values.len();
        }

        let mut lift = vec![0.0; n];
        coupling.mat_vec_mul(&essential.lifted(), &mut lift);

        Self {
            matrix,
            coupling,
            lift,
        }
    }

    /// `b_free -= A_fe x_e`, `b_e = x_e`.
    pub fn apply_rhs(&self, essential: &EssentialDofs, b: &mut [f64]) {
        for (bi, li) in b.iter_mut().zip(&self.lift) {
            *bi -= li;
        }
        essential.apply(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::linear_solver::CgSolver;
    use crate::solver::mesh::{generate_structured_rect_mesh, BoundarySides};
    use crate::solver::options::LinearSolverOptions;

    #[test]
    fn test_no_slip_wins_at_inlet_corners() {
        let mesh = generate_structured_rect_mesh(4, 2, 2.0, 1.0, BoundarySides::channel())
            .expect("mesh");
        let disc = Discretization::new(mesh, 2).expect("discretization");
        let bcs = BoundaryConditions::build(&disc, Vector2::new(1.0, 0.0), PressureReference::Outlet)
            .expect("valid boundary setup");

        let coords = disc.velocity.dof_coords();
        let ns = disc.velocity.num_scalar_dofs();
        for (&d, &v) in bcs.velocity.dofs().iter().zip(bcs.velocity.values()) {
            if d >= ns {
                assert_eq!(v, 0.0);
                continue;
            }
            let p = coords[d];
            let on_wall = p.y.abs() < 1e-12 || (p.y - 1.0).abs() < 1e-12;
            let on_inlet = p.x.abs() < 1e-12;
            if on_wall {
                assert_eq!(v, 0.0, "wall dof at {:?}", p);
            } else if on_inlet {
                assert_eq!(v, 1.0, "inlet dof at {:?}", p);
            }
        }
        // outlet pressure DOFs of Q1 on the right edge
        assert_eq!(bcs.pressure.len(), 3);
    }

    #[test]
    fn test_unknown_attribute_and_missing_outlet() {
        let sides = BoundarySides {
            right: 7,
            ..BoundarySides::channel()
        };
        let mesh = generate_structured_rect_mesh(2, 2, 1.0, 1.0, sides).expect("mesh");
        let disc = Discretization::new(mesh, 2).expect("discretization");
        assert!(matches!(
            BoundaryConditions::build(&disc, Vector2::zeros(), PressureReference::Outlet),
            Err(ConfigError::UnknownBoundaryAttribute { attribute: 7, facets: 2 })
        ));

        let mesh = generate_structured_rect_mesh(2, 2, 1.0, 1.0, BoundarySides::cavity())
            .expect("mesh");
        let disc = Discretization::new(mesh, 2).expect("discretization");
        assert!(matches!(
            BoundaryConditions::build(&disc, Vector2::zeros(), PressureReference::Outlet),
            Err(ConfigError::MissingPressureReference)
        ));
        let bcs = BoundaryConditions::build(
            &disc,
            Vector2::zeros(),
            PressureReference::Point { x: 0.5, y: 0.5 },
        )
        .expect("pinned pressure");
        assert_eq!(bcs.pressure.len(), 1);
    }

    #[test]
    fn test_elimination_reproduces_prescribed_values() {
        // 1D Laplacian with x(0) = 1, x(n-1) = 3: solution is linear
        let n = 9;
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 2.0));
            if i > 0 {
                t.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                t.push((i, i + 1, -1.0));
            }
        }
        let a = SparseMatrix::from_triplets(n, n, &t);
        let ess = EssentialDofs::new(n, [(0, 1.0), (n - 1, 3.0)].into_iter().collect());
        let elim = EliminatedOperator::new(&a, &ess);
        assert!(elim.matrix.max_asymmetry() == 0.0);
        assert_eq!(elim.coupling.nnz(), 2);

        let mut b = vec![0.0; n];
        elim.apply_rhs(&ess, &mut b);
        let mut x = vec![0.0; n];
        let mut solver = CgSolver::new("test", elim.matrix.clone(), LinearSolverOptions::default());
        solver.solve(&b, &mut x).expect("no breakdown");
        for (i, xi) in x.iter().enumerate() {
            let expected = 1.0 + 2.0 * i as f64 / (n - 1) as f64;
            assert!((xi - expected).abs() < 1e-8, "x[{}] = {}", i, xi);
        }
    }
}
