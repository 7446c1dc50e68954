use super::basis::{QuadMap, TensorBasis};
use crate::solver::mesh::{Mesh, QUAD_EDGES};
use nalgebra::{Point2, Vector2};

/// Continuous Lagrange space of degree `order` over a quadrilateral mesh.
///
/// Scalar DOFs are numbered vertices first (in order of first use by an
/// element), then `order - 1` nodes per edge running from the lower to the
/// higher global vertex index, then `(order - 1)^2` interior nodes per
/// element. A vector space stores all x-components, then all y-components.
#[derive(Clone, Debug)]
pub struct FunctionSpace {
    order: usize,
    components: usize,
    n_scalar: usize,
    basis: TensorBasis,
    element_dofs: Vec<usize>,
    dof_coords: Vec<Point2<f64>>,
    facet_dofs: Vec<Vec<usize>>,
}

impl FunctionSpace {
    pub fn new(mesh: &Mesh, order: usize, components: usize) -> Self {
        assert!(order >= 1, "H1 space needs order >= 1");
        assert!(components == 1 || components == 2);

        let k = order;
        let basis = TensorBasis::new(k);
        let nb = basis.num_basis();

        let mut vertex_dof = vec![usize::MAX; mesh.num_vertices()];
        let mut n_vertex_dofs = 0;
        for element in mesh.elements() {
            for &v in &element.vertices {
                if vertex_dof[v] == usize::MAX {
                    vertex_dof[v] = n_vertex_dofs;
                    n_vertex_dofs += 1;
                }
            }
        }
        let edge_base = n_vertex_dofs;
        let interior_base = edge_base + mesh.num_edges() * (k - 1);
        let n_scalar = interior_base + mesh.num_elements() * (k - 1) * (k - 1);

        let mut element_dofs = vec![0usize; mesh.num_elements() * nb];
        let mut dof_coords = vec![Point2::origin(); n_scalar];

        for (e, element) in mesh.elements().iter().enumerate() {
            let edges = mesh.element_edges(e);
            let map = QuadMap::new(mesh.element_points(e));
            let dofs = &mut element_dofs[e * nb..(e + 1) * nb];

            for b in 0..=k {
                for a in 0..=k {
                    let global = match node_entity(k, a, b) {
                        NodeEntity::Corner(c) => vertex_dof[element.vertices[c]],
                        NodeEntity::Edge(le, m) => {
                            let [lo, _] = mesh.edge_vertices(edges[le]);
                            let start = element.vertices[QUAD_EDGES[le][0]];
                            let offset = if start == lo { m - 1 } else { k - m - 1 };
                            edge_base + edges[le] * (k - 1) + offset
                        }
                        NodeEntity::Interior => {
                            interior_base + e * (k - 1) * (k - 1) + (a - 1) + (k - 1) * (b - 1)
                        }
                    };
                    dofs[basis.local_index(a, b)] = global;
                    let [xi, eta] = basis.node(a, b);
                    dof_coords[global] = map.map(xi, eta);
                }
            }
        }

        let facet_dofs = (0..mesh.num_boundary_facets())
            .map(|f| {
                let parent = mesh.facet_parent(f);
                let dofs = &element_dofs[parent.element * nb..(parent.element + 1) * nb];
                edge_local_nodes(k, parent.local_edge)
                    .into_iter()
                    .map(|(a, b)| dofs[basis.local_index(a, b)])
                    .collect()
            })
            .collect();

        Self {
            order,
            components,
            n_scalar,
            basis,
            element_dofs,
            dof_coords,
            facet_dofs,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn basis(&self) -> &TensorBasis {
        &self.basis
    }

    pub fn num_scalar_dofs(&self) -> usize {
        self.n_scalar
    }

    pub fn num_dofs(&self) -> usize {
        self.n_scalar * self.components
    }

    /// Scalar DOFs of element `e` in local basis order.
    pub fn element_dofs(&self, e: usize) -> &[usize] {
        let nb = self.basis.num_basis();
        &self.element_dofs[e * nb..(e + 1) * nb]
    }

    pub fn dof_coords(&self) -> &[Point2<f64>] {
        &self.dof_coords
    }

    /// Scalar DOFs lying on boundary facet `f`.
    pub fn facet_dofs(&self, f: usize) -> &[usize] {
        &self.facet_dofs[f]
    }

    pub fn vector_dof(&self, component: usize, scalar_dof: usize) -> usize {
        component * self.n_scalar + scalar_dof
    }

    /// Sorted scalar DOFs on every facet carrying one of `attributes`.
    pub fn boundary_dofs(&self, mesh: &Mesh, attributes: &[i32]) -> Vec<usize> {
        let mut dofs: Vec<usize> = mesh
            .boundary()
            .iter()
            .enumerate()
            .filter(|(_, facet)| attributes.contains(&facet.attribute))
            .flat_map(|(f, _)| self.facet_dofs[f].iter().copied())
            .collect();
        dofs.sort_unstable();
        dofs.dedup();
        dofs
    }

    /// Nodal interpolant of a vector field (vector spaces only).
    pub fn interpolate_vector<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(Point2<f64>) -> Vector2<f64>,
    {
        assert_eq!(self.components, 2);
        let mut out = vec![0.0; self.num_dofs()];
        for (i, p) in self.dof_coords.iter().enumerate() {
            let v = f(*p);
            out[i] = v.x;
            out[self.n_scalar + i] = v.y;
        }
        out
    }

    /// Nodal interpolant of a scalar field (scalar spaces only).
    pub fn interpolate_scalar<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(Point2<f64>) -> f64,
    {
        assert_eq!(self.components, 1);
        self.dof_coords.iter().map(|p| f(*p)).collect()
    }

    /// Scalar DOF whose node is closest to `point`.
    pub fn nearest_dof(&self, point: Point2<f64>) -> usize {
        self.dof_coords
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - point).norm_squared()))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
            .0
    }
}

enum NodeEntity {
    Corner(usize),
    /// Local edge and the node's position along it, counted from the edge's
    /// start vertex (1..k-1).
    Edge(usize, usize),
    Interior,
}

fn node_entity(k: usize, a: usize, b: usize) -> NodeEntity {
    match (a, b) {
        (0, 0) => NodeEntity::Corner(0),
        (a, 0) if a == k => NodeEntity::Corner(1),
        (a, b) if a == k && b == k => NodeEntity::Corner(2),
        (0, b) if b == k => NodeEntity::Corner(3),
        (a, 0) => NodeEntity::Edge(0, a),
        (a, b) if a == k => NodeEntity::Edge(1, b),
        (a, b) if b == k => NodeEntity::Edge(2, k - a),
        (0, b) => NodeEntity::Edge(3, k - b),
        _ => NodeEntity::Interior,
    }
}

/// Local nodes `(a, b)` along a local edge, in the edge's direction.
pub fn edge_local_nodes(k: usize, local_edge: usize) -> Vec<(usize, usize)> {
    (0..=k)
        .map(|m| match local_edge {
            0 => (m, 0),
            1 => (k, m),
            2 => (k - m, k),
            _ => (0, k - m),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::{generate_structured_rect_mesh, BoundarySides};

    #[test]
    fn test_dof_counts_on_structured_mesh() {
        let mesh = generate_structured_rect_mesh(4, 3, 2.0, 1.5, BoundarySides::channel())
            .expect("mesh");
        let vel = FunctionSpace::new(&mesh, 2, 2);
        let pres = FunctionSpace::new(&mesh, 1, 1);
        // Q2 nodes form a (2*4+1) x (2*3+1) lattice
        assert_eq!(vel.num_scalar_dofs(), 9 * 7);
        assert_eq!(vel.num_dofs(), 2 * 9 * 7);
        assert_eq!(pres.num_dofs(), 5 * 4);
    }

    #[test]
    fn test_shared_edge_nodes_coincide() {
        let mesh = generate_structured_rect_mesh(3, 3, 1.0, 1.0, BoundarySides::cavity())
            .expect("mesh");
        let space = FunctionSpace::new(&mesh, 3, 1);
        // every node is a distinct point of the 10 x 10 lattice
        let mut pts: Vec<(i64, i64)> = space
            .dof_coords()
            .iter()
            .map(|p| ((p.x * 9.0).round() as i64, (p.y * 9.0).round() as i64))
            .collect();
        pts.sort_unstable();
        pts.dedup();
        assert_eq!(pts.len(), space.num_scalar_dofs());
        assert_eq!(pts.len(), 100);

        // element local nodes map to the coordinates stored for their dofs
        for e in 0..mesh.num_elements() {
            let map = QuadMap::new(mesh.element_points(e));
            for b in 0..=3 {
                for a in 0..=3 {
                    let [xi, eta] = space.basis().node(a, b);
                    let g = space.element_dofs(e)[space.basis().local_index(a, b)];
                    assert!((map.map(xi, eta) - space.dof_coords()[g]).norm() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_boundary_dofs_by_attribute() {
        let mesh = generate_structured_rect_mesh(4, 2, 2.0, 1.0, BoundarySides::channel())
            .expect("mesh");
        let space = FunctionSpace::new(&mesh, 2, 2);
        let outlet = space.boundary_dofs(&mesh, &[3]);
        assert_eq!(outlet.len(), 5);
        for &d in &outlet {
            assert!((space.dof_coords()[d].x - 2.0).abs() < 1e-12);
        }
    }
}
