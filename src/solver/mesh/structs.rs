use crate::solver::error::MeshError;
use nalgebra::Point2;
use std::collections::{BTreeMap, HashMap};

/// Geometry code of a boundary segment in the mesh file.
pub const GEOMETRY_SEGMENT: i32 = 1;
/// Geometry code of a quadrilateral element in the mesh file.
pub const GEOMETRY_SQUARE: i32 = 3;

/// Boundary attribute tags shared with the mesh generator.
pub mod attributes {
    pub const CYLINDER: i32 = 1;
    pub const INLET: i32 = 2;
    pub const OUTLET: i32 = 3;
    pub const WALLS: i32 = 4;
}

/// Local edges of a quadrilateral, counter-clockwise starting at vertex 0.
pub const QUAD_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Element {
    pub attribute: i32,
    pub vertices: [usize; 4],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryFacet {
    pub attribute: i32,
    pub vertices: [usize; 2],
}

/// The element owning a boundary facet and which of its local edges it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FacetParent {
    pub element: usize,
    pub local_edge: usize,
}

#[derive(Clone, Debug)]
pub struct MeshStats {
    pub vertices: usize,
    pub elements: usize,
    pub edges: usize,
    pub boundary_facets: usize,
    pub facets_per_attribute: BTreeMap<i32, usize>,
    pub min_edge_length: f64,
    pub max_edge_length: f64,
}

/// Immutable quadrilateral mesh with derived edge topology.
///
/// Construction validates the connectivity; a `Mesh` that exists is safe to
/// build function spaces on.
#[derive(Clone, Debug)]
pub struct Mesh {
    vx: Vec<f64>,
    vy: Vec<f64>,
    elements: Vec<Element>,
    boundary: Vec<BoundaryFacet>,

    // Edges are stored with ascending vertex indices.
    edge_vertices: Vec<[usize; 2]>,
    element_edges: Vec<[usize; 4]>,
    facet_edge: Vec<usize>,
    facet_parent: Vec<FacetParent>,
}

impl Mesh {
    pub fn new(
        vertices: Vec<Point2<f64>>,
        elements: Vec<Element>,
        boundary: Vec<BoundaryFacet>,
    ) -> Result<Self, MeshError> {
        if elements.is_empty() {
            return Err(MeshError::Empty);
        }
        let n_vertices = vertices.len();

        for (entry, element) in elements.iter().enumerate() {
            for &index in &element.vertices {
                if index >= n_vertices {
                    return Err(MeshError::VertexOutOfRange {
                        section: "elements",
                        entry,
                        index,
                        count: n_vertices,
                    });
                }
            }
            let v = element.vertices;
            for a in 0..4 {
                for b in (a + 1)..4 {
                    if v[a] == v[b] {
                        return Err(MeshError::DegenerateElement {
                            element: entry,
                            vertices: v,
                        });
                    }
                }
            }
        }
        for (entry, facet) in boundary.iter().enumerate() {
            for &index in &facet.vertices {
                if index >= n_vertices {
                    return Err(MeshError::VertexOutOfRange {
                        section: "boundary",
                        entry,
                        index,
                        count: n_vertices,
                    });
                }
            }
        }

        for (e, element) in elements.iter().enumerate() {
            let det = min_corner_jacobian(&vertices, &element.vertices);
            if !(det > 0.0) {
                return Err(MeshError::InvertedElement { element: e, det });
            }
        }

        // Edge topology
        let mut edge_lookup: HashMap<[usize; 2], usize> = HashMap::new();
        let mut edge_vertices = Vec::new();
        let mut edge_owner: Vec<FacetParent> = Vec::new();
        let mut element_edges = Vec::with_capacity(elements.len());
        for (e, element) in elements.iter().enumerate() {
            let mut local = [0usize; 4];
            for (k, [a, b]) in QUAD_EDGES.iter().enumerate() {
                let key = sorted_pair(element.vertices[*a], element.vertices[*b]);
                let id = *edge_lookup.entry(key).or_insert_with(|| {
                    edge_vertices.push(key);
                    edge_owner.push(FacetParent {
                        element: e,
                        local_edge: k,
                    });
                    edge_vertices.len() - 1
                });
                local[k] = id;
            }
            element_edges.push(local);
        }

        let mut facet_edge = Vec::with_capacity(boundary.len());
        let mut facet_parent = Vec::with_capacity(boundary.len());
        for (f, facet) in boundary.iter().enumerate() {
            let [v0, v1] = facet.vertices;
            let Some(&edge) = edge_lookup.get(&sorted_pair(v0, v1)) else {
                return Err(MeshError::OrphanFacet { facet: f, v0, v1 });
            };
            facet_edge.push(edge);
            facet_parent.push(edge_owner[edge]);
        }

        let (vx, vy) = vertices.iter().map(|p| (p.x, p.y)).unzip();

        Ok(Self {
            vx,
            vy,
            elements,
            boundary,
            edge_vertices,
            element_edges,
            facet_edge,
            facet_parent,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vx.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_vertices.len()
    }

    pub fn num_boundary_facets(&self) -> usize {
        self.boundary.len()
    }

    pub fn vertex(&self, i: usize) -> Point2<f64> {
        Point2::new(self.vx[i], self.vy[i])
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn boundary(&self) -> &[BoundaryFacet] {
        &self.boundary
    }

    pub fn element_points(&self, e: usize) -> [Point2<f64>; 4] {
        let v = self.elements[e].vertices;
        [
            self.vertex(v[0]),
            self.vertex(v[1]),
            self.vertex(v[2]),
            self.vertex(v[3]),
        ]
    }

    pub fn edge_vertices(&self, edge: usize) -> [usize; 2] {
        self.edge_vertices[edge]
    }

    pub fn element_edges(&self, e: usize) -> [usize; 4] {
        self.element_edges[e]
    }

    pub fn facet_edge(&self, facet: usize) -> usize {
        self.facet_edge[facet]
    }

    pub fn facet_parent(&self, facet: usize) -> FacetParent {
        self.facet_parent[facet]
    }

    /// Number of boundary facets carrying each attribute.
    pub fn boundary_attributes(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for facet in &self.boundary {
            *counts.entry(facet.attribute).or_insert(0) += 1;
        }
        counts
    }

    pub fn edge_length(&self, edge: usize) -> f64 {
        let [a, b] = self.edge_vertices[edge];
        (self.vertex(b) - self.vertex(a)).norm()
    }

    pub fn min_edge_length(&self) -> f64 {
        (0..self.num_edges())
            .map(|e| self.edge_length(e))
            .fold(f64::INFINITY, f64::min)
    }

    /// One level of uniform refinement: every quad splits into four through
    /// its edge midpoints and centre, every boundary facet into two halves
    /// with the same attribute. Edges stay straight.
    pub fn refine_uniform(&self) -> Result<Mesh, MeshError> {
        let nv = self.num_vertices();
        let n_edges = self.num_edges();
        let mut vertices = Vec::with_capacity(nv + n_edges + self.num_elements());
        vertices.extend((0..nv).map(|i| self.vertex(i)));
        for [a, b] in &self.edge_vertices {
            vertices.push(Point2::from(
                (self.vertex(*a).coords + self.vertex(*b).coords) * 0.5,
            ));
        }
        for e in 0..self.num_elements() {
            let [p0, p1, p2, p3] = self.element_points(e);
            vertices.push(Point2::from((p0.coords + p1.coords + p2.coords + p3.coords) * 0.25));
        }

        let mut elements = Vec::with_capacity(4 * self.num_elements());
        for (e, element) in self.elements.iter().enumerate() {
            let [v0, v1, v2, v3] = element.vertices;
            let [m0, m1, m2, m3] = self.element_edges[e].map(|edge| nv + edge);
            let c = nv + n_edges + e;
            for quad in [[v0, m0, c, m3], [m0, v1, m1, c], [c, m1, v2, m2], [m3, c, m2, v3]] {
                elements.push(Element {
                    attribute: element.attribute,
                    vertices: quad,
                });
            }
        }

        let mut boundary = Vec::with_capacity(2 * self.num_boundary_facets());
        for (f, facet) in self.boundary.iter().enumerate() {
            let [a, b] = facet.vertices;
            let m = nv + self.facet_edge[f];
            for half in [[a, m], [m, b]] {
                boundary.push(BoundaryFacet {
                    attribute: facet.attribute,
                    vertices: half,
                });
            }
        }

        Mesh::new(vertices, elements, boundary)
    }

    pub fn stats(&self) -> MeshStats {
        let max_edge_length = (0..self.num_edges())
            .map(|e| self.edge_length(e))
            .fold(0.0, f64::max);
        MeshStats {
            vertices: self.num_vertices(),
            elements: self.num_elements(),
            edges: self.num_edges(),
            boundary_facets: self.num_boundary_facets(),
            facets_per_attribute: self.boundary_attributes(),
            min_edge_length: self.min_edge_length(),
            max_edge_length,
        }
    }
}

pub(crate) fn sorted_pair(a: usize, b: usize) -> [usize; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

/// Smallest determinant of the bilinear map over the four corners.
fn min_corner_jacobian(vertices: &[Point2<f64>], quad: &[usize; 4]) -> f64 {
    let mut min_det = f64::INFINITY;
    for k in 0..4 {
        let p = vertices[quad[k]];
        let next = vertices[quad[(k + 1) % 4]];
        let prev = vertices[quad[(k + 3) % 4]];
        let a = next - p;
        let b = prev - p;
        min_det = min_det.min(a.x * b.y - a.y * b.x);
    }
    min_det
}
