use super::structs::{attributes, BoundaryFacet, Element, Mesh};
use crate::solver::error::MeshError;
use nalgebra::Point2;

/// Bundles the boundary attribute of each side for the structured generators.
#[derive(Clone, Copy, Debug)]
pub struct BoundarySides {
    pub left: i32,
    pub right: i32,
    pub bottom: i32,
    pub top: i32,
}

impl BoundarySides {
    /// Inlet on the left, outlet on the right, walls top and bottom.
    pub fn channel() -> Self {
        Self {
            left: attributes::INLET,
            right: attributes::OUTLET,
            bottom: attributes::WALLS,
            top: attributes::WALLS,
        }
    }

    /// Closed box whose top side is the prescribed-velocity lid.
    pub fn cavity() -> Self {
        Self {
            left: attributes::WALLS,
            right: attributes::WALLS,
            bottom: attributes::WALLS,
            top: attributes::INLET,
        }
    }
}

pub fn generate_structured_rect_mesh(
    nx: usize,
    ny: usize,
    length: f64,
    height: f64,
    boundaries: BoundarySides,
) -> Result<Mesh, MeshError> {
    generate_grid(nx, ny, length, height, boundaries, |_| true)
}

/// Channel `[0, length] x [0, height]` with the grid cells whose centre lies
/// inside the circle removed. Edges exposed by the removal are tagged as the
/// cylinder wall.
pub fn generate_channel_with_obstacle(
    nx: usize,
    ny: usize,
    length: f64,
    height: f64,
    center: Point2<f64>,
    radius: f64,
) -> Result<Mesh, MeshError> {
    generate_grid(nx, ny, length, height, BoundarySides::channel(), |c| {
        (c - center).norm() > radius
    })
}

fn generate_grid<F>(
    nx: usize,
    ny: usize,
    length: f64,
    height: f64,
    sides: BoundarySides,
    keep_cell: F,
) -> Result<Mesh, MeshError>
where
    F: Fn(Point2<f64>) -> bool,
{
    assert!(nx > 0 && ny > 0, "grid needs at least one cell per direction");
    assert!(length > 0.0 && height > 0.0, "domain extent must be positive");

    let dx = length / nx as f64;
    let dy = height / ny as f64;
    let vid = |i: usize, j: usize| j * (nx + 1) + i;

    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push(Point2::new(i as f64 * dx, j as f64 * dy));
        }
    }

    let mut kept = vec![false; nx * ny];
    for j in 0..ny {
        for i in 0..nx {
            let center = Point2::new((i as f64 + 0.5) * dx, (j as f64 + 0.5) * dy);
            kept[j * nx + i] = keep_cell(center);
        }
    }
    let is_kept = |i: isize, j: isize| -> Option<bool> {
        if i < 0 || j < 0 || i >= nx as isize || j >= ny as isize {
            None
        } else {
            Some(kept[j as usize * nx + i as usize])
        }
    };

    let mut elements = Vec::new();
    let mut boundary = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            if !kept[j * nx + i] {
                continue;
            }
            let v = [vid(i, j), vid(i + 1, j), vid(i + 1, j + 1), vid(i, j + 1)];
            elements.push(Element {
                attribute: 1,
                vertices: v,
            });

            // Counter-clockwise edges with the neighbour across each of them.
            let (ii, jj) = (i as isize, j as isize);
            let edges = [
                ([v[0], v[1]], is_kept(ii, jj - 1), sides.bottom),
                ([v[1], v[2]], is_kept(ii + 1, jj), sides.right),
                ([v[2], v[3]], is_kept(ii, jj + 1), sides.top),
                ([v[3], v[0]], is_kept(ii - 1, jj), sides.left),
            ];
            for (pair, neighbour, side_attr) in edges {
                let attribute = match neighbour {
                    None => side_attr,
                    Some(false) => attributes::CYLINDER,
                    Some(true) => continue,
                };
                boundary.push(BoundaryFacet {
                    attribute,
                    vertices: pair,
                });
            }
        }
    }

    Mesh::new(vertices, elements, boundary)
}
