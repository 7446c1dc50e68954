//! Reader and writer for the MFEM v1.0 text mesh format.
//!
//! Only the subset produced by the cylinder mesh generator is accepted:
//! quadrilateral elements, segment boundary facets, 2D vertices, with the
//! sections in the order `dimension`, `elements`, `boundary`, `vertices`.

use super::structs::{BoundaryFacet, Element, Mesh, GEOMETRY_SEGMENT, GEOMETRY_SQUARE};
use crate::solver::error::MeshError;
use nalgebra::Point2;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

const HEADER: &str = "MFEM mesh v1.0";
const SECTIONS: [&str; 4] = ["dimension", "elements", "boundary", "vertices"];

impl Mesh {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_mfem(&text)
    }
}

struct Cursor<'a> {
    lines: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, raw)| {
                let content = raw.split('#').next().unwrap_or("").trim();
                (i + 1, content)
            })
            .filter(|(_, content)| !content.is_empty())
            .collect();
        Self { lines, pos: 0 }
    }

    fn peek(&self) -> Option<(usize, &'a str)> {
        self.lines.get(self.pos).copied()
    }

    fn next(&mut self, section: &'static str) -> Result<(usize, &'a str), MeshError> {
        let line = self.peek().ok_or(MeshError::UnexpectedEof { section })?;
        self.pos += 1;
        Ok(line)
    }

    fn expect_section(&mut self, expected: &'static str) -> Result<(), MeshError> {
        let (line, content) = self.next(expected)?;
        if content != expected {
            return Err(MeshError::UnexpectedSection {
                line,
                expected,
                found: content.to_string(),
            });
        }
        Ok(())
    }

    /// Reads the entry lines of a section, checking them against the
    /// declared count.
    fn entries(
        &mut self,
        section: &'static str,
        declared: usize,
    ) -> Result<Vec<(usize, &'a str)>, MeshError> {
        let mut out = Vec::with_capacity(declared);
        while out.len() < declared {
            match self.peek() {
                Some((line, content)) if !is_keyword(content) => {
                    out.push((line, content));
                    self.pos += 1;
                }
                _ => {
                    return Err(MeshError::CountMismatch {
                        section,
                        declared,
                        found: out.len(),
                    })
                }
            }
        }
        let mut extra = 0;
        while let Some((_, content)) = self.lines.get(self.pos + extra).copied() {
            if is_keyword(content) {
                break;
            }
            extra += 1;
        }
        if extra > 0 {
            return Err(MeshError::CountMismatch {
                section,
                declared,
                found: declared + extra,
            });
        }
        Ok(out)
    }
}

fn is_keyword(content: &str) -> bool {
    content
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false)
}

fn parse_value<T: FromStr>(line: usize, token: &str, what: &str) -> Result<T, MeshError> {
    token.parse::<T>().map_err(|_| MeshError::Parse {
        line,
        message: format!("invalid {what} '{token}'"),
    })
}

fn parse_count(cursor: &mut Cursor<'_>, section: &'static str) -> Result<usize, MeshError> {
    let (line, content) = cursor.next(section)?;
    parse_value(line, content, "entry count")
}

/// Parses one connectivity line: `attribute geometry v0 v1 ...`.
fn parse_connectivity<const N: usize>(
    section: &'static str,
    entry: usize,
    line: usize,
    content: &str,
    geometry_code: i32,
) -> Result<(i32, [usize; N]), MeshError> {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(MeshError::Parse {
            line,
            message: format!("{section} entry {entry} is missing attribute or geometry"),
        });
    }
    let attribute: i32 = parse_value(line, tokens[0], "attribute")?;
    let geometry: i32 = parse_value(line, tokens[1], "geometry type")?;
    if geometry != geometry_code {
        return Err(MeshError::UnsupportedGeometry {
            section,
            entry,
            geometry,
        });
    }
    let indices = &tokens[2..];
    if indices.len() != N {
        return Err(MeshError::WrongVertexCount {
            section,
            entry,
            geometry,
            expected: N,
            found: indices.len(),
        });
    }
    let mut vertices = [0usize; N];
    for (slot, token) in vertices.iter_mut().zip(indices) {
        *slot = parse_value(line, token, "vertex index")?;
    }
    Ok((attribute, vertices))
}

pub fn parse_mfem(text: &str) -> Result<Mesh, MeshError> {
    let mut cursor = Cursor::new(text);

    let (line, header) = cursor.next("header")?;
    if header != HEADER {
        return Err(MeshError::MissingHeader {
            line,
            found: header.to_string(),
        });
    }

    cursor.expect_section(SECTIONS[0])?;
    let (line, content) = cursor.next("dimension")?;
    let dimension: usize = parse_value(line, content, "dimension")?;
    if dimension != 2 {
        return Err(MeshError::UnsupportedDimension(dimension));
    }

    cursor.expect_section(SECTIONS[1])?;
    let n_elements = parse_count(&mut cursor, "elements")?;
    let mut elements = Vec::with_capacity(n_elements);
    for (entry, (line, content)) in cursor.entries("elements", n_elements)?.into_iter().enumerate()
    {
        let (attribute, vertices) =
            parse_connectivity::<4>("elements", entry, line, content, GEOMETRY_SQUARE)?;
        elements.push(Element {
            attribute,
            vertices,
        });
    }

    cursor.expect_section(SECTIONS[2])?;
    let n_boundary = parse_count(&mut cursor, "boundary")?;
    let mut boundary = Vec::with_capacity(n_boundary);
    for (entry, (line, content)) in cursor.entries("boundary", n_boundary)?.into_iter().enumerate()
    {
        let (attribute, vertices) =
            parse_connectivity::<2>("boundary", entry, line, content, GEOMETRY_SEGMENT)?;
        boundary.push(BoundaryFacet {
            attribute,
            vertices,
        });
    }

    cursor.expect_section(SECTIONS[3])?;
    let n_vertices = parse_count(&mut cursor, "vertices")?;
    let (line, content) = cursor.next("vertices")?;
    let space_dim: usize = parse_value(line, content, "space dimension")?;
    if space_dim != 2 {
        return Err(MeshError::UnsupportedDimension(space_dim));
    }
    let mut vertices = Vec::with_capacity(n_vertices);
    for (line, content) in cursor.entries("vertices", n_vertices)? {
        let coords: Vec<&str> = content.split_whitespace().collect();
        if coords.len() != 2 {
            return Err(MeshError::Parse {
                line,
                message: format!("expected 2 coordinates, found {}", coords.len()),
            });
        }
        let x: f64 = parse_value(line, coords[0], "coordinate")?;
        let y: f64 = parse_value(line, coords[1], "coordinate")?;
        vertices.push(Point2::new(x, y));
    }

    if let Some((line, content)) = cursor.peek() {
        return Err(MeshError::Parse {
            line,
            message: format!("unexpected content after vertices: '{content}'"),
        });
    }

    Mesh::new(vertices, elements, boundary)
}

/// Serializes a mesh in the same format `parse_mfem` reads.
pub fn write_mfem(mesh: &Mesh) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}\n");
    let _ = writeln!(out, "dimension\n2\n");

    let _ = writeln!(out, "elements\n{}", mesh.num_elements());
    for element in mesh.elements() {
        let [a, b, c, d] = element.vertices;
        let _ = writeln!(
            out,
            "{} {} {} {} {} {}",
            element.attribute, GEOMETRY_SQUARE, a, b, c, d
        );
    }
    out.push('\n');

    let _ = writeln!(out, "boundary\n{}", mesh.num_boundary_facets());
    for facet in mesh.boundary() {
        let [a, b] = facet.vertices;
        let _ = writeln!(out, "{} {} {} {}", facet.attribute, GEOMETRY_SEGMENT, a, b);
    }
    out.push('\n');

    let _ = writeln!(out, "vertices\n{}\n2", mesh.num_vertices());
    for i in 0..mesh.num_vertices() {
        let p = mesh.vertex(i);
        let _ = writeln!(out, "{:?} {:?}", p.x, p.y);
    }
    out
}
