use std::path::PathBuf;

/// Structural problems found while reading or validating a mesh.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("cannot read mesh file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected mesh header 'MFEM mesh v1.0', found '{found}'")]
    MissingHeader { line: usize, found: String },

    #[error("line {line}: expected section '{expected}', found '{found}'")]
    UnexpectedSection {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of file while reading section '{section}'")]
    UnexpectedEof { section: &'static str },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("section '{section}' declares {declared} entries but {found} were found")]
    CountMismatch {
        section: &'static str,
        declared: usize,
        found: usize,
    },

    #[error("only 2D meshes are supported (dimension {0})")]
    UnsupportedDimension(usize),

    #[error("{section} entry {entry}: unsupported geometry type {geometry}")]
    UnsupportedGeometry {
        section: &'static str,
        entry: usize,
        geometry: i32,
    },

    #[error("{section} entry {entry}: geometry {geometry} needs {expected} vertices, found {found}")]
    WrongVertexCount {
        section: &'static str,
        entry: usize,
        geometry: i32,
        expected: usize,
        found: usize,
    },

    #[error("{section} entry {entry}: vertex index {index} out of range (mesh has {count} vertices)")]
    VertexOutOfRange {
        section: &'static str,
        entry: usize,
        index: usize,
        count: usize,
    },

    #[error("element {element} repeats a vertex: {vertices:?}")]
    DegenerateElement { element: usize, vertices: [usize; 4] },

    #[error("element {element} is inverted or collapsed (min Jacobian determinant {det:e})")]
    InvertedElement { element: usize, det: f64 },

    #[error("boundary facet {facet} ({v0}, {v1}) is not an edge of any element")]
    OrphanFacet { facet: usize, v0: usize, v1: usize },

    #[error("mesh has no elements")]
    Empty,
}

/// Invalid run parameters or boundary setup, detected before assembly.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("time step must be positive (dt = {0})")]
    NonPositiveTimeStep(f64),

    #[error("Reynolds number must be positive (Re = {0})")]
    NonPositiveReynolds(f64),

    #[error("final time must be positive (t_final = {0})")]
    NonPositiveFinalTime(f64),

    #[error("velocity order {0} is not supported (expected 2..=4)")]
    UnsupportedOrder(usize),

    #[error("output interval must be at least one step")]
    ZeroOutputInterval,

    #[error("{name} must be positive ({value})")]
    NonPositive { name: &'static str, value: f64 },

    #[error("boundary attribute {attribute} ({facets} facets) has no role (expected 1=cylinder, 2=inlet, 3=outlet, 4=walls)")]
    UnknownBoundaryAttribute { attribute: i32, facets: usize },

    #[error("pressure system is singular: no outlet (attribute 3) facets to fix the pressure reference")]
    MissingPressureReference,

    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Unrecoverable failures inside a linear solve.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("{stage} solve broke down at iteration {iteration} (residual {residual})")]
    Breakdown {
        stage: &'static str,
        iteration: usize,
        residual: f64,
    },
}

/// Failures writing forces, snapshots or traces. Never fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
