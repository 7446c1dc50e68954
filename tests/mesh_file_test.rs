use cylflow::solver::error::MeshError;
use cylflow::solver::mesh::{
    attributes, generate_channel_with_obstacle, parse_mfem, write_mfem, Mesh,
};
use nalgebra::Point2;

// 3 x 1 channel with the middle cell missing.
const SPLIT_CHANNEL: &str = "MFEM mesh v1.0
#
# inlet left, outlet right, cylinder facets around the gap
#
dimension
2

elements
2
1 3 0 1 5 4
1 3 2 3 7 6   # right cell

boundary
8
2 1 4 0
4 1 0 1
1 1 1 5
4 1 5 4
1 1 6 2
4 1 2 3
3 1 3 7
4 1 7 6

vertices
8
2
0 0
1 0
2 0
3 0
0 1
1 1
2 1
3 1
";

#[test]
fn test_mesh_file_with_comments_loads() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("split.mesh");
    std::fs::write(&path, SPLIT_CHANNEL).expect("write");

    let mesh = Mesh::from_file(&path).expect("valid mesh");
    assert_eq!(mesh.num_elements(), 2);
    assert_eq!(mesh.num_boundary_facets(), 8);
    let stats = mesh.stats();
    assert_eq!(stats.facets_per_attribute.get(&attributes::CYLINDER), Some(&2));
    assert_eq!(stats.facets_per_attribute.get(&attributes::WALLS), Some(&4));
    assert_eq!(stats.min_edge_length, 1.0);
}

#[test]
fn test_sections_out_of_order_are_rejected() {
    let reordered = SPLIT_CHANNEL.replacen("dimension\n2\n", "", 1).replacen(
        "vertices\n8",
        "dimension\n2\n\nvertices\n8",
        1,
    );
    assert!(matches!(
        parse_mfem(&reordered),
        Err(MeshError::UnexpectedSection { .. })
    ));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nowhere.mesh");
    match Mesh::from_file(&path) {
        Err(MeshError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an I/O error, got {:?}", other.map(|m| m.num_elements())),
    }
}

#[test]
fn test_generated_mesh_survives_file_round_trip() {
    let mesh = generate_channel_with_obstacle(24, 8, 6.0, 2.0, Point2::new(1.5, 1.0), 0.4)
        .expect("mesh");
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("channel.mesh");
    std::fs::write(&path, write_mfem(&mesh)).expect("write");

    let loaded = Mesh::from_file(&path).expect("reload");
    assert_eq!(loaded.num_vertices(), mesh.num_vertices());
    assert_eq!(loaded.num_edges(), mesh.num_edges());
    assert_eq!(loaded.boundary_attributes(), mesh.boundary_attributes());
    for e in 0..mesh.num_elements() {
        assert_eq!(loaded.element_points(e), mesh.element_points(e));
    }
}
