//! Every generated kernel variant must parse and validate under naga.
//!
//! This catches codegen regressions without needing a GPU: the same WGSL the
//! simulator ships to `create_shader_module` goes through naga's front end
//! and validator here.

use glam::Vec3;
use plume::boundary::{Boundary, BoundaryShape};
use plume::kernels;
use plume::materials::MaterialTable;

fn validate(label: &str, source: &str) {
    let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|e| {
        panic!(
            "{}: WGSL parse failed:\n{}",
            label,
            e.emit_to_string(source)
        )
    });
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .unwrap_or_else(|e| panic!("{}: validation failed: {:?}", label, e));
}

fn validate_all(label: &str, boundary: &Boundary) {
    let sources = kernels::generate(&MaterialTable::default(), boundary);
    validate(&format!("{label}/clear_grid"), &sources.clear_grid);
    validate(&format!("{label}/p2g1"), &sources.p2g1);
    validate(&format!("{label}/p2g2"), &sources.p2g2);
    validate(&format!("{label}/grid_update"), &sources.grid_update);
    validate(&format!("{label}/g2p"), &sources.g2p);
}

#[test]
fn kernels_validate_for_every_boundary_shape() {
    for shape in [
        BoundaryShape::None,
        BoundaryShape::Box,
        BoundaryShape::Sphere,
        BoundaryShape::Tube,
        BoundaryShape::Dodecahedron,
        BoundaryShape::Custom,
    ] {
        let boundary = Boundary::with_shape(Vec3::splat(64.0), shape);
        validate_all(&format!("{:?}", shape), &boundary);
    }
}

#[test]
fn kernels_validate_for_non_cubic_grids() {
    let boundary = Boundary::new(Vec3::new(96.0, 64.0, 48.0));
    validate_all("non_cubic", &boundary);
}

#[test]
fn standalone_snippets_validate() {
    // The utility snippets must stand on their own so hosts can reuse them.
    validate("utils", &plume::shader_utils::all_utils_wgsl());
}
