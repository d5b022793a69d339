// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decode, measure and estimate a printed part the way the CLI does.

use approx::assert_relative_eq;
use yantra_core::MaterialDef;
use yantra_geometry::{
    decode_stl, encode_binary_stl, estimate_print, measure, MaterialCatalog, PrintOverrides,
};

/// ASCII STL of a closed box from the origin to (sx, sy, sz).
fn ascii_box(sx: f32, sy: f32, sz: f32) -> String {
    let p = |x: f32, y: f32, z: f32| [x * sx, y * sy, z * sz];
    let quads = [
        [p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)],
        [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
        [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
        [p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)],
        [p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)],
        [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)],
    ];

    let mut out = String::from("solid box\n");
    for [a, b, c, d] in quads {
        for tri in [[a, b, c], [a, c, d]] {
            out.push_str("  facet normal 0 0 0\n    outer loop\n");
            for v in tri {
                out.push_str(&format!("      vertex {} {} {}\n", v[0], v[1], v[2]));
            }
            out.push_str("    endloop\n  endfacet\n");
        }
    }
    out.push_str("endsolid box\n");
    out
}

#[test]
fn ascii_box_measures_and_survives_binary_reencoding() {
    let mesh = decode_stl(ascii_box(40.0, 40.0, 20.0).as_bytes()).unwrap();
    assert_eq!(mesh.triangle_count(), 12);
    assert!(mesh.normals.is_none());

    let metrics = measure(&mesh).unwrap();
    assert_relative_eq!(metrics.volume_mm3, 32000.0, epsilon = 1e-6);
    assert_relative_eq!(metrics.dimensions.width, 40.0, epsilon = 1e-6);
    assert_relative_eq!(metrics.dimensions.depth, 40.0, epsilon = 1e-6);
    assert_relative_eq!(metrics.dimensions.height, 20.0, epsilon = 1e-6);
    assert_relative_eq!(metrics.centroid.z, 10.0, epsilon = 1e-6);

    let binary = encode_binary_stl(&mesh, "box");
    let again = decode_stl(&binary).unwrap();
    assert_eq!(again.triangle_count(), 12);
    assert_relative_eq!(measure(&again).unwrap().volume_mm3, 32000.0, epsilon = 1e-3);
}

#[test]
fn print_estimate_uses_the_selected_material() {
    let mesh = decode_stl(ascii_box(40.0, 40.0, 20.0).as_bytes()).unwrap();
    let metrics = measure(&mesh).unwrap();
    let catalog = MaterialCatalog::with_manifest(&[MaterialDef {
        id: "petg".into(),
        name: "Studio PETG".into(),
        density: 1.27,
        print_speed_factor: None,
        cost_per_kg: 22.0,
    }]);

    let pla = estimate_print(
        metrics.volume_mm3,
        &metrics.dimensions,
        catalog.resolve("pla"),
        &PrintOverrides::default(),
    );
    assert_eq!(pla.material, "PLA");
    assert_relative_eq!(pla.grams, 17.5);
    assert_relative_eq!(pla.cost, 0.35);
    assert_eq!((pla.hours, pla.minutes), (0, 21));

    let petg = estimate_print(
        metrics.volume_mm3,
        &metrics.dimensions,
        catalog.resolve("petg"),
        &PrintOverrides::default(),
    );
    assert_eq!(petg.material, "Studio PETG");
    assert_relative_eq!(petg.grams, 17.9);
    assert_eq!(catalog.list()[0], ("petg", "Studio PETG"));
}
