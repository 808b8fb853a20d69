// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests: area conservation and consistency of the subdivision
//! under awkward inputs.

use approx::assert_relative_eq;
use rooftop_arrangement::{Arrangement, FaceLabel, GridSegment};
use rooftop_geometry::{LinearRing, Point2};

fn seg(ax: f64, ay: f64, bx: f64, by: f64) -> GridSegment {
    GridSegment::snap(&Point2::new(ax, ay), &Point2::new(bx, by)).unwrap()
}

fn l_shape() -> LinearRing {
    LinearRing::new(vec![
        Point2::new(0.0, 0.0),
        Point2::new(20.0, 0.0),
        Point2::new(20.0, 8.0),
        Point2::new(9.0, 8.0),
        Point2::new(9.0, 15.0),
        Point2::new(0.0, 15.0),
    ])
}

/// Every half-edge's twin points back, and faces agree with the cycles
fn assert_consistent(arr: &Arrangement) {
    for edge in arr.edges().unwrap() {
        let he = arr.half_edge(edge.half_edge).unwrap();
        let twin = arr.half_edge(he.twin).unwrap();
        assert_eq!(twin.twin, edge.half_edge);
        assert_eq!(arr.half_edge(he.next).unwrap().prev, edge.half_edge);
    }
    for face in arr.faces() {
        for ring in arr.face_boundary(face).unwrap() {
            for pair in ring.windows(2) {
                assert_eq!(pair[0].target, pair[1].source);
            }
            assert!(ring.iter().all(|e| e.face == face));
        }
    }
}

#[test]
fn near_parallel_lines_conserve_area() {
    let ring = l_shape();
    let mut segments = Vec::new();
    // A fan of almost parallel lines crossing each other inside the footprint
    for i in 0..12 {
        let offset = i as f64 * 1e-3;
        segments.push(seg(-1.0, 3.0 + offset, 21.0, 3.3 - offset));
    }
    segments.push(seg(4.5, -2.0, 4.5, 17.0));
    segments.push(seg(-3.0, -1.0, 18.0, 14.0));

    let arr = Arrangement::build(&ring, &segments).unwrap();
    assert!(arr.footprint_faces().count() > 10);
    assert_relative_eq!(arr.footprint_area().unwrap(), ring.area(), epsilon = 1e-6);
    for face in arr.footprint_faces() {
        assert!(arr.face_area(face).unwrap() > 0.0);
    }
    assert_consistent(&arr);
}

#[test]
fn build_is_deterministic() {
    let segments = [
        seg(-1.0, 5.0, 21.0, 5.5),
        seg(3.0, -1.0, 3.0, 16.0),
        seg(0.0, 0.0, 20.0, 8.0),
    ];
    let a = Arrangement::build(&l_shape(), &segments).unwrap();
    let b = Arrangement::build(&l_shape(), &segments).unwrap();
    let rings = |arr: &Arrangement| -> Vec<_> {
        arr.footprint_faces()
            .map(|f| arr.face_rings(f).unwrap())
            .collect()
    };
    assert_eq!(rings(&a), rings(&b));
}

#[test]
fn dissolve_and_snap_conserve_area() {
    let ring = l_shape();
    let segments = [
        seg(-1.0, 4.0, 21.0, 4.0),
        seg(4.5, -1.0, 4.5, 16.0),
        seg(14.0, -1.0, 14.0, 9.0),
    ];
    let mut arr = Arrangement::build(&ring, &segments).unwrap();
    let faces: Vec<_> = arr.footprint_faces().collect();
    assert_eq!(faces.len(), 6);
    for (i, face) in faces.iter().enumerate() {
        arr.face_info_mut(*face).unwrap().label = FaceLabel::Plane(i % 2);
    }

    let total = ring.area();
    let mut lod13 = arr.clone();
    lod13.dissolve(|a, b| a.label == b.label).unwrap();
    lod13.snap().unwrap();
    assert_relative_eq!(lod13.footprint_area().unwrap(), total, epsilon = 1e-6);
    assert_consistent(&lod13);

    let mut lod12 = arr.clone();
    lod12.dissolve(|_, _| true).unwrap();
    lod12.snap().unwrap();
    assert_eq!(lod12.footprint_faces().count(), 1);
    // Only the six outline corners remain
    assert_eq!(lod12.vertex_count(), 6);
    assert_relative_eq!(lod12.footprint_area().unwrap(), total, epsilon = 1e-6);

    // The pristine arrangement is untouched
    assert_eq!(arr.footprint_faces().count(), 6);
}

#[test]
fn lines_outside_footprint_are_ignored() {
    let ring = l_shape();
    // Runs through the notch of the L only
    let arr = Arrangement::build(&ring, &[seg(12.0, 10.0, 19.0, 14.0)]).unwrap();
    assert_eq!(arr.footprint_faces().count(), 1);
    assert_eq!(arr.vertex_count(), 6);
}
