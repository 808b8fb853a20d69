// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extrusion of a labeled arrangement into closed solids.
//!
//! [`extrude_lod`] dissolves a copy of the labeled arrangement per level of
//! detail and hands it to [`ArrangementExtruder`], which lifts every
//! non-ground footprint face to its roof and closes it with a floor and
//! walls. Faces that share an edge end up in one solid.
//!
//! Walls between two roofs are split where the roofs cross, and every
//! vertical wall side carries all roof heights found at its vertex, so
//! neighbouring polygons always meet along identical edges.

use rooftop_arrangement::{Arrangement, DisjointSet, EdgeView, FaceInfo, FaceKey, GridPoint};
use rooftop_geometry::{Mesh, MultiSolid, Plane, Point2, Point3, Polygon3, SurfaceType};
use rustc_hash::FxHashMap;

use crate::building::Lod;
use crate::error::{ReconstructionError, Result};
use crate::optimise::elevation_stats;
use crate::raster::Heightfield;

/// Heights closer than this at one vertex are merged into one level
const HEIGHT_EPS: f64 = 1e-3;

/// Extrude one level of detail from the labeled arrangement.
///
/// The arrangement is cloned, dissolved by the LOD rule, given fresh
/// elevation statistics for merged faces and snapped before extrusion.
pub fn extrude_lod(
    labeled: &Arrangement,
    heightfield: &Heightfield,
    lod: Lod,
    h_ground: f64,
    step_height: f64,
    fallback_height: f64,
) -> Result<MultiSolid> {
    let mut arrangement = labeled.clone();
    match lod {
        Lod::Lod12 => arrangement.dissolve(|a, b| !a.label.is_ground() && !b.label.is_ground())?,
        Lod::Lod13 => arrangement.dissolve(|a, b| {
            if a.label.is_ground() || b.label.is_ground() {
                return false;
            }
            match (a.elevation, b.elevation) {
                (Some(ea), Some(eb)) => ((ea.h_70p - eb.h_70p).abs() as f64) < step_height,
                // faces without samples only join their own plane
                _ => a.label == b.label,
            }
        })?,
        Lod::Lod22 => arrangement.dissolve(|a, b| a.label == b.label)?,
    }

    let merged: Vec<FaceKey> = arrangement
        .footprint_faces()
        .filter(|&f| matches!(arrangement.face_info(f), Ok(info) if info.elevation.is_none()))
        .collect();
    for face in merged {
        let polygon = arrangement.face_polygon(face)?;
        let stats = elevation_stats(heightfield.samples_in(&polygon));
        arrangement.face_info_mut(face)?.elevation = stats;
    }
    arrangement.snap()?;

    ArrangementExtruder.compute(&arrangement, h_ground, lod == Lod::Lod22, h_ground + fallback_height)
}

/// Roof surface of one face
#[derive(Debug, Clone, Copy)]
enum RoofSurface {
    Sloped(Plane),
    Flat(f64),
}

impl RoofSurface {
    fn of(arrangement: &Arrangement, face: FaceKey, lod2: bool, default_z: f64) -> Result<Self> {
        let info: &FaceInfo = arrangement.face_info(face)?;
        if lod2 {
            if let Some(plane) = info.plane.filter(|p| p.z_at(0.0, 0.0).is_some()) {
                return Ok(RoofSurface::Sloped(plane));
            }
        }
        if let Some(elevation) = info.elevation {
            return Ok(RoofSurface::Flat(elevation.h_70p as f64));
        }
        if let Some(plane) = info.plane {
            let polygon = arrangement.face_polygon(face)?;
            let n = polygon.outer.len().max(1) as f64;
            let (sx, sy) = polygon
                .outer
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            if let Some(z) = plane.z_at(sx / n, sy / n) {
                return Ok(RoofSurface::Flat(z));
            }
        }
        Ok(RoofSurface::Flat(default_z))
    }

    /// Roof height above `p`, never below the ground
    fn z(&self, p: &Point2<f64>, h_ground: f64) -> f64 {
        let z = match self {
            RoofSurface::Sloped(plane) => plane.z_at(p.x, p.y).unwrap_or(h_ground),
            RoofSurface::Flat(z) => *z,
        };
        z.max(h_ground)
    }
}

fn edge_key(a: GridPoint, b: GridPoint) -> (GridPoint, GridPoint) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArrangementExtruder;

impl ArrangementExtruder {
    /// Closed solids of all footprint faces not labeled as ground.
    ///
    /// With `lod2` roofs follow their plane; otherwise each roof is flat at
    /// its 70th percentile height. Faces without any height use `default_z`.
    pub fn compute(
        &self,
        arrangement: &Arrangement,
        h_ground: f64,
        lod2: bool,
        default_z: f64,
    ) -> Result<MultiSolid> {
        let mut faces = Vec::new();
        for face in arrangement.footprint_faces() {
            if !arrangement.face_info(face)?.label.is_ground() {
                faces.push(face);
            }
        }
        if faces.is_empty() {
            return Err(ReconstructionError::DegenerateInput(
                "no roof faces to extrude".to_string(),
            ));
        }
        let index: FxHashMap<FaceKey, usize> = faces.iter().enumerate().map(|(i, &f)| (f, i)).collect();
        let roofs = faces
            .iter()
            .map(|&f| RoofSurface::of(arrangement, f, lod2, default_z))
            .collect::<Result<Vec<_>>>()?;
        let boundaries = faces
            .iter()
            .map(|&f| arrangement.face_boundary(f).map_err(Into::into))
            .collect::<Result<Vec<_>>>()?;
        let edges: Vec<EdgeView> = arrangement
            .edges()?
            .into_iter()
            .filter(|e| e.face != e.twin_face)
            .collect();

        // Connected faces form one solid, numbered in face order
        let mut groups = DisjointSet::new(faces.len());
        for e in &edges {
            if let (Some(&a), Some(&b)) = (index.get(&e.face), index.get(&e.twin_face)) {
                groups.union(a, b);
            }
        }
        let mut solid_of = vec![0usize; faces.len()];
        let mut numbering: FxHashMap<usize, usize> = FxHashMap::default();
        for (i, solid) in solid_of.iter_mut().enumerate() {
            let root = groups.find(i);
            let next = numbering.len();
            *solid = *numbering.entry(root).or_insert(next);
        }

        let surface_z = |i: usize, p: GridPoint| roofs[i].z(&p.to_point(), h_ground);

        // Every height present at a vertex, for splitting vertical wall sides.
        // Near-equal heights collapse to one level shared by all faces there.
        let mut levels: FxHashMap<GridPoint, Vec<f64>> = FxHashMap::default();
        for (i, cycles) in boundaries.iter().enumerate() {
            for e in cycles.iter().flatten() {
                levels.entry(e.source).or_default().push(surface_z(i, e.source));
            }
        }
        for heights in levels.values_mut() {
            *heights = merge_levels(std::mem::take(heights), h_ground);
        }
        let z = |i: usize, p: GridPoint| {
            let h = surface_z(i, p);
            levels.get(&p).map_or(h, |l| nearest_level(l, h))
        };

        let mut crossings: FxHashMap<(GridPoint, GridPoint), Point3<f64>> = FxHashMap::default();
        let mut walls: Vec<(usize, Polygon3, SurfaceType)> = Vec::new();
        for e in &edges {
            let left = index.get(&e.face).copied();
            let right = index.get(&e.twin_face).copied();
            let Some(owner) = left.or(right) else {
                continue;
            };
            let kind = if left.is_some() && right.is_some() {
                SurfaceType::InnerWall
            } else {
                SurfaceType::OuterWall
            };
            let height = |side: Option<usize>, p: GridPoint| side.map_or(h_ground, |i| z(i, p));
            let (s, t) = (e.source, e.target);
            let (zl_s, zr_s) = (height(left, s), height(right, s));
            let (zl_t, zr_t) = (height(left, t), height(right, t));
            let (ds, dt) = (zl_s - zr_s, zl_t - zr_t);
            let (ps, pt) = (s.to_point(), t.to_point());
            let end_s = WallEnd::at(ps, zl_s, zr_s, levels.get(&s));
            let end_t = WallEnd::at(pt, zl_t, zr_t, levels.get(&t));

            let crossing = (ds > HEIGHT_EPS && dt < -HEIGHT_EPS) || (ds < -HEIGHT_EPS && dt > HEIGHT_EPS);
            if crossing {
                let u = ds / (ds - dt);
                let pc = ps + (pt - ps) * u;
                let zc = match left {
                    Some(i) => roofs[i].z(&pc, h_ground),
                    None => h_ground,
                };
                let c = Point3::new(pc.x, pc.y, zc);
                crossings.insert(edge_key(s, t), c);
                let end_c = WallEnd::point(c);
                walls.extend(wall(&end_s, &end_c, ds > 0.0).map(|p| (owner, p, kind)));
                walls.extend(wall(&end_c, &end_t, dt > 0.0).map(|p| (owner, p, kind)));
            } else {
                let d = if ds.abs() > dt.abs() { ds } else { dt };
                if d.abs() <= HEIGHT_EPS {
                    continue;
                }
                walls.extend(wall(&end_s, &end_t, d > 0.0).map(|p| (owner, p, kind)));
            }
        }

        let mut meshes: Vec<Mesh> = (0..numbering.len()).map(|_| Mesh::new()).collect();
        for (i, cycles) in boundaries.iter().enumerate() {
            let mut roof_rings = Vec::with_capacity(cycles.len());
            let mut floor_rings = Vec::with_capacity(cycles.len());
            for cycle in cycles {
                let mut roof = Vec::with_capacity(cycle.len());
                let mut floor = Vec::with_capacity(cycle.len());
                for e in cycle {
                    let p = e.source.to_point();
                    roof.push(Point3::new(p.x, p.y, z(i, e.source)));
                    floor.push(Point3::new(p.x, p.y, h_ground));
                    if let Some(c) = crossings.get(&edge_key(e.source, e.target)) {
                        roof.push(*c);
                    }
                }
                roof_rings.push(roof);
                floor_rings.push(floor);
            }
            let mesh = &mut meshes[solid_of[i]];
            mesh.push_polygon(polygon_of(floor_rings).reversed(), SurfaceType::Floor);
            mesh.push_polygon(polygon_of(roof_rings), SurfaceType::Roof);
        }
        for (owner, polygon, kind) in walls {
            meshes[solid_of[owner]].push_polygon(polygon, kind);
        }

        let mut solids = MultiSolid::new();
        for (i, mut mesh) in meshes.into_iter().enumerate() {
            mesh.resize_attributes();
            solids.insert(i, mesh);
        }
        tracing::debug!(faces = faces.len(), solids = solids.len(), lod2, "arrangement extruded");
        Ok(solids)
    }
}

/// Sorted distinct levels of the heights at one vertex. Heights within
/// [`HEIGHT_EPS`] of each other form one level at their mean; the level
/// holding the ground is the ground itself.
fn merge_levels(mut heights: Vec<f64>, h_ground: f64) -> Vec<f64> {
    heights.push(h_ground);
    heights.sort_by(|a, b| a.total_cmp(b));

    let mut levels = Vec::new();
    let mut group: Vec<f64> = Vec::new();
    for h in heights {
        if group.last().is_some_and(|&last| h - last > HEIGHT_EPS) {
            levels.push(level_of(&group, h_ground));
            group.clear();
        }
        group.push(h);
    }
    if !group.is_empty() {
        levels.push(level_of(&group, h_ground));
    }
    levels
}

fn level_of(group: &[f64], h_ground: f64) -> f64 {
    if group.contains(&h_ground) {
        h_ground
    } else {
        group.iter().sum::<f64>() / group.len() as f64
    }
}

fn nearest_level(levels: &[f64], h: f64) -> f64 {
    levels
        .iter()
        .copied()
        .min_by(|a, b| (a - h).abs().total_cmp(&(b - h).abs()))
        .unwrap_or(h)
}

fn polygon_of(mut rings: Vec<Vec<Point3<f64>>>) -> Polygon3 {
    let holes = rings.split_off(1.min(rings.len()));
    Polygon3 {
        outer: rings.pop().unwrap_or_default(),
        holes,
    }
}

/// One vertical side of a wall: the lower and upper height at a plan point
/// and the vertex heights strictly between them
struct WallEnd {
    at: Point2<f64>,
    lo: f64,
    hi: f64,
    between: Vec<f64>,
}

impl WallEnd {
    fn at(at: Point2<f64>, z_left: f64, z_right: f64, levels: Option<&Vec<f64>>) -> Self {
        if (z_left - z_right).abs() <= HEIGHT_EPS {
            let z = z_left.max(z_right);
            return Self {
                at,
                lo: z,
                hi: z,
                between: Vec::new(),
            };
        }
        let (lo, hi) = (z_left.min(z_right), z_left.max(z_right));
        let between = levels
            .map(|l| {
                l.iter()
                    .copied()
                    .filter(|&h| h > lo + HEIGHT_EPS && h < hi - HEIGHT_EPS)
                    .collect()
            })
            .unwrap_or_default();
        Self { at, lo, hi, between }
    }

    fn point(p: Point3<f64>) -> Self {
        Self {
            at: Point2::new(p.x, p.y),
            lo: p.z,
            hi: p.z,
            between: Vec::new(),
        }
    }
}

/// Wall between two ends. With `left_higher` the wall faces right of the
/// direction `a -> b`, otherwise left.
fn wall(a: &WallEnd, b: &WallEnd, left_higher: bool) -> Option<Polygon3> {
    let lift = |end: &WallEnd, z: f64| Point3::new(end.at.x, end.at.y, z);
    let mut ring = vec![lift(a, a.lo), lift(b, b.lo)];
    ring.extend(b.between.iter().map(|&z| lift(b, z)));
    ring.push(lift(b, b.hi));
    ring.push(lift(a, a.hi));
    ring.extend(a.between.iter().rev().map(|&z| lift(a, z)));

    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return None;
    }
    let polygon = Polygon3::new(ring);
    Some(if left_higher { polygon } else { polygon.reversed() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rooftop_arrangement::{ElevationStats, FaceLabel, GridSegment};
    use rooftop_geometry::{LinearRing, Vector3};

    fn seg(ax: f64, ay: f64, bx: f64, by: f64) -> GridSegment {
        GridSegment::snap(&Point2::new(ax, ay), &Point2::new(bx, by)).unwrap()
    }

    fn flat(z: f32) -> Option<ElevationStats> {
        Some(ElevationStats {
            h_50p: z,
            h_70p: z,
            h_min: z,
            h_max: z,
            samples: 10,
        })
    }

    /// Label every footprint face through a function of its min x
    fn label_by_x(arr: &mut Arrangement, f: impl Fn(f64) -> FaceInfo) {
        let faces: Vec<FaceKey> = arr.footprint_faces().collect();
        for face in faces {
            let (min, _) = arr.face_polygon(face).unwrap().bounds();
            let info = f(min.x);
            *arr.face_info_mut(face).unwrap() = FaceInfo {
                in_footprint: true,
                ..info
            };
        }
    }

    fn roof(label: FaceLabel, plane: Option<Plane>, elevation: Option<ElevationStats>) -> FaceInfo {
        FaceInfo {
            in_footprint: true,
            label,
            plane,
            elevation,
        }
    }

    fn assert_closed(mesh: &Mesh) {
        let counts = mesh.directed_edge_counts(1e-5);
        for (&(a, b), &n) in &counts {
            assert_eq!(counts.get(&(b, a)).copied().unwrap_or(0), n, "edge {a:?} -> {b:?}");
        }
    }

    fn count(mesh: &Mesh, kind: SurfaceType) -> usize {
        mesh.labels().iter().filter(|&&l| l == kind).count()
    }

    #[test]
    fn test_flat_box() {
        let mut arr = Arrangement::build(&LinearRing::rectangle(0.0, 0.0, 4.0, 3.0), &[]).unwrap();
        label_by_x(&mut arr, |_| roof(FaceLabel::Plane(0), None, flat(5.0)));
        let solids = ArrangementExtruder.compute(&arr, 1.0, false, 4.0).unwrap();
        assert_eq!(solids.len(), 1);
        let mesh = &solids[&0];
        assert_eq!(mesh.len(), 6);
        assert_eq!(count(mesh, SurfaceType::OuterWall), 4);
        assert_eq!(mesh.attributes().len(), 6);
        assert_closed(mesh);
        let roof_area = mesh.polygons()[1].area_vector();
        assert!((roof_area.z - 12.0).abs() < 1e-9);
        let floor_area = mesh.polygons()[0].area_vector();
        assert!((floor_area.z + 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_step_gives_inner_wall() {
        let mut arr = Arrangement::build(
            &LinearRing::rectangle(0.0, 0.0, 4.0, 3.0),
            &[seg(2.0, -1.0, 2.0, 4.0)],
        )
        .unwrap();
        label_by_x(&mut arr, |x| {
            if x < 1.0 {
                roof(FaceLabel::Plane(0), None, flat(5.0))
            } else {
                roof(FaceLabel::Plane(1), None, flat(7.0))
            }
        });
        let solids = ArrangementExtruder.compute(&arr, 1.0, false, 4.0).unwrap();
        assert_eq!(solids.len(), 1);
        let mesh = &solids[&0];
        assert_eq!(count(mesh, SurfaceType::InnerWall), 1);
        assert_eq!(count(mesh, SurfaceType::OuterWall), 6);
        assert_eq!(count(mesh, SurfaceType::Roof), 2);
        assert_closed(mesh);
    }

    #[test]
    fn test_crossing_roofs_split_wall() {
        let mut arr = Arrangement::build(
            &LinearRing::rectangle(0.0, 0.0, 4.0, 4.0),
            &[seg(2.0, -1.0, 2.0, 5.0)],
        )
        .unwrap();
        let sloped = Plane::from_point_normal(&Point3::new(0.0, 0.0, 5.0), &Vector3::new(0.0, -0.5, 1.0)).unwrap();
        label_by_x(&mut arr, |x| {
            if x < 1.0 {
                roof(FaceLabel::Plane(0), Some(sloped), flat(6.0))
            } else {
                roof(FaceLabel::Plane(1), Some(Plane::horizontal(6.0)), flat(6.0))
            }
        });
        let solids = ArrangementExtruder.compute(&arr, 0.0, true, 3.0).unwrap();
        let mesh = &solids[&0];
        let inner: Vec<&Polygon3> = mesh
            .iter()
            .filter(|(_, l)| *l == SurfaceType::InnerWall)
            .map(|(p, _)| p)
            .collect();
        assert_eq!(inner.len(), 2);
        assert!(inner.iter().all(|p| p.outer.len() == 3));
        // The sloped roof gains the crossing vertex
        let sloped_roof = mesh
            .iter()
            .find(|(p, l)| *l == SurfaceType::Roof && p.outer.iter().any(|v| v.x < 1.0))
            .unwrap()
            .0;
        assert_eq!(sloped_roof.outer.len(), 5);
        assert_closed(mesh);
    }

    #[test]
    fn test_ridge_heights_are_merged() {
        let mut arr = Arrangement::build(
            &LinearRing::rectangle(0.0, 0.0, 10.0, 8.0),
            &[seg(-1.0, 4.0, 11.0, 4.0)],
        )
        .unwrap();
        // Fitted planes miss each other at the ridge by a fraction of a millimetre
        let south = Plane::from_point_normal(&Point3::new(0.0, 0.0, 3.0), &Vector3::new(0.0, -0.5, 1.0)).unwrap();
        let north = Plane::from_point_normal(&Point3::new(0.0, 8.0, 3.0004), &Vector3::new(0.0, 0.5, 1.0)).unwrap();
        let faces: Vec<FaceKey> = arr.footprint_faces().collect();
        for face in faces {
            let (min, _) = arr.face_polygon(face).unwrap().bounds();
            *arr.face_info_mut(face).unwrap() = if min.y < 1.0 {
                roof(FaceLabel::Plane(0), Some(south), flat(4.0))
            } else {
                roof(FaceLabel::Plane(1), Some(north), flat(4.0))
            };
        }

        let solids = ArrangementExtruder.compute(&arr, 0.0, true, 3.0).unwrap();
        let mesh = &solids[&0];
        assert_eq!(count(mesh, SurfaceType::InnerWall), 0);
        // Each gable end is split at the ridge into two quads
        assert_eq!(count(mesh, SurfaceType::OuterWall), 6);
        assert!(mesh
            .iter()
            .filter(|(_, l)| *l == SurfaceType::OuterWall)
            .all(|(p, _)| p.outer.len() == 4));
        assert_closed(mesh);

        let triangulated = crate::finish::MeshTriangulator.compute(&solids).unwrap();
        assert_eq!(crate::finish::SolidValidator::default().validate(&solids, &triangulated), "valid");
        assert!((triangulated.total_volume() - 320.0).abs() < 0.05);
    }

    #[test]
    fn test_merge_levels() {
        let levels = merge_levels(vec![7.0, 5.0004, 5.0], 1.0);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], 1.0);
        assert!((levels[1] - 5.0002).abs() < 1e-9);
        assert_eq!(levels[2], 7.0);
        assert_eq!(merge_levels(vec![1.0002, 3.0], 1.0), vec![1.0, 3.0]);
        assert_eq!(nearest_level(&levels, 5.0004), levels[1]);
    }

    #[test]
    fn test_ground_faces_split_solids() {
        let mut arr = Arrangement::build(
            &LinearRing::rectangle(0.0, 0.0, 9.0, 3.0),
            &[seg(3.0, -1.0, 3.0, 4.0), seg(6.0, -1.0, 6.0, 4.0)],
        )
        .unwrap();
        label_by_x(&mut arr, |x| {
            if (2.0..4.0).contains(&x) {
                roof(FaceLabel::Ground, None, flat(0.0))
            } else {
                roof(FaceLabel::Plane(0), None, flat(4.0))
            }
        });
        let solids = ArrangementExtruder.compute(&arr, 0.0, false, 3.0).unwrap();
        assert_eq!(solids.len(), 2);
        for mesh in solids.values() {
            assert_eq!(mesh.len(), 6);
            assert_closed(mesh);
        }
    }

    #[test]
    fn test_all_ground_is_degenerate() {
        let mut arr = Arrangement::build(&LinearRing::rectangle(0.0, 0.0, 4.0, 3.0), &[]).unwrap();
        label_by_x(&mut arr, |_| roof(FaceLabel::Ground, None, None));
        assert!(matches!(
            ArrangementExtruder.compute(&arr, 0.0, false, 3.0),
            Err(ReconstructionError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_lod_dissolve_rules() {
        let ring = LinearRing::rectangle(0.0, 0.0, 6.0, 3.0);
        let mut arr = Arrangement::build(&ring, &[seg(2.0, -1.0, 2.0, 4.0), seg(4.0, -1.0, 4.0, 4.0)]).unwrap();
        label_by_x(&mut arr, |x| {
            if x < 1.0 {
                roof(FaceLabel::Plane(0), Some(Plane::horizontal(5.0)), flat(5.0))
            } else if x < 3.0 {
                roof(FaceLabel::Plane(1), Some(Plane::horizontal(6.0)), flat(6.0))
            } else {
                roof(FaceLabel::Plane(1), Some(Plane::horizontal(10.0)), flat(10.0))
            }
        });
        let field = Heightfield::new(Point2::new(0.0, 0.0), Point2::new(6.0, 3.0), 0.5);
        let roofs = |lod| {
            let solids = extrude_lod(&arr, &field, lod, 0.0, 3.0, 3.0).unwrap();
            solids.values().map(|m| count(m, SurfaceType::Roof)).sum::<usize>()
        };
        assert_eq!(roofs(Lod::Lod12), 1);
        assert_eq!(roofs(Lod::Lod13), 2);
        assert_eq!(roofs(Lod::Lod22), 2);
    }
}
