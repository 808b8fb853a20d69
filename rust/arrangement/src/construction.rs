// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction of an arrangement from a footprint and roof lines.
//!
//! Building runs in four steps: every input segment is split at all mutual
//! intersections, roof line pieces outside the footprint are dropped, dangling
//! roof line pieces are pruned, and the remaining pieces are assembled into
//! half-edges whose cycles become faces. Dissolve and snap reuse the assembly
//! step on an edited piece list.

use std::collections::BTreeMap;

use rooftop_geometry::LinearRing;
use rustc_hash::FxHashMap;
use slotmap::SecondaryMap;

use crate::arena::*;
use crate::disjoint_set::DisjointSet;
use crate::error::{Error, Result};
use crate::kernel::*;
use crate::keys::*;

/// Upper bound on split passes; rounded crossing points can create new
/// crossings, which the next pass resolves.
const MAX_SPLIT_PASSES: usize = 16;

/// Segment piece fed to the half-edge assembler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Piece {
    pub segment: GridSegment,
    /// Footprint flag relative to the direction of `segment`
    pub footprint_interior_left: Option<bool>,
    /// Faces on the left and right of `segment` in the arrangement the piece
    /// was taken from; null keys when building from scratch
    pub sides: (FaceKey, FaceKey),
}

impl Piece {
    fn new(segment: GridSegment, footprint_interior_left: Option<bool>) -> Self {
        Self {
            segment,
            footprint_interior_left,
            sides: (FaceKey::default(), FaceKey::default()),
        }
    }

    pub fn reversed(self) -> Self {
        Self {
            segment: self.segment.reversed(),
            footprint_interior_left: self.footprint_interior_left.map(|f| !f),
            sides: (self.sides.1, self.sides.0),
        }
    }

    #[inline]
    fn is_footprint(&self) -> bool {
        self.footprint_interior_left.is_some()
    }
}

/// Face record produced by cycle tracing
struct TracedCycle {
    start: HalfEdgeKey,
    points: Vec<GridPoint>,
    area2: i128,
    component: usize,
}

impl Arrangement {
    /// Overlay the footprint and the roof line segments.
    ///
    /// Footprint rings are re-oriented (outer counter-clockwise, holes
    /// clockwise) and snapped to the grid. Every bounded face of the result
    /// is flagged `in_footprint` when it lies inside the footprint; the
    /// union of those faces is exactly the snapped footprint.
    pub fn build(footprint: &LinearRing, segments: &[GridSegment]) -> Result<Self> {
        if footprint.outer.is_empty() {
            return Err(Error::EmptyFootprint);
        }
        footprint
            .validate()
            .map_err(|e| Error::DegenerateFootprint(e.to_string()))?;

        let rings = snap_footprint(footprint)?;

        let mut pieces = Vec::new();
        for ring in &rings {
            for i in 0..ring.len() {
                let segment = GridSegment::new(ring[i], ring[(i + 1) % ring.len()]);
                pieces.push(Piece::new(segment, Some(true)));
            }
        }
        pieces.extend(
            segments
                .iter()
                .filter(|s| !s.is_degenerate())
                .map(|s| Piece::new(*s, None)),
        );

        let pieces = split_all(pieces)?;
        let pieces: Vec<Piece> = pieces
            .into_iter()
            .filter(|p| p.is_footprint() || midpoint_inside(&rings, &p.segment))
            .collect();
        let pieces = prune_dangling(pieces);

        let (arrangement, _) = Self::assemble(&pieces)?;
        Ok(arrangement)
    }

    /// Assemble half-edges, trace cycles and create faces.
    ///
    /// Pieces must not cross or overlap. Returns the arrangement together
    /// with, per piece, its forward and backward half-edge. Faces get a fresh
    /// [`FaceInfo`] with only `in_footprint` set.
    pub(crate) fn assemble(pieces: &[Piece]) -> Result<(Self, Vec<[HalfEdgeKey; 2]>)> {
        let mut arr = Self::empty();
        let null = HalfEdgeKey::default();

        let mut vertex_of: BTreeMap<GridPoint, VertexKey> = BTreeMap::new();
        let mut vertex_index: SecondaryMap<VertexKey, usize> = SecondaryMap::new();
        let mut outgoing: BTreeMap<GridPoint, Vec<HalfEdgeKey>> = BTreeMap::new();
        let mut direction: SecondaryMap<HalfEdgeKey, (i64, i64)> = SecondaryMap::new();
        let mut pairs = Vec::with_capacity(pieces.len());

        for piece in pieces {
            let (a, b) = (piece.segment.source, piece.segment.target);
            if a == b {
                return Err(Error::Inconsistent("zero-length piece".to_string()));
            }
            let va = arr.vertex_for(&mut vertex_of, &mut vertex_index, a);
            let vb = arr.vertex_for(&mut vertex_of, &mut vertex_index, b);

            let h = arr.half_edges.insert(HalfEdgeData {
                origin: va,
                twin: null,
                next: null,
                prev: null,
                face: arr.unbounded,
                footprint_interior_left: piece.footprint_interior_left,
            });
            let t = arr.half_edges.insert(HalfEdgeData {
                origin: vb,
                twin: h,
                next: null,
                prev: null,
                face: arr.unbounded,
                footprint_interior_left: piece.footprint_interior_left.map(|f| !f),
            });
            arr.half_edges[h].twin = t;

            let (dx, dy) = piece.segment.direction();
            direction.insert(h, (dx, dy));
            direction.insert(t, (-dx, -dy));
            outgoing.entry(a).or_default().push(h);
            outgoing.entry(b).or_default().push(t);
            pairs.push([h, t]);
        }

        // Around every vertex: next(twin(e)) is the outgoing edge just before
        // e in counter-clockwise order
        for (point, list) in outgoing.iter_mut() {
            list.sort_by(|&x, &y| angle_cmp(direction[x], direction[y]));
            let m = list.len();
            for i in 0..m {
                let incoming = arr.half_edges[list[i]].twin;
                let next = list[(i + m - 1) % m];
                arr.half_edges[incoming].next = next;
                arr.half_edges[next].prev = incoming;
            }
            if let Some(&v) = vertex_of.get(point) {
                arr.vertices[v].incident = list[0];
            }
        }

        // Connected components over vertices
        let mut components = DisjointSet::new(vertex_of.len());
        for [h, t] in &pairs {
            let a = vertex_index[arr.half_edges[*h].origin];
            let b = vertex_index[arr.half_edges[*t].origin];
            components.union(a, b);
        }

        let mut visited: SecondaryMap<HalfEdgeKey, ()> = SecondaryMap::new();
        let mut cycles = Vec::new();
        let keys: Vec<HalfEdgeKey> = arr.half_edges.keys().collect();
        for h in keys {
            if visited.contains_key(h) {
                continue;
            }
            let cycle = arr.cycle(h)?;
            for &c in &cycle {
                visited.insert(c, ());
            }
            let points = arr.cycle_points(h)?;
            let origin = arr.half_edges[h].origin;
            cycles.push(TracedCycle {
                start: h,
                area2: ring_area2(&points),
                component: components.find(vertex_index[origin]),
                points,
            });
        }

        // Counter-clockwise cycles bound faces
        let mut outer_faces: Vec<(usize, FaceKey)> = Vec::new();
        for (i, cycle) in cycles.iter().enumerate() {
            if cycle.area2 <= 0 {
                continue;
            }
            let face = arr.faces.insert(FaceData {
                outer: Some(cycle.start),
                holes: Vec::new(),
                info: FaceInfo::default(),
            });
            arr.assign_face(cycle.start, face)?;
            outer_faces.push((i, face));
        }

        // Clockwise cycles are the outside of a component; attach each one to
        // the smallest face of another component that contains it
        for cycle in cycles.iter().filter(|c| c.area2 <= 0) {
            let probe = cycle.points[0];
            let host = outer_faces
                .iter()
                .filter(|(i, _)| cycles[*i].component != cycle.component)
                .filter(|(i, _)| ring_contains(&cycles[*i].points, probe))
                .min_by_key(|(i, _)| cycles[*i].area2)
                .map(|(_, f)| *f)
                .unwrap_or(arr.unbounded);
            arr.assign_face(cycle.start, host)?;
            arr.faces[host].holes.push(cycle.start);
        }

        // A face is outside the footprint when a footprint edge has the
        // exterior on its left
        let bounded: Vec<FaceKey> = outer_faces.iter().map(|(_, f)| *f).collect();
        for face in bounded {
            let mut inside = true;
            for start in arr.face_cycles(face)? {
                for h in arr.cycle(start)? {
                    if arr.half_edges[h].footprint_interior_left == Some(false) {
                        inside = false;
                    }
                }
            }
            arr.faces[face].info.in_footprint = inside;
        }

        Ok((arr, pairs))
    }

    /// Outer cycle (if any) followed by the hole cycles of a face
    pub fn face_cycles(&self, face: FaceKey) -> Result<Vec<HalfEdgeKey>> {
        let data = self.face(face)?;
        Ok(data.outer.iter().chain(data.holes.iter()).copied().collect())
    }

    fn vertex_for(
        &mut self,
        vertex_of: &mut BTreeMap<GridPoint, VertexKey>,
        vertex_index: &mut SecondaryMap<VertexKey, usize>,
        point: GridPoint,
    ) -> VertexKey {
        if let Some(&v) = vertex_of.get(&point) {
            return v;
        }
        let v = self.vertices.insert(VertexData {
            point,
            incident: HalfEdgeKey::default(),
        });
        vertex_index.insert(v, vertex_of.len());
        vertex_of.insert(point, v);
        v
    }

    fn assign_face(&mut self, start: HalfEdgeKey, face: FaceKey) -> Result<()> {
        for h in self.cycle(start)? {
            self.half_edges[h].face = face;
        }
        Ok(())
    }

    /// Pieces of every edge, with the faces on either side
    pub(crate) fn pieces(&self) -> Result<Vec<Piece>> {
        let mut pieces = Vec::with_capacity(self.half_edges.len() / 2);
        for (h, data) in &self.half_edges {
            if h > data.twin {
                continue;
            }
            let twin = self.half_edge(data.twin)?;
            pieces.push(Piece {
                segment: GridSegment::new(self.point(data.origin)?, self.point(twin.origin)?),
                footprint_interior_left: data.footprint_interior_left,
                sides: (data.face, twin.face),
            });
        }
        Ok(pieces)
    }

    /// Map every bounded face back to the face it was part of in the
    /// arrangement the pieces were taken from, through their `sides`.
    pub(crate) fn source_faces(
        &self,
        pieces: &[Piece],
        pairs: &[[HalfEdgeKey; 2]],
    ) -> Result<FxHashMap<FaceKey, FaceKey>> {
        let mut origin_of: SecondaryMap<HalfEdgeKey, (usize, bool)> = SecondaryMap::new();
        for (i, [h, t]) in pairs.iter().enumerate() {
            origin_of.insert(*h, (i, true));
            origin_of.insert(*t, (i, false));
        }
        let mut map = FxHashMap::default();
        for (face, data) in &self.faces {
            let Some(outer) = data.outer else {
                continue;
            };
            let (i, forward) = origin_of
                .get(outer)
                .copied()
                .ok_or(Error::HalfEdgeNotFound(outer))?;
            let sides = pieces[i].sides;
            map.insert(face, if forward { sides.0 } else { sides.1 });
        }
        Ok(map)
    }
}

/// Snap footprint rings to the grid, outer counter-clockwise and holes
/// clockwise. Holes that collapse on the grid are dropped.
fn snap_footprint(footprint: &LinearRing) -> Result<Vec<Vec<GridPoint>>> {
    let oriented = footprint.oriented();
    let mut rings = Vec::new();
    for (i, ring) in oriented.rings().enumerate() {
        let mut grid: Vec<GridPoint> = Vec::with_capacity(ring.len());
        for p in ring {
            let g = GridPoint::from_point(p)?;
            if grid.last() != Some(&g) {
                grid.push(g);
            }
        }
        while grid.len() > 1 && grid.first() == grid.last() {
            grid.pop();
        }
        let area2 = ring_area2(&grid);
        if i == 0 {
            if grid.len() < 3 || area2 <= 0 {
                return Err(Error::DegenerateFootprint(
                    "outer ring collapses on the grid".to_string(),
                ));
            }
        } else {
            if grid.len() < 3 || area2 == 0 {
                continue;
            }
            if area2 > 0 {
                grid.reverse();
            }
        }
        rings.push(grid);
    }
    Ok(rings)
}

/// Split all pieces at their mutual intersections and drop duplicates
fn split_all(pieces: Vec<Piece>) -> Result<Vec<Piece>> {
    let mut pieces = dedup(pieces);
    for _ in 0..MAX_SPLIT_PASSES {
        let mut splits: Vec<SplitPoints> = vec![SplitPoints::new(); pieces.len()];
        let mut any = false;
        for i in 0..pieces.len() {
            for j in (i + 1)..pieces.len() {
                let (s, t) = (&pieces[i].segment, &pieces[j].segment);
                if !boxes_overlap(s, t) {
                    continue;
                }
                let (on_s, on_t) = split_points(s, t);
                any |= !on_s.is_empty() || !on_t.is_empty();
                splits[i].extend(on_s);
                splits[j].extend(on_t);
            }
        }
        if !any {
            return Ok(pieces);
        }

        let mut next = Vec::with_capacity(pieces.len() * 2);
        for (piece, mut points) in pieces.into_iter().zip(splits) {
            let segment = piece.segment;
            points.sort_by(|a, b| {
                projection(&segment, *a)
                    .cmp(&projection(&segment, *b))
                    .then(a.cmp(b))
            });
            points.dedup();
            let mut start = segment.source;
            for p in points.into_iter().chain(std::iter::once(segment.target)) {
                if p != start {
                    next.push(Piece {
                        segment: GridSegment::new(start, p),
                        ..piece
                    });
                    start = p;
                }
            }
        }
        pieces = dedup(next);
    }
    Err(Error::Inconsistent(
        "segment splitting did not converge".to_string(),
    ))
}

fn boxes_overlap(s: &GridSegment, t: &GridSegment) -> bool {
    let (s0, s1) = (s.source, s.target);
    let (t0, t1) = (t.source, t.target);
    s0.x.max(s1.x) >= t0.x.min(t1.x)
        && t0.x.max(t1.x) >= s0.x.min(s1.x)
        && s0.y.max(s1.y) >= t0.y.min(t1.y)
        && t0.y.max(t1.y) >= s0.y.min(s1.y)
}

/// Remove zero-length and repeated pieces; a footprint flag wins over a
/// roof line covering the same edge
fn dedup(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut unique: BTreeMap<GridSegment, Option<bool>> = BTreeMap::new();
    for piece in pieces {
        if piece.segment.is_degenerate() {
            continue;
        }
        let (segment, flipped) = piece.segment.normalized();
        let flag = piece.footprint_interior_left.map(|inside| inside != flipped);
        let entry = unique.entry(segment).or_insert(None);
        if entry.is_none() {
            *entry = flag;
        }
    }
    unique
        .into_iter()
        .map(|(segment, flag)| Piece::new(segment, flag))
        .collect()
}

/// Even-odd test of a segment midpoint against all footprint rings
fn midpoint_inside(rings: &[Vec<GridPoint>], segment: &GridSegment) -> bool {
    let doubled = GridPoint::new(
        segment.source.x + segment.target.x,
        segment.source.y + segment.target.y,
    );
    rings
        .iter()
        .filter(|ring| ring_contains_scaled(ring, 2, doubled))
        .count()
        % 2
        == 1
}

/// Repeatedly drop roof line pieces with a free endpoint
pub(crate) fn prune_dangling(mut pieces: Vec<Piece>) -> Vec<Piece> {
    loop {
        let mut degree: FxHashMap<GridPoint, usize> = FxHashMap::default();
        for p in &pieces {
            *degree.entry(p.segment.source).or_insert(0) += 1;
            *degree.entry(p.segment.target).or_insert(0) += 1;
        }
        let before = pieces.len();
        pieces.retain(|p| {
            p.is_footprint()
                || (degree.get(&p.segment.source).copied().unwrap_or(0) > 1
                    && degree.get(&p.segment.target).copied().unwrap_or(0) > 1)
        });
        if pieces.len() == before {
            return pieces;
        }
    }
}
