use earcutr::earcut;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::geom::{OUTLINE_SCALE, Point, Point3};
use crate::layout::WedgeArc;
use crate::outline::WedgeOutline;
use crate::slice::{Slice, SliceColor};

/// How far an exploded wedge moves away from the center, in world units.
pub const EXPLOSION_MAGNITUDE: f64 = 0.2;

/// A wedge outline lifted into a solid and positioned in the world.
///
/// The top face sits at the group origin `base_position`; the solid extends `extrude_depth`
/// downward from there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedSolid {
    pub index: usize,
    #[serde(skip)]
    pub outline: WedgeOutline,
    pub extrude_depth: f64,
    pub base_position: Point3,
    pub color: SliceColor,
    pub percentage: f64,
}

/// Positions the solid for one wedge.
///
/// `total_value` must be the sum over the arcs of the same layout, so percentages of every
/// displayed wedge add up to one.
pub fn place(
    outline: &WedgeOutline,
    arc: &WedgeArc,
    slice: &Slice,
    total_value: f64,
) -> PositionedSolid {
    let (x, z) = if slice.exploded {
        let dir = arc.direction();
        (dir.x * EXPLOSION_MAGNITUDE, dir.y * EXPLOSION_MAGNITUDE)
    } else {
        (0.0, 0.0)
    };

    let percentage = if total_value > 0.0 {
        arc.value / total_value
    } else {
        0.0
    };

    PositionedSolid {
        index: arc.source_index,
        outline: outline.clone(),
        extrude_depth: slice.height,
        base_position: Point3::new(x, slice.height + slice.offset, z),
        color: slice.color,
        percentage,
    }
}

/// Triangle soup in world space, counter-clockwise when seen from outside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push_vertex(&mut self, p: Point3, n: Point3) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push([p.x as f32, p.y as f32, p.z as f32]);
        self.normals.push([n.x as f32, n.y as f32, n.z as f32]);
        index
    }
}

impl PositionedSolid {
    /// Outline point at local height `y`, in world space.
    fn lift(&self, p: Point, y: f64) -> Point3 {
        Point3::new(
            self.base_position.x + p.x * OUTLINE_SCALE,
            self.base_position.y + y,
            self.base_position.z + p.y * OUTLINE_SCALE,
        )
    }

    /// Extrudes the outline into a closed mesh.
    pub fn mesh(&self, segments_per_turn: usize) -> Result<Mesh, GeometryError> {
        let rings = self.outline.flatten(segments_per_turn);
        let mut mesh = Mesh::default();
        if rings.is_empty() {
            return Ok(mesh);
        }

        let points: Vec<Point> = rings.iter().flatten().copied().collect();
        let cap = self.triangulate_cap(&rings, &points)?;
        let depth = self.extrude_depth;

        // Outline x/y map to world x/z, so increasing chart angle turns clockwise seen from
        // above. Flip the cap winding on top to face +y.
        for (y, normal, flip) in [
            (0.0, Point3::new(0.0, 1.0, 0.0), true),
            (-depth, Point3::new(0.0, -1.0, 0.0), false),
        ] {
            let base = mesh.positions.len() as u32;
            for p in &points {
                mesh.push_vertex(self.lift(*p, y), normal);
            }
            for tri in cap.chunks_exact(3) {
                let (a, b, c) = (tri[0] as u32, tri[1] as u32, tri[2] as u32);
                if flip {
                    mesh.indices.extend_from_slice(&[base + a, base + c, base + b]);
                } else {
                    mesh.indices.extend_from_slice(&[base + a, base + b, base + c]);
                }
            }
        }

        for ring in &rings {
            for (p, q) in ring.iter().zip(ring.iter().cycle().skip(1)) {
                let Some(normal) = wall_normal(*p, *q) else {
                    continue;
                };
                let top_p = mesh.push_vertex(self.lift(*p, 0.0), normal);
                let top_q = mesh.push_vertex(self.lift(*q, 0.0), normal);
                let bot_p = mesh.push_vertex(self.lift(*p, -depth), normal);
                let bot_q = mesh.push_vertex(self.lift(*q, -depth), normal);
                mesh.indices
                    .extend_from_slice(&[top_p, bot_p, top_q, top_q, bot_p, bot_q]);
            }
        }

        Ok(mesh)
    }

    /// Cap triangles as indices into `points`, each counter-clockwise in outline space.
    fn triangulate_cap(
        &self,
        rings: &[Vec<Point>],
        points: &[Point],
    ) -> Result<Vec<usize>, GeometryError> {
        let mut coords = Vec::with_capacity(rings.iter().map(Vec::len).sum::<usize>() * 2);
        let mut holes = Vec::new();
        for (i, ring) in rings.iter().enumerate() {
            if i > 0 {
                holes.push(coords.len() / 2);
            }
            coords.extend(ring.iter().flat_map(|p| [p.x, p.y]));
        }

        let mut indices = earcut(&coords, &holes, 2).map_err(|e| GeometryError::Triangulation {
            index: self.index,
            reason: format!("{e:?}"),
        })?;

        for tri in indices.chunks_exact_mut(3) {
            let (a, b, c) = (points[tri[0]], points[tri[1]], points[tri[2]]);
            if (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x) < 0.0 {
                tri.swap(1, 2);
            }
        }
        Ok(indices)
    }
}

/// Outward normal of the wall between consecutive boundary points.
fn wall_normal(p: Point, q: Point) -> Option<Point3> {
    // boundary runs counter-clockwise in outline space, so outward is to the right of travel
    // with y mapped onto world z
    Point3::new(q.y - p.y, 0.0, -(q.x - p.x)).normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout;
    use approx::assert_relative_eq;

    fn solid(exploded: bool) -> (PositionedSolid, WedgeArc) {
        let arcs = layout(&[1.0, 3.0], 0.0).unwrap();
        let outline = WedgeOutline::new(&arcs[1], 20.0, 100.0, 5.0);
        let slice = Slice::new(3.0, SliceColor::rgb(1, 2, 3))
            .with_height(0.75)
            .with_offset(0.25)
            .exploded(exploded);
        (place(&outline, &arcs[1], &slice, 4.0), arcs[1])
    }

    #[test]
    fn test_stacks_by_height_plus_offset() {
        let (solid, _) = solid(false);
        assert_eq!(solid.base_position, Point3::new(0.0, 1.0, 0.0));
        assert_eq!(solid.extrude_depth, 0.75);
        assert_relative_eq!(solid.percentage, 0.75);
        assert_eq!(solid.index, 1);
    }

    #[test]
    fn test_explode_only_moves_horizontally() {
        let (flat, _) = solid(false);
        let (exploded, arc) = solid(true);

        assert_eq!(flat.extrude_depth, exploded.extrude_depth);
        assert_eq!(flat.color, exploded.color);
        assert_eq!(flat.base_position.y, exploded.base_position.y);

        let shift = exploded.base_position.sub(flat.base_position);
        assert_relative_eq!(shift.x.hypot(shift.z), EXPLOSION_MAGNITUDE, epsilon = 1e-12);

        // away from the center: same direction as the wedge centroid
        let c = arc.direction();
        assert!(shift.x * c.x + shift.z * c.y > 0.0);
    }

    #[test]
    fn test_mesh_spans_the_extruded_depth() {
        let (solid, _) = solid(false);
        let mesh = solid.mesh(128).unwrap();
        assert!(mesh.triangle_count() > 0);
        assert_eq!(mesh.positions.len(), mesh.normals.len());

        let ys: Vec<f32> = mesh.positions.iter().map(|p| p[1]).collect();
        let top = ys.iter().cloned().fold(f32::MIN, f32::max);
        let bottom = ys.iter().cloned().fold(f32::MAX, f32::min);
        assert_relative_eq!(top, 1.0, epsilon = 1e-6);
        assert_relative_eq!(bottom, 0.25, epsilon = 1e-6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
    }

    #[test]
    fn test_annulus_cap_has_a_hole() {
        let arcs = layout(&[1.0], 0.0).unwrap();
        let outline = WedgeOutline::new(&arcs[0], 50.0, 100.0, 0.0);
        let slice = Slice::new(1.0, SliceColor::default());
        let solid = place(&outline, &arcs[0], &slice, 1.0);
        let mesh = solid.mesh(64).unwrap();

        // no vertex of the cap falls inside the hole
        let inside_hole = mesh.positions.iter().any(|p| {
            let r = (p[0] as f64).hypot(p[2] as f64) / OUTLINE_SCALE;
            r < 50.0 * 0.99
        });
        assert!(!inside_hole);
        assert!(mesh.triangle_count() > 0);
    }

    #[test]
    fn test_empty_wedge_has_empty_mesh() {
        let arcs = layout(&[1.0, 0.0], 0.0).unwrap();
        let outline = WedgeOutline::new(&arcs[1], 0.0, 100.0, 0.0);
        let solid = place(&outline, &arcs[1], &Slice::new(0.0, SliceColor::default()), 1.0);
        assert_eq!(solid.mesh(64).unwrap().triangle_count(), 0);
        assert_eq!(solid.percentage, 0.0);
    }
}
