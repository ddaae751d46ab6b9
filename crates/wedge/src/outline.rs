use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::geom::Point;
use crate::layout::WedgeArc;

/// Arc resolution used when a wedge is flattened for extrusion.
pub const DEFAULT_SEGMENTS_PER_TURN: usize = 256;

const EPSILON: f64 = 1e-9;

/// One piece of a wedge boundary.
///
/// Arc angles follow the chart convention (0 at 12 o'clock, clockwise) around `center`. An arc
/// runs from `start` to `end` in whichever direction their order implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Line {
        from: Point,
        to: Point,
    },
    Arc {
        center: Point,
        radius: f64,
        start: f64,
        end: f64,
    },
}

impl Segment {
    fn arc(center: Point, radius: f64, start: f64, end: f64) -> Self {
        Self::Arc {
            center,
            radius,
            start,
            end,
        }
    }

    pub fn start_point(&self) -> Point {
        match *self {
            Self::Line { from, .. } => from,
            Self::Arc {
                center,
                radius,
                start,
                ..
            } => offset(center, radius, start),
        }
    }

    pub fn end_point(&self) -> Point {
        match *self {
            Self::Line { to, .. } => to,
            Self::Arc {
                center,
                radius,
                end,
                ..
            } => offset(center, radius, end),
        }
    }

    /// Points from the start of the segment up to, but excluding, its end.
    fn flatten_into(&self, segments_per_turn: usize, out: &mut Vec<Point>) {
        match *self {
            Self::Line { from, .. } => out.push(from),
            Self::Arc {
                center,
                radius,
                start,
                end,
            } => {
                let sweep = end - start;
                let steps = ((sweep.abs() / TAU) * segments_per_turn as f64).ceil().max(1.0) as usize;
                out.extend(
                    (0..steps)
                        .map(|i| start + sweep * i as f64 / steps as f64)
                        .map(|angle| offset(center, radius, angle)),
                );
            }
        }
    }
}

fn offset(center: Point, radius: f64, angle: f64) -> Point {
    let p = Point::polar(radius, angle);
    Point::new(center.x + p.x, center.y + p.y)
}

/// Closed 2D boundary of one wedge, in outline units.
///
/// `boundary` runs with increasing angle along the outer edge. `hole` is only present for a
/// single donut wedge that covers the whole circle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WedgeOutline {
    pub source_index: usize,
    pub boundary: Vec<Segment>,
    pub hole: Option<Vec<Segment>>,
    pub outer_corner_radius: f64,
    pub inner_corner_radius: f64,
}

impl WedgeOutline {
    /// Builds the annular sector for `arc`.
    ///
    /// Radii and angles are assumed validated. The corner radius is clamped per boundary so it
    /// never exceeds half the radial thickness, half the arc length of that boundary, or the
    /// largest circle that still fits between the two radial edges.
    pub fn new(arc: &WedgeArc, inner: f64, outer: f64, corner_radius: f64) -> Self {
        let (a0, a1) = (arc.start_angle, arc.end_angle);
        let span = a1 - a0;

        if span <= EPSILON {
            return Self::empty(arc.source_index);
        }
        if span >= TAU - EPSILON {
            return Self::full_ring(arc.source_index, inner, outer);
        }

        let half_sin = if span >= PI { 1.0 } else { (span / 2.0).sin() };
        let thickness_limit = (outer - inner) / 2.0;

        let rc1 = corner_radius
            .min(thickness_limit)
            .min(outer * span / 2.0)
            .min(outer * half_sin / (1.0 + half_sin))
            .max(0.0);

        let rc0 = if inner > EPSILON {
            let fit = if half_sin < 1.0 {
                inner * half_sin / (1.0 - half_sin)
            } else {
                f64::INFINITY
            };
            corner_radius
                .min(thickness_limit)
                .min(inner * span / 2.0)
                .min(fit)
                .max(0.0)
        } else {
            0.0
        };

        let mut boundary = Vec::with_capacity(8);

        // outer edge, start corner to end corner
        if rc1 > EPSILON {
            let d1 = (rc1 / (outer - rc1)).asin();
            let c_start = Point::polar(outer - rc1, a0 + d1);
            let c_end = Point::polar(outer - rc1, a1 - d1);
            boundary.push(Segment::arc(c_start, rc1, a0 - FRAC_PI_2, a0 + d1));
            boundary.push(Segment::arc(Point::default(), outer, a0 + d1, a1 - d1));
            boundary.push(Segment::arc(c_end, rc1, a1 - d1, a1 + FRAC_PI_2));
        } else {
            boundary.push(Segment::arc(Point::default(), outer, a0, a1));
        }

        // inner edge, end corner back to start corner
        if inner > EPSILON {
            if rc0 > EPSILON {
                let d0 = (rc0 / (inner + rc0)).asin();
                let c_end = Point::polar(inner + rc0, a1 - d0);
                let c_start = Point::polar(inner + rc0, a0 + d0);
                push_line_to(&mut boundary, offset(c_end, rc0, a1 + FRAC_PI_2));
                boundary.push(Segment::arc(c_end, rc0, a1 + FRAC_PI_2, a1 - d0 + PI));
                boundary.push(Segment::arc(Point::default(), inner, a1 - d0, a0 + d0));
                boundary.push(Segment::arc(c_start, rc0, a0 + d0 + PI, a0 + 3.0 * FRAC_PI_2));
            } else {
                push_line_to(&mut boundary, Point::polar(inner, a1));
                boundary.push(Segment::arc(Point::default(), inner, a1, a0));
            }
        } else {
            push_line_to(&mut boundary, Point::default());
        }

        let first = boundary[0].start_point();
        push_line_to(&mut boundary, first);

        Self {
            source_index: arc.source_index,
            boundary,
            hole: None,
            outer_corner_radius: rc1,
            inner_corner_radius: rc0,
        }
    }

    fn empty(source_index: usize) -> Self {
        Self {
            source_index,
            boundary: Vec::new(),
            hole: None,
            outer_corner_radius: 0.0,
            inner_corner_radius: 0.0,
        }
    }

    fn full_ring(source_index: usize, inner: f64, outer: f64) -> Self {
        Self {
            source_index,
            boundary: vec![Segment::arc(Point::default(), outer, 0.0, TAU)],
            hole: (inner > EPSILON)
                .then(|| vec![Segment::arc(Point::default(), inner, TAU, 0.0)]),
            outer_corner_radius: 0.0,
            inner_corner_radius: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boundary.is_empty()
    }

    /// Polylines for the boundary and, if any, the hole. Closing points are not repeated.
    pub fn flatten(&self, segments_per_turn: usize) -> Vec<Vec<Point>> {
        std::iter::once(&self.boundary)
            .chain(self.hole.as_ref())
            .filter(|ring| !ring.is_empty())
            .map(|ring| flatten_ring(ring, segments_per_turn))
            .filter(|ring| ring.len() >= 3)
            .collect()
    }

    /// Enclosed area, hole excluded.
    pub fn area(&self, segments_per_turn: usize) -> f64 {
        self.flatten(segments_per_turn)
            .iter()
            .map(|ring| signed_area(ring))
            .sum::<f64>()
            .abs()
    }

    /// Area centroid, or `None` for an empty wedge.
    pub fn centroid(&self, segments_per_turn: usize) -> Option<Point> {
        let (mut area, mut cx, mut cy) = (0.0, 0.0, 0.0);
        for ring in self.flatten(segments_per_turn) {
            for (p, q) in ring.iter().zip(ring.iter().cycle().skip(1)) {
                let cross = p.x * q.y - q.x * p.y;
                area += cross / 2.0;
                cx += (p.x + q.x) * cross;
                cy += (p.y + q.y) * cross;
            }
        }
        (area.abs() > EPSILON).then(|| Point::new(cx / (6.0 * area), cy / (6.0 * area)))
    }
}

fn push_line_to(boundary: &mut Vec<Segment>, to: Point) {
    if let Some(from) = boundary.last().map(Segment::end_point)
        && from.distance(to) > EPSILON
    {
        boundary.push(Segment::Line { from, to });
    }
}

fn flatten_ring(ring: &[Segment], segments_per_turn: usize) -> Vec<Point> {
    let mut points = Vec::new();
    for segment in ring {
        segment.flatten_into(segments_per_turn, &mut points);
    }
    points.dedup_by(|a, b| a.distance(*b) <= EPSILON);
    if points.len() >= 2 && points[0].distance(points[points.len() - 1]) <= EPSILON {
        points.pop();
    }
    points
}

/// Shoelace area; positive when the ring runs with increasing chart angle.
pub fn signed_area(ring: &[Point]) -> f64 {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(p, q)| p.x * q.y - q.x * p.y)
        .sum::<f64>()
        / 2.0
}
