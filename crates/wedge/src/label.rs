use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::geom::{OUTLINE_SCALE, Point3, Rotation};
use crate::layout::WedgeArc;

/// Height of a label above the top face of its wedge, in world units.
pub const LABEL_LIFT: f64 = 0.125;

/// Anchor for a wedge's value label, relative to the wedge's base position.
///
/// `fraction` interpolates between the inner (0) and outer (1) radius along the bisector.
pub fn label_anchor(arc: &WedgeArc, inner: f64, outer: f64, fraction: f64) -> Point3 {
    let theta = arc.mid_angle() - FRAC_PI_2;
    let distance = (fraction * (outer - inner) + inner) * OUTLINE_SCALE;
    Point3::new(theta.cos() * distance, LABEL_LIFT, theta.sin() * distance)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisLock {
    #[serde(default)]
    pub x: bool,
    #[serde(default)]
    pub y: bool,
    #[serde(default)]
    pub z: bool,
}

impl AxisLock {
    pub const NONE: Self = Self {
        x: false,
        y: false,
        z: false,
    };
}

/// Rotation that turns an object's +Z axis toward `camera`, with +Y as up.
///
/// Locked axes stay at their rest angle of zero.
pub fn billboard_rotation(camera: Point3, object: Point3, locked: AxisLock) -> Rotation {
    let up = Point3::new(0.0, 1.0, 0.0);
    let Some(mut z) = camera.sub(object).normalized() else {
        return Rotation::default();
    };

    let mut x = up.cross(z);
    if x.length() <= f64::EPSILON {
        // looking straight up or down; nudge off the pole
        z.z += 1e-4;
        z = z.normalized().unwrap_or(z);
        x = up.cross(z);
    }
    let x = x.normalized().unwrap_or(Point3::new(1.0, 0.0, 0.0));
    let y = z.cross(x);

    // matrix columns are x, y, z; decompose as XYZ Euler angles
    let (m11, m12, m13) = (x.x, y.x, z.x);
    let (m22, m23) = (y.y, z.y);
    let (m32, m33) = (y.z, z.z);

    let ry = m13.clamp(-1.0, 1.0).asin();
    let (rx, rz) = if m13.abs() < 0.999_999_9 {
        ((-m23).atan2(m33), (-m12).atan2(m11))
    } else {
        (m32.atan2(m22), 0.0)
    };

    Rotation::new(
        if locked.x { 0.0 } else { rx },
        if locked.y { 0.0 } else { ry },
        if locked.z { 0.0 } else { rz },
    )
}

/// `0.4213` becomes `"42%"`.
pub fn format_percentage(fraction: f64) -> String {
    format!("{}%", (fraction * 100.0).round() as i64)
}

/// Plain value with at most two decimals and no trailing zeros.
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0 + 0.0;
    format!("{rounded}")
}
