use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::error::GeometryError;
use crate::geom::{Point, bisector};

/// The angular span assigned to one wedge. Angles exclude the padding gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WedgeArc {
    pub start_angle: f64,
    pub end_angle: f64,
    pub value: f64,
    pub source_index: usize,
}

impl WedgeArc {
    pub fn span(&self) -> f64 {
        self.end_angle - self.start_angle
    }

    pub fn mid_angle(&self) -> f64 {
        (self.start_angle + self.end_angle) / 2.0
    }

    /// Unit vector from the chart center through the middle of the wedge.
    pub fn direction(&self) -> Point {
        bisector(self.start_angle, self.end_angle)
    }
}

/// Partitions the full circle among `values`, in input order.
///
/// There is one gap of `pad_angle` per wedge boundary, the wraparound included, and each wedge
/// sits centered between its two half gaps. The first wedge therefore starts at `pad_angle / 2`.
pub fn layout(values: &[f64], pad_angle: f64) -> Result<Vec<WedgeArc>, GeometryError> {
    if values.is_empty() {
        return Err(GeometryError::invalid("a chart needs at least one slice"));
    }
    if let Some((i, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(GeometryError::invalid(format!(
            "slice {i} has value {v}; values must be finite and non-negative"
        )));
    }
    if !pad_angle.is_finite() || pad_angle < 0.0 {
        return Err(GeometryError::invalid(format!(
            "pad angle must be non-negative, got {pad_angle}"
        )));
    }

    let n = values.len() as f64;
    let available = TAU - n * pad_angle;
    if available <= 0.0 {
        return Err(GeometryError::invalid(format!(
            "pad angle {pad_angle} leaves no room for {} wedges",
            values.len()
        )));
    }

    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(GeometryError::DegenerateInput);
    }

    let k = available / total;
    let mut cursor = 0.0;
    let arcs = values
        .iter()
        .enumerate()
        .map(|(source_index, &value)| {
            let start_angle = cursor + pad_angle / 2.0;
            let end_angle = start_angle + value * k;
            cursor = end_angle + pad_angle / 2.0;
            WedgeArc {
                start_angle,
                end_angle,
                value,
                source_index,
            }
        })
        .collect();

    Ok(arcs)
}

pub fn total_value(arcs: &[WedgeArc]) -> f64 {
    arcs.iter().map(|a| a.value).sum()
}
