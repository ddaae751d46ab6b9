use serde::Serialize;

use crate::error::GeometryError;
use crate::extrude::{PositionedSolid, place};
use crate::layout::{WedgeArc, layout, total_value};
use crate::outline::WedgeOutline;
use crate::slice::{ChartGeometry, Slice};

/// Outlines and arcs for every slice, index-aligned with the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pie {
    pub arcs: Vec<WedgeArc>,
    pub outlines: Vec<WedgeOutline>,
}

/// Lays out `slices` and builds one outline per wedge.
pub fn build(slices: &[Slice], geometry: &ChartGeometry) -> Result<Pie, GeometryError> {
    let values: Vec<f64> = slices.iter().map(|s| s.value).collect();
    build_from_values(&values, geometry)
}

/// Same as [`build`], for callers that only track values.
pub fn build_from_values(values: &[f64], geometry: &ChartGeometry) -> Result<Pie, GeometryError> {
    geometry.validate(values.len())?;
    let arcs = layout(values, geometry.pad_angle)?;
    let outlines = arcs
        .iter()
        .map(|arc| {
            WedgeOutline::new(
                arc,
                geometry.inner_radius,
                geometry.outer_radius,
                geometry.corner_radius,
            )
        })
        .collect();

    log::trace!("built {} wedge outlines", values.len());
    Ok(Pie { arcs, outlines })
}

impl Pie {
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        total_value(&self.arcs)
    }

    /// Share of the wedge at `index`, computed from this layout's own arcs.
    pub fn percentage(&self, index: usize) -> Option<f64> {
        let total = self.total_value();
        self.arcs
            .get(index)
            .map(|arc| if total > 0.0 { arc.value / total } else { 0.0 })
    }

    /// Positions every wedge using `slices` for height, offset, explode and color.
    ///
    /// Wedges without a matching slice are skipped.
    pub fn place_all(&self, slices: &[Slice]) -> Vec<PositionedSolid> {
        let total = self.total_value();
        self.arcs
            .iter()
            .zip(&self.outlines)
            .filter_map(|(arc, outline)| {
                slices
                    .get(arc.source_index)
                    .map(|slice| place(outline, arc, slice, total))
            })
            .collect()
    }
}
