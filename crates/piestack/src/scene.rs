use serde::Serialize;
use wedge::{
    AxisLock, GeometryError, Mesh, Point3, PositionedSolid, Rotation, Slice, SliceColor,
    SliceLabel, billboard_rotation, format_percentage, format_value, label_anchor,
};

use crate::motion::SliceMotion;
use crate::params::Presentation;
use crate::resolver::{Generation, ResolvedFrame};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelNode {
    /// Relative to the owning slice's position.
    pub anchor: Point3,
    pub rotation: Rotation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<SliceLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSlice {
    /// Click handle: pass it back to toggle the wedge.
    pub index: usize,
    pub color: SliceColor,
    pub value: f64,
    pub percentage: f64,
    pub position: Point3,
    pub depth: f64,
    pub label: LabelNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<Mesh>,
}

/// Scene graph for one rendered frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub generation: Generation,
    /// Set while newer outlines are still loading.
    pub stale: bool,
    pub rotation_y: f64,
    pub camera: Point3,
    pub environment_map: Option<&'static str>,
    pub presentation: Presentation,
    pub slices: Vec<SceneSlice>,
}

/// Positions every wedge of `frame`.
///
/// Height, offset, explode and color come from `current` when it has a slice at that index,
/// so placement follows edits that do not need new outlines. Otherwise the frame's own
/// snapshot is used.
pub fn place_frame(frame: &ResolvedFrame, current: &[Slice]) -> Vec<PositionedSolid> {
    let total = frame.total_value();
    frame
        .arcs
        .iter()
        .zip(&frame.outlines)
        .zip(&frame.slices)
        .map(|((arc, outline), snapshot)| {
            let slice = current.get(arc.source_index).unwrap_or(snapshot);
            wedge::place(outline, arc, slice, total)
        })
        .collect()
}

/// Rotates `p` about the vertical axis by `angle`, the way a parent group's `rotation.y`
/// would.
pub fn rotate_y(p: Point3, angle: f64) -> Point3 {
    let (sin, cos) = angle.sin_cos();
    Point3::new(p.x * cos + p.z * sin, p.y, -p.x * sin + p.z * cos)
}

pub struct SceneBuilder<'a> {
    pub frame: &'a ResolvedFrame,
    pub current: &'a [Slice],
    pub presentation: &'a Presentation,
    pub label_position: f64,
    pub rotation_y: f64,
    pub stale: bool,
    pub segments_per_turn: Option<usize>,
}

impl SceneBuilder<'_> {
    /// Assembles the scene from placed solids and their animated state.
    pub fn build(
        &self,
        solids: &[PositionedSolid],
        motions: &[SliceMotion],
    ) -> Result<Scene, GeometryError> {
        let p = self.presentation;
        // the chart group is spun by the turntable; labels face the camera in its frame
        let camera = rotate_y(p.camera, -self.rotation_y);

        let slices = solids
            .iter()
            .zip(motions)
            .map(|(solid, motion)| self.slice(solid, motion, camera))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scene {
            generation: self.frame.generation,
            stale: self.stale,
            rotation_y: self.rotation_y,
            camera: p.camera,
            environment_map: p.lighting.environment.hdr_file(),
            presentation: p.clone(),
            slices,
        })
    }

    fn slice(
        &self,
        solid: &PositionedSolid,
        motion: &SliceMotion,
        camera: Point3,
    ) -> Result<SceneSlice, GeometryError> {
        let arc = &self.frame.arcs[solid.index];
        let geometry = &self.frame.geometry;
        let position = motion.position();
        let depth = motion.depth();

        let text = self.presentation.show_values.then(|| {
            if self.presentation.values_as_percent {
                format_percentage(solid.percentage)
            } else {
                format_value(arc.value)
            }
        });
        let caption = self
            .current
            .get(solid.index)
            .or_else(|| self.frame.slices.get(solid.index))
            .and_then(|s| s.caption().cloned());

        let label = LabelNode {
            anchor: label_anchor(
                arc,
                geometry.inner_radius,
                geometry.outer_radius,
                self.label_position,
            ),
            rotation: billboard_rotation(camera, position, AxisLock::NONE),
            text,
            caption,
        };

        let mesh = self
            .segments_per_turn
            .map(|segments| {
                PositionedSolid {
                    base_position: Point3::ORIGIN,
                    extrude_depth: depth,
                    ..solid.clone()
                }
                .mesh(segments)
            })
            .transpose()?;

        Ok(SceneSlice {
            index: solid.index,
            color: solid.color,
            value: arc.value,
            percentage: solid.percentage,
            position,
            depth,
            label,
            mesh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::SpringConfig;
    use crate::resolver::{OutlineRequest, Resolver};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;
    use wedge::{ChartGeometry, LABEL_LIFT};

    fn slices() -> Vec<Slice> {
        vec![
            Slice::new(3.0, SliceColor::rgb(255, 0, 0)).with_label("Big"),
            Slice::new(1.0, SliceColor::rgb(0, 0, 255)),
        ]
    }

    async fn frame(slices: Vec<Slice>) -> std::sync::Arc<ResolvedFrame> {
        let mut resolver = Resolver::default();
        resolver
            .request(OutlineRequest::new(slices, ChartGeometry::new(0.0, 100.0, 0.0, 0.0)))
            .unwrap();
        resolver.first_frame().await.unwrap()
    }

    fn build(frame: &ResolvedFrame, current: &[Slice], presentation: &Presentation) -> Scene {
        let solids = place_frame(frame, current);
        let motions: Vec<SliceMotion> = solids
            .iter()
            .map(|s| SliceMotion::new(s, SpringConfig::WOBBLY))
            .collect();
        SceneBuilder {
            frame,
            current,
            presentation,
            label_position: 0.5,
            rotation_y: 0.0,
            stale: false,
            segments_per_turn: Some(64),
        }
        .build(&solids, &motions)
        .unwrap()
    }

    #[test]
    fn test_rotate_y_matches_a_quarter_turn() {
        let p = rotate_y(Point3::new(1.0, 2.0, 0.0), FRAC_PI_2);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 2.0);
        assert_abs_diff_eq!(p.z, -1.0, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_labels_carry_percentages_and_captions() {
        let frame = frame(slices()).await;
        let scene = build(&frame, &frame.slices, &Presentation::default());

        assert_eq!(scene.slices.len(), 2);
        assert_eq!(scene.slices[0].label.text.as_deref(), Some("75%"));
        assert_eq!(scene.slices[1].label.text.as_deref(), Some("25%"));
        assert_eq!(
            scene.slices[0].label.caption.as_ref().map(|c| c.as_str()),
            Some("Big")
        );
        assert_eq!(scene.slices[1].label.caption, None);
        assert_eq!(scene.slices[0].label.anchor.y, LABEL_LIFT);
        assert_eq!(scene.environment_map, Some("dikhololo_night_1k.hdr"));
        assert!(scene.slices.iter().all(|s| s.mesh.is_some()));
    }

    #[tokio::test]
    async fn test_labels_follow_presentation_toggles() {
        let frame = frame(slices()).await;
        let mut presentation = Presentation::default();
        presentation.values_as_percent = false;
        let scene = build(&frame, &frame.slices, &presentation);
        assert_eq!(scene.slices[0].label.text.as_deref(), Some("3"));

        presentation.show_values = false;
        let scene = build(&frame, &frame.slices, &presentation);
        assert!(scene.slices.iter().all(|s| s.label.text.is_none()));
    }

    #[tokio::test]
    async fn test_placement_follows_current_slices() {
        let frame = frame(slices()).await;
        let mut current = slices();
        current[1].exploded = true;
        current[1].height = 1.0;

        let solids = place_frame(&frame, &current);
        assert_eq!(solids[1].extrude_depth, 1.0);
        assert!(solids[1].base_position.x != 0.0 || solids[1].base_position.z != 0.0);
        assert_eq!(solids[0].base_position, Point3::new(0.0, 0.5, 0.0));

        let fewer = place_frame(&frame, &current[..1]);
        assert_eq!(fewer.len(), 2);
        assert_eq!(fewer[1].extrude_depth, frame.slices[1].height);
    }

    #[tokio::test]
    async fn test_mesh_is_local_to_the_slice() {
        let frame = frame(slices()).await;
        let mut current = slices();
        current[0].offset = 1.0;
        let scene = build(&frame, &current, &Presentation::default());

        let slice = &scene.slices[0];
        assert_eq!(slice.position.y, 1.5);
        let mesh = slice.mesh.as_ref().unwrap();
        let top = mesh.positions.iter().map(|p| p[1]).fold(f32::MIN, f32::max);
        let bottom = mesh.positions.iter().map(|p| p[1]).fold(f32::MAX, f32::min);
        assert_eq!(top, 0.0);
        assert_eq!(bottom, -0.5);
    }
}
