//! Geometry for extruded pie and donut charts.
//!
//! [`build`] turns an ordered list of [`Slice`]s into angular [`WedgeArc`]s and 2D
//! [`WedgeOutline`]s. [`place`] lifts an outline into a [`PositionedSolid`], and
//! [`label_anchor`] finds where its value label goes.

pub mod error;
pub mod extrude;
pub mod geom;
pub mod label;
pub mod layout;
pub mod macros;
pub mod outline;
pub mod pie;
pub mod slice;

pub use error::GeometryError;
pub use extrude::{EXPLOSION_MAGNITUDE, Mesh, PositionedSolid, place};
pub use geom::{OUTLINE_SCALE, Point, Point3, Rotation};
pub use label::{AxisLock, LABEL_LIFT, billboard_rotation, format_percentage, format_value, label_anchor};
pub use layout::{WedgeArc, layout, total_value};
pub use outline::{DEFAULT_SEGMENTS_PER_TURN, Segment, WedgeOutline};
pub use pie::{Pie, build, build_from_values};
pub use slice::{ChartGeometry, DEFAULT_HEIGHT, Slice, SliceColor, SliceLabel};
