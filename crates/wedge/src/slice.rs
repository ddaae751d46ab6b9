use derive_more::{AsRef, Deref, Display, From, Into};
use palette::Srgb;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use crate::error::GeometryError;

pub const DEFAULT_HEIGHT: f64 = 0.5;

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Deref, From, Into, AsRef,
)]
#[serde(transparent)]
pub struct SliceLabel(String);

crate::impl_string_newtype!(SliceLabel);

/// An sRGB slice color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct SliceColor(pub Srgb<u8>);

impl SliceColor {
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self(Srgb::new(red, green, blue))
    }
}

impl Default for SliceColor {
    fn default() -> Self {
        Self::rgb(0x80, 0x80, 0x80)
    }
}

impl fmt::Display for SliceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}",
            self.0.red, self.0.green, self.0.blue
        )
    }
}

impl FromStr for SliceColor {
    type Err = palette::rgb::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Srgb::<u8>::from_str(s.trim()).map(Self)
    }
}

/// One data record of the chart. Order in the slice list fixes angular order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub value: f64,
    #[serde(default)]
    pub color: SliceColor,
    #[serde(default)]
    pub label: Option<SliceLabel>,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default, alias = "explode")]
    pub exploded: bool,
}

fn default_height() -> f64 {
    DEFAULT_HEIGHT
}

impl Slice {
    pub fn new(value: f64, color: SliceColor) -> Self {
        Self {
            value,
            color,
            label: None,
            height: DEFAULT_HEIGHT,
            offset: 0.0,
            exploded: false,
        }
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(SliceLabel::new(label));
        self
    }

    pub fn exploded(mut self, exploded: bool) -> Self {
        self.exploded = exploded;
        self
    }

    /// Label text, if one is set and not blank.
    pub fn caption(&self) -> Option<&SliceLabel> {
        self.label.as_ref().filter(|l| !l.is_blank())
    }
}

/// Radii (outline units) and angles (radians) shaping every wedge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartGeometry {
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub corner_radius: f64,
    pub pad_angle: f64,
}

impl Default for ChartGeometry {
    fn default() -> Self {
        Self {
            inner_radius: 2.0,
            outer_radius: 150.0,
            corner_radius: 0.0,
            pad_angle: 0.05,
        }
    }
}

impl ChartGeometry {
    pub fn new(inner_radius: f64, outer_radius: f64, corner_radius: f64, pad_angle: f64) -> Self {
        Self {
            inner_radius,
            outer_radius,
            corner_radius,
            pad_angle,
        }
    }

    /// Checks the parameters for a chart of `slice_count` wedges.
    pub fn validate(&self, slice_count: usize) -> Result<(), GeometryError> {
        let fields = [
            ("inner radius", self.inner_radius),
            ("outer radius", self.outer_radius),
            ("corner radius", self.corner_radius),
            ("pad angle", self.pad_angle),
        ];
        if let Some((name, v)) = fields.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(GeometryError::invalid(format!(
                "{name} must be a finite non-negative number, got {v}"
            )));
        }
        if self.inner_radius >= self.outer_radius {
            return Err(GeometryError::invalid(format!(
                "inner radius {} must be smaller than outer radius {}",
                self.inner_radius, self.outer_radius
            )));
        }
        if slice_count as f64 * self.pad_angle >= TAU {
            return Err(GeometryError::invalid(format!(
                "pad angle {} leaves no room for {slice_count} wedges",
                self.pad_angle
            )));
        }
        Ok(())
    }
}
