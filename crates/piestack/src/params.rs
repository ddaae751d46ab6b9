use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::f64::consts::PI;
use strum::{Display as StrumDisplay, EnumIter, EnumString, IntoEnumIterator};
use wedge::{ChartGeometry, DEFAULT_HEIGHT, Point3, Slice, SliceColor};

pub const MIN_SLICES: usize = 2;
pub const MAX_SLICES: usize = 10;
pub const DEFAULT_SLICES: usize = 4;

const PALETTE: [(u8, u8, u8); 8] = [
    (0xf4, 0x3f, 0x5e),
    (0xd9, 0x46, 0xef),
    (0x8b, 0x5c, 0xf6),
    (0x3b, 0x82, 0xf6),
    (0x06, 0xb6, 0xd4),
    (0x22, 0xc5, 0x5e),
    (0xea, 0xb3, 0x08),
    (0xf9, 0x73, 0x16),
];

pub fn palette_color(index: usize) -> SliceColor {
    let (r, g, b) = PALETTE[index % PALETTE.len()];
    SliceColor::rgb(r, g, b)
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0 + 0.0
}

/// The slice a fresh chart starts with at position `index`.
pub fn default_slice(index: usize, height: f64) -> Slice {
    let value = if index == 0 {
        1.5
    } else {
        round2(1.0 / 2f64.powf(index as f64 * 0.35))
    };
    Slice::new(value, palette_color(index)).with_height(height)
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    SerializeDisplay,
    DeserializeFromStr,
    EnumString,
    EnumIter,
    StrumDisplay,
)]
#[strum(ascii_case_insensitive)]
pub enum Environment {
    #[strum(to_string = "none")]
    None,
    #[strum(to_string = "sunset", serialize = "venice_sunset_1k.hdr")]
    Sunset,
    #[strum(to_string = "dawn", serialize = "kiara_1_dawn_1k.hdr")]
    Dawn,
    #[default]
    #[strum(to_string = "night", serialize = "dikhololo_night_1k.hdr")]
    Night,
    #[strum(to_string = "warehouse", serialize = "empty_warehouse_01_1k.hdr")]
    Warehouse,
    #[strum(to_string = "forest", serialize = "forest_slope_1k.hdr")]
    Forest,
    #[strum(to_string = "apartment", serialize = "lebombo_1k.hdr")]
    Apartment,
    #[strum(to_string = "studio", serialize = "studio_small_03_1k.hdr")]
    Studio,
    #[strum(to_string = "city", serialize = "potsdamer_platz_1k.hdr")]
    City,
    #[strum(to_string = "park", serialize = "rooitou_park_1k.hdr")]
    Park,
    #[strum(to_string = "lobby", serialize = "st_fagans_interior_1k.hdr")]
    Lobby,
}

impl Environment {
    /// HDR map file for the preset, `None` when the scene has no environment map.
    pub fn hdr_file(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Sunset => Some("venice_sunset_1k.hdr"),
            Self::Dawn => Some("kiara_1_dawn_1k.hdr"),
            Self::Night => Some("dikhololo_night_1k.hdr"),
            Self::Warehouse => Some("empty_warehouse_01_1k.hdr"),
            Self::Forest => Some("forest_slope_1k.hdr"),
            Self::Apartment => Some("lebombo_1k.hdr"),
            Self::Studio => Some("studio_small_03_1k.hdr"),
            Self::City => Some("potsdamer_platz_1k.hdr"),
            Self::Park => Some("rooitou_park_1k.hdr"),
            Self::Lobby => Some("st_fagans_interior_1k.hdr"),
        }
    }

    pub fn presets() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lighting {
    pub ambient: f64,
    pub spot: f64,
    pub environment: Environment,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 0.2,
            spot: 0.75,
            environment: Environment::Night,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub roughness: f64,
    pub metalness: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            roughness: 0.2,
            metalness: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bloom {
    pub enabled: bool,
    pub strength: f64,
    pub radius: f64,
    pub threshold: f64,
}

impl Default for Bloom {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 1.0,
            radius: 1.5,
            threshold: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Title {
    pub text: String,
    pub max_width: f64,
    pub offset: f64,
}

impl Default for Title {
    fn default() -> Self {
        Self {
            text: String::new(),
            max_width: 80.0,
            offset: -30.0,
        }
    }
}

/// Everything the renderer needs besides the chart geometry. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presentation {
    pub lighting: Lighting,
    pub material: Material,
    pub bloom: Bloom,
    pub title: Title,
    pub background: SliceColor,
    pub spin_speed: f64,
    pub show_values: bool,
    pub values_as_percent: bool,
    pub camera: Point3,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            lighting: Lighting::default(),
            material: Material::default(),
            bloom: Bloom::default(),
            title: Title::default(),
            background: SliceColor::rgb(0x1f, 0x29, 0x37),
            spin_speed: 0.0,
            show_values: true,
            values_as_percent: true,
            camera: Point3::new(3.0, 3.0, 4.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartParameters {
    pub slices: Vec<Slice>,
    pub geometry: ChartGeometry,
    pub label_position: f64,
    pub all_heights: f64,
}

impl Default for ChartParameters {
    fn default() -> Self {
        Self {
            slices: (0..DEFAULT_SLICES)
                .map(|i| default_slice(i, DEFAULT_HEIGHT))
                .collect(),
            geometry: ChartGeometry::default(),
            label_position: 0.65,
            all_heights: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceField {
    Height,
    Offset,
}

impl SliceField {
    fn get(self, slice: &Slice) -> f64 {
        match self {
            Self::Height => slice.height,
            Self::Offset => slice.offset,
        }
    }

    fn set(self, slice: &mut Slice, value: f64) {
        match self {
            Self::Height => slice.height = value,
            Self::Offset => slice.offset = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BulkValue {
    Min,
    Max,
    Value(f64),
}

impl ChartParameters {
    /// Grows or shrinks the slice list, keeping existing slices untouched.
    pub fn set_slice_count(&mut self, count: usize) {
        let count = count.clamp(MIN_SLICES, MAX_SLICES);
        let height = self.all_heights;
        let start = self.slices.len();
        self.slices.truncate(count);
        self.slices
            .extend((start..count).map(|i| default_slice(i, height)));
    }

    /// Sets the shared height and overwrites every slice height with it.
    pub fn set_all_heights(&mut self, height: f64) {
        self.all_heights = height;
        self.set_all(SliceField::Height, BulkValue::Value(height));
    }

    pub fn set_all(&mut self, field: SliceField, value: BulkValue) {
        let values = self.slices.iter().map(|s| field.get(s));
        let value = match value {
            BulkValue::Min => values.fold(f64::INFINITY, f64::min),
            BulkValue::Max => values.fold(f64::NEG_INFINITY, f64::max),
            BulkValue::Value(v) => v,
        };
        if !value.is_finite() {
            return;
        }
        for slice in &mut self.slices {
            field.set(slice, value);
        }
    }

    /// Spreads `field` evenly across its current range.
    ///
    /// The slice holding the maximum keeps it. Counting down from the max slot, the minimum
    /// comes first and values climb back up toward the max.
    pub fn distribute(&mut self, field: SliceField) {
        let n = self.slices.len();
        if n < 2 {
            return;
        }
        let values: Vec<f64> = self.slices.iter().map(|s| field.get(s)).collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let max_index = values
            .iter()
            .position(|&v| v == max)
            .unwrap_or_default();
        let increment = (max - min) / (n - 1) as f64;

        for i in 0..n {
            let index = (n - 1 - i + max_index) % n;
            field.set(&mut self.slices[index], min + increment * i as f64);
        }
    }

    pub fn reset_heights(&mut self) {
        self.set_all(SliceField::Height, BulkValue::Value(DEFAULT_HEIGHT));
    }

    pub fn reset_offsets(&mut self) {
        self.set_all(SliceField::Offset, BulkValue::Value(0.0));
    }

    /// Flips the explode flag of slice `index`, returning the new state.
    pub fn toggle_explode(&mut self, index: usize) -> Option<bool> {
        self.slices.get_mut(index).map(|slice| {
            slice.exploded = !slice.exploded;
            slice.exploded
        })
    }

    /// Brings every field into the range the control panel allows.
    pub fn clamp(&mut self) {
        if self.slices.len() < MIN_SLICES || self.slices.len() > MAX_SLICES {
            self.set_slice_count(self.slices.len());
        }
        for slice in &mut self.slices {
            slice.value = finite_or(slice.value, 0.0).max(0.0);
            slice.height = finite_or(slice.height, DEFAULT_HEIGHT).clamp(0.01, 2.0);
            slice.offset = finite_or(slice.offset, 0.0).clamp(0.0, 2.0);
        }
        let g = &mut self.geometry;
        g.outer_radius = finite_or(g.outer_radius, 150.0).clamp(50.0, 300.0);
        // inner must stay one control step inside outer
        g.inner_radius = finite_or(g.inner_radius, 2.0)
            .clamp(0.0, 100.0)
            .min(g.outer_radius - 1.0);
        g.corner_radius = finite_or(g.corner_radius, 0.0).clamp(0.0, 50.0);
        g.pad_angle = finite_or(g.pad_angle, 0.05).clamp(0.0, PI / 8.0);
        self.label_position = finite_or(self.label_position, 0.65).clamp(0.0, 1.0);
        self.all_heights = finite_or(self.all_heights, DEFAULT_HEIGHT).clamp(0.01, 2.0);
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

impl Presentation {
    pub fn clamp(&mut self) {
        let unit = |v: f64, fallback: f64| finite_or(v, fallback).clamp(0.0, 1.0);
        self.lighting.ambient = unit(self.lighting.ambient, 0.2);
        self.lighting.spot = unit(self.lighting.spot, 0.75);
        self.material.roughness = unit(self.material.roughness, 0.2);
        self.material.metalness = unit(self.material.metalness, 0.0);
        self.bloom.strength = finite_or(self.bloom.strength, 1.0).clamp(0.0, 3.0);
        self.bloom.radius = finite_or(self.bloom.radius, 1.5).clamp(0.0, 2.0);
        self.bloom.threshold = unit(self.bloom.threshold, 0.15);
        self.spin_speed = unit(self.spin_speed, 0.0);
        self.title.max_width = finite_or(self.title.max_width, 80.0).clamp(0.0, 100.0);
        self.title.offset = finite_or(self.title.offset, -30.0).clamp(-50.0, 50.0);
    }
}

/// The full parameter object driving one chart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub chart: ChartParameters,
    pub presentation: Presentation,
}

impl Params {
    pub fn clamped(mut self) -> Self {
        self.chart.clamp();
        self.presentation.clamp();
        self
    }
}
