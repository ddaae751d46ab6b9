//! Interactive 3D pie and donut charts, headless.
//!
//! [`app::App`] owns the chart parameters and a [`resolver::Resolver`] that keeps the last
//! good outlines on screen while new ones load. Each tick produces a [`scene::Scene`].

pub mod app;
pub mod config;
pub mod events;
pub mod motion;
pub mod params;
pub mod resolver;
pub mod scene;
pub mod sys;
pub mod url_sync;
