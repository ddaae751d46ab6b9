use wedge::{ChartGeometry, GeometryError, Slice};

use crate::config::{self, AnimationConfig, Config};
use crate::events::AppEvent;
use crate::motion::{SliceMotion, Turntable};
use crate::params::{BulkValue, Params, Presentation, SliceField};
use crate::resolver::{
    GeometryLoader, OutlineLoader, OutlineRequest, ResolveError, Resolver, ResolverState,
};
use crate::scene::{Scene, SceneBuilder, place_frame};
use crate::url_sync::{self, UrlSync};

#[derive(Debug, Clone)]
pub enum AppMsg {
    ConfigReload,
    Query(String),
    SetParams(Params),
    SetSliceCount(usize),
    SetSlice(usize, Slice),
    SetGeometry(ChartGeometry),
    SetLabelPosition(f64),
    SetAllHeights(f64),
    Distribute(SliceField),
    SetAll(SliceField, BulkValue),
    ResetHeights,
    ResetOffsets,
    SetPresentation(Presentation),
    ClickSlice(usize),
}

impl From<AppEvent> for AppMsg {
    fn from(event: AppEvent) -> Self {
        match event {
            AppEvent::ConfigReload => AppMsg::ConfigReload,
            AppEvent::Click(i) => AppMsg::ClickSlice(i),
            AppEvent::Query(q) => AppMsg::Query(q),
        }
    }
}

/// Headless chart: parameters in, one [`Scene`] per tick out.
pub struct App<L: OutlineLoader = GeometryLoader> {
    params: Params,
    resolver: Resolver<L>,
    requested: Option<OutlineRequest>,
    motions: Vec<SliceMotion>,
    turntable: Turntable,
    url: UrlSync,
    animation: AnimationConfig,
    mesh_segments: Option<usize>,
}

impl App<GeometryLoader> {
    pub fn new(config: &Config, url: UrlSync) -> Self {
        Self::with_loader(config, url, GeometryLoader)
    }
}

impl<L: OutlineLoader> App<L> {
    /// Parameters come from `config` with the query in `url` applied on top.
    pub fn with_loader(config: &Config, url: UrlSync, loader: L) -> Self {
        let params = url_sync::decode(&url.query_string(), &config.params());
        Self {
            params,
            resolver: Resolver::new(loader),
            requested: None,
            motions: Vec::new(),
            turntable: Turntable::default(),
            url,
            animation: config.animation.clone().clamped(),
            mesh_segments: None,
        }
    }

    /// Emit triangulated meshes with every scene.
    pub fn with_meshes(mut self, segments_per_turn: usize) -> Self {
        self.mesh_segments = Some(segments_per_turn.max(4));
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn url(&self) -> &UrlSync {
        &self.url
    }

    pub fn resolver(&self) -> &Resolver<L> {
        &self.resolver
    }

    pub fn frame_seconds(&self) -> f64 {
        self.animation.frame_seconds()
    }

    /// Requests the first outlines. Needs a tokio runtime.
    pub fn start(&mut self) -> Result<(), ResolveError> {
        self.request_outlines()
    }

    pub async fn first_frame(&mut self) -> Result<(), ResolveError> {
        self.resolver.first_frame().await.map(|_| ())
    }

    pub async fn settle(&mut self) -> Result<(), ResolveError> {
        self.resolver.settle().await
    }

    pub async fn next_completion(&mut self) -> Result<(), ResolveError> {
        self.resolver.next_completion().await.map(|_| ())
    }

    pub fn is_animating(&self) -> bool {
        self.motions.iter().any(|m| !m.is_settled())
    }

    /// Applies `msg`. Parameters the geometry builder would reject are rolled back and
    /// never reach the URL.
    pub fn update(&mut self, msg: AppMsg) -> Result<(), ResolveError> {
        let previous = self.params.clone();
        let chart = &mut self.params.chart;
        match msg {
            AppMsg::ConfigReload => match config::load_config() {
                Ok(new_config) => {
                    self.params = new_config.params();
                    self.animation = new_config.animation.clamped();
                    log::info!("Configuration reloaded");
                }
                Err(e) => {
                    log::error!("Failed to reload config: {}", e);
                    return Ok(());
                }
            },
            AppMsg::Query(query) => self.params = url_sync::decode(&query, &self.params),
            AppMsg::SetParams(params) => self.params = params,
            AppMsg::SetSliceCount(n) => chart.set_slice_count(n),
            AppMsg::SetSlice(i, slice) => match chart.slices.get_mut(i) {
                Some(s) => *s = slice,
                None => {
                    log::warn!("No slice {} to update", i);
                    return Ok(());
                }
            },
            AppMsg::SetGeometry(geometry) => chart.geometry = geometry,
            AppMsg::SetLabelPosition(p) => chart.label_position = p,
            AppMsg::SetAllHeights(h) => chart.set_all_heights(h),
            AppMsg::Distribute(field) => chart.distribute(field),
            AppMsg::SetAll(field, value) => chart.set_all(field, value),
            AppMsg::ResetHeights => chart.reset_heights(),
            AppMsg::ResetOffsets => chart.reset_offsets(),
            AppMsg::SetPresentation(p) => self.params.presentation = p,
            AppMsg::ClickSlice(i) => {
                self.click_slice(i);
                return Ok(());
            }
        }

        self.params = std::mem::take(&mut self.params).clamped();
        if let Err(e) = OutlineRequest::from_chart(&self.params.chart).validate() {
            log::warn!("Rejected chart parameters: {}", e);
            self.params = previous;
            return Err(e.into());
        }
        self.url.write_params(&self.params);
        self.request_outlines()
    }

    /// Toggles the explode flag of wedge `index`. Returns the new state.
    pub fn click_slice(&mut self, index: usize) -> Option<bool> {
        let exploded = self.params.chart.toggle_explode(index)?;
        self.url.write(&url_sync::explode_key(index), exploded);
        log::debug!("Slice {} exploded: {}", index, exploded);
        Some(exploded)
    }

    fn request_outlines(&mut self) -> Result<(), ResolveError> {
        let request = OutlineRequest::from_chart(&self.params.chart);
        if self
            .requested
            .as_ref()
            .is_some_and(|r| r.same_outlines(&request))
        {
            return Ok(());
        }
        self.resolver.request(request.clone())?;
        self.requested = Some(request);
        Ok(())
    }

    /// Advances one tick of `dt` seconds and assembles the scene. `None` until the first
    /// outlines arrive.
    pub fn frame(&mut self, dt: f64) -> Result<Option<Scene>, GeometryError> {
        self.resolver.poll();
        let Some(frame) = self.resolver.frame() else {
            return Ok(None);
        };
        if !self.url.is_initialized() {
            self.url.mark_initialized();
        }

        let rotation_y = self.turntable.tick(self.params.presentation.spin_speed);
        let solids = place_frame(&frame, &self.params.chart.slices);

        self.motions.truncate(solids.len());
        for (i, solid) in solids.iter().enumerate() {
            match self.motions.get_mut(i) {
                Some(motion) => motion.retarget(solid),
                None => self
                    .motions
                    .push(SliceMotion::new(solid, self.animation.spring)),
            }
        }
        for motion in &mut self.motions {
            motion.step(dt);
        }

        let scene = SceneBuilder {
            frame: &frame,
            current: &self.params.chart.slices,
            presentation: &self.params.presentation,
            label_position: self.params.chart.label_position,
            rotation_y,
            stale: matches!(self.resolver.state(), ResolverState::Refreshing { .. }),
            segments_per_turn: self.mesh_segments,
        }
        .build(&solids, &self.motions)?;
        Ok(Some(scene))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Generation;

    const FRAME: f64 = 1.0 / 60.0;

    async fn started(query: &str) -> App {
        let mut app = App::new(&Config::default(), UrlSync::new(query, false));
        app.start().unwrap();
        app.first_frame().await.unwrap();
        app
    }

    #[tokio::test]
    async fn test_first_frame_initializes_url_sync() {
        let mut app = App::new(&Config::default(), UrlSync::new("r=200&n=3", false));
        assert_eq!(app.params().chart.slices.len(), 3);
        assert!(app.frame(FRAME).unwrap().is_none());

        app.start().unwrap();
        app.update(AppMsg::SetGeometry(ChartGeometry::new(
            2.0, 250.0, 0.0, 0.05,
        )))
        .unwrap();
        assert_eq!(app.url().get("r"), Some("200"));

        app.settle().await.unwrap();
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert_eq!(scene.slices.len(), 3);
        assert!(app.url().is_initialized());

        app.update(AppMsg::SetGeometry(ChartGeometry::new(
            2.0, 220.0, 0.0, 0.05,
        )))
        .unwrap();
        assert_eq!(app.url().get("r"), Some("220"));
    }

    #[tokio::test]
    async fn test_click_explodes_without_new_outlines() {
        let mut app = started("").await;
        let before = app.frame(FRAME).unwrap().unwrap();
        let generation = app.resolver().latest_generation();

        assert_eq!(app.click_slice(1), Some(true));
        assert_eq!(app.url().get("x1"), Some("true"));
        assert_eq!(app.resolver().latest_generation(), generation);

        let mut scene = before.clone();
        for _ in 0..600 {
            scene = app.frame(FRAME).unwrap().unwrap();
        }
        assert!(!app.is_animating());
        let (a, b) = (&before.slices[1], &scene.slices[1]);
        assert!(b.position.x.hypot(b.position.z) > 0.19);
        assert_eq!(a.position.y, b.position.y);
        assert_eq!(a.depth, b.depth);
        assert_eq!(a.color, b.color);
        assert_eq!(scene.slices[0].position, before.slices[0].position);

        assert_eq!(app.click_slice(42), None);
    }

    #[tokio::test]
    async fn test_height_edits_reuse_outlines() {
        let mut app = started("").await;
        let generation = app.resolver().latest_generation();

        app.update(AppMsg::SetAllHeights(1.25)).unwrap();
        assert_eq!(app.resolver().latest_generation(), generation);
        app.update(AppMsg::Distribute(SliceField::Height)).unwrap();
        assert_eq!(app.resolver().latest_generation(), generation);

        let mut slice = app.params().chart.slices[0].clone();
        slice.value = 10.0;
        app.update(AppMsg::SetSlice(0, slice)).unwrap();
        assert_eq!(app.resolver().latest_generation(), generation.next());
    }

    #[tokio::test]
    async fn test_refresh_serves_stale_frame() {
        let mut app = started("").await;
        app.frame(FRAME).unwrap().unwrap();

        app.update(AppMsg::SetSliceCount(6)).unwrap();
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert!(scene.stale);
        assert_eq!(scene.slices.len(), 4);
        assert_eq!(scene.generation, Generation::from(1));

        app.settle().await.unwrap();
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert!(!scene.stale);
        assert_eq!(scene.slices.len(), 6);
    }

    #[tokio::test]
    async fn test_degenerate_values_keep_last_frame() {
        let mut app = started("").await;
        app.frame(FRAME).unwrap().unwrap();
        app.update(AppMsg::SetLabelPosition(0.5)).unwrap();
        assert_eq!(app.url().get("v0"), Some("1.5"));
        let before = app.params().clone();

        let mut params = before.clone();
        params.chart.slices.iter_mut().for_each(|s| s.value = 0.0);
        let result = app.update(AppMsg::SetParams(params));

        assert!(matches!(
            result,
            Err(ResolveError::Geometry(GeometryError::DegenerateInput))
        ));
        assert_eq!(app.params(), &before);
        assert_eq!(app.url().get("v0"), Some("1.5"));
        assert_eq!(app.resolver().latest_generation(), Generation::from(1));
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert_eq!(scene.slices.len(), 4);
        assert!(!scene.stale);
    }

    #[tokio::test]
    async fn test_spin_advances_each_frame() {
        let mut app = started("spn=0.5").await;
        app.frame(FRAME).unwrap();
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert_eq!(scene.rotation_y, 1.0);
    }

    #[tokio::test]
    async fn test_meshes_are_optional() {
        let mut app = started("").await;
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert!(scene.slices.iter().all(|s| s.mesh.is_none()));

        let mut app = started("").await.with_meshes(32);
        let scene = app.frame(FRAME).unwrap().unwrap();
        assert!(scene.slices.iter().all(|s| s.mesh.is_some()));
    }

    #[test]
    fn test_events_map_to_messages() {
        assert!(matches!(
            AppMsg::from(AppEvent::Click(3)),
            AppMsg::ClickSlice(3)
        ));
        assert!(matches!(
            AppMsg::from(AppEvent::ConfigReload),
            AppMsg::ConfigReload
        ));
    }
}
