use async_channel::{Receiver, Sender};
use derive_more::{Display, From, Into};
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use wedge::{ChartGeometry, GeometryError, Pie, Slice, WedgeArc, WedgeOutline};

use crate::params::ChartParameters;

/// Parameter-change epoch. Only the newest one may be committed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, From, Into, Serialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("outline loader failed: {0}")]
    Load(String),
    #[error("resolution of generation {generation} failed: {reason}")]
    Failed {
        generation: Generation,
        reason: String,
    },
    #[error("no outlines have been requested")]
    NotRequested,
    #[error("resolver channel closed")]
    Closed,
}

/// Everything outline generation depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineRequest {
    pub slices: Vec<Slice>,
    pub geometry: ChartGeometry,
}

impl OutlineRequest {
    pub fn new(slices: Vec<Slice>, geometry: ChartGeometry) -> Self {
        Self { slices, geometry }
    }

    pub fn from_chart(chart: &ChartParameters) -> Self {
        Self::new(chart.slices.clone(), chart.geometry)
    }

    pub fn values(&self) -> Vec<f64> {
        self.slices.iter().map(|s| s.value).collect()
    }

    /// Rejects requests the builder would fail on, before any work is scheduled.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.geometry.validate(self.slices.len())?;
        wedge::layout(&self.values(), self.geometry.pad_angle).map(|_| ())
    }

    /// True when `other` yields the same outlines. Heights, offsets, colors and labels
    /// only affect placement.
    pub fn same_outlines(&self, other: &OutlineRequest) -> bool {
        self.geometry == other.geometry && self.values() == other.values()
    }
}

/// The unit the resolver caches: outlines, their arcs and the slices they were built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFrame {
    pub generation: Generation,
    pub arcs: Vec<WedgeArc>,
    pub outlines: Vec<WedgeOutline>,
    pub slices: Vec<Slice>,
    pub geometry: ChartGeometry,
}

impl ResolvedFrame {
    fn new(generation: Generation, pie: Pie, request: OutlineRequest) -> Result<Self, String> {
        let n = request.slices.len();
        if pie.arcs.len() != n || pie.outlines.len() != n {
            return Err(format!(
                "loader returned {} arcs and {} outlines for {} slices",
                pie.arcs.len(),
                pie.outlines.len(),
                n
            ));
        }
        Ok(Self {
            generation,
            arcs: pie.arcs,
            outlines: pie.outlines,
            slices: request.slices,
            geometry: request.geometry,
        })
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        wedge::total_value(&self.arcs)
    }

    pub fn percentage(&self, index: usize) -> Option<f64> {
        let total = self.total_value();
        self.arcs
            .get(index)
            .map(|arc| if total > 0.0 { arc.value / total } else { 0.0 })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolverState {
    Empty,
    Loading {
        pending: Generation,
    },
    Ready(Arc<ResolvedFrame>),
    Refreshing {
        frame: Arc<ResolvedFrame>,
        pending: Generation,
    },
}

impl ResolverState {
    /// The frame to display, stale or not.
    pub fn frame(&self) -> Option<&Arc<ResolvedFrame>> {
        match self {
            Self::Ready(frame) | Self::Refreshing { frame, .. } => Some(frame),
            Self::Empty | Self::Loading { .. } => None,
        }
    }

    pub fn pending(&self) -> Option<Generation> {
        match self {
            Self::Loading { pending } | Self::Refreshing { pending, .. } => Some(*pending),
            Self::Empty | Self::Ready(_) => None,
        }
    }

    fn requested(&self, pending: Generation) -> Self {
        match self.frame() {
            Some(frame) => Self::Refreshing {
                frame: frame.clone(),
                pending,
            },
            None => Self::Loading { pending },
        }
    }
}

/// Produces outlines for a request. This is the slow, asynchronous step.
pub trait OutlineLoader: Send + Sync + 'static {
    fn load(
        &self,
        request: OutlineRequest,
    ) -> impl Future<Output = Result<Pie, ResolveError>> + Send;
}

/// Runs the geometry builder on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryLoader;

impl OutlineLoader for GeometryLoader {
    async fn load(&self, request: OutlineRequest) -> Result<Pie, ResolveError> {
        let pie = tokio::task::spawn_blocking(move || {
            wedge::build(&request.slices, &request.geometry)
        })
        .await
        .map_err(|e| ResolveError::Load(e.to_string()))??;
        Ok(pie)
    }
}

/// Read side of the committed frame, for render passes that do not own the resolver.
#[derive(Debug, Clone, Default)]
pub struct FrameHandle(Arc<RwLock<Option<Arc<ResolvedFrame>>>>);

impl FrameHandle {
    pub fn current(&self) -> Option<Arc<ResolvedFrame>> {
        self.0.read().clone()
    }

    fn publish(&self, frame: Arc<ResolvedFrame>) {
        *self.0.write() = Some(frame);
    }
}

struct Completion {
    generation: Generation,
    request: OutlineRequest,
    result: Result<Pie, ResolveError>,
}

/// Serves the last good frame while newer outlines load.
///
/// Loads are never cancelled. A completion is committed only if no newer request was made
/// after it; anything else is dropped on arrival.
pub struct Resolver<L: OutlineLoader = GeometryLoader> {
    loader: Arc<L>,
    state: ResolverState,
    latest: Generation,
    arrived: Generation,
    last_error: Option<String>,
    published: FrameHandle,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Default for Resolver<GeometryLoader> {
    fn default() -> Self {
        Self::new(GeometryLoader)
    }
}

impl<L: OutlineLoader> Resolver<L> {
    pub fn new(loader: L) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            loader: Arc::new(loader),
            state: ResolverState::Empty,
            latest: Generation::default(),
            arrived: Generation::default(),
            last_error: None,
            published: FrameHandle::default(),
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub fn frame(&self) -> Option<Arc<ResolvedFrame>> {
        self.state.frame().cloned()
    }

    pub fn handle(&self) -> FrameHandle {
        self.published.clone()
    }

    pub fn latest_generation(&self) -> Generation {
        self.latest
    }

    /// Whether the newest request has come back, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.arrived == self.latest
    }

    /// Validates `request` and starts loading it on the current tokio runtime.
    ///
    /// Invalid parameters are rejected here and leave the resolver untouched.
    pub fn request(&mut self, request: OutlineRequest) -> Result<Generation, ResolveError> {
        request.validate()?;

        let generation = self.latest.next();
        self.latest = generation;
        self.state = self.state.requested(generation);

        let loader = self.loader.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = loader.load(request.clone()).await;
            let _ = tx
                .send(Completion {
                    generation,
                    request,
                    result,
                })
                .await;
        });

        log::debug!("Requested outlines for generation {}", generation);
        Ok(generation)
    }

    /// Applies every completion that has already arrived. Returns the newly committed
    /// frame, if any.
    pub fn poll(&mut self) -> Option<Arc<ResolvedFrame>> {
        let mut committed = None;
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(frame) = self.apply(completion) {
                committed = Some(frame);
            }
        }
        committed
    }

    /// Waits for the next completion and applies it.
    pub async fn next_completion(&mut self) -> Result<Option<Arc<ResolvedFrame>>, ResolveError> {
        let completion = self.rx.recv().await.map_err(|_| ResolveError::Closed)?;
        Ok(self.apply(completion))
    }

    /// Waits until the newest request has arrived.
    pub async fn settle(&mut self) -> Result<(), ResolveError> {
        while !self.is_settled() {
            self.next_completion().await?;
        }
        Ok(())
    }

    /// Suspends until a frame exists. Fails if the newest request failed and nothing was
    /// ever resolved.
    pub async fn first_frame(&mut self) -> Result<Arc<ResolvedFrame>, ResolveError> {
        loop {
            self.poll();
            if let Some(frame) = self.frame() {
                return Ok(frame);
            }
            if self.latest == Generation::default() {
                return Err(ResolveError::NotRequested);
            }
            if self.is_settled() {
                return Err(ResolveError::Failed {
                    generation: self.latest,
                    reason: self.last_error.clone().unwrap_or_default(),
                });
            }
            self.next_completion().await?;
        }
    }

    fn apply(&mut self, completion: Completion) -> Option<Arc<ResolvedFrame>> {
        let Completion {
            generation,
            request,
            result,
        } = completion;

        if generation != self.latest {
            log::debug!(
                "Discarding stale outlines for generation {} (latest is {})",
                generation,
                self.latest
            );
            return None;
        }
        self.arrived = generation;

        let frame = result
            .map_err(|e| e.to_string())
            .and_then(|pie| ResolvedFrame::new(generation, pie, request));

        match frame {
            Ok(frame) => {
                let frame = Arc::new(frame);
                log::info!(
                    "Committed {} wedge outlines for generation {}",
                    frame.len(),
                    generation
                );
                self.state = ResolverState::Ready(frame.clone());
                self.published.publish(frame.clone());
                self.last_error = None;
                Some(frame)
            }
            Err(reason) => {
                log::error!(
                    "Failed to resolve outlines for generation {}: {}",
                    generation,
                    reason
                );
                self.last_error = Some(reason);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::sync::oneshot;
    use wedge::SliceColor;

    const FAILING: f64 = 99.0;

    /// Holds each load until its gate opens. Requests are keyed by their first value.
    #[derive(Default)]
    struct GatedLoader {
        gates: Mutex<HashMap<u64, oneshot::Receiver<()>>>,
    }

    impl GatedLoader {
        fn gate(&self, key: u64) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(key, rx);
            tx
        }
    }

    impl OutlineLoader for GatedLoader {
        async fn load(&self, request: OutlineRequest) -> Result<Pie, ResolveError> {
            let key = request.slices[0].value;
            let gate = self.gates.lock().remove(&(key as u64));
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if key == FAILING {
                return Err(ResolveError::Load("loader rejected".to_string()));
            }
            Ok(wedge::build(&request.slices, &request.geometry)?)
        }
    }

    fn request(first: f64) -> OutlineRequest {
        let slices = [first, 1.0, 1.0]
            .iter()
            .map(|&v| Slice::new(v, SliceColor::default()))
            .collect();
        OutlineRequest::new(slices, ChartGeometry::default())
    }

    #[tokio::test]
    async fn test_only_latest_generation_commits() {
        let loader = GatedLoader::default();
        let gate_a = loader.gate(1);
        let gate_b = loader.gate(2);
        let gate_c = loader.gate(3);
        let mut resolver = Resolver::new(loader);

        resolver.request(request(1.0)).unwrap();
        resolver.request(request(2.0)).unwrap();
        let latest = resolver.request(request(3.0)).unwrap();
        assert_eq!(
            resolver.state(),
            &ResolverState::Loading { pending: latest }
        );

        gate_c.send(()).unwrap();
        let committed = resolver.next_completion().await.unwrap().unwrap();
        assert_eq!(committed.generation, latest);
        assert_eq!(committed.slices[0].value, 3.0);

        gate_a.send(()).unwrap();
        gate_b.send(()).unwrap();
        assert!(resolver.next_completion().await.unwrap().is_none());
        assert!(resolver.next_completion().await.unwrap().is_none());

        let frame = resolver.frame().unwrap();
        assert_eq!(frame.generation, latest);
        assert_eq!(frame.slices[0].value, 3.0);
        assert!(matches!(resolver.state(), ResolverState::Ready(_)));
        assert_eq!(resolver.handle().current(), Some(frame));
    }

    #[tokio::test]
    async fn test_stale_completions_never_commit_before_latest() {
        let loader = GatedLoader::default();
        let gate_a = loader.gate(1);
        let gate_b = loader.gate(2);
        let mut resolver = Resolver::new(loader);

        resolver.request(request(1.0)).unwrap();
        resolver.request(request(2.0)).unwrap();

        gate_a.send(()).unwrap();
        assert!(resolver.next_completion().await.unwrap().is_none());
        assert!(resolver.frame().is_none());
        assert!(!resolver.is_settled());

        gate_b.send(()).unwrap();
        let frame = resolver.first_frame().await.unwrap();
        assert_eq!(frame.slices[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_frame() {
        let mut resolver = Resolver::new(GatedLoader::default());
        resolver.request(request(4.0)).unwrap();
        let first = resolver.first_frame().await.unwrap();

        let pending = resolver.request(request(FAILING)).unwrap();
        assert_eq!(
            resolver.state(),
            &ResolverState::Refreshing {
                frame: first.clone(),
                pending
            }
        );

        resolver.settle().await.unwrap();
        assert_eq!(
            resolver.state(),
            &ResolverState::Refreshing {
                frame: first.clone(),
                pending
            }
        );
        assert_eq!(resolver.frame(), Some(first));
    }

    #[tokio::test]
    async fn test_first_frame_reports_total_failure() {
        let mut resolver = Resolver::new(GatedLoader::default());
        assert_eq!(
            resolver.first_frame().await,
            Err(ResolveError::NotRequested)
        );

        let generation = resolver.request(request(FAILING)).unwrap();
        match resolver.first_frame().await {
            Err(ResolveError::Failed { generation: g, .. }) => assert_eq!(g, generation),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_synchronously() {
        let mut resolver = Resolver::default();
        let mut bad = request(1.0);
        bad.geometry = ChartGeometry::new(50.0, 50.0, 0.0, 0.0);
        assert!(matches!(
            resolver.request(bad),
            Err(ResolveError::Geometry(GeometryError::InvalidGeometry(_)))
        ));

        let mut zero = request(0.0);
        zero.slices.iter_mut().for_each(|s| s.value = 0.0);
        assert_eq!(
            resolver.request(zero),
            Err(ResolveError::Geometry(GeometryError::DegenerateInput))
        );
        assert_eq!(resolver.state(), &ResolverState::Empty);
        assert_eq!(resolver.latest_generation(), Generation::default());
    }

    #[tokio::test]
    async fn test_geometry_loader_frame() {
        let mut resolver = Resolver::default();
        resolver.request(request(2.0)).unwrap();
        let frame = resolver.first_frame().await.unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.outlines.len(), frame.slices.len());
        for (i, arc) in frame.arcs.iter().enumerate() {
            assert_eq!(arc.source_index, i);
        }
        let share: f64 = (0..frame.len()).filter_map(|i| frame.percentage(i)).sum();
        assert!((share - 1.0).abs() < 1e-9);
        assert_eq!(frame.percentage(0), Some(0.5));
    }

    #[test]
    fn test_same_outlines_ignores_placement() {
        let a = request(1.0);
        let mut b = a.clone();
        b.slices[0].height = 1.5;
        b.slices[1].exploded = true;
        assert!(a.same_outlines(&b));

        b.slices[2].value = 4.0;
        assert!(!a.same_outlines(&b));
    }
}
