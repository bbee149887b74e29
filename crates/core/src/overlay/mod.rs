//! Lazily loaded plate boundary overlay.

mod geometry;
mod source;

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};

pub use geometry::{FlatLines, GeoPoint, OverlayGeometry, Polyline};
pub use source::{FileGeometrySource, GeometrySource, HttpGeometrySource};

use crate::{QuakeReplayError, Result};

type LoadOutcome = std::result::Result<Arc<OverlayGeometry>, Arc<QuakeReplayError>>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

/// Future resolving once the overlay geometry is available (or failed).
pub type OverlayLoad = BoxFuture<'static, Result<Arc<OverlayGeometry>>>;

/// What the boundary layer should currently show.
#[derive(Debug, Clone, Default)]
pub struct OverlayView {
    pub visible: bool,
    pub geometry: Option<Arc<OverlayGeometry>>,
}

impl OverlayView {
    pub fn is_loaded(&self) -> bool {
        self.geometry.is_some()
    }

    /// Lines to draw, or `None` when hidden or not loaded yet.
    pub fn drawable(&self) -> Option<&OverlayGeometry> {
        if self.visible {
            self.geometry.as_deref()
        } else {
            None
        }
    }
}

#[derive(Default)]
struct OverlayState {
    geometry: Option<Arc<OverlayGeometry>>,
    visible: bool,
    in_flight: Option<SharedLoad>,
    fetches: usize,
}

enum Attach {
    Ready(Arc<OverlayGeometry>),
    Pending(SharedLoad),
}

/// Caches the boundary geometry for the lifetime of the process.
///
/// At most one fetch runs at a time: callers that arrive while a load is in
/// flight attach to the same shared future instead of starting another one.
/// Clones share the same cache.
#[derive(Clone)]
pub struct OverlayCache {
    source: Arc<dyn GeometrySource>,
    state: Arc<Mutex<OverlayState>>,
}

impl OverlayCache {
    pub fn new(source: Arc<dyn GeometrySource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(OverlayState::default())),
        }
    }

    /// Resolves with the cached geometry, attaching to or starting a load when
    /// there is none yet. The in-flight guard is registered before this
    /// returns, so the future only needs to be driven by someone.
    pub fn ensure_loaded(&self) -> OverlayLoad {
        let load = match self.attach() {
            Ok(Attach::Ready(geometry)) => return future::ready(Ok(geometry)).boxed(),
            Ok(Attach::Pending(load)) => load,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        let state = Arc::clone(&self.state);
        async move {
            let outcome = load.clone().await;
            settle(&state, &load, &outcome)?;
            outcome.map_err(QuakeReplayError::Overlay)
        }
        .boxed()
    }

    /// Sets visibility regardless of load state. Showing an overlay that has
    /// no geometry yet hands back the load to drive; it attaches to any load
    /// already in flight.
    pub fn set_visible(&self, visible: bool) -> Result<Option<OverlayLoad>> {
        let needs_load = {
            let mut state = self.lock()?;
            state.visible = visible;
            visible && state.geometry.is_none()
        };
        Ok(needs_load.then(|| self.ensure_loaded()))
    }

    pub fn toggle_visible(&self) -> Result<Option<OverlayLoad>> {
        let visible = self.lock()?.visible;
        self.set_visible(!visible)
    }

    /// Forgets the cached geometry so the next load fetches again. A load
    /// still in flight is detached and its result discarded.
    pub fn invalidate(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.geometry = None;
        state.in_flight = None;
        Ok(())
    }

    pub fn view(&self) -> Result<OverlayView> {
        let state = self.lock()?;
        Ok(OverlayView {
            visible: state.visible,
            geometry: state.geometry.clone(),
        })
    }

    pub fn is_visible(&self) -> Result<bool> {
        Ok(self.lock()?.visible)
    }

    pub fn is_loading(&self) -> Result<bool> {
        Ok(self.lock()?.in_flight.is_some())
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> Result<usize> {
        Ok(self.lock()?.fetches)
    }

    fn attach(&self) -> Result<Attach> {
        let mut state = self.lock()?;
        if let Some(geometry) = &state.geometry {
            return Ok(Attach::Ready(Arc::clone(geometry)));
        }
        if let Some(load) = &state.in_flight {
            return Ok(Attach::Pending(load.clone()));
        }

        tracing::info!(source = %self.source.describe(), "loading plate boundaries");
        let source = Arc::clone(&self.source);
        let load = async move { fetch_and_parse(source).await.map_err(Arc::new) }
            .boxed()
            .shared();
        state.in_flight = Some(load.clone());
        state.fetches += 1;
        Ok(Attach::Pending(load))
    }

    fn lock(&self) -> Result<MutexGuard<'_, OverlayState>> {
        lock_state(&self.state)
    }
}

impl std::fmt::Debug for OverlayCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayCache")
            .field("source", &self.source.describe())
            .finish()
    }
}

async fn fetch_and_parse(source: Arc<dyn GeometrySource>) -> Result<Arc<OverlayGeometry>> {
    let raw = source.fetch_geometry().await?;
    let geometry = OverlayGeometry::parse(&raw)?;
    tracing::info!(
        polylines = geometry.len(),
        points = geometry.point_count(),
        "plate boundaries loaded"
    );
    Ok(Arc::new(geometry))
}

/// Records the outcome of `load`, unless the cache moved on to another load
/// (or was invalidated) in the meantime.
fn settle(state: &Mutex<OverlayState>, load: &SharedLoad, outcome: &LoadOutcome) -> Result<()> {
    let mut state = lock_state(state)?;
    let current = state
        .in_flight
        .as_ref()
        .is_some_and(|pending| pending.ptr_eq(load));
    if !current {
        return Ok(());
    }

    state.in_flight = None;
    match outcome {
        Ok(geometry) => state.geometry = Some(Arc::clone(geometry)),
        Err(err) => tracing::warn!(error = %err, "failed to load plate boundaries"),
    }
    Ok(())
}

fn lock_state(state: &Mutex<OverlayState>) -> Result<MutexGuard<'_, OverlayState>> {
    state
        .lock()
        .map_err(|_| QuakeReplayError::msg("overlay cache has been poisoned"))
}
