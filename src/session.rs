//! Per-session viewer state and the update rules that drive re-rendering.
//!
//! A [`Session`] owns the loaded volume and the current parameters. Each
//! [`Change`] recomputes only the views that depend on it; exports build
//! summary images without touching the state. [`render_views`] is the pure
//! form of the same computation.

use crate::enums::Axis;
use crate::enums::Colormap;
use crate::enums::ExportKind;
use crate::enums::StitchMode;
use crate::figure::Figure;
use crate::figure::RenderError;
use crate::montage::MontageComposer;
use crate::slice_renderer::HeatmapFigure;
use crate::slice_renderer::SliceRenderer;
use crate::stitcher::StitchError;
use crate::stitcher::Stitcher;
use crate::volume::Volume;
use crate::volume_loader::LoadStatus;
use crate::volume_loader::VolumeLoader;
use crate::volume_renderer::VolumeFigure;
use crate::volume_renderer::VolumeRenderSettings;
use crate::volume_renderer::VolumeRenderer;
use crate::windowing::DisplayRange;
use crate::windowing::WindowCache;

use image::RgbImage;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

/// Slider marks are placed on every multiple of this.
pub const SLIDER_MARK_STEP: usize = 5;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No volume loaded, submit a dataset first")]
    NoVolumeLoaded,

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Stitch(#[from] StitchError),
}

/// Settings of the three orthogonal slice views.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceParameters {
    pub colormap: Colormap,
    pub min_pct: i32,
    pub max_pct: i32,
}

impl Default for SliceParameters {
    fn default() -> Self {
        Self {
            colormap: Colormap::Rainbow,
            min_pct: 8,
            max_pct: 92,
        }
    }
}

/// Settings of the 3D view.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParameters {
    pub colorscale: Colormap,
    pub min_pct: i32,
    pub max_pct: i32,
    pub opacity: f32,
    pub opacity_scale: f32,
    pub surface_count: u32,
    /// Overrides the volume's voxel size for tick labels.
    pub voxel_size: Option<f32>,
    /// Axis pointing up in the interactive 3D view.
    pub view_axis: Axis,
    pub width: u32,
    pub height: u32,
}

impl Default for VolumeParameters {
    fn default() -> Self {
        let settings = VolumeRenderSettings::default();
        Self {
            colorscale: settings.colorscale,
            min_pct: 8,
            max_pct: 92,
            opacity: settings.opacity,
            opacity_scale: settings.opacity_scale,
            surface_count: settings.surface_count,
            voxel_size: None,
            view_axis: Axis::Z,
            width: settings.width,
            height: settings.height,
        }
    }
}

impl VolumeParameters {
    pub fn settings(&self) -> VolumeRenderSettings {
        VolumeRenderSettings {
            colorscale: self.colorscale,
            opacity: self.opacity,
            opacity_scale: self.opacity_scale,
            surface_count: self.surface_count,
            voxel_size: self.voxel_size,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParameters {
    pub slice: SliceParameters,
    pub volume: VolumeParameters,
    /// Tiles per row in exported montages.
    pub montage_row_width: usize,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            slice: SliceParameters::default(),
            volume: VolumeParameters::default(),
            montage_row_width: 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceIndex {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl SliceIndex {
    pub fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Set the index for `axis`, clamped to `[0, extent - 1]` of `volume`.
    pub fn set(&mut self, axis: Axis, index: usize, volume: &Volume) {
        let clamped = index.min(volume.extent(axis).saturating_sub(1));
        match axis {
            Axis::X => self.x = clamped,
            Axis::Y => self.y = clamped,
            Axis::Z => self.z = clamped,
        }
    }

    /// Labelled slider positions for an axis with `extent` slices.
    pub fn marks(extent: usize) -> Vec<usize> {
        (0..extent).step_by(SLIDER_MARK_STEP).collect()
    }
}

/// A user edit that invalidates some views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Change {
    SliceIndex(Axis, usize),
    SliceParameters(SliceParameters),
    VolumeParameters(VolumeParameters),
    /// Explicit request to (re)draw the 3D view.
    RenderVolume,
}

#[derive(Clone, Debug)]
pub enum View {
    Slice(Axis, HeatmapFigure),
    Volume(VolumeFigure),
}

/// Every figure shown for one set of inputs.
#[derive(Clone, Debug)]
pub struct Views {
    pub x: HeatmapFigure,
    pub y: HeatmapFigure,
    pub z: HeatmapFigure,
    pub volume: VolumeFigure,
}

/// Compute all figures for `volume` from scratch. Deterministic in its
/// inputs; the slice index is expected to be within bounds.
pub fn render_views(
    volume: &Volume,
    params: &RenderParameters,
    index: &SliceIndex,
) -> Result<Views, RenderError> {
    let slice_range = DisplayRange::from_percentiles(
        volume,
        params.slice.min_pct as f64,
        params.slice.max_pct as f64,
    );
    let volume_range = DisplayRange::from_percentiles(
        volume,
        params.volume.min_pct as f64,
        params.volume.max_pct as f64,
    );
    let slice = |axis| {
        SliceRenderer::render(volume, axis, index.get(axis), params.slice.colormap, slice_range)
    };
    Ok(Views {
        x: slice(Axis::X)?,
        y: slice(Axis::Y)?,
        z: slice(Axis::Z)?,
        volume: VolumeRenderer::render(
            volume,
            &params.volume.settings(),
            volume_range,
            params.volume.view_axis,
        ),
    })
}

/// Build a summary image of `volume` and encode it as PNG, also writing it
/// to `outfile` when given.
pub fn summary(
    volume: &Volume,
    params: &RenderParameters,
    kind: ExportKind,
    outfile: Option<&Path>,
) -> Result<Vec<u8>, SessionError> {
    let montages = || -> Result<Vec<RgbImage>, SessionError> {
        let range = DisplayRange::from_percentiles(
            volume,
            params.slice.min_pct as f64,
            params.slice.max_pct as f64,
        );
        Axis::ALL
            .into_par_iter()
            .map(|axis| {
                MontageComposer::compose(
                    volume,
                    axis,
                    range,
                    params.slice.colormap,
                    params.montage_row_width,
                )
                .map(|montage| montage.to_image())
                .map_err(SessionError::from)
            })
            .collect()
    };
    let renderings = || -> Result<RgbImage, SessionError> {
        let range = DisplayRange::from_percentiles(
            volume,
            params.volume.min_pct as f64,
            params.volume.max_pct as f64,
        );
        let settings = params.volume.settings();
        let images: Vec<RgbImage> = Axis::ALL
            .into_par_iter()
            .map(|axis| VolumeRenderer::render(volume, &settings, range, axis).to_image())
            .collect();
        Ok(Stitcher::stitch_images(&images, StitchMode::Horizontal)?)
    };

    let canvas = match kind {
        ExportKind::TwoD => Stitcher::stitch_images(&montages()?, StitchMode::Vertical)?,
        ExportKind::ThreeD => renderings()?,
        ExportKind::All => {
            let mut tiles = montages()?;
            tiles.push(renderings()?);
            Stitcher::stitch_images(&tiles, StitchMode::Vertical)?
        }
    };
    debug!(?kind, size = ?canvas.dimensions(), "built summary");
    Ok(Stitcher::finish(&canvas, outfile)?)
}

/// A downloadable summary image.
#[derive(Clone, Debug)]
pub struct Export {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
struct Loaded {
    volume: Arc<Volume>,
    status: LoadStatus,
    generation: u64,
}

#[derive(Clone, Debug, Default)]
pub enum SessionState {
    #[default]
    NoVolumeLoaded,
    VolumeLoaded {
        volume: Arc<Volume>,
        status: LoadStatus,
    },
}

/// State of one viewer session.
#[derive(Debug, Default)]
pub struct Session {
    loaded: Option<Loaded>,
    params: RenderParameters,
    index: SliceIndex,
    generations: u64,
    slice_windows: WindowCache,
    volume_windows: WindowCache,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(params: RenderParameters) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.loaded {
            None => SessionState::NoVolumeLoaded,
            Some(loaded) => SessionState::VolumeLoaded {
                volume: Arc::clone(&loaded.volume),
                status: loaded.status.clone(),
            },
        }
    }

    pub fn volume(&self) -> Option<&Arc<Volume>> {
        self.loaded.as_ref().map(|l| &l.volume)
    }

    pub fn status(&self) -> Option<&LoadStatus> {
        self.loaded.as_ref().map(|l| &l.status)
    }

    pub fn parameters(&self) -> &RenderParameters {
        &self.params
    }

    pub fn slice_index(&self) -> SliceIndex {
        self.index
    }

    /// Load the dataset at `path`, replacing any previous volume. A failed
    /// load still moves the session to the loaded state with the
    /// placeholder volume; the returned message tells the user which case
    /// happened.
    pub fn submit(&mut self, path: impl AsRef<Path>) -> String {
        let loaded = VolumeLoader::load(path);
        let message = loaded.to_string();
        self.install(loaded.volume, loaded.status);
        message
    }

    /// Use an in-memory volume as the session dataset.
    pub fn submit_volume(&mut self, volume: Volume) -> String {
        let message = format!("volume shape: {:?}", volume.dim());
        self.install(volume, LoadStatus::Loaded);
        message
    }

    fn install(&mut self, volume: Volume, status: LoadStatus) {
        self.generations += 1;
        self.index = SliceIndex::default();
        self.slice_windows.clear();
        self.volume_windows.clear();
        info!(
            generation = self.generations,
            shape = ?volume.dim(),
            ?status,
            "session volume replaced"
        );
        self.loaded = Some(Loaded {
            volume: Arc::new(volume),
            status,
            generation: self.generations,
        });
    }

    fn loaded(&self) -> Result<&Loaded, SessionError> {
        self.loaded.as_ref().ok_or(SessionError::NoVolumeLoaded)
    }

    pub fn slice_range(&mut self) -> Result<DisplayRange, SessionError> {
        let loaded = self.loaded.as_ref().ok_or(SessionError::NoVolumeLoaded)?;
        Ok(self.slice_windows.get_or_compute(
            loaded.generation,
            &loaded.volume,
            self.params.slice.min_pct,
            self.params.slice.max_pct,
        ))
    }

    pub fn volume_range(&mut self) -> Result<DisplayRange, SessionError> {
        let loaded = self.loaded.as_ref().ok_or(SessionError::NoVolumeLoaded)?;
        Ok(self.volume_windows.get_or_compute(
            loaded.generation,
            &loaded.volume,
            self.params.volume.min_pct,
            self.params.volume.max_pct,
        ))
    }

    pub fn render_slice(&mut self, axis: Axis) -> Result<HeatmapFigure, SessionError> {
        let range = self.slice_range()?;
        let loaded = self.loaded()?;
        Ok(SliceRenderer::render(
            &loaded.volume,
            axis,
            self.index.get(axis),
            self.params.slice.colormap,
            range,
        )?)
    }

    pub fn render_volume(&mut self) -> Result<VolumeFigure, SessionError> {
        let range = self.volume_range()?;
        let loaded = self.loaded()?;
        Ok(VolumeRenderer::render(
            &loaded.volume,
            &self.params.volume.settings(),
            range,
            self.params.volume.view_axis,
        ))
    }

    /// Apply `change` and re-render only the views that depend on it.
    pub fn apply(&mut self, change: Change) -> Result<Vec<View>, SessionError> {
        let volume = Arc::clone(&self.loaded()?.volume);
        debug!(?change, "applying change");
        match change {
            Change::SliceIndex(axis, index) => {
                self.index.set(axis, index, &volume);
                Ok(vec![View::Slice(axis, self.render_slice(axis)?)])
            }
            Change::SliceParameters(slice) => {
                self.params.slice = slice;
                Axis::ALL
                    .into_iter()
                    .map(|axis| -> Result<View, SessionError> {
                        Ok(View::Slice(axis, self.render_slice(axis)?))
                    })
                    .collect()
            }
            Change::VolumeParameters(params) => {
                self.params.volume = params;
                Ok(vec![View::Volume(self.render_volume()?)])
            }
            Change::RenderVolume => Ok(vec![View::Volume(self.render_volume()?)]),
        }
    }

    /// All current figures, computed from scratch.
    pub fn views(&self) -> Result<Views, SessionError> {
        let loaded = self.loaded()?;
        Ok(render_views(&loaded.volume, &self.params, &self.index)?)
    }

    /// Build the requested summary as a PNG attachment.
    pub fn export(&self, kind: ExportKind) -> Result<Export, SessionError> {
        let loaded = self.loaded()?;
        info!(?kind, "exporting summary");
        Ok(Export {
            file_name: kind.file_name(),
            content_type: "image/png",
            bytes: summary(&loaded.volume, &self.params, kind, None)?,
        })
    }
}

/// Opaque handle of one session in a [`SessionRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey(Uuid);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Keeps concurrent sessions apart; nothing is shared between them.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> SessionKey {
        let key = SessionKey(Uuid::new_v4());
        self.sessions.insert(key, Session::new());
        debug!(%key, "session created");
        key
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<Session> {
        self.sessions.remove(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn linear_4() -> Volume {
        Volume::new(
            Array3::from_shape_vec((4, 4, 4), (0..64).map(|v| v as f32).collect())
                .expect("shape matches"),
            1.0,
        )
    }

    fn small_params() -> RenderParameters {
        RenderParameters {
            volume: VolumeParameters {
                width: 24,
                height: 20,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_dashboard_controls() {
        let params = RenderParameters::default();
        assert_eq!(params.slice.colormap, Colormap::Rainbow);
        assert_eq!((params.slice.min_pct, params.slice.max_pct), (8, 92));
        assert_eq!(params.volume.opacity, 0.3);
        assert_eq!(params.volume.opacity_scale, 0.3);
        assert_eq!(params.volume.surface_count, 12);
        assert_eq!(params.montage_row_width, 4);
    }

    #[test]
    fn parameters_deserialize_with_defaults() {
        let params: RenderParameters =
            serde_json::from_str(r#"{"slice": {"colormap": "viridis"}}"#).expect("parses");
        assert_eq!(params.slice.colormap, Colormap::Viridis);
        assert_eq!(params.slice.max_pct, 92);
        assert_eq!(params.volume, VolumeParameters::default());
    }

    #[test]
    fn nothing_renders_before_submit() {
        let mut session = Session::new();
        assert!(matches!(session.state(), SessionState::NoVolumeLoaded));
        assert!(matches!(
            session.apply(Change::RenderVolume),
            Err(SessionError::NoVolumeLoaded)
        ));
        assert!(matches!(
            session.export(ExportKind::TwoD),
            Err(SessionError::NoVolumeLoaded)
        ));
    }

    #[test]
    fn failed_submit_still_loads_placeholder() {
        let mut session = Session::new();
        let message = session.submit("/definitely/not/a/dataset");
        assert!(message.contains("could not load"));
        match session.state() {
            SessionState::VolumeLoaded { volume, status } => {
                assert_eq!(volume.dim(), (1, 1, 1));
                assert!(status.is_placeholder());
            }
            SessionState::NoVolumeLoaded => panic!("expected a loaded state"),
        }
        let views = session.apply(Change::SliceIndex(Axis::X, 0)).expect("renders");
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn slice_index_change_renders_only_that_axis() {
        let mut session = Session::new();
        session.submit_volume(linear_4());
        let views = session.apply(Change::SliceIndex(Axis::Y, 9)).expect("renders");
        assert_eq!(views.len(), 1);
        match &views[0] {
            View::Slice(axis, figure) => {
                assert_eq!(*axis, Axis::Y);
                assert_eq!(figure.title, "y-slice 3");
            }
            View::Volume(_) => panic!("expected a slice view"),
        }
        assert_eq!(session.slice_index(), SliceIndex { x: 0, y: 3, z: 0 });
    }

    #[test]
    fn slice_parameters_rerender_all_slices() {
        let mut session = Session::new();
        session.submit_volume(linear_4());
        let change = Change::SliceParameters(SliceParameters {
            colormap: Colormap::Gray,
            min_pct: 0,
            max_pct: 100,
        });
        let views = session.apply(change).expect("renders");
        let axes: Vec<Axis> = views
            .iter()
            .filter_map(|v| match v {
                View::Slice(axis, figure) => {
                    assert_eq!((figure.zmin, figure.zmax), (0.0, 63.0));
                    assert_eq!(figure.colorscale, Colormap::Gray);
                    Some(*axis)
                }
                View::Volume(_) => None,
            })
            .collect();
        assert_eq!(axes, Axis::ALL.to_vec());
    }

    #[test]
    fn volume_parameters_rerender_only_3d() {
        let mut session = Session::with_parameters(small_params());
        session.submit_volume(linear_4());
        let params = VolumeParameters {
            surface_count: 5,
            view_axis: Axis::X,
            ..small_params().volume
        };
        let views = session.apply(Change::VolumeParameters(params)).expect("renders");
        assert_eq!(views.len(), 1);
        match &views[0] {
            View::Volume(figure) => {
                assert_eq!(figure.surface_count, 5);
                assert_eq!(figure.camera.up, [1.0, 0.0, 0.0]);
            }
            View::Slice(..) => panic!("expected the 3D view"),
        }
    }

    #[test]
    fn resubmit_resets_indices() {
        let mut session = Session::new();
        session.submit_volume(linear_4());
        session.apply(Change::SliceIndex(Axis::Z, 2)).expect("renders");
        session.submit_volume(Volume::new(Array3::zeros((2, 2, 2)), 1.0));
        assert_eq!(session.slice_index(), SliceIndex::default());
        assert_eq!(session.slice_range().expect("loaded"), DisplayRange::new(0.0, 0.0));
    }

    #[test]
    fn render_views_is_pure() {
        let volume = linear_4();
        let params = small_params();
        let index = SliceIndex { x: 2, y: 1, z: 0 };
        let first = render_views(&volume, &params, &index).expect("renders");
        let second = render_views(&volume, &params, &index).expect("renders");
        assert_eq!(first.x.z, second.x.z);
        assert_eq!(first.volume.value, second.volume.value);
        assert_eq!(first.x.z.row(0).to_vec(), vec![32.0, 33.0, 34.0, 35.0]);
    }

    #[test]
    fn exports_stack_montages_and_renderings() {
        let mut session = Session::with_parameters(small_params());
        session.submit_volume(linear_4());
        let before = session.slice_index();

        let two_d = session.export(ExportKind::TwoD).expect("exports");
        assert_eq!(two_d.file_name, "volume_summary_2d.png");
        let montage = image::load_from_memory(&two_d.bytes).expect("png");

        let three_d = session.export(ExportKind::ThreeD).expect("exports");
        let row = image::load_from_memory(&three_d.bytes).expect("png");
        assert_eq!((row.width(), row.height()), (3 * 24, 20));

        let all = session.export(ExportKind::All).expect("exports");
        let combined = image::load_from_memory(&all.bytes).expect("png");
        assert_eq!(combined.width(), montage.width().max(row.width()));
        assert_eq!(combined.height(), montage.height() + row.height());

        assert_eq!(session.slice_index(), before);
    }

    #[test]
    fn views_match_render_views_on_session_state() {
        let mut session = Session::with_parameters(small_params());
        session.submit_volume(linear_4());
        session.apply(Change::SliceIndex(Axis::Z, 3)).expect("renders");

        let views = session.views().expect("renders");
        let expected = render_views(&linear_4(), session.parameters(), &session.slice_index())
            .expect("renders");
        assert_eq!(views.z.z, expected.z.z);
        assert_eq!(views.z.title, "z-slice 3");
        assert_eq!(views.x.z, expected.x.z);
        assert_eq!(views.volume.value, expected.volume.value);
        assert_eq!(views.volume.to_image(), expected.volume.to_image());
    }

    #[test]
    fn tick_labels_follow_volume_voxel_size_unless_overridden() {
        let mut session = Session::with_parameters(small_params());
        session.submit_volume(Volume::new(Array3::zeros((9, 2, 2)), 1.0).with_voxel_size(0.5));
        let views = session.apply(Change::RenderVolume).expect("renders");
        let View::Volume(own) = &views[0] else {
            panic!("expected the 3D view");
        };
        assert_eq!(own.ticks.ticktext, vec!["0.0", "4.0"]);

        let params = VolumeParameters {
            voxel_size: Some(2.0),
            ..small_params().volume
        };
        let views = session.apply(Change::VolumeParameters(params)).expect("renders");
        let View::Volume(overridden) = &views[0] else {
            panic!("expected the 3D view");
        };
        assert_eq!(overridden.ticks.ticktext, vec!["0.0", "16.0"]);
    }

    #[test]
    fn slider_marks_every_fifth_index() {
        assert_eq!(SliceIndex::marks(12), vec![0, 5, 10]);
        assert_eq!(SliceIndex::marks(1), vec![0]);
    }

    #[test]
    fn registry_isolates_sessions() {
        let mut registry = SessionRegistry::new();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);

        registry
            .get_mut(&a)
            .expect("session a")
            .submit_volume(linear_4());
        assert!(registry.get(&a).and_then(Session::volume).is_some());
        assert!(registry.get(&b).and_then(Session::volume).is_none());

        assert!(registry.remove(&a).is_some());
        assert_eq!(registry.len(), 1);
    }
}
