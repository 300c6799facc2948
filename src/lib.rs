//! # volume-viewer library
//!
//! This crate serves the core of an interactive 3D volume viewer: loading a
//! dataset into a volume, contrast windowing, and rendering slice, montage
//! and isosurface views that a front end can either draw itself (every
//! figure serializes to JSON) or take as ready-made PNG images.
//!
//! Volumes can either be loaded from a directory of numbered slice images
//! (`slice_1.tif`, `slice_2.tif`, ..., ordered by the digits in the file
//! name, not lexically) or from a single `.npy` array. Loading never fails:
//! an unreadable dataset yields a 1x1x1 placeholder volume flagged with
//! [`LoadStatus::Placeholder`].
//!
//! The volume can be sliced along its three axes:
//!  - x (first array axis, the slice order of an image stack)
//!  - y
//!  - z
//!
//! Display ranges are taken from percentiles of all samples, so the same
//! contrast applies to every view of a volume.
//!
//! A [`Session`] keeps one user's volume and parameters and re-renders only
//! the views affected by each change. Exports stitch montages of every
//! slice and three 3D camera presets into a single summary image.
//!
//! # Examples
//!
//! ## Rendering the centre slice of an image stack
//!
//! ```no_run
//! # use volume_viewer::{Axis, Colormap, DisplayRange, Figure, SliceRenderer, VolumeLoader};
//! let loaded = VolumeLoader::load("stack/");
//! println!("{loaded}");
//! let volume = loaded.volume;
//! let range = DisplayRange::from_percentiles(&volume, 8.0, 92.0);
//! let centre = volume.dim().0 / 2;
//! let figure = SliceRenderer::render(&volume, Axis::X, centre, Colormap::Viridis, range)
//!     .expect("index is in bounds");
//! figure.to_image().save("slice.png").expect("should have written the slice");
//! ```
//!
//! ## Driving a session
//!
//! ```no_run
//! # use volume_viewer::{Axis, Change, ExportKind, Session};
//! let mut session = Session::new();
//! println!("{}", session.submit("volume.npy"));
//! let views = session.apply(Change::SliceIndex(Axis::Z, 10)).expect("volume is loaded");
//! let export = session.export(ExportKind::All).expect("summary renders");
//! std::fs::write(export.file_name, export.bytes).expect("should have saved the summary");
//! # drop(views);
//! ```

pub mod colormap;
pub mod enums;
pub mod figure;
mod interpolator;
pub mod montage;
pub mod npy;
pub mod session;
pub mod slice_renderer;
pub mod stitcher;
pub mod volume;
pub mod volume_loader;
pub mod volume_renderer;
pub mod windowing;

pub use enums::{Axis, Colormap, ExportKind, StitchMode};
pub use figure::{Figure, RenderError};
pub use montage::{MontageComposer, MontageFigure};
pub use session::{
    Change, Export, RenderParameters, Session, SessionError, SessionKey, SessionRegistry,
    SessionState, SliceIndex, SliceParameters, View, Views, VolumeParameters, render_views,
};
pub use slice_renderer::{HeatmapFigure, SliceRenderer};
pub use stitcher::{StitchError, Stitcher};
pub use volume::Volume;
pub use volume_loader::{LoadStatus, LoadedVolume, VolumeLoader, VolumeLoaderError};
pub use volume_renderer::{VolumeFigure, VolumeRenderSettings, VolumeRenderer};
pub use windowing::DisplayRange;

/// Install the `tracing` subscriber used by the command line tool. The
/// `RUST_LOG` environment variable refines the default `info` level.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
