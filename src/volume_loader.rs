use crate::npy;
use crate::volume::Volume;

use image::DynamicImage;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::s;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use tracing::warn;

const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid slice images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Not a directory or .npy file: {0}")]
    UnsupportedPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array file error: {0}")]
    Npy(#[from] npy::NpyError),
}

/// Whether a volume holds real data or the fallback placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Placeholder { reason: String },
}

impl LoadStatus {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, LoadStatus::Placeholder { .. })
    }
}

/// Result of [`VolumeLoader::load`]: always a usable volume plus how it was
/// obtained.
#[derive(Clone, Debug)]
pub struct LoadedVolume {
    pub volume: Volume,
    pub status: LoadStatus,
}

impl fmt::Display for LoadedVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            LoadStatus::Loaded => write!(f, "volume shape: {:?}", self.volume.dim()),
            LoadStatus::Placeholder { reason } => {
                write!(f, "could not load dataset ({reason}), showing empty volume")
            }
        }
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a dataset from either a `.npy` file or a directory of numbered
    /// slice images.
    ///
    /// This never fails: on any error the 1x1x1 placeholder volume is
    /// returned with [`LoadStatus::Placeholder`] and a warning is logged.
    pub fn load(path: impl AsRef<Path>) -> LoadedVolume {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(volume) => {
                info!(path = %path.display(), shape = ?volume.dim(), "loaded volume");
                LoadedVolume {
                    volume,
                    status: LoadStatus::Loaded,
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "falling back to placeholder volume");
                LoadedVolume {
                    volume: Volume::placeholder(),
                    status: LoadStatus::Placeholder {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    /// Strict variant of [`VolumeLoader::load`] that reports errors.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        if Self::is_npy(path) {
            Self::load_npy(path)
        } else if path.is_dir() {
            Self::load_from_directory(path)
        } else {
            Err(VolumeLoaderError::UnsupportedPath(path.to_path_buf()))
        }
    }

    /// Load a volume from a serialized `.npy` array
    pub fn load_npy(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        Ok(Volume::new(npy::read(path.as_ref())?, 1.0))
    }

    /// Save the volume samples as a `.npy` array (`<f4`, C order)
    pub fn save_npy(volume: &Volume, path: impl AsRef<Path>) -> Result<(), VolumeLoaderError> {
        npy::write(volume.data(), path.as_ref())?;
        Ok(())
    }

    /// Load a volume from slice image paths, ordered by the number in each
    /// file name.
    pub fn load_from_file_paths(paths: &[impl AsRef<Path>]) -> Result<Volume, VolumeLoaderError> {
        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        let mut paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        Self::sort_paths(&mut paths);

        let images = paths
            .iter()
            .map(|path| Self::decode_image(path))
            .collect::<Result<Vec<_>, _>>()?;

        Self::validate_dimensions(&images)?;
        Ok(Volume::new(Self::build_volume_array(&images), 1.0))
    }

    /// Load a volume from a directory containing numbered slice images
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_slice_image(path))
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        // read_dir order is platform dependent; fix it before the stable sort.
        paths.sort();

        Self::load_from_file_paths(&paths)
    }

    fn is_npy(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"))
    }

    fn is_slice_image(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
    }

    /// Integer formed by every digit in the file name, e.g. `slice_012.tif`
    /// gives 12. `None` when the name has no digits.
    pub fn slice_number(path: &Path) -> Option<u128> {
        let digits: String = path
            .file_name()?
            .to_string_lossy()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let significant = digits.trim_start_matches('0');
        if digits.is_empty() {
            None
        } else if significant.is_empty() {
            Some(0)
        } else {
            significant.parse().ok()
        }
    }

    /// Stable: paths with equal (or missing) numbers keep their order.
    fn sort_paths(paths: &mut [PathBuf]) {
        paths.sort_by_key(|path| Self::slice_number(path));
    }

    fn decode_image(path: &Path) -> Result<Array2<f32>, VolumeLoaderError> {
        let image = image::open(path)?;
        Ok(Self::image_to_array(image))
    }

    /// Grayscale samples keep their stored values; colour images are
    /// reduced to luminance at their native bit depth.
    fn image_to_array(image: DynamicImage) -> Array2<f32> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let samples: Vec<f32> = match image {
            DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            float @ (DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)) => {
                float.to_luma32f().into_raw()
            }
            wide @ (DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_)) => wide
                .to_luma16()
                .into_raw()
                .into_iter()
                .map(f32::from)
                .collect(),
            other => other
                .to_luma8()
                .into_raw()
                .into_iter()
                .map(f32::from)
                .collect(),
        };
        Array2::from_shape_vec((height, width), samples)
            .unwrap_or_else(|_| Array2::zeros((height, width)))
    }

    fn validate_dimensions(images: &[Array2<f32>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<f32>]) -> Array3<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }
}
