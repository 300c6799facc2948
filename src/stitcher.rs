//! Concatenation of rendered images into one summary canvas.

use crate::enums::StitchMode;
use crate::figure::RenderError;
use crate::figure::encode_png;

use image::ImageBuffer;
use image::Rgb;
use image::RgbImage;
use image::imageops;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("Nothing to stitch")]
    Empty,

    #[error("Tile {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Summary could not be written: {0}")]
    Save(#[from] image::ImageError),

    #[error(transparent)]
    Encode(#[from] RenderError),
}

pub struct Stitcher;

impl Stitcher {
    /// Canvas (width, height) needed to hold `sizes` laid out in `mode`.
    pub fn canvas_size(sizes: &[(u32, u32)], mode: StitchMode) -> (u32, u32) {
        sizes
            .iter()
            .fold((0, 0), |(width, height), &(w, h)| match mode {
                StitchMode::Vertical => (width.max(w), height + h),
                StitchMode::Horizontal => (width + w, height.max(h)),
            })
    }

    /// Paste `images` one after another starting at the top-left corner.
    /// Space not covered by a tile stays black.
    pub fn stitch_images(images: &[RgbImage], mode: StitchMode) -> Result<RgbImage, StitchError> {
        if images.is_empty() {
            return Err(StitchError::Empty);
        }
        let sizes: Vec<_> = images.iter().map(|img| img.dimensions()).collect();
        let (width, height) = Self::canvas_size(&sizes, mode);
        let mut canvas: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([0, 0, 0]));

        let mut cursor = (0u32, 0u32);
        for image in images {
            imageops::replace(&mut canvas, image, cursor.0 as i64, cursor.1 as i64);
            cursor = match mode {
                StitchMode::Vertical => (0, cursor.1 + image.height()),
                StitchMode::Horizontal => (cursor.0 + image.width(), cursor.1),
            };
        }
        tracing::debug!(tiles = images.len(), width, height, ?mode, "stitched summary");
        Ok(canvas)
    }

    /// Decode every encoded buffer and stitch the results.
    pub fn stitch_buffers(
        buffers: &[impl AsRef<[u8]>],
        mode: StitchMode,
    ) -> Result<RgbImage, StitchError> {
        let images = buffers
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                image::load_from_memory(bytes.as_ref())
                    .map(|decoded| decoded.to_rgb8())
                    .map_err(|source| StitchError::Decode { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // The decoded tiles are dropped as soon as the canvas is built.
        Self::stitch_images(&images, mode)
    }

    /// Stitch encoded images into a PNG buffer, also saving it to `outfile`
    /// when given.
    pub fn stitch(
        buffers: &[impl AsRef<[u8]>],
        mode: StitchMode,
        outfile: Option<&Path>,
    ) -> Result<Vec<u8>, StitchError> {
        let summary = Self::stitch_buffers(buffers, mode)?;
        Self::finish(&summary, outfile)
    }

    /// Encode a finished summary, saving it first if a path is given.
    pub fn finish(summary: &RgbImage, outfile: Option<&Path>) -> Result<Vec<u8>, StitchError> {
        if let Some(path) = outfile {
            summary.save(path)?;
            tracing::info!(path = %path.display(), "saved summary image");
        }
        Ok(encode_png(summary)?)
    }
}
