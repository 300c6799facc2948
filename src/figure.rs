//! Shared plumbing for renderable figures.

use crate::enums::Axis;

use image::ImageFormat;
use image::RgbImage;
use ndarray::Array2;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeSeq;
use std::io::Cursor;
use thiserror::Error;

/// Background of 3D scenes ("LightBlue").
pub const PAPER_COLOR: [u8; 3] = [173, 216, 230];

/// Gutter between montage tiles.
pub const GUTTER_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Index {index} out of bounds for {axis} axis with {extent} slices")]
    IndexOutOfBounds {
        axis: Axis,
        index: usize,
        extent: usize,
    },

    #[error("Images per row must be at least 1")]
    InvalidRowWidth,

    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A figure is both a serializable description (for a front end that draws
/// it itself) and something this crate can rasterize.
pub trait Figure: Serialize {
    fn to_image(&self) -> RgbImage;

    fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        encode_png(&self.to_image())
    }

    fn to_json(&self) -> Result<String, RenderError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Serialize a 2D array as nested rows, the layout plotting front ends
/// expect for heatmap `z` values.
pub(crate) fn serialize_rows<S: Serializer>(
    array: &Array2<f32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(array.nrows()))?;
    for row in array.rows() {
        seq.serialize_element(&row.to_vec())?;
    }
    seq.end()
}
