use crate::enums::Axis;
use crate::enums::Colormap;
use crate::figure::Figure;
use crate::figure::RenderError;
use crate::figure::serialize_rows;
use crate::volume::Volume;
use crate::windowing::DisplayRange;

use image::ImageBuffer;
use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

/// Interactive slice views aim for roughly this many pixels along their
/// longer side.
const TARGET_EDGE: usize = 480;

/// Colour-mapped 2D grid. Row 0 is drawn at the top.
#[derive(Clone, Debug, Serialize)]
pub struct HeatmapFigure {
    pub title: String,
    #[serde(serialize_with = "serialize_rows")]
    pub z: Array2<f32>,
    pub zmin: f32,
    pub zmax: f32,
    pub colorscale: Colormap,
    pub show_axes: bool,
}

impl HeatmapFigure {
    pub fn range(&self) -> DisplayRange {
        DisplayRange::new(self.zmin, self.zmax)
    }

    /// Pixel edge length of one cell when rendered with [`Figure::to_image`].
    pub fn default_cell_size(&self) -> u32 {
        let (rows, cols) = self.z.dim();
        (TARGET_EDGE / rows.max(cols).max(1)).max(1) as u32
    }

    /// Rasterize with every cell drawn as a `cell` x `cell` square.
    pub fn to_image_scaled(&self, cell: u32) -> RgbImage {
        let cell = cell.max(1) as usize;
        let (rows, cols) = self.z.dim();
        let (width, height) = (cols * cell, rows * cell);
        let range = self.range();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                let row = self.z.row(y / cell);
                (0..width).flat_map(move |x| self.colorscale.map_value(row[x / cell], &range))
            })
            .collect();

        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
            .unwrap_or_else(|| RgbImage::new(width as u32, height as u32))
    }
}

impl Figure for HeatmapFigure {
    fn to_image(&self) -> RgbImage {
        self.to_image_scaled(self.default_cell_size())
    }
}

pub struct SliceRenderer;

impl SliceRenderer {
    /// Heatmap of the cross-section at `index` along `axis`, clamped to
    /// `range`.
    pub fn render(
        volume: &Volume,
        axis: Axis,
        index: usize,
        colormap: Colormap,
        range: DisplayRange,
    ) -> Result<HeatmapFigure, RenderError> {
        let slice = volume
            .get_slice_from_axis(index, axis)
            .ok_or(RenderError::IndexOutOfBounds {
                axis,
                index,
                extent: volume.extent(axis),
            })?;
        Ok(HeatmapFigure {
            title: format!("{axis}-slice {index}"),
            z: slice.to_owned(),
            zmin: range.low,
            zmax: range.high,
            colorscale: colormap,
            show_axes: true,
        })
    }
}
