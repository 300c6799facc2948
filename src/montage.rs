use crate::enums::Axis;
use crate::enums::Colormap;
use crate::figure::Figure;
use crate::figure::GUTTER_COLOR;
use crate::figure::RenderError;
use crate::slice_renderer::HeatmapFigure;
use crate::slice_renderer::SliceRenderer;
use crate::volume::Volume;
use crate::windowing::DisplayRange;

use image::ImageBuffer;
use image::Rgb;
use image::RgbImage;
use image::imageops;
use rayon::prelude::*;
use serde::Serialize;

/// Pixels per cell for montage tiles.
pub const TILE_CELL_SIZE: u32 = 3;

/// Gap between neighbouring tiles, in pixels.
pub const TILE_GUTTER: u32 = 4;

/// Every slice along one axis, laid out row-major in a fixed-width grid.
#[derive(Clone, Debug, Serialize)]
pub struct MontageFigure {
    pub title: String,
    pub axis: Axis,
    pub rows: usize,
    pub cols: usize,
    pub tiles: Vec<HeatmapFigure>,
}

impl MontageFigure {
    /// Tile index for each grid cell, `None` for the unused tail of the last
    /// row.
    pub fn grid(&self) -> Vec<Vec<Option<usize>>> {
        (0..self.rows)
            .map(|row| {
                (0..self.cols)
                    .map(|col| {
                        let i = row * self.cols + col;
                        (i < self.tiles.len()).then_some(i)
                    })
                    .collect()
            })
            .collect()
    }

    pub fn empty_cells(&self) -> usize {
        self.rows * self.cols - self.tiles.len()
    }

    /// Tile size in pixels (width, height); every tile along an axis has the
    /// same shape.
    fn tile_size(&self) -> (u32, u32) {
        self.tiles
            .first()
            .map(|t| {
                let (rows, cols) = t.z.dim();
                (cols as u32 * TILE_CELL_SIZE, rows as u32 * TILE_CELL_SIZE)
            })
            .unwrap_or((0, 0))
    }
}

impl Figure for MontageFigure {
    fn to_image(&self) -> RgbImage {
        let (tile_w, tile_h) = self.tile_size();
        let width = self.cols as u32 * (tile_w + TILE_GUTTER) + TILE_GUTTER;
        let height = self.rows as u32 * (tile_h + TILE_GUTTER) + TILE_GUTTER;
        let mut canvas: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(GUTTER_COLOR));

        let rendered: Vec<RgbImage> = self
            .tiles
            .par_iter()
            .map(|tile| tile.to_image_scaled(TILE_CELL_SIZE))
            .collect();

        for (i, tile) in rendered.iter().enumerate() {
            let (row, col) = ((i / self.cols) as u32, (i % self.cols) as u32);
            let x = TILE_GUTTER + col * (tile_w + TILE_GUTTER);
            let y = TILE_GUTTER + row * (tile_h + TILE_GUTTER);
            imageops::replace(&mut canvas, tile, x as i64, y as i64);
        }
        canvas
    }
}

pub struct MontageComposer;

impl MontageComposer {
    /// Render every slice along `axis` as an axis-less tile, `row_width`
    /// tiles per row.
    pub fn compose(
        volume: &Volume,
        axis: Axis,
        range: DisplayRange,
        colormap: Colormap,
        row_width: usize,
    ) -> Result<MontageFigure, RenderError> {
        if row_width == 0 {
            return Err(RenderError::InvalidRowWidth);
        }
        let count = volume.extent(axis);
        let tiles = (0..count)
            .map(|index| {
                SliceRenderer::render(volume, axis, index, colormap, range).map(|mut tile| {
                    tile.show_axes = false;
                    tile
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MontageFigure {
            title: format!("{axis}-slices"),
            axis,
            rows: count.div_ceil(row_width),
            cols: row_width,
            tiles,
        })
    }
}
