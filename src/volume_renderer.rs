//! Isosurface rendering of a whole volume.
//!
//! [`VolumeFigure`] carries the flattened grid in the form plotting front
//! ends consume. Its raster output is an orthographic ray caster that
//! draws `surface_count` translucent iso-shells between `isomin` and
//! `isomax`, composited front to back.

use crate::enums::Axis;
use crate::enums::Colormap;
use crate::figure::Figure;
use crate::figure::PAPER_COLOR;
use crate::interpolator::Interpolator;
use crate::volume::Volume;
use crate::windowing::DisplayRange;

use glam::Vec3;
use image::ImageBuffer;
use image::RgbImage;
use ndarray::ArrayView3;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;

pub const MIN_SURFACE_COUNT: u32 = 3;
pub const MAX_SURFACE_COUNT: u32 = 30;

/// Tick spacing along every scene axis, in voxels.
pub const TICK_STRIDE: usize = 8;

const STEP: f32 = 0.5;
const OPAQUE: f32 = 0.99;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeRenderSettings {
    pub colorscale: Colormap,
    pub opacity: f32,
    /// Opacity of the lowest iso-shell relative to the highest one.
    pub opacity_scale: f32,
    pub surface_count: u32,
    /// Overrides the volume's own voxel size for tick labels.
    pub voxel_size: Option<f32>,
    pub width: u32,
    pub height: u32,
}

impl Default for VolumeRenderSettings {
    fn default() -> Self {
        Self {
            colorscale: Colormap::Rainbow,
            opacity: 0.3,
            opacity_scale: 0.3,
            surface_count: 12,
            voxel_size: None,
            width: 700,
            height: 600,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub up: [f32; 3],
    pub eye: [f32; 3],
    pub center: [f32; 3],
}

impl Camera {
    /// Preset camera looking at the scene with `axis` pointing up.
    pub fn for_axis(axis: Axis) -> Self {
        let (up, eye) = match axis {
            Axis::X => ([1.0, 0.0, 0.0], [1.25, 1.25, 1.25]),
            Axis::Y => ([0.0, 1.0, 0.0], [1.25, 1.25, 1.25]),
            Axis::Z => ([0.0, 0.0, 1.0], [-1.25, 1.25, 1.25]),
        };
        Self {
            up,
            eye,
            center: [0.0; 3],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisTicks {
    pub tickvals: Vec<usize>,
    pub ticktext: Vec<String>,
}

impl AxisTicks {
    /// Every [`TICK_STRIDE`]th index below `extent`, labelled in physical
    /// units.
    pub fn new(extent: usize, voxel_size: f32) -> Self {
        let tickvals: Vec<usize> = (0..extent).step_by(TICK_STRIDE).collect();
        let ticktext = tickvals
            .iter()
            .map(|&i| format_tick(i as f32 * voxel_size))
            .collect();
        Self { tickvals, ticktext }
    }
}

fn format_tick(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VolumeFigure {
    pub name: String,
    pub shape: [usize; 3],
    pub x: Vec<u32>,
    pub y: Vec<u32>,
    pub z: Vec<u32>,
    pub value: Vec<f32>,
    pub isomin: f32,
    pub isomax: f32,
    pub opacity: f32,
    pub opacity_scale: f32,
    pub surface_count: u32,
    pub colorscale: Colormap,
    pub camera: Camera,
    pub ticks: AxisTicks,
    pub width: u32,
    pub height: u32,
}

pub struct VolumeRenderer;

impl VolumeRenderer {
    pub fn clamp_surface_count(count: u32) -> u32 {
        count.clamp(MIN_SURFACE_COUNT, MAX_SURFACE_COUNT)
    }

    /// Build the 3D figure for `volume`, viewed with `axis` pointing up.
    pub fn render(
        volume: &Volume,
        settings: &VolumeRenderSettings,
        range: DisplayRange,
        axis: Axis,
    ) -> VolumeFigure {
        let (nx, ny, nz) = volume.dim();
        let count = nx * ny * nz;
        let mut x = Vec::with_capacity(count);
        let mut y = Vec::with_capacity(count);
        let mut z = Vec::with_capacity(count);
        for i in 0..nx as u32 {
            for j in 0..ny as u32 {
                for k in 0..nz as u32 {
                    x.push(i);
                    y.push(j);
                    z.push(k);
                }
            }
        }
        let value: Vec<f32> = volume.data().iter().copied().collect();

        let voxel_size = settings.voxel_size.unwrap_or(volume.voxel_size);
        let surface_count = Self::clamp_surface_count(settings.surface_count);
        tracing::debug!(%axis, ?range, surface_count, "building volume figure");

        VolumeFigure {
            name: "3D volume".to_string(),
            shape: [nx, ny, nz],
            x,
            y,
            z,
            value,
            isomin: range.low,
            isomax: range.high,
            opacity: settings.opacity,
            opacity_scale: settings.opacity_scale,
            surface_count,
            colorscale: settings.colorscale,
            camera: Camera::for_axis(axis),
            ticks: AxisTicks::new(nx.max(ny).max(nz), voxel_size),
            width: settings.width,
            height: settings.height,
        }
    }
}

struct Scene<'a> {
    data: ArrayView3<'a, f32>,
    lo: Vec3,
    hi: Vec3,
    levels: Vec<(f32, [f32; 3], f32)>,
}

impl VolumeFigure {
    fn scene(&self) -> Option<Scene<'_>> {
        let data = ArrayView3::from_shape(self.shape, self.value.as_slice()).ok()?;
        let n = Vec3::new(
            self.shape[0] as f32,
            self.shape[1] as f32,
            self.shape[2] as f32,
        );
        Some(Scene {
            data,
            lo: Vec3::splat(-0.5),
            hi: n - 0.5,
            levels: self.levels(),
        })
    }

    /// Iso-levels with their colour and per-shell opacity.
    fn levels(&self) -> Vec<(f32, [f32; 3], f32)> {
        let count = self.surface_count.max(1);
        let span = self.isomax - self.isomin;
        (0..count)
            .map(|k| {
                let t = if count == 1 {
                    0.0
                } else {
                    k as f32 / (count - 1) as f32
                };
                let rgb = self.colorscale.sample(t).map(|c| c as f32 / 255.0);
                let scale = self.opacity_scale + (1.0 - self.opacity_scale) * t;
                (self.isomin + span * t, rgb, (self.opacity * scale).clamp(0.0, 1.0))
            })
            .collect()
    }

    fn shade(&self, scene: &Scene<'_>, origin: Vec3, dir: Vec3) -> [u8; 3] {
        let background = Vec3::from_array(PAPER_COLOR.map(|c| c as f32 / 255.0));
        let Some((t_near, t_far)) = intersect_box(origin, dir, scene.lo, scene.hi) else {
            return PAPER_COLOR;
        };

        let mut color = Vec3::ZERO;
        let mut alpha = 0.0f32;
        let mut t = t_near;
        // Outside the box counts as below every level, so shells touching
        // the boundary are still drawn.
        let mut previous = f32::NEG_INFINITY;
        while t <= t_far && alpha < OPAQUE {
            let position = origin + dir * t;
            let current = Interpolator::trilinear_interpolate(&scene.data, position.to_array());
            t += STEP;
            let (a, b) = if previous <= current {
                (previous, current)
            } else {
                (current, previous)
            };
            for &(level, rgb, shell_alpha) in &scene.levels {
                if a < level && level <= b {
                    let weight = (1.0 - alpha) * shell_alpha;
                    color += Vec3::from_array(rgb) * weight;
                    alpha += weight;
                }
            }
            previous = current;
        }

        let out = color + background * (1.0 - alpha);
        out.to_array().map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
    }
}

/// Slab test; returns the entry and exit distances along the ray.
fn intersect_box(origin: Vec3, dir: Vec3, lo: Vec3, hi: Vec3) -> Option<(f32, f32)> {
    let inv = dir.recip();
    let t0 = (lo - origin) * inv;
    let t1 = (hi - origin) * inv;
    let near = t0.min(t1).max_element().max(0.0);
    let far = t0.max(t1).min_element();
    (near < far).then_some((near, far))
}

impl Figure for VolumeFigure {
    fn to_image(&self) -> RgbImage {
        let (width, height) = (self.width.max(1), self.height.max(1));
        let Some(scene) = self.scene() else {
            return ImageBuffer::from_pixel(width, height, image::Rgb(PAPER_COLOR));
        };

        let center = (scene.lo + scene.hi) * 0.5;
        let radius = ((scene.hi - scene.lo) * 0.5).length();
        let forward = -Vec3::from_array(self.camera.eye).normalize_or(Vec3::NEG_Z);
        let up = Vec3::from_array(self.camera.up);
        let right = forward
            .cross(up)
            .try_normalize()
            .unwrap_or_else(|| forward.any_orthonormal_vector());
        let view_up = right.cross(forward);

        let pixel = 2.2 * radius / width.min(height) as f32;
        let (half_w, half_h) = (width as f32 / 2.0, height as f32 / 2.0);
        let start = center - forward * (radius + 1.0);

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|py| {
                let scene = &scene;
                (0..width).flat_map(move |px| {
                    let u = (px as f32 + 0.5 - half_w) * pixel;
                    let v = (half_h - py as f32 - 0.5) * pixel;
                    let origin = start + right * u + view_up * v;
                    self.shade(scene, origin, forward)
                })
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
            .unwrap_or_else(|| RgbImage::new(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn small_settings() -> VolumeRenderSettings {
        VolumeRenderSettings {
            width: 40,
            height: 30,
            ..Default::default()
        }
    }

    #[test]
    fn coordinates_and_values_flatten_in_lock_step() {
        let data = Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as f32);
        let volume = Volume::new(data, 1.0);
        let figure = VolumeRenderer::render(
            &volume,
            &VolumeRenderSettings::default(),
            DisplayRange::new(0.0, 1.0),
            Axis::Z,
        );
        assert_eq!(figure.value.len(), 24);
        for i in 0..figure.value.len() {
            let (x, y, z) = (figure.x[i], figure.y[i], figure.z[i]);
            assert_eq!(figure.value[i], (x * 100 + y * 10 + z) as f32);
        }
    }

    #[test]
    fn camera_presets_follow_axis() {
        assert_eq!(Camera::for_axis(Axis::X).up, [1.0, 0.0, 0.0]);
        assert_eq!(Camera::for_axis(Axis::Y).eye, [1.25, 1.25, 1.25]);
        let z = Camera::for_axis(Axis::Z);
        assert_eq!(z.up, [0.0, 0.0, 1.0]);
        assert_eq!(z.eye, [-1.25, 1.25, 1.25]);
    }

    #[test]
    fn ticks_use_stride_and_voxel_size() {
        let ticks = AxisTicks::new(20, 0.5);
        assert_eq!(ticks.tickvals, vec![0, 8, 16]);
        assert_eq!(ticks.ticktext, vec!["0.0", "4.0", "8.0"]);
        assert_eq!(AxisTicks::new(9, 0.25).ticktext, vec!["0.0", "2.0"]);
        assert_eq!(AxisTicks::new(9, 2.5).ticktext, vec!["0.0", "20.0"]);
        assert_eq!(AxisTicks::new(9, 0.1).ticktext, vec!["0.0", "0.8"]);
        assert_eq!(AxisTicks::new(17, 0.3).ticktext, vec!["0.0", "2.4", "4.8"]);
    }

    #[test]
    fn voxel_size_override_wins() {
        let volume = Volume::new(Array3::zeros((17, 2, 2)), 2.0);
        let range = DisplayRange::new(0.0, 1.0);
        let own = VolumeRenderer::render(&volume, &small_settings(), range, Axis::X);
        assert_eq!(own.ticks.ticktext, vec!["0.0", "16.0", "32.0"]);
        let settings = VolumeRenderSettings {
            voxel_size: Some(1.0),
            ..small_settings()
        };
        let overridden = VolumeRenderer::render(&volume, &settings, range, Axis::X);
        assert_eq!(overridden.ticks.ticktext, vec!["0.0", "8.0", "16.0"]);
    }

    #[test]
    fn surface_count_is_clamped() {
        assert_eq!(VolumeRenderer::clamp_surface_count(0), 3);
        assert_eq!(VolumeRenderer::clamp_surface_count(15), 15);
        assert_eq!(VolumeRenderer::clamp_surface_count(500), 30);
    }

    #[test]
    fn empty_scene_renders_background() {
        let volume = Volume::new(Array3::zeros((6, 6, 6)), 1.0);
        let figure = VolumeRenderer::render(
            &volume,
            &small_settings(),
            DisplayRange::new(5.0, 10.0),
            Axis::Z,
        );
        let image = figure.to_image();
        assert_eq!(image.dimensions(), (40, 30));
        assert!(image.pixels().all(|p| p.0 == PAPER_COLOR));
    }

    #[test]
    fn bright_core_is_visible_in_the_centre() {
        let data = Array3::from_shape_fn((8, 8, 8), |(x, y, z)| {
            if (2..6).contains(&x) && (2..6).contains(&y) && (2..6).contains(&z) {
                100.0
            } else {
                0.0
            }
        });
        let volume = Volume::new(data, 1.0);
        for axis in Axis::ALL {
            let figure = VolumeRenderer::render(
                &volume,
                &small_settings(),
                DisplayRange::new(10.0, 90.0),
                axis,
            );
            let image = figure.to_image();
            assert_ne!(image.get_pixel(20, 15).0, PAPER_COLOR, "axis {axis}");
            assert_eq!(image.get_pixel(0, 0).0, PAPER_COLOR, "axis {axis}");
        }
    }

    #[test]
    fn png_output_matches_requested_size() {
        let volume = Volume::new(Array3::from_elem((3, 3, 3), 50.0), 1.0);
        let figure = VolumeRenderer::render(
            &volume,
            &small_settings(),
            DisplayRange::new(0.0, 100.0),
            Axis::Y,
        );
        let png = figure.to_png().expect("encodes");
        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }
}
