use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::s;

pub(crate) struct Interpolator;

impl Interpolator {
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Sample `data` at a continuous voxel position `[x, y, z]`, blending
    /// the two neighbouring x-slices. Positions are clamped to the grid.
    #[inline]
    pub(crate) fn trilinear_interpolate(data: &ArrayView3<f32>, p: [f32; 3]) -> f32 {
        let (dx, dy, dz) = data.dim();
        let x = p[0].clamp(0.0, (dx - 1) as f32);
        let y = p[1].clamp(0.0, (dy - 1) as f32);
        let z = p[2].clamp(0.0, (dz - 1) as f32);

        let x0 = x.floor() as usize;
        let x1 = (x0 + 1).min(dx - 1);
        let t = x - x0 as f32;

        let v0 = Self::bilinear_interpolate(&data.slice(s![x0, .., ..]), y, z);
        if t == 0.0 || x1 == x0 {
            return v0;
        }
        let v1 = Self::bilinear_interpolate(&data.slice(s![x1, .., ..]), y, z);
        v0.mul_add(1.0 - t, v1 * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn trilinear_hits_grid_points_exactly() {
        let data = Array3::from_shape_fn((3, 3, 3), |(x, y, z)| (x * 9 + y * 3 + z) as f32);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), [1.0, 2.0, 0.0]), 15.0);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), [2.0, 2.0, 2.0]), 26.0);
    }

    #[test]
    fn trilinear_is_linear_for_linear_fields() {
        let data = Array3::from_shape_fn((3, 3, 3), |(x, y, z)| (x * 9 + y * 3 + z) as f32);
        let v = Interpolator::trilinear_interpolate(&data.view(), [0.5, 1.25, 1.5]);
        assert_relative_eq!(v, 0.5 * 9.0 + 1.25 * 3.0 + 1.5, epsilon = 1e-5);
    }

    #[test]
    fn positions_outside_the_grid_are_clamped() {
        let data = Array3::from_shape_fn((2, 2, 2), |(x, _, _)| x as f32);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), [-4.0, 0.0, 0.0]), 0.0);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), [9.0, 0.5, 0.5]), 1.0);
    }
}
