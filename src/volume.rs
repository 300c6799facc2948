use crate::enums::Axis;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;

/// Dense intensity grid indexed `[x, y, z]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    /// Physical edge length of one voxel, used for axis labels.
    pub voxel_size: f32,
}

impl Default for Volume {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl Volume {
    pub fn new(data: Array3<f32>, voxel_size: f32) -> Self {
        Self { data, voxel_size }
    }

    /// The 1x1x1 zero volume handed out when a dataset cannot be loaded.
    pub fn placeholder() -> Self {
        Self::new(Array3::zeros((1, 1, 1)), 1.0)
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn with_voxel_size(mut self, voxel_size: f32) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    /// Number of slices along `axis`.
    pub fn extent(&self, axis: Axis) -> usize {
        self.data.shape()[axis.index()]
    }

    /// Cross-section at `index`, fixing `axis` and keeping the other two in
    /// their original order. Returns `None` when the index is out of bounds.
    pub fn get_slice_from_axis(&self, index: usize, axis: Axis) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, axis) {
            return None;
        }
        let slice_result = match axis {
            Axis::X => self.data().slice(s![index, .., ..]),
            Axis::Y => self.data().slice(s![.., index, ..]),
            Axis::Z => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    pub fn is_valid_index(&self, index: usize, axis: Axis) -> bool {
        index < self.extent(axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(shape: (usize, usize, usize)) -> Volume {
        let n = shape.0 * shape.1 * shape.2;
        let data = Array3::from_shape_vec(shape, (0..n).map(|v| v as f32).collect())
            .expect("shape matches");
        Volume::new(data, 1.0)
    }

    #[test]
    fn slices_drop_the_fixed_axis() {
        let volume = linear((2, 3, 4));
        assert_eq!(volume.get_slice_from_axis(1, Axis::X).map(|s| s.dim()), Some((3, 4)));
        assert_eq!(volume.get_slice_from_axis(2, Axis::Y).map(|s| s.dim()), Some((2, 4)));
        assert_eq!(volume.get_slice_from_axis(3, Axis::Z).map(|s| s.dim()), Some((2, 3)));
    }

    #[test]
    fn slices_are_exact_cross_sections() {
        let volume = linear((2, 3, 4));
        for axis in Axis::ALL {
            for index in 0..volume.extent(axis) {
                let slice = volume
                    .get_slice_from_axis(index, axis)
                    .expect("index in bounds");
                for ((a, b), &value) in slice.indexed_iter() {
                    let expected = match axis {
                        Axis::X => volume.data[[index, a, b]],
                        Axis::Y => volume.data[[a, index, b]],
                        Axis::Z => volume.data[[a, b, index]],
                    };
                    assert_eq!(value, expected);
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_index_yields_none() {
        let volume = linear((2, 3, 4));
        assert!(volume.get_slice_from_axis(2, Axis::X).is_none());
        assert!(volume.get_slice_from_axis(4, Axis::Z).is_none());
    }

    #[test]
    fn placeholder_is_single_zero_voxel() {
        let volume = Volume::placeholder();
        assert_eq!(volume.dim(), (1, 1, 1));
        assert_eq!(volume.data[[0, 0, 0]], 0.0);
    }
}
