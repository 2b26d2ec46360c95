//! Non-owning tensor descriptors handed to kernels and copy primitives.

use std::slice;

use crate::device::Device;
use crate::tensor::DType;

/// A non-owning view of a dense tensor: base pointer, device, dtype, and
/// borrowed shape.
///
/// The view never owns anything it points at. `data` aliases a storage pool
/// slot (or a caller-owned buffer) and `shape` borrows a shape vector held
/// elsewhere; both must outlive the view. The layout is C-compatible so a
/// pointer to a `TensorView` can serve as the tensor-handle argument of the
/// packed-call kernel convention.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TensorView {
    pub data: *mut u8,
    pub device: Device,
    pub ndim: i32,
    pub dtype: DType,
    pub shape: *const i64,
}

impl TensorView {
    /// Builds a view over `data` with the given metadata. The returned view
    /// borrows `shape`; callers must keep the shape vector alive and
    /// unmoved for as long as the view circulates.
    pub fn new(data: *mut u8, device: Device, dtype: DType, shape: &[i64]) -> Self {
        Self {
            data,
            device,
            ndim: shape.len() as i32,
            dtype,
            shape: shape.as_ptr(),
        }
    }

    /// Borrows the shape extents.
    ///
    /// # Safety
    /// `self.shape` must point to `self.ndim` readable `i64` values, which
    /// holds for every view produced by this crate as long as its backing
    /// graph and argument blocks are alive.
    pub unsafe fn shape(&self) -> &[i64] {
        slice::from_raw_parts(self.shape, self.ndim as usize)
    }

    /// Number of elements described by the view.
    ///
    /// # Safety
    /// Same contract as [`TensorView::shape`].
    pub unsafe fn num_elements(&self) -> i64 {
        self.shape().iter().product()
    }

    /// Total bytes described by the view.
    ///
    /// # Safety
    /// Same contract as [`TensorView::shape`].
    pub unsafe fn byte_size(&self) -> u64 {
        self.dtype.element_bytes() * self.num_elements() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_metadata_follows_the_shape() {
        let shape = vec![2i64, 3, 4];
        let mut data = vec![0u8; 96];
        let view = TensorView::new(data.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &shape);
        assert_eq!(view.ndim, 3);
        unsafe {
            assert_eq!(view.shape(), &[2, 3, 4]);
            assert_eq!(view.num_elements(), 24);
            assert_eq!(view.byte_size(), 96);
        }
    }

    #[test]
    fn scalar_view_has_one_element() {
        let mut data = vec![0u8; 4];
        let view = TensorView::new(data.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &[]);
        assert_eq!(view.ndim, 0);
        unsafe {
            assert_eq!(view.num_elements(), 1);
            assert_eq!(view.byte_size(), 4);
        }
    }
}
