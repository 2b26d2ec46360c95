//! An owned host tensor producing views for staging inputs and outputs.

use graphrt::device::{Device, DeviceAllocator, DeviceBuffer, DeviceError};
use graphrt::tensor::{DType, TensorView};

use crate::cpu::CpuBuffer;
use crate::CpuBackend;

/// A dense host tensor that owns both its bytes and its shape vector, so
/// the views it hands out stay valid for as long as the tensor lives.
pub struct HostTensor {
    buffer: CpuBuffer,
    dtype: DType,
    shape: Vec<i64>,
    byte_len: usize,
}

impl HostTensor {
    /// Allocates a zero-filled tensor.
    pub fn zeroed(dtype: DType, shape: &[i64]) -> Result<Self, DeviceError> {
        let bytes = dtype.byte_size(shape).ok_or_else(|| {
            DeviceError::Other(format!("tensor shape {shape:?} overflows a byte size"))
        })?;
        let byte_len = usize::try_from(bytes)
            .map_err(|_| DeviceError::Other(format!("tensor of {bytes} bytes is too large")))?;
        let buffer = CpuBackend::new().alloc(shape, dtype, Device::cpu())?;
        Ok(Self {
            buffer,
            dtype,
            shape: shape.to_vec(),
            byte_len,
        })
    }

    /// Builds a `float32` tensor from the given values; `values` must
    /// fill the shape exactly.
    pub fn from_f32(shape: &[i64], values: &[f32]) -> Result<Self, DeviceError> {
        let tensor = Self::zeroed(DType::FLOAT32, shape)?;
        let src_bytes = values.len() * 4;
        if src_bytes != tensor.byte_len {
            return Err(DeviceError::CopySizeMismatch {
                src: src_bytes as u64,
                dst: tensor.byte_len as u64,
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                values.as_ptr().cast::<u8>(),
                tensor.buffer.data_ptr(),
                src_bytes,
            );
        }
        Ok(tensor)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Bytes described by the tensor metadata (the underlying allocation
    /// may be padded). The length is fixed when the tensor is built.
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.buffer.data_ptr(), self.byte_len) }
    }

    /// The contents interpreted as `f32` values.
    pub fn as_f32(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::FLOAT32);
        unsafe {
            std::slice::from_raw_parts(self.buffer.data_ptr().cast::<f32>(), self.byte_len / 4)
        }
    }

    /// A view over this tensor, valid while the tensor is alive.
    pub fn view(&self) -> TensorView {
        TensorView::new(
            self.buffer.data_ptr(),
            Device::cpu(),
            self.dtype,
            &self.shape,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_f32_values() {
        let tensor = HostTensor::from_f32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(tensor.as_f32(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tensor.bytes().len(), 16);
        let view = tensor.view();
        assert_eq!(view.ndim, 2);
        unsafe {
            assert_eq!(view.shape(), &[2, 2]);
            assert_eq!(view.byte_size(), 16);
        }
    }

    #[test]
    fn zeroed_tensors_read_as_zero() {
        let tensor = HostTensor::zeroed(DType::FLOAT32, &[3]).unwrap();
        assert_eq!(tensor.as_f32(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn from_f32_rejects_values_that_do_not_fill_the_shape() {
        assert!(matches!(
            HostTensor::from_f32(&[3], &[1.0, 2.0]),
            Err(DeviceError::CopySizeMismatch { src: 8, dst: 12 })
        ));
    }

    #[test]
    fn zeroed_rejects_overflowing_shapes() {
        assert!(matches!(
            HostTensor::zeroed(DType::FLOAT32, &[i64::MAX, i64::MAX]),
            Err(DeviceError::Other(_))
        ));
    }
}
