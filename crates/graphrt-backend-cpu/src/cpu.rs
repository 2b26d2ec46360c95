//! Aligned host allocations and byte-level tensor copies.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use graphrt::device::{device_type, Device, DeviceAllocator, DeviceBuffer, DeviceError, TensorCopy};
use graphrt::tensor::{DType, TensorView};

/// Alignment of every host allocation, generous enough for any vectorized
/// kernel the module may carry.
const HOST_ALIGN: usize = 64;

/// An owned, zero-initialized host allocation.
pub struct CpuBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The buffer is a plain byte region with no interior mutability.
unsafe impl Send for CpuBuffer {}
unsafe impl Sync for CpuBuffer {}

impl CpuBuffer {
    fn zeroed(bytes: usize, device: Device) -> Result<Self, DeviceError> {
        let layout = Layout::from_size_align(bytes.max(1), HOST_ALIGN)
            .map_err(|err| DeviceError::Other(err.to_string()))?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(DeviceError::AllocFailed {
            device,
            bytes: bytes as u64,
        })?;
        Ok(Self { ptr, layout })
    }
}

impl DeviceBuffer for CpuBuffer {
    fn data_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn byte_len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for CpuBuffer {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Host implementation of the executor's memory collaborators.
#[derive(Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

fn check_host(device: Device) -> Result<(), DeviceError> {
    if device.device_type != device_type::CPU {
        return Err(DeviceError::UnsupportedDevice(device));
    }
    Ok(())
}

impl DeviceAllocator for CpuBackend {
    type Buffer = CpuBuffer;

    fn alloc(
        &self,
        shape: &[i64],
        dtype: DType,
        device: Device,
    ) -> Result<Self::Buffer, DeviceError> {
        check_host(device)?;
        let bytes = dtype.byte_size(shape).ok_or_else(|| {
            DeviceError::Other(format!("allocation shape {shape:?} overflows a byte size"))
        })?;
        let bytes = usize::try_from(bytes)
            .map_err(|_| DeviceError::Other(format!("allocation of {bytes} bytes is too large")))?;
        CpuBuffer::zeroed(bytes, device)
    }
}

impl TensorCopy for CpuBackend {
    fn copy(&self, src: &TensorView, dst: &TensorView) -> Result<(), DeviceError> {
        check_host(src.device)?;
        check_host(dst.device)?;
        let (src_bytes, dst_bytes) = unsafe { (src.byte_size(), dst.byte_size()) };
        if src_bytes != dst_bytes {
            return Err(DeviceError::CopySizeMismatch {
                src: src_bytes,
                dst: dst_bytes,
            });
        }
        // Entries may alias one another, so this must tolerate overlap.
        unsafe { ptr::copy(src.data, dst.data, src_bytes as usize) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_zeroed_and_aligned() {
        let backend = CpuBackend::new();
        let buffer = backend
            .alloc(&[16], DType::FLOAT32, Device::cpu())
            .unwrap();
        assert_eq!(buffer.byte_len(), 64);
        assert_eq!(buffer.data_ptr() as usize % HOST_ALIGN, 0);
        let bytes = unsafe { std::slice::from_raw_parts(buffer.data_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn copy_rejects_size_mismatch() {
        let backend = CpuBackend::new();
        let mut a = vec![0u8; 8];
        let mut b = vec![0u8; 4];
        let src = TensorView::new(a.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &[2]);
        let dst = TensorView::new(b.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &[1]);
        assert!(matches!(
            backend.copy(&src, &dst),
            Err(DeviceError::CopySizeMismatch { src: 8, dst: 4 })
        ));
    }

    #[test]
    fn copy_moves_bytes() {
        let backend = CpuBackend::new();
        let mut a = 3.5f32.to_le_bytes().to_vec();
        let mut b = vec![0u8; 4];
        let src = TensorView::new(a.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &[1]);
        let dst = TensorView::new(b.as_mut_ptr(), Device::cpu(), DType::FLOAT32, &[1]);
        backend.copy(&src, &dst).unwrap();
        assert_eq!(f32::from_le_bytes(b.try_into().unwrap()), 3.5);
    }

    #[test]
    fn rejects_non_cpu_devices() {
        let backend = CpuBackend::new();
        let cuda = Device::new(device_type::CUDA, 0);
        assert!(matches!(
            backend.alloc(&[1], DType::FLOAT32, cuda),
            Err(DeviceError::UnsupportedDevice(_))
        ));
    }
}
