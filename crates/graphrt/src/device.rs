//! Device identity and the memory collaborator traits the executor consumes.

use thiserror::Error;

use crate::tensor::{DType, TensorView};

/// Well-known device type codes.
pub mod device_type {
    pub const CPU: i32 = 1;
    pub const CUDA: i32 = 2;
}

/// Identifies the device a tensor lives on.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Device {
    pub device_type: i32,
    pub device_id: i32,
}

impl Device {
    pub fn new(device_type: i32, device_id: i32) -> Self {
        Self {
            device_type,
            device_id,
        }
    }

    pub fn cpu() -> Self {
        Self::new(device_type::CPU, 0)
    }
}

/// Failures reported by the allocator and copy collaborators.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("allocation of {bytes} bytes failed on device {device:?}")]
    AllocFailed { device: Device, bytes: u64 },

    #[error("device {0:?} is not supported by this allocator")]
    UnsupportedDevice(Device),

    #[error("copy size mismatch: source is {src} bytes, destination {dst}")]
    CopySizeMismatch { src: u64, dst: u64 },

    #[error("device error: {0}")]
    Other(String),
}

/// A device memory allocation handle.
///
/// The backing memory is released when the handle drops; handles stay pinned
/// at their base address for their whole lifetime.
pub trait DeviceBuffer {
    /// Device-visible base address of the allocation.
    fn data_ptr(&self) -> *mut u8;

    /// Size of the allocation in bytes.
    fn byte_len(&self) -> usize;
}

/// Allocates dense tensors on a device.
pub trait DeviceAllocator: Send + Sync {
    type Buffer: DeviceBuffer;

    fn alloc(
        &self,
        shape: &[i64],
        dtype: DType,
        device: Device,
    ) -> std::result::Result<Self::Buffer, DeviceError>;
}

/// Copies tensor contents between views, uniformly across host and device
/// memory. Source and destination must describe the same number of bytes.
pub trait TensorCopy: Send + Sync {
    fn copy(&self, src: &TensorView, dst: &TensorView) -> std::result::Result<(), DeviceError>;
}
