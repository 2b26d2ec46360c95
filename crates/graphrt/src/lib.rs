//! Executor core for compiled tensor computation graphs.
//!
//! A producer toolchain lowers a dataflow graph into a JSON topology, a
//! binary blob of parameter tensors, and a code module exposing named
//! kernels with a packed-argument calling convention. This crate loads the
//! topology, materializes the producer's storage plan as shared buffer
//! pools, binds every compiled node to its kernel, and runs the graph as a
//! straight sequential dispatch.
//!
//! Device memory and the kernel module itself are collaborators, consumed
//! through the [`device::DeviceAllocator`], [`device::TensorCopy`], and
//! [`module::KernelModule`] traits; `graphrt-backend-cpu` provides the host
//! implementations.

pub mod device;
pub mod error;
pub mod exec;
pub mod graph;
pub mod module;
pub mod params;
pub mod storage;
pub mod tensor;

pub use device::{Device, DeviceAllocator, DeviceBuffer, DeviceError, TensorCopy};
pub use error::{Error, Result};
pub use exec::{GraphExecutor, InputKey};
pub use module::{KernelError, KernelModule, PackedArgs, PackedFunc, PackedValue};
pub use tensor::{DType, TensorView};
