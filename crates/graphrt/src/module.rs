//! The packed-call kernel convention and the code-module collaborator.
//!
//! Kernels are uniform entry points taking parallel arrays of argument
//! values and type codes plus a count. The executor pre-builds these arrays
//! once per node; kernels therefore see stable tensor handles across runs.

use std::os::raw::c_void;
use std::sync::Arc;

use thiserror::Error;

use crate::tensor::TensorView;

/// Type code marking a packed argument as a tensor handle.
pub const ARG_TENSOR_HANDLE: i32 = 7;

/// One slot of a packed argument array.
#[repr(C)]
#[derive(Clone, Copy)]
pub union PackedValue {
    pub v_int64: i64,
    pub v_float64: f64,
    pub v_handle: *mut c_void,
}

impl PackedValue {
    pub fn tensor_handle(view: *mut TensorView) -> Self {
        Self {
            v_handle: view.cast(),
        }
    }
}

/// Borrowed argument list for one packed call.
#[derive(Clone, Copy)]
pub struct PackedArgs<'a> {
    pub values: &'a [PackedValue],
    pub type_codes: &'a [i32],
}

impl<'a> PackedArgs<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads argument `index` as a tensor view. Returns `None` when the
    /// index is out of range or the slot does not carry a tensor handle.
    ///
    /// # Safety
    /// The caller must be inside a kernel invoked through this crate, so
    /// that tensor-handle slots point at live `TensorView`s.
    pub unsafe fn tensor(&self, index: usize) -> Option<&'a TensorView> {
        if *self.type_codes.get(index)? != ARG_TENSOR_HANDLE {
            return None;
        }
        let handle = self.values[index].v_handle as *const TensorView;
        handle.as_ref()
    }
}

/// Failures raised by a kernel during a packed call.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("kernel returned nonzero status {0}")]
    Status(i32),

    #[error("bad argument {index}: {reason}")]
    BadArg { index: usize, reason: String },

    #[error("{0}")]
    Other(String),
}

/// A resolved kernel entry point.
pub type PackedFunc = Arc<dyn Fn(PackedArgs<'_>) -> Result<(), KernelError> + Send + Sync>;

/// The compiled code module the executor resolves kernel names against.
pub trait KernelModule: Send + Sync {
    /// Looks up a kernel by name; `None` when the module has no such entry.
    fn lookup(&self, name: &str) -> Option<PackedFunc>;
}
