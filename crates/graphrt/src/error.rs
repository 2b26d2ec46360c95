use thiserror::Error;

use crate::device::DeviceError;
use crate::module::KernelError;
use crate::tensor::DType;

/// Convenience alias for results returned by graph runtime routines.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by graph loading, storage planning, and execution.
#[derive(Debug, Error)]
pub enum Error {
    #[error("graph schema error: {0}")]
    Schema(String),

    #[error("unrecognized dtype string '{0}'")]
    DtypeParse(String),

    #[error("storage plan error: {0}")]
    StoragePlan(String),

    #[error("found parameter for non-existent input '{0}'")]
    ParamBind(String),

    #[error("parameter '{name}' shape mismatch: destination is {expected:?}, blob has {actual:?}")]
    ParamShapeMismatch {
        name: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("parameter '{name}' dtype mismatch: destination is {expected}, blob has {actual}")]
    ParamDtypeMismatch {
        name: String,
        expected: DType,
        actual: DType,
    },

    #[error("parameter '{name}' payload is {actual} bytes, destination holds {expected}")]
    ParamSizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid parameter blob: {0}")]
    ParamBlob(String),

    #[error("unsupported operator '{op_type}' on node '{name}'")]
    UnsupportedOp { op_type: String, name: String },

    #[error("no kernel named '{0}' in module")]
    KernelMissing(String),

    #[error("input index {index} out of range for {count} inputs")]
    InputIndexOutOfRange { index: usize, count: usize },

    #[error("output index {index} out of range for {count} outputs")]
    OutputIndexOutOfRange { index: usize, count: usize },

    #[error("unknown input name '{0}'")]
    InputNameUnknown(String),

    #[error("kernel '{name}' failed")]
    Kernel {
        name: String,
        #[source]
        source: KernelError,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),
}
