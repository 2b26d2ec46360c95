//! Pre-built packed-argument blocks, one per compiled node.

use crate::error::{Error, Result};
use crate::module::{PackedArgs, PackedFunc, PackedValue, ARG_TENSOR_HANDLE};
use crate::tensor::TensorView;

/// The argument block a node's kernel is invoked with on every run.
///
/// All four arrays live in boxed slices, so their heap storage never moves
/// once built: handle values keep pointing at the same `TensorView`s, and
/// flattened views keep pointing at the same scalar shape slots, for the
/// lifetime of the executor.
pub(crate) struct OpArgs {
    tensors: Box<[TensorView]>,
    values: Box<[PackedValue]>,
    type_codes: Box<[i32]>,
    #[allow(dead_code)]
    flat_shapes: Box<[i64]>,
}

impl OpArgs {
    /// Builds the block from entry views (inputs first, then outputs).
    /// With `flatten`, every view is rewritten to rank 1 over the product
    /// of its extents.
    pub fn new(tensors: Vec<TensorView>, flatten: bool) -> OpArgs {
        let flat_shapes: Box<[i64]> = if flatten {
            tensors
                .iter()
                .map(|t| unsafe { t.num_elements() })
                .collect()
        } else {
            Box::default()
        };

        let mut tensors = tensors.into_boxed_slice();
        if flatten {
            for (view, flat) in tensors.iter_mut().zip(flat_shapes.iter()) {
                view.ndim = 1;
                view.shape = flat as *const i64;
            }
        }

        let values: Box<[PackedValue]> = tensors
            .iter_mut()
            .map(|view| PackedValue::tensor_handle(view as *mut TensorView))
            .collect();
        let type_codes = vec![ARG_TENSOR_HANDLE; tensors.len()].into_boxed_slice();

        OpArgs {
            tensors,
            values,
            type_codes,
            flat_shapes,
        }
    }

    pub fn packed(&self) -> PackedArgs<'_> {
        PackedArgs {
            values: &self.values,
            type_codes: &self.type_codes,
        }
    }

    #[cfg(test)]
    pub fn views(&self) -> &[TensorView] {
        &self.tensors
    }
}

/// A node bound for execution: its argument block plus the resolved kernel.
/// `func` is `None` for the `__nop` placeholder kernel.
pub(crate) struct BoundOp {
    pub func: Option<(String, PackedFunc)>,
    pub args: OpArgs,
}

impl BoundOp {
    pub fn invoke(&self) -> Result<()> {
        if let Some((name, func)) = &self.func {
            func(self.args.packed()).map_err(|source| Error::Kernel {
                name: name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
