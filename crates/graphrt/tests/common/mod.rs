#![allow(dead_code)]

use std::sync::Arc;

use graphrt::device::device_type;
use graphrt::module::{KernelError, PackedArgs};
use graphrt::{GraphExecutor, Result};
use graphrt_backend_cpu::{CpuBackend, HostKernelModule};

pub fn executor(
    graph_json: &str,
    module: HostKernelModule,
) -> Result<GraphExecutor<CpuBackend>> {
    GraphExecutor::create(
        graph_json,
        Arc::new(module),
        Arc::new(CpuBackend::new()),
        device_type::CPU,
        0,
        false,
    )
}

pub fn debug_executor(
    graph_json: &str,
    module: HostKernelModule,
) -> Result<GraphExecutor<CpuBackend>> {
    GraphExecutor::create(
        graph_json,
        Arc::new(module),
        Arc::new(CpuBackend::new()),
        device_type::CPU,
        0,
        true,
    )
}

/// Copies the first argument's bytes into the second.
pub fn identity_kernel(args: PackedArgs<'_>) -> std::result::Result<(), KernelError> {
    unsafe {
        let src = args.tensor(0).expect("identity kernel wants a source");
        let dst = args.tensor(1).expect("identity kernel wants a destination");
        std::ptr::copy(src.data, dst.data, src.byte_size() as usize);
    }
    Ok(())
}

/// A one-input one-output graph: placeholder `x` feeding node `id` bound
/// to `func_name`, both entries `float32` of the given shape.
pub fn unary_graph(func_name: &str, flatten: bool, shape: &str) -> String {
    format!(
        r#"{{
        "nodes": [
            {{"op": "null", "name": "x", "inputs": []}},
            {{
                "op": "tvm_op",
                "name": "id",
                "inputs": [[0, 0]],
                "attrs": {{
                    "func_name": "{func_name}",
                    "num_inputs": "1",
                    "num_outputs": "1",
                    "flatten_data": "{flatten}"
                }}
            }}
        ],
        "arg_nodes": [0],
        "node_row_ptr": [0, 1, 2],
        "heads": [[1, 0]],
        "attrs": {{
            "dltype": ["list_str", ["float32", "float32"]],
            "storage_id": ["list_int", [0, 1]],
            "shape": ["list_shape", [{shape}, {shape}]]
        }}
    }}"#,
        flatten = if flatten { 1 } else { 0 },
    )
}
