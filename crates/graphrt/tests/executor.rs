mod common;

use std::sync::{Arc, Mutex};

use graphrt::module::KernelError;
use graphrt::tensor::DType;
use graphrt::Error;
use graphrt_backend_cpu::{HostKernelModule, HostTensor};

use common::{debug_executor, executor, identity_kernel, unary_graph};

#[test]
fn identity_graph_copies_input_to_output() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let mut exec = executor(&unary_graph("identity", false, "[2]"), module).unwrap();

    let x = HostTensor::from_f32(&[2], &[1.0, 2.0]).unwrap();
    exec.set_input(0, &x.view()).unwrap();
    exec.run().unwrap();

    let out = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    exec.get_output(0, &out.view()).unwrap();
    assert_eq!(out.as_f32(), &[1.0, 2.0]);
}

#[test]
fn nop_nodes_run_without_a_kernel() {
    let mut exec = executor(&unary_graph("__nop", false, "[2]"), HostKernelModule::new()).unwrap();
    let x = HostTensor::from_f32(&[2], &[3.0, 4.0]).unwrap();
    exec.set_input(0, &x.view()).unwrap();
    exec.run().unwrap();

    // The output entry was never written, so it still reads as the
    // zero-initialized pool bytes.
    let out = HostTensor::from_f32(&[2], &[9.0, 9.0]).unwrap();
    exec.get_output(0, &out.view()).unwrap();
    assert_eq!(out.as_f32(), &[0.0, 0.0]);
}

#[test]
fn entries_sharing_a_storage_id_alias_the_same_bytes() {
    let graph = r#"{
        "nodes": [
            {"op": "null", "name": "x", "inputs": []},
            {
                "op": "tvm_op",
                "name": "fill",
                "inputs": [[0, 0]],
                "attrs": {
                    "func_name": "fill_seven",
                    "num_inputs": "1",
                    "num_outputs": "1",
                    "flatten_data": "0"
                }
            },
            {
                "op": "tvm_op",
                "name": "probe",
                "inputs": [],
                "attrs": {
                    "func_name": "__nop",
                    "num_inputs": "0",
                    "num_outputs": "1",
                    "flatten_data": "0"
                }
            }
        ],
        "arg_nodes": [0],
        "node_row_ptr": [0, 1, 2, 3],
        "heads": [[2, 0]],
        "attrs": {
            "dltype": ["list_str", ["float32", "float32", "float32"]],
            "storage_id": ["list_int", [0, 1, 1]],
            "shape": ["list_shape", [[1], [1], [1]]]
        }
    }"#;

    let mut module = HostKernelModule::new();
    module.register("fill_seven", |args| {
        let dst = unsafe { args.tensor(1) }.ok_or(KernelError::BadArg {
            index: 1,
            reason: "missing output".to_string(),
        })?;
        unsafe { dst.data.cast::<f32>().write(7.0) };
        Ok(())
    });
    let mut exec = executor(graph, module).unwrap();
    let x = HostTensor::from_f32(&[1], &[1.0]).unwrap();
    exec.set_input(0, &x.view()).unwrap();
    exec.run().unwrap();

    // "probe" never wrote its output, but it shares storage id 1 with
    // "fill"'s output, so the bytes written through one entry are visible
    // through the other.
    let out = HostTensor::zeroed(DType::FLOAT32, &[1]).unwrap();
    exec.get_output(0, &out.view()).unwrap();
    assert_eq!(out.as_f32(), &[7.0]);
}

#[test]
fn flatten_data_rewrites_kernel_argument_shapes() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let mut module = HostKernelModule::new();
    module.register("observe", move |args| {
        let input = unsafe { args.tensor(0) }.expect("input view");
        let mut seen = sink.lock().unwrap();
        seen.push(input.ndim as i64);
        seen.extend_from_slice(unsafe { input.shape() });
        Ok(())
    });

    let mut exec = executor(&unary_graph("observe", true, "[2, 3, 4]"), module).unwrap();
    exec.run().unwrap();
    assert_eq!(*observed.lock().unwrap(), vec![1, 24]);
}

#[test]
fn zero_input_graphs_still_run() {
    let graph = r#"{
        "nodes": [
            {
                "op": "tvm_op",
                "name": "emit",
                "inputs": [],
                "attrs": {
                    "func_name": "emit_five",
                    "num_inputs": "0",
                    "num_outputs": "1",
                    "flatten_data": "0"
                }
            }
        ],
        "arg_nodes": [],
        "node_row_ptr": [0, 1],
        "heads": [[0, 0]],
        "attrs": {
            "dltype": ["list_str", ["float32"]],
            "storage_id": ["list_int", [0]],
            "shape": ["list_shape", [[1]]]
        }
    }"#;
    let mut module = HostKernelModule::new();
    module.register("emit_five", |args| {
        let dst = unsafe { args.tensor(0) }.expect("output view");
        unsafe { dst.data.cast::<f32>().write(5.0) };
        Ok(())
    });
    let mut exec = executor(graph, module).unwrap();
    assert_eq!(exec.get_input_names(), "");
    exec.run().unwrap();

    let out = HostTensor::zeroed(DType::FLOAT32, &[1]).unwrap();
    exec.get_output(0, &out.view()).unwrap();
    assert_eq!(out.as_f32(), &[5.0]);
}

#[test]
fn placeholder_only_graph_has_no_outputs() {
    let graph = r#"{
        "nodes": [{"op": "null", "name": "x", "inputs": []}],
        "arg_nodes": [0],
        "node_row_ptr": [0, 1],
        "heads": [],
        "attrs": {
            "dltype": ["list_str", ["float32"]],
            "storage_id": ["list_int", [0]],
            "shape": ["list_shape", [[1]]]
        }
    }"#;
    let mut exec = executor(graph, HostKernelModule::new()).unwrap();
    exec.run().unwrap();
    assert_eq!(exec.get_output_names(), "");
    let out = HostTensor::zeroed(DType::FLOAT32, &[1]).unwrap();
    assert!(matches!(
        exec.get_output(0, &out.view()),
        Err(Error::OutputIndexOutOfRange { index: 0, count: 0 })
    ));
}

#[test]
fn input_and_output_names_join_with_trailing_semicolons() {
    let graph = r#"{
        "nodes": [
            {"op": "null", "name": "a", "inputs": []},
            {"op": "null", "name": "b", "inputs": []},
            {
                "op": "tvm_op",
                "name": "sum",
                "inputs": [[0, 0], [1, 0]],
                "attrs": {
                    "func_name": "__nop",
                    "num_inputs": "2",
                    "num_outputs": "1",
                    "flatten_data": "0"
                }
            }
        ],
        "arg_nodes": [0, 1],
        "node_row_ptr": [0, 1, 2, 3],
        "heads": [[2, 0]],
        "attrs": {
            "dltype": ["list_str", ["float32", "float32", "float32"]],
            "storage_id": ["list_int", [0, 1, 2]],
            "shape": ["list_shape", [[1], [1], [1]]]
        }
    }"#;
    let exec = executor(graph, HostKernelModule::new()).unwrap();
    assert_eq!(exec.get_input_names(), "a;b;");
    assert_eq!(exec.get_output_names(), "sum;");
    assert_eq!(exec.input_index("b"), Some(1));
    assert_eq!(exec.input_index("c"), None);
}

#[test]
fn set_then_get_input_round_trips() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let mut exec = executor(&unary_graph("identity", false, "[2]"), module).unwrap();

    let x = HostTensor::from_f32(&[2], &[0.5, -0.5]).unwrap();
    exec.set_input("x", &x.view()).unwrap();

    let back = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    exec.get_input("x", &back.view()).unwrap();
    assert_eq!(back.as_f32(), &[0.5, -0.5]);

    let by_index = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    exec.get_input(0, &by_index.view()).unwrap();
    assert_eq!(by_index.as_f32(), &[0.5, -0.5]);
}

#[test]
fn repeated_runs_are_deterministic() {
    let mut module = HostKernelModule::new();
    module.register("double", |args| {
        unsafe {
            let src = args.tensor(0).expect("input");
            let dst = args.tensor(1).expect("output");
            for i in 0..src.num_elements() as usize {
                let value = src.data.cast::<f32>().add(i).read();
                dst.data.cast::<f32>().add(i).write(value * 2.0);
            }
        }
        Ok(())
    });
    let mut exec = executor(&unary_graph("double", false, "[3]"), module).unwrap();
    let x = HostTensor::from_f32(&[3], &[1.0, 2.0, 3.0]).unwrap();
    exec.set_input(0, &x.view()).unwrap();

    exec.run().unwrap();
    let first = HostTensor::zeroed(DType::FLOAT32, &[3]).unwrap();
    exec.get_output(0, &first.view()).unwrap();

    exec.run().unwrap();
    let second = HostTensor::zeroed(DType::FLOAT32, &[3]).unwrap();
    exec.get_output(0, &second.view()).unwrap();

    assert_eq!(first.as_f32(), &[2.0, 4.0, 6.0]);
    assert_eq!(first.as_f32(), second.as_f32());
}

#[test]
fn set_input_with_unknown_name_is_ignored() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let mut exec = executor(&unary_graph("identity", false, "[2]"), module).unwrap();

    let x = HostTensor::from_f32(&[2], &[8.0, 8.0]).unwrap();
    exec.set_input("not_an_input", &x.view()).unwrap();

    let back = HostTensor::from_f32(&[2], &[5.0, 5.0]).unwrap();
    exec.get_input(0, &back.view()).unwrap();
    assert_eq!(back.as_f32(), &[0.0, 0.0]);
}

#[test]
fn get_input_with_unknown_name_fails() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let exec = executor(&unary_graph("identity", false, "[2]"), module).unwrap();
    let out = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    assert!(matches!(
        exec.get_input("nope", &out.view()),
        Err(Error::InputNameUnknown(name)) if name == "nope"
    ));
}

#[test]
fn input_indices_are_bounds_checked() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let mut exec = executor(&unary_graph("identity", false, "[2]"), module).unwrap();
    let x = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    assert!(matches!(
        exec.set_input(3, &x.view()),
        Err(Error::InputIndexOutOfRange { index: 3, count: 1 })
    ));
    assert!(matches!(
        exec.get_input(3, &x.view()),
        Err(Error::InputIndexOutOfRange { index: 3, count: 1 })
    ));
}

#[test]
fn missing_kernels_fail_at_construction() {
    let result = executor(&unary_graph("not_compiled", false, "[2]"), HostKernelModule::new());
    assert!(matches!(
        result,
        Err(Error::KernelMissing(ref name)) if name == "not_compiled"
    ));
}

#[test]
fn kernel_failures_surface_from_run() {
    let mut module = HostKernelModule::new();
    module.register("explode", |_args| Err(KernelError::Status(-3)));
    let mut exec = executor(&unary_graph("explode", false, "[2]"), module).unwrap();
    assert!(matches!(
        exec.run(),
        Err(Error::Kernel { name, .. }) if name == "explode"
    ));
}

#[test]
fn debug_runs_capture_per_node_outputs() {
    let mut module = HostKernelModule::new();
    module.register("identity", identity_kernel);
    let mut exec = debug_executor(&unary_graph("identity", false, "[2]"), module).unwrap();

    let scratch_x = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    let scratch_id = HostTensor::zeroed(DType::FLOAT32, &[2]).unwrap();
    exec.set_debug_buffer(scratch_x.view());
    exec.set_debug_buffer(scratch_id.view());

    let x = HostTensor::from_f32(&[2], &[6.0, 7.0]).unwrap();
    exec.set_input(0, &x.view()).unwrap();
    exec.run().unwrap();

    assert_eq!(scratch_x.as_f32(), &[6.0, 7.0]);
    assert_eq!(scratch_id.as_f32(), &[6.0, 7.0]);
}
