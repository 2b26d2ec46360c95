//! The graph executor: pooled storage, kernel binding, and the run loop.

mod args;

use std::slice;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::device::{Device, DeviceAllocator, DeviceBuffer, TensorCopy};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::module::KernelModule;
use crate::params::BlobReader;
use crate::storage::StoragePlan;
use crate::tensor::{DType, TensorView};

use args::{BoundOp, OpArgs};

/// Debug-run scan mask bit: report NaN values.
pub const SCAN_NAN: u32 = 0x1;
/// Debug-run scan mask bit: report infinite values.
pub const SCAN_INF: u32 = 0x2;

/// Selects a graph input by position or by placeholder name.
#[derive(Clone, Copy, Debug)]
pub enum InputKey<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for InputKey<'static> {
    fn from(index: usize) -> Self {
        InputKey::Index(index)
    }
}

impl<'a> From<&'a str> for InputKey<'a> {
    fn from(name: &'a str) -> Self {
        InputKey::Name(name)
    }
}

struct DataEntry {
    storage_id: usize,
    dtype: DType,
}

/// Executes a loaded graph against a kernel module and a device.
///
/// Construction loads and validates the topology, allocates the storage
/// pools, and binds every compiled node to its kernel; afterwards the
/// executor only moves bytes. An executor is single-owner: pool buffers
/// belong to it exclusively and concurrent runs are not supported.
pub struct GraphExecutor<D: DeviceAllocator + TensorCopy> {
    graph: Graph,
    module: Arc<dyn KernelModule>,
    device_api: Arc<D>,
    device: Device,
    debug: bool,
    scan_mask: u32,
    storage_pool: Vec<D::Buffer>,
    data_entry: Vec<DataEntry>,
    op_execs: Vec<Option<BoundOp>>,
    debug_buffers: Vec<TensorView>,
}

impl<D: DeviceAllocator + TensorCopy> GraphExecutor<D> {
    /// Builds an executor from the producer's graph JSON.
    pub fn create(
        graph_json: &str,
        module: Arc<dyn KernelModule>,
        device_api: Arc<D>,
        device_type: i32,
        device_id: i32,
        debug: bool,
    ) -> Result<Self> {
        let graph = Graph::from_json(graph_json)?;
        let mut exec = Self {
            graph,
            module,
            device_api,
            device: Device::new(device_type, device_id),
            debug,
            scan_mask: SCAN_NAN | SCAN_INF,
            storage_pool: Vec::new(),
            data_entry: Vec::new(),
            op_execs: Vec::new(),
            debug_buffers: Vec::new(),
        };
        exec.setup_storage()?;
        exec.setup_op_execs()?;
        Ok(exec)
    }

    /// Executes the graph: every bound node, in node-id order.
    pub fn run(&mut self) -> Result<()> {
        if self.debug {
            return self.debug_run();
        }
        for op in self.op_execs.iter().flatten() {
            op.invoke()?;
        }
        Ok(())
    }

    /// Copies `data` into the selected input entry. An unknown name is
    /// logged and ignored; an out-of-range index is an error.
    pub fn set_input<'a>(&mut self, key: impl Into<InputKey<'a>>, data: &TensorView) -> Result<()> {
        let index = match key.into() {
            InputKey::Index(index) => index,
            InputKey::Name(name) => match self.input_index(name) {
                Some(index) => index,
                None => {
                    warn!("cannot find \"{name}\" among graph inputs");
                    return Ok(());
                }
            },
        };
        let eid = self.input_entry_id(index)?;
        self.device_api.copy(data, &self.entry_view(eid))?;
        Ok(())
    }

    /// Copies the selected input entry into `out`. Unlike [`set_input`],
    /// an unknown name is an error here.
    ///
    /// [`set_input`]: GraphExecutor::set_input
    pub fn get_input<'a>(&self, key: impl Into<InputKey<'a>>, out: &TensorView) -> Result<()> {
        let index = match key.into() {
            InputKey::Index(index) => index,
            InputKey::Name(name) => self
                .input_index(name)
                .ok_or_else(|| Error::InputNameUnknown(name.to_string()))?,
        };
        let eid = self.input_entry_id(index)?;
        self.device_api.copy(&self.entry_view(eid), out)?;
        Ok(())
    }

    /// Copies the `index`-th graph output into `out`.
    pub fn get_output(&self, index: usize, out: &TensorView) -> Result<()> {
        let entry = self
            .graph
            .outputs
            .get(index)
            .ok_or_else(|| Error::OutputIndexOutOfRange {
                index,
                count: self.graph.outputs.len(),
            })?;
        let eid = self.graph.entry_id_of(entry);
        self.device_api.copy(&self.entry_view(eid), out)?;
        Ok(())
    }

    /// Position of the named placeholder among the graph inputs.
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.graph
            .input_nodes
            .iter()
            .position(|&nid| self.graph.nodes[nid as usize].name == name)
    }

    /// Input placeholder names, semicolon-separated with a trailing
    /// semicolon (`"a;b;"`).
    pub fn get_input_names(&self) -> String {
        let mut names = String::new();
        for &nid in &self.graph.input_nodes {
            names.push_str(&self.graph.nodes[nid as usize].name);
            names.push(';');
        }
        names
    }

    /// Output node names in `heads` order, same form as
    /// [`get_input_names`](GraphExecutor::get_input_names).
    pub fn get_output_names(&self) -> String {
        let mut names = String::new();
        for entry in &self.graph.outputs {
            names.push_str(&self.graph.nodes[entry.node_id as usize].name);
            names.push(';');
        }
        names
    }

    /// Binds every named tensor in a parameter blob to its input entry.
    pub fn load_params(&mut self, blob: &[u8]) -> Result<()> {
        let mut reader = BlobReader::new(blob);
        let names = reader.read_header()?;
        for name in &names {
            let index = self
                .input_index(name)
                .ok_or_else(|| Error::ParamBind(name.clone()))?;
            let eid = self.input_entry_id(index)?;
            let tensor = reader.read_tensor()?;

            let dst_shape = &self.graph.attrs.shape[eid];
            if tensor.shape != *dst_shape {
                return Err(Error::ParamShapeMismatch {
                    name: name.clone(),
                    expected: dst_shape.clone(),
                    actual: tensor.shape,
                });
            }
            let dst_dtype = self.data_entry[eid].dtype;
            if tensor.dtype != dst_dtype {
                return Err(Error::ParamDtypeMismatch {
                    name: name.clone(),
                    expected: dst_dtype,
                    actual: tensor.dtype,
                });
            }
            let expected = dst_dtype
                .byte_size(dst_shape)
                .expect("entry sizes were checked during storage planning");
            if tensor.data.len() as u64 != expected {
                return Err(Error::ParamSizeMismatch {
                    name: name.clone(),
                    expected,
                    actual: tensor.data.len() as u64,
                });
            }

            let src = TensorView::new(
                tensor.data.as_ptr() as *mut u8,
                Device::cpu(),
                dst_dtype,
                dst_shape,
            );
            self.device_api.copy(&src, &self.entry_view(eid))?;
        }
        Ok(())
    }

    /// Registers the next node's host scratch buffer for debug runs.
    /// Buffers are consumed positionally: the first call covers node 0.
    pub fn set_debug_buffer(&mut self, buffer: TensorView) {
        self.debug_buffers.push(buffer);
    }

    /// Bitmask of [`SCAN_NAN`] and [`SCAN_INF`] applied to debug-run
    /// scratch scans.
    pub fn set_scan_mask(&mut self, mask: u32) {
        self.scan_mask = mask;
    }

    fn debug_run(&mut self) -> Result<()> {
        for nid in 0..self.graph.num_nodes() {
            if let Some(op) = &self.op_execs[nid] {
                op.invoke()?;
            }
            let node = &self.graph.nodes[nid];
            debug!(node = %node.name, op = %node.op_type, "executed node {nid}");
            if let Some(scratch) = self.debug_buffers.get(nid) {
                let eid = self.graph.entry_id(nid as u32, 0);
                self.device_api.copy(&self.entry_view(eid), scratch)?;
                scan_nan_inf(scratch, self.scan_mask, &node.name);
            }
        }
        Ok(())
    }

    fn setup_storage(&mut self) -> Result<()> {
        let plan = StoragePlan::build(&self.graph.attrs)?;
        for sid in 0..plan.pool_bytes.len() {
            let buffer =
                self.device_api
                    .alloc(&plan.pool_shape(sid), DType::FLOAT32, self.device)?;
            self.storage_pool.push(buffer);
        }
        self.data_entry = plan
            .entry_storage
            .iter()
            .zip(&plan.entry_dtype)
            .map(|(&storage_id, &dtype)| DataEntry { storage_id, dtype })
            .collect();
        Ok(())
    }

    fn setup_op_execs(&mut self) -> Result<()> {
        let mut op_execs = Vec::with_capacity(self.graph.num_nodes());
        for (nid, node) in self.graph.nodes.iter().enumerate() {
            if node.is_placeholder() {
                op_execs.push(None);
                continue;
            }
            if node.op_type != "tvm_op" {
                return Err(Error::UnsupportedOp {
                    op_type: node.op_type.clone(),
                    name: node.name.clone(),
                });
            }
            let attrs = node
                .attrs
                .as_ref()
                .expect("validated tvm_op nodes carry attributes");

            let mut views = Vec::with_capacity(node.inputs.len() + attrs.num_outputs as usize);
            for entry in &node.inputs {
                views.push(self.entry_view(self.graph.entry_id_of(entry)));
            }
            for index in 0..attrs.num_outputs {
                views.push(self.entry_view(self.graph.entry_id(nid as u32, index)));
            }

            let func = if attrs.func_name == "__nop" {
                None
            } else {
                let func = self
                    .module
                    .lookup(&attrs.func_name)
                    .ok_or_else(|| Error::KernelMissing(attrs.func_name.clone()))?;
                Some((attrs.func_name.clone(), func))
            };
            op_execs.push(Some(BoundOp {
                func,
                args: OpArgs::new(views, attrs.flatten_data),
            }));
        }
        self.op_execs = op_execs;
        Ok(())
    }

    fn input_entry_id(&self, index: usize) -> Result<usize> {
        let nid = *self.graph.input_nodes.get(index).ok_or_else(|| {
            Error::InputIndexOutOfRange {
                index,
                count: self.graph.input_nodes.len(),
            }
        })?;
        Ok(self.graph.entry_id(nid, 0))
    }

    fn entry_view(&self, eid: usize) -> TensorView {
        let entry = &self.data_entry[eid];
        TensorView::new(
            self.storage_pool[entry.storage_id].data_ptr(),
            self.device,
            entry.dtype,
            &self.graph.attrs.shape[eid],
        )
    }
}

impl<D: DeviceAllocator + TensorCopy> Drop for GraphExecutor<D> {
    fn drop(&mut self) {
        self.op_execs.clear();
        while self.storage_pool.pop().is_some() {}
    }
}

fn scan_nan_inf(scratch: &TensorView, mask: u32, node: &str) {
    if mask & (SCAN_NAN | SCAN_INF) == 0 || scratch.dtype != DType::FLOAT32 {
        return;
    }
    let values = unsafe {
        slice::from_raw_parts(scratch.data as *const f32, scratch.num_elements() as usize)
    };
    for (index, value) in values.iter().enumerate() {
        if mask & SCAN_NAN != 0 && value.is_nan() {
            warn!("NaN in output of node '{node}' at index {index}");
            return;
        }
        if mask & SCAN_INF != 0 && value.is_infinite() {
            warn!("Inf in output of node '{node}' at index {index}");
            return;
        }
    }
}
