//! In-memory model of a compiled computation graph.

mod json;

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Identifies one output of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_id: u32,
    pub index: u32,
    pub version: u32,
}

/// Kernel binding attributes of a compiled-call node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpAttrs {
    pub func_name: String,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub flatten_data: bool,
}

/// One graph node: either a `"null"` placeholder fed from outside, or a
/// `"tvm_op"` bound to a compiled kernel.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub op_type: String,
    pub name: String,
    pub inputs: Vec<NodeEntry>,
    /// Parsed and preserved; no scheduling decision consults these.
    pub control_deps: Vec<u32>,
    pub attrs: Option<OpAttrs>,
}

impl GraphNode {
    pub fn is_placeholder(&self) -> bool {
        self.op_type == "null"
    }

    /// Output count: the kernel attribute for compiled nodes, one for
    /// placeholders.
    pub fn num_outputs(&self) -> u32 {
        self.attrs.as_ref().map_or(1, |a| a.num_outputs)
    }
}

/// Per-entry metadata arrays, indexed by entry id.
#[derive(Clone, Debug, Default)]
pub struct GraphAttrs {
    pub dltype: Vec<String>,
    pub storage_id: Vec<i64>,
    pub shape: Vec<Vec<i64>>,
}

/// A loaded, structurally validated graph topology.
#[derive(Clone, Debug)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub input_nodes: Vec<u32>,
    pub node_row_ptr: Vec<u32>,
    pub outputs: Vec<NodeEntry>,
    pub attrs: GraphAttrs,
}

impl Graph {
    /// Parses the producer's JSON topology and validates its structural
    /// invariants.
    pub fn from_json(graph_json: &str) -> Result<Graph> {
        let graph = json::parse(graph_json)?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_node_entries(&self) -> usize {
        self.node_row_ptr.last().copied().unwrap_or(0) as usize
    }

    /// Global entry id of output `index` of node `nid`.
    pub fn entry_id(&self, nid: u32, index: u32) -> usize {
        (self.node_row_ptr[nid as usize] + index) as usize
    }

    pub fn entry_id_of(&self, entry: &NodeEntry) -> usize {
        self.entry_id(entry.node_id, entry.index)
    }

    fn validate(&self) -> Result<()> {
        let num_nodes = self.nodes.len();
        if self.node_row_ptr.len() != num_nodes + 1 {
            return Err(Error::Schema(format!(
                "node_row_ptr has {} entries, expected {}",
                self.node_row_ptr.len(),
                num_nodes + 1
            )));
        }
        if self.node_row_ptr.first() != Some(&0) {
            return Err(Error::Schema("node_row_ptr must start at 0".to_string()));
        }
        if self.node_row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Schema(
                "node_row_ptr must be non-decreasing".to_string(),
            ));
        }

        let num_entries = self.num_node_entries();
        for (field, len) in [
            ("dltype", self.attrs.dltype.len()),
            ("storage_id", self.attrs.storage_id.len()),
            ("shape", self.attrs.shape.len()),
        ] {
            if len != num_entries {
                return Err(Error::Schema(format!(
                    "attrs.{field} has {len} entries, expected {num_entries}"
                )));
            }
        }
        for (eid, shape) in self.attrs.shape.iter().enumerate() {
            if shape.iter().any(|&dim| dim < 0) {
                return Err(Error::Schema(format!(
                    "entry {eid} has negative extent in shape {shape:?}"
                )));
            }
        }

        for (nid, node) in self.nodes.iter().enumerate() {
            match node.op_type.as_str() {
                "null" => {}
                "tvm_op" => {
                    if node.attrs.is_none() {
                        return Err(Error::Schema(format!(
                            "node '{}' is missing kernel attributes",
                            node.name
                        )));
                    }
                }
                other => {
                    return Err(Error::UnsupportedOp {
                        op_type: other.to_string(),
                        name: node.name.clone(),
                    });
                }
            }
            let span = self.node_row_ptr[nid + 1] - self.node_row_ptr[nid];
            if node.num_outputs() != span {
                return Err(Error::Schema(format!(
                    "node '{}' claims {} outputs but node_row_ptr spans {}",
                    node.name,
                    node.num_outputs(),
                    span
                )));
            }
            for entry in &node.inputs {
                self.check_entry(entry)?;
            }
        }

        let mut seen = HashSet::new();
        for &nid in &self.input_nodes {
            let node = self
                .nodes
                .get(nid as usize)
                .ok_or_else(|| Error::Schema(format!("arg_nodes references node {nid}")))?;
            if !node.is_placeholder() {
                return Err(Error::Schema(format!(
                    "arg_nodes references non-null node '{}'",
                    node.name
                )));
            }
            if !seen.insert(nid) {
                return Err(Error::Schema(format!(
                    "arg_nodes lists node {nid} more than once"
                )));
            }
        }

        for entry in &self.outputs {
            self.check_entry(entry)?;
        }
        Ok(())
    }

    fn check_entry(&self, entry: &NodeEntry) -> Result<()> {
        let nid = entry.node_id as usize;
        if nid >= self.nodes.len() {
            return Err(Error::Schema(format!(
                "entry references node {nid}, graph has {}",
                self.nodes.len()
            )));
        }
        let span = self.node_row_ptr[nid + 1] - self.node_row_ptr[nid];
        if entry.index >= span {
            return Err(Error::Schema(format!(
                "entry references output {} of node '{}', which has {span}",
                entry.index, self.nodes[nid].name
            )));
        }
        Ok(())
    }
}
