//! serde-based loader for the producer's graph JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::{Graph, GraphAttrs, GraphNode, NodeEntry, OpAttrs};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGraph {
    nodes: Vec<RawNode>,
    arg_nodes: Vec<u32>,
    node_row_ptr: Vec<u32>,
    heads: Vec<RawEntry>,
    attrs: RawAttrs,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    op: String,
    name: String,
    inputs: Vec<RawEntry>,
    #[serde(default, alias = "attr")]
    attrs: Option<BTreeMap<String, String>>,
    #[serde(default)]
    control_deps: Vec<u32>,
}

struct RawEntry(NodeEntry);

impl<'de> Deserialize<'de> for RawEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = RawEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [node_id, index] or [node_id, index, version] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let node_id: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let index: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let version: u32 = seq.next_element()?.unwrap_or(0);
                if seq.next_element::<u32>()?.is_some() {
                    return Err(de::Error::custom(
                        "node entry arrays carry at most 3 elements",
                    ));
                }
                Ok(RawEntry(NodeEntry {
                    node_id,
                    index,
                    version,
                }))
            }
        }

        deserializer.deserialize_seq(EntryVisitor)
    }
}

/// Graph attribute blocks keyed by name, each a `[type_tag, payload]` pair.
#[derive(Deserialize)]
struct RawAttrs(BTreeMap<String, (String, Value)>);

pub(super) fn parse(graph_json: &str) -> Result<Graph> {
    let raw: RawGraph =
        serde_json::from_str(graph_json).map_err(|err| Error::Schema(err.to_string()))?;

    let nodes = raw
        .nodes
        .into_iter()
        .map(node_from_raw)
        .collect::<Result<Vec<_>>>()?;
    let attrs = attrs_from_raw(raw.attrs)?;

    Ok(Graph {
        nodes,
        input_nodes: raw.arg_nodes,
        node_row_ptr: raw.node_row_ptr,
        outputs: raw.heads.into_iter().map(|e| e.0).collect(),
        attrs,
    })
}

fn node_from_raw(raw: RawNode) -> Result<GraphNode> {
    let attrs = match (raw.op.as_str(), raw.attrs) {
        ("tvm_op", Some(map)) => Some(op_attrs(&raw.name, &map)?),
        ("tvm_op", None) => {
            return Err(Error::Schema(format!(
                "node '{}' is missing kernel attributes",
                raw.name
            )));
        }
        _ => None,
    };
    Ok(GraphNode {
        op_type: raw.op,
        name: raw.name,
        inputs: raw.inputs.into_iter().map(|e| e.0).collect(),
        control_deps: raw.control_deps,
        attrs,
    })
}

fn op_attrs(node: &str, map: &BTreeMap<String, String>) -> Result<OpAttrs> {
    let field = |key: &str| {
        map.get(key)
            .ok_or_else(|| Error::Schema(format!("node '{node}' attrs missing {key}")))
    };
    let numeric = |key: &str| -> Result<u32> {
        field(key)?
            .parse()
            .map_err(|_| Error::Schema(format!("node '{node}' attr {key} is not an integer")))
    };
    Ok(OpAttrs {
        func_name: field("func_name")?.clone(),
        num_inputs: numeric("num_inputs")?,
        num_outputs: numeric("num_outputs")?,
        flatten_data: numeric("flatten_data")? != 0,
    })
}

fn attrs_from_raw(raw: RawAttrs) -> Result<GraphAttrs> {
    let mut attrs = GraphAttrs::default();
    let mut found = [false; 3];
    for (key, (tag, payload)) in raw.0 {
        match key.as_str() {
            "dltype" => {
                attrs.dltype = typed_payload(&key, &tag, "list_str", payload)?;
                found[0] = true;
            }
            "storage_id" => {
                attrs.storage_id = typed_payload(&key, &tag, "list_int", payload)?;
                found[1] = true;
            }
            "shape" => {
                attrs.shape = typed_payload(&key, &tag, "list_shape", payload)?;
                found[2] = true;
            }
            _ => match tag.as_str() {
                "list_int" => {
                    typed_payload::<Vec<i64>>(&key, &tag, "list_int", payload)?;
                }
                "size_t" => {
                    typed_payload::<u64>(&key, &tag, "size_t", payload)?;
                }
                _ => {
                    return Err(Error::Schema(format!(
                        "cannot skip graph attr '{key}' with type tag '{tag}'"
                    )));
                }
            },
        }
    }
    for (ok, key) in found.iter().zip(["dltype", "storage_id", "shape"]) {
        if !ok {
            return Err(Error::Schema(format!("attrs missing {key}")));
        }
    }
    Ok(attrs)
}

fn typed_payload<T: serde::de::DeserializeOwned>(
    key: &str,
    tag: &str,
    expected_tag: &str,
    payload: Value,
) -> Result<T> {
    if tag != expected_tag {
        return Err(Error::Schema(format!(
            "attr '{key}' has type tag '{tag}', expected '{expected_tag}'"
        )));
    }
    serde_json::from_value(payload)
        .map_err(|err| Error::Schema(format!("attr '{key}' payload: {err}")))
}
