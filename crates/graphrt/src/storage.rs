//! Storage planning: folding per-entry sizes into shared pool requirements.
//!
//! The producer assigns every entry a `storage_id`; entries sharing an id
//! deliberately alias one physical buffer (their live ranges do not
//! overlap, which the producer — not this crate — guarantees). The plan
//! records, per pool, the largest byte size any aliasing entry needs.

use crate::error::{Error, Result};
use crate::graph::GraphAttrs;
use crate::tensor::DType;

/// Output of the planning step, consumed by the executor when it allocates
/// pool buffers and materializes entry views.
#[derive(Clone, Debug)]
pub struct StoragePlan {
    /// Decoded dtype per entry, parallel to the attribute arrays.
    pub entry_dtype: Vec<DType>,
    /// Pool slot per entry, checked non-negative.
    pub entry_storage: Vec<usize>,
    /// Required byte size per pool slot.
    pub pool_bytes: Vec<u64>,
}

impl StoragePlan {
    pub fn build(attrs: &GraphAttrs) -> Result<StoragePlan> {
        let mut entry_dtype = Vec::with_capacity(attrs.dltype.len());
        for dltype in &attrs.dltype {
            entry_dtype.push(dltype.parse::<DType>()?);
        }

        let mut entry_storage = Vec::with_capacity(attrs.storage_id.len());
        let mut pool_bytes: Vec<u64> = Vec::new();
        for (eid, (&storage_id, shape)) in
            attrs.storage_id.iter().zip(&attrs.shape).enumerate()
        {
            let dtype = entry_dtype[eid];
            let bits = u32::from(dtype.bits) * u32::from(dtype.lanes);
            if !bits.is_multiple_of(8) {
                return Err(Error::StoragePlan(format!(
                    "entry {eid} dtype {dtype} is {bits} bits, not byte-aligned"
                )));
            }
            let sid = usize::try_from(storage_id).map_err(|_| {
                Error::StoragePlan(format!("entry {eid} has negative storage id {storage_id}"))
            })?;
            let bytes = dtype.byte_size(shape).ok_or_else(|| {
                Error::StoragePlan(format!("entry {eid} shape {shape:?} overflows a byte size"))
            })?;

            if sid >= pool_bytes.len() {
                pool_bytes.resize(sid + 1, 0);
            }
            pool_bytes[sid] = pool_bytes[sid].max(bytes);
            entry_storage.push(sid);
        }

        Ok(StoragePlan {
            entry_dtype,
            entry_storage,
            pool_bytes,
        })
    }

    /// Shape of the rank-1 `float32` buffer backing pool `sid`. The
    /// float32 encoding is a fixed contract with the producer's memory
    /// plan; parameter loading and kernels only ever address raw bytes.
    pub fn pool_shape(&self, sid: usize) -> [i64; 1] {
        [((self.pool_bytes[sid] + 3) / 4) as i64]
    }
}
