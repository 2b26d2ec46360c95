//! Reader for the binary parameter blob produced alongside the graph.
//!
//! Layout (little-endian): a list header naming every parameter, then one
//! tensor record per name in order. Both the list and each tensor carry a
//! magic number.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::tensor::DType;

/// Magic number opening a parameter blob.
pub const NDARRAY_LIST_MAGIC: u64 = 0xF7E5_8D4F_0504_9CB7;

/// Magic number opening each serialized tensor inside the blob.
pub const NDARRAY_MAGIC: u64 = 0xDD5E_40F0_96B4_A13F;

/// One serialized tensor, with its payload borrowed from the blob.
#[derive(Debug)]
pub(crate) struct ParamTensor<'a> {
    #[allow(dead_code)]
    pub device: Device,
    pub dtype: DType,
    pub shape: Vec<i64>,
    pub data: &'a [u8],
}

pub(crate) struct BlobReader<'a> {
    buf: &'a [u8],
}

impl<'a> BlobReader<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self { buf: blob }
    }

    /// Reads the list header and returns the parameter names in blob order.
    pub fn read_header(&mut self) -> Result<Vec<String>> {
        let magic = self.read_u64()?;
        if magic != NDARRAY_LIST_MAGIC {
            return Err(Error::ParamBlob(format!(
                "bad list magic {magic:#018x}"
            )));
        }
        self.read_u64()?; // reserved

        let count = self.read_len("name count")?;
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.read_len("name length")?;
            let bytes = self.take(len)?;
            let name = String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::ParamBlob("parameter name is not UTF-8".to_string()))?;
            names.push(name);
        }

        let tensor_count = self.read_len("tensor count")?;
        if tensor_count != names.len() {
            return Err(Error::ParamBlob(format!(
                "{} names but {tensor_count} tensors",
                names.len()
            )));
        }
        Ok(names)
    }

    /// Reads the next tensor record.
    pub fn read_tensor(&mut self) -> Result<ParamTensor<'a>> {
        let magic = self.read_u64()?;
        if magic != NDARRAY_MAGIC {
            return Err(Error::ParamBlob(format!(
                "bad tensor magic {magic:#018x}"
            )));
        }
        self.read_u64()?; // reserved

        let device = Device::new(self.read_i32()?, self.read_i32()?);
        let ndim = self.read_i32()?;
        let ndim = usize::try_from(ndim)
            .map_err(|_| Error::ParamBlob(format!("negative tensor rank {ndim}")))?;
        let dtype = DType::new(self.read_u8()?, self.read_u8()?, self.read_u16()?);
        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            shape.push(self.read_i64()?);
        }
        let byte_size = self.read_len("tensor byte size")?;
        let data = self.take(byte_size)?;
        Ok(ParamTensor {
            device,
            dtype,
            shape,
            data,
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::ParamBlob(format!(
                "truncated: wanted {n} bytes, {} remain",
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_len(&mut self, what: &str) -> Result<usize> {
        let value = self.read_u64()?;
        usize::try_from(value)
            .map_err(|_| Error::ParamBlob(format!("{what} {value} exceeds address space")))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
}
