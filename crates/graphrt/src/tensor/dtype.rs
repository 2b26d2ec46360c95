//! Scalar element types as carried in graph metadata and tensor headers.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Type-code half of a dtype, matching the wire encoding used by graph
/// producers: `int = 0`, `uint = 1`, `float = 2`, `handle = 3`.
pub mod type_code {
    pub const INT: u8 = 0;
    pub const UINT: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const HANDLE: u8 = 3;
}

/// Element type of a tensor: type code, bit width, and vector lane count.
///
/// The layout matches the packed header form used in parameter blobs
/// (`code: u8`, `bits: u8`, `lanes: u16`).
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

impl DType {
    pub const FLOAT32: DType = DType {
        code: type_code::FLOAT,
        bits: 32,
        lanes: 1,
    };

    pub const INT32: DType = DType {
        code: type_code::INT,
        bits: 32,
        lanes: 1,
    };

    pub fn new(code: u8, bits: u8, lanes: u16) -> Self {
        Self { code, bits, lanes }
    }

    /// Bytes occupied by a single element, rounding sub-byte widths up.
    pub fn element_bytes(&self) -> u64 {
        (u64::from(self.bits) * u64::from(self.lanes) + 7) / 8
    }

    /// Total bytes of a dense tensor of this dtype, or `None` on overflow.
    pub fn byte_size(&self, shape: &[i64]) -> Option<u64> {
        shape
            .iter()
            .try_fold(self.element_bytes(), |acc, &dim| {
                acc.checked_mul(u64::try_from(dim).ok()?)
            })
    }

    fn code_name(&self) -> &'static str {
        match self.code {
            type_code::INT => "int",
            type_code::UINT => "uint",
            type_code::FLOAT => "float",
            type_code::HANDLE => "handle",
            _ => "unknown",
        }
    }
}

impl FromStr for DType {
    type Err = Error;

    /// Parses the `<code><bits>[x<lanes>]` form, e.g. `"float32"`,
    /// `"uint8"`, `"float32x4"`.
    fn from_str(s: &str) -> Result<Self> {
        let err = || Error::DtypeParse(s.to_string());
        let (code, rest) = if let Some(rest) = s.strip_prefix("handle") {
            (type_code::HANDLE, rest)
        } else if let Some(rest) = s.strip_prefix("float") {
            (type_code::FLOAT, rest)
        } else if let Some(rest) = s.strip_prefix("uint") {
            (type_code::UINT, rest)
        } else if let Some(rest) = s.strip_prefix("int") {
            (type_code::INT, rest)
        } else {
            return Err(err());
        };

        let (bits_str, lanes_str) = match rest.split_once('x') {
            Some((bits, lanes)) => (bits, Some(lanes)),
            None => (rest, None),
        };
        let bits: u8 = bits_str.parse().map_err(|_| err())?;
        if bits == 0 {
            return Err(err());
        }
        let lanes: u16 = match lanes_str {
            Some(lanes) => lanes.parse().map_err(|_| err())?,
            None => 1,
        };
        if lanes == 0 {
            return Err(err());
        }
        Ok(DType { code, bits, lanes })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code_name(), self.bits)?;
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
