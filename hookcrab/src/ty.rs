//! IR types.
use anyhow::{Result, bail};
use std::fmt;
use std::str::FromStr;

/// Type of an IR value.
///
/// Integers carry their bit width. `Ptr` is an opaque payload whose size depends
/// on its contents, which is how argument and environment vectors are passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    F32,
    F64,
    Ptr,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);
    pub const I128: Type = Type::Int(128);

    /// Return the size of the type in bytes, or `None` for unsized payloads.
    pub fn size(&self) -> Option<usize> {
        match self {
            Type::Void => Some(0),
            Type::Int(bits) => Some(bits.div_ceil(8) as usize),
            Type::F32 => Some(4),
            Type::F64 => Some(8),
            Type::Ptr => None,
        }
    }

    /// Bit width of integer types.
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

impl FromStr for Type {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s {
            "void" => Type::Void,
            "i1" => Type::I1,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "i128" => Type::I128,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "ptr" => Type::Ptr,
            _ => bail!("unknown type `{s}`"),
        };
        Ok(ty)
    }
}
