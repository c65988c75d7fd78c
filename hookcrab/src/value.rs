//! Runtime values exchanged between the interpreter and its callers.
use crate::ty::Type;
use anyhow::{Result, bail};
use smallvec::SmallVec;
use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Runtime value with binary representation and size information.
///
/// Uses SmallVec to avoid heap allocations for values ≤16 bytes,
/// which covers every scalar type (up to i128 and f64).
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Raw bytes - inline for values ≤16 bytes, heap for larger
    data: SmallVec<[u8; 16]>,
}

impl Value {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: SmallVec::from_slice(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Create a value from any plain-old-data type, in host byte order.
    pub fn from_type<T: IntoBytes + Immutable>(value: T) -> Self {
        Self {
            data: SmallVec::from_slice(value.as_bytes()),
        }
    }

    /// Try to interpret the bytes as `T`. Returns `None` if the sizes differ.
    pub fn as_type<T: FromBytes>(&self) -> Option<T> {
        T::read_from_bytes(&self.data).ok()
    }

    /// Create unit value (zero-sized)
    pub fn unit() -> &'static Self {
        static UNIT: Value = Value {
            data: SmallVec::new_const(),
        };
        &UNIT
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_type(u8::from(value))
    }

    /// Try to interpret as boolean
    pub fn as_bool(&self) -> Option<bool> {
        self.as_type::<u8>().map(|b| b != 0)
    }

    /// Check if this is a unit value
    pub fn is_unit(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Mask selecting the low `bits` bits of a 128-bit integer.
pub(crate) fn int_mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// A value tagged with the IR type it was produced or declared with.
///
/// This is what crosses the boundary between the interpreter and its caller:
/// arguments going in and the exit value coming out.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: Type,
    pub value: Value,
}

impl TypedValue {
    /// Pair a value with a type, checking the value has the type's size.
    pub fn new(ty: Type, value: Value) -> Result<Self> {
        match ty.size() {
            Some(size) if size != value.len() => bail!(
                "Value of {} bytes does not fit type {} ({} bytes)",
                value.len(),
                ty,
                size
            ),
            _ => Ok(Self { ty, value }),
        }
    }

    pub fn void() -> Self {
        Self {
            ty: Type::Void,
            value: Value::unit().clone(),
        }
    }

    /// Build an integer of type `ty` from the low bits of `raw`.
    pub fn from_int(ty: Type, raw: u128) -> Result<Self> {
        let Some(bits) = ty.int_bits() else {
            bail!("Expected integer type, found {ty}");
        };
        let size = ty.size().unwrap_or_default();
        let bytes = (raw & int_mask(bits)).to_le_bytes();
        Ok(Self {
            ty,
            value: Value::from_bytes(&bytes[..size]),
        })
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            ty: Type::I1,
            value: Value::from_bool(value),
        }
    }

    pub fn from_i8(value: i8) -> Self {
        Self {
            ty: Type::I8,
            value: Value::from_type(value),
        }
    }

    pub fn from_i16(value: i16) -> Self {
        Self {
            ty: Type::I16,
            value: Value::from_type(value),
        }
    }

    pub fn from_i32(value: i32) -> Self {
        Self {
            ty: Type::I32,
            value: Value::from_type(value),
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self {
            ty: Type::I64,
            value: Value::from_type(value),
        }
    }

    pub fn from_i128(value: i128) -> Self {
        Self {
            ty: Type::I128,
            value: Value::from_type(value),
        }
    }

    pub fn from_f32(value: f32) -> Self {
        Self {
            ty: Type::F32,
            value: Value::from_type(value),
        }
    }

    pub fn from_f64(value: f64) -> Self {
        Self {
            ty: Type::F64,
            value: Value::from_type(value),
        }
    }

    /// Pack a list of strings into an opaque `ptr` payload.
    ///
    /// Each string is NUL-terminated, the same way a process receives its
    /// argument and environment vectors.
    pub fn from_strings<S: AsRef<str>>(items: &[S]) -> Self {
        let mut data = SmallVec::<[u8; 16]>::new();
        for item in items {
            data.extend_from_slice(item.as_ref().as_bytes());
            data.push(0);
        }
        Self {
            ty: Type::Ptr,
            value: Value { data },
        }
    }

    /// Unpack a `ptr` payload built with [`TypedValue::from_strings`].
    pub fn as_strings(&self) -> Option<Vec<String>> {
        if self.ty != Type::Ptr {
            return None;
        }
        let bytes = self.value.as_bytes();
        let Some(body) = bytes.strip_suffix(&[0]) else {
            return bytes.is_empty().then(Vec::new);
        };
        Some(
            body.split(|b| *b == 0)
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect(),
        )
    }

    /// Integer value zero-extended to 128 bits.
    pub fn as_u128(&self) -> Option<u128> {
        let bits = self.ty.int_bits()?;
        let bytes = self.value.as_bytes();
        let mut buf = [0u8; 16];
        buf.get_mut(..bytes.len())?.copy_from_slice(bytes);
        Some(u128::from_le_bytes(buf) & int_mask(bits))
    }

    /// Integer value sign-extended to 128 bits.
    pub fn as_i128(&self) -> Option<i128> {
        let bits = self.ty.int_bits()?;
        let raw = self.as_u128()?;
        let sign_bit = 1u128 << (bits - 1);
        if bits < 128 && raw & sign_bit != 0 {
            Some((raw | !int_mask(bits)) as i128)
        } else {
            Some(raw as i128)
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        (self.ty == Type::I1).then(|| self.value.as_bool()).flatten()
    }

    pub fn as_i32(&self) -> Option<i32> {
        (self.ty == Type::I32).then(|| self.value.as_type()).flatten()
    }

    pub fn as_i64(&self) -> Option<i64> {
        (self.ty == Type::I64).then(|| self.value.as_type()).flatten()
    }

    pub fn as_f32(&self) -> Option<f32> {
        (self.ty == Type::F32).then(|| self.value.as_type()).flatten()
    }

    pub fn as_f64(&self) -> Option<f64> {
        (self.ty == Type::F64).then(|| self.value.as_type()).flatten()
    }

    /// Reinterpret the value as another type of the same size.
    pub fn retag(self, ty: Type) -> Result<Self> {
        if self.ty == ty {
            return Ok(self);
        }
        if ty == Type::Ptr || self.ty == Type::Ptr {
            bail!("Cannot reinterpret {} as {}", self.ty, ty);
        }
        Self::new(ty, self.value)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Void => write!(f, "void"),
            Type::Int(1) => match self.as_bool() {
                Some(b) => write!(f, "i1 {b}"),
                None => write!(f, "i1 invalid"),
            },
            Type::Int(_) => match self.as_i128() {
                Some(i) => write!(f, "{} {}", self.ty, i),
                None => write!(f, "{} invalid", self.ty),
            },
            Type::F32 => match self.as_f32() {
                Some(x) => write!(f, "f32 {x:?}"),
                None => write!(f, "f32 invalid"),
            },
            Type::F64 => match self.as_f64() {
                Some(x) => write!(f, "f64 {x:?}"),
                None => write!(f, "f64 invalid"),
            },
            Type::Ptr => match self.as_strings() {
                Some(items) => write!(f, "ptr {items:?}"),
                None => write!(f, "ptr <{} bytes>", self.value.len()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_bool() {
        let true_val = Value::from_bool(true);
        assert_eq!(true_val.as_bool(), Some(true));
        assert!(!true_val.is_unit());
        assert_eq!(true_val.len(), 1);

        let false_val = Value::from_bool(false);
        assert_eq!(false_val.as_bool(), Some(false));
    }

    #[test]
    fn test_value_unit() {
        let unit_val = Value::unit();
        assert!(unit_val.is_unit());
        assert_eq!(unit_val.as_bool(), None);
        assert_eq!(unit_val.as_type::<u8>(), None);
    }

    #[test]
    fn test_value_type_safety() {
        let i8_val = Value::from_type(42i8);
        assert_eq!(i8_val.as_type::<i16>(), None);
        assert_eq!(i8_val.as_type::<u8>(), Some(42)); // Same size, different interpretation

        let i32_val = Value::from_type(42i32);
        assert_eq!(i32_val.as_type::<i8>(), None);
        assert_eq!(i32_val.as_type::<u32>(), Some(42));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::from_type(42i32), Value::from_type(42i32));
        assert_ne!(Value::from_type(42i32), Value::from_type(43i32));
        assert_ne!(Value::from_type(42i32), Value::from_type(42i8)); // Different sizes
    }

    #[test]
    fn test_typed_value_size_check() {
        assert!(TypedValue::new(Type::I32, Value::from_type(1i32)).is_ok());
        assert!(TypedValue::new(Type::I64, Value::from_type(1i32)).is_err());
        assert!(TypedValue::new(Type::Ptr, Value::from_bytes(b"abc\0")).is_ok());
    }

    #[test]
    fn test_from_int_truncates() {
        let v = TypedValue::from_int(Type::I8, 0x1ff).unwrap();
        assert_eq!(v.as_u128(), Some(0xff));
        assert_eq!(v.as_i128(), Some(-1));

        let b = TypedValue::from_int(Type::I1, 3).unwrap();
        assert_eq!(b.as_bool(), Some(true));
        assert_eq!(b.as_i128(), Some(-1));

        assert!(TypedValue::from_int(Type::F64, 1).is_err());
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(TypedValue::from_i32(-7).as_i128(), Some(-7));
        assert_eq!(TypedValue::from_i32(-7).as_u128(), Some(0xffff_fff9));
        assert_eq!(TypedValue::from_i128(i128::MIN).as_i128(), Some(i128::MIN));
        assert_eq!(TypedValue::from_i16(300).as_i128(), Some(300));
    }

    #[test]
    fn test_width_checked_accessors() {
        let v = TypedValue::from_i64(5);
        assert_eq!(v.as_i64(), Some(5));
        assert_eq!(v.as_i32(), None);
        assert_eq!(TypedValue::from_f64(1.5).as_f64(), Some(1.5));
        assert_eq!(TypedValue::from_f64(1.5).as_f32(), None);
    }

    #[test]
    fn test_string_payloads() {
        let argv = TypedValue::from_strings(&["app", "", "x y"]);
        assert_eq!(argv.ty, Type::Ptr);
        assert_eq!(
            argv.as_strings(),
            Some(vec!["app".to_string(), String::new(), "x y".to_string()])
        );

        let empty = TypedValue::from_strings::<&str>(&[]);
        assert_eq!(empty.as_strings(), Some(vec![]));
        assert_eq!(TypedValue::from_i32(0).as_strings(), None);
    }

    #[test]
    fn test_retag() {
        let v = TypedValue::from_i32(-1).retag(Type::F32).unwrap();
        assert_eq!(v.ty, Type::F32);
        assert!(TypedValue::from_i32(1).retag(Type::I64).is_err());
        assert!(TypedValue::from_strings(&["a"]).retag(Type::I8).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TypedValue::from_i32(-3).to_string(), "i32 -3");
        assert_eq!(TypedValue::from_bool(true).to_string(), "i1 true");
        assert_eq!(TypedValue::from_f64(2.0).to_string(), "f64 2.0");
        assert_eq!(TypedValue::void().to_string(), "void");
        assert_eq!(
            TypedValue::from_strings(&["a", "b"]).to_string(),
            r#"ptr ["a", "b"]"#
        );
    }
}
