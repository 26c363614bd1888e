use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};

/// Untyped machine value crossing the guest boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// Address value meaning "absent" for reference-typed values.
pub const NULL: i32 = -1;

impl RawValue {
    /// Integer view. Float values are truncated toward zero.
    pub fn as_i32(self) -> i32 {
        match self {
            RawValue::I32(v) => v,
            RawValue::I64(v) => v as i32,
            RawValue::F32(v) => v as i32,
            RawValue::F64(v) => v as i32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            RawValue::I32(v) => v as f64,
            RawValue::I64(v) => v as f64,
            RawValue::F32(v) => v as f64,
            RawValue::F64(v) => v,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, RawValue::I32(NULL))
    }

    /// Reinterpret a 4-byte little-endian slot, using the float32 view when
    /// `float` is set and the int32 view otherwise.
    pub fn from_slot(bytes: [u8; 4], float: bool) -> Self {
        if float {
            RawValue::F32(f32::from_le_bytes(bytes))
        } else {
            RawValue::I32(i32::from_le_bytes(bytes))
        }
    }

    /// Store into a 4-byte slot with the float32 or int32 view.
    pub fn to_slot(self, float: bool) -> [u8; 4] {
        if float {
            (self.as_f64() as f32).to_le_bytes()
        } else {
            self.as_i32().to_le_bytes()
        }
    }

    pub fn to_val(self, ty: &wasmtime::ValType) -> Result<wasmtime::Val> {
        Ok(match ty {
            wasmtime::ValType::I32 => wasmtime::Val::I32(self.as_i32()),
            wasmtime::ValType::I64 => wasmtime::Val::I64(match self {
                RawValue::I64(v) => v,
                other => other.as_f64() as i64,
            }),
            wasmtime::ValType::F32 => wasmtime::Val::F32((self.as_f64() as f32).to_bits()),
            wasmtime::ValType::F64 => wasmtime::Val::F64(self.as_f64().to_bits()),
            other => return Err(Error::mismatch("numeric result type", other.to_string())),
        })
    }

    pub fn from_val(val: &wasmtime::Val) -> Result<Self> {
        match val {
            wasmtime::Val::I32(v) => Ok(RawValue::I32(*v)),
            wasmtime::Val::I64(v) => Ok(RawValue::I64(*v)),
            wasmtime::Val::F32(bits) => Ok(RawValue::F32(f32::from_bits(*bits))),
            wasmtime::Val::F64(bits) => Ok(RawValue::F64(f64::from_bits(*bits))),
            other => Err(Error::mismatch("numeric value", format!("{other:?}"))),
        }
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::I32(v)
    }
}

impl From<f32> for RawValue {
    fn from(v: f32) -> Self {
        RawValue::F32(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::F64(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::I32(v as i32)
    }
}

/// Native host value produced by decoding guest memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i32),
    Num(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Dict(IndexMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Num(_) => "num",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of an int or num.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Num(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Top-level strings print bare; nested strings are quoted.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Num(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Dict(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {name}: ")?;
                    value.fmt_nested(f)?;
                }
                if !fields.is_empty() {
                    f.write_str(" ")?;
                }
                f.write_str("}")
            }
        }
    }
}
