//! Decoding and encoding of values in guest linear memory.
//!
//! **Decoding** turns a raw value returned by (or passed from) the guest into
//! a native [`Value`], following references into memory as the
//! [`TypeDescriptor`] dictates.
//!
//! **Encoding** is the inverse: native values are written into freshly
//! allocated guest memory and the resulting raw value (a scalar, or a base
//! address) is handed back to the guest.
//!
//! Layout is assumed, not discovered: every array element and dict field sits
//! in a 4-byte slot, strings are NUL-terminated UTF-8, and `-1` is the null
//! reference.

use indexmap::IndexMap;

use crate::descriptor::{TypeDescriptor, SLOT};
use crate::error::{Error, Result};
use crate::memory::GuestMemory;
use crate::value::{RawValue, Value, NULL};

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode `raw` as a value of shape `ty`.
pub fn decode(memory: &dyn GuestMemory, ty: &TypeDescriptor, raw: RawValue) -> Result<Value> {
    match ty {
        TypeDescriptor::Int => Ok(Value::Int(raw.as_i32())),
        TypeDescriptor::Num => Ok(Value::Num(round6(raw.as_f64()))),
        TypeDescriptor::Bool => Ok(Value::Bool(raw.as_i32() != 0)),
        TypeDescriptor::Str => {
            if raw.is_null() {
                return Ok(Value::Null);
            }
            decode_str(memory, raw.as_i32()).map(Value::Str)
        }
        TypeDescriptor::Array { element } => {
            if raw.is_null() {
                return Ok(Value::Null);
            }
            decode_array(memory, element, raw.as_i32())
        }
        TypeDescriptor::Dict { fields } => {
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let base = raw.as_i32() as i64;
            let mut result = IndexMap::with_capacity(fields.len());
            for (name, field) in fields {
                // A field typed as the enclosing record terminates with null
                // rather than following the cycle.
                let value = match &field.ty {
                    TypeDescriptor::Alias { .. } => Value::Null,
                    field_ty => {
                        let slot = memory.read_slot(base + field.offset as i64)?;
                        decode(memory, field_ty, RawValue::from_slot(slot, field_ty.is_float()))?
                    }
                };
                result.insert(name.clone(), value);
            }
            Ok(Value::Dict(result))
        }
        TypeDescriptor::Enum { values } => {
            let index = raw.as_i32();
            usize::try_from(index)
                .ok()
                .and_then(|i| values.get(i))
                .map(|member| Value::Str(member.clone()))
                .ok_or_else(|| Error::layout(index, format!("enum index out of range for {ty}")))
        }
        TypeDescriptor::Alias { .. } => Ok(Value::Null),
    }
}

/// Decode a NUL-terminated UTF-8 string at `address`.
pub fn decode_str(memory: &dyn GuestMemory, address: i32) -> Result<String> {
    let bytes = memory.read_cstr(address as i64)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::layout(address, format!("invalid UTF-8 in string: {e}")))
}

/// Element count stored in an array header.
pub fn array_len(memory: &dyn GuestMemory, address: i32) -> Result<i32> {
    Ok(i32::from_le_bytes(memory.read_slot(address as i64)?))
}

fn decode_array(memory: &dyn GuestMemory, element: &TypeDescriptor, address: i32) -> Result<Value> {
    let len = array_len(memory, address)?;
    if len < 0 {
        return Err(Error::layout(address, format!("negative array length {len}")));
    }
    let end = address as i64 + SLOT as i64 * (1 + len as i64);
    if end > memory.data().len() as i64 {
        return Err(Error::layout(address, format!("array of {len} elements runs past end of memory")));
    }
    let mut items = Vec::with_capacity(len as usize);
    let mut cursor = address as i64 + SLOT as i64;
    for _ in 0..len {
        let slot = memory.read_slot(cursor)?;
        items.push(decode(memory, element, RawValue::from_slot(slot, element.is_float()))?);
        cursor += SLOT as i64;
    }
    Ok(Value::Array(items))
}

/// Normalize float32 storage error to 6 decimal digits.
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `value` as shape `ty`, allocating guest memory for references.
///
/// Scalars pass through. `Null` for any reference shape encodes to the null
/// sentinel.
pub fn encode(memory: &mut dyn GuestMemory, ty: &TypeDescriptor, value: &Value) -> Result<RawValue> {
    match (ty, value) {
        (TypeDescriptor::Int, Value::Int(v)) => Ok(RawValue::I32(*v)),
        (TypeDescriptor::Int, Value::Num(v)) => Ok(RawValue::I32(*v as i32)),
        (TypeDescriptor::Int, Value::Bool(v)) => Ok(RawValue::from(*v)),
        (TypeDescriptor::Num, Value::Num(v)) => Ok(RawValue::F32(*v as f32)),
        (TypeDescriptor::Num, Value::Int(v)) => Ok(RawValue::F32(*v as f32)),
        (TypeDescriptor::Bool, Value::Bool(v)) => Ok(RawValue::from(*v)),
        (TypeDescriptor::Bool, Value::Int(v)) => Ok(RawValue::from(*v != 0)),
        (TypeDescriptor::Str | TypeDescriptor::Array { .. } | TypeDescriptor::Dict { .. }, Value::Null) => {
            Ok(RawValue::I32(NULL))
        }
        (TypeDescriptor::Alias { .. }, _) => Ok(RawValue::I32(NULL)),
        (TypeDescriptor::Str, Value::Str(s)) => encode_str(memory, s).map(RawValue::I32),
        (TypeDescriptor::Array { element }, Value::Array(items)) => {
            let encoded = items
                .iter()
                .map(|item| encode(memory, element, item))
                .collect::<Result<Vec<_>>>()?;
            let address = memory.alloc(ty.storage_size(items.len()))?;
            memory.write_bytes(address, &(items.len() as i32).to_le_bytes())?;
            let float = element.is_float();
            for (i, raw) in encoded.into_iter().enumerate() {
                let slot = address + SLOT * (1 + i as u32);
                memory.write_bytes(slot, &raw.to_slot(float))?;
            }
            Ok(RawValue::I32(address as i32))
        }
        (TypeDescriptor::Dict { fields }, Value::Dict(values)) => {
            let mut encoded = Vec::with_capacity(fields.len());
            for (name, field) in fields {
                let value = values
                    .get(name)
                    .ok_or_else(|| Error::MissingField(name.clone()))?;
                encoded.push((encode(memory, &field.ty, value)?, field.ty.is_float()));
            }
            let address = memory.alloc(ty.storage_size(fields.len()))?;
            for (i, (raw, float)) in encoded.into_iter().enumerate() {
                memory.write_bytes(address + SLOT * i as u32, &raw.to_slot(float))?;
            }
            Ok(RawValue::I32(address as i32))
        }
        (TypeDescriptor::Enum { values }, Value::Str(member)) => values
            .iter()
            .position(|v| v == member)
            .map(|i| RawValue::I32(i as i32))
            .ok_or_else(|| Error::mismatch(ty.to_string(), format!("member {member:?}"))),
        (TypeDescriptor::Enum { values }, Value::Int(i)) if (*i as usize) < values.len() && *i >= 0 => {
            Ok(RawValue::I32(*i))
        }
        (ty, value) => Err(Error::mismatch(ty.to_string(), value.kind())),
    }
}

/// Copy `s` plus a trailing NUL into a fresh guest block.
pub fn encode_str(memory: &mut dyn GuestMemory, s: &str) -> Result<i32> {
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    let address = memory.alloc(bytes.len() as u32)?;
    memory.write_bytes(address, &bytes)?;
    Ok(address as i32)
}
