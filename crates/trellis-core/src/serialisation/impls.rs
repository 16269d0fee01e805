use std::collections::BTreeSet;

use super::{type_mismatch, Serialiser};
use crate::domain::sketch::HyperLogLog;
use crate::domain::value::{Value, ValueType};
use crate::CoreError;

fn fixed<const N: usize>(name: &str, bytes: &[u8]) -> Result<[u8; N], CoreError> {
    bytes.try_into().map_err(|_| {
        CoreError::Serialisation(format!(
            "{} expects {} bytes, got {}",
            name,
            N,
            bytes.len()
        ))
    })
}

/// One byte per boolean; `false < true`
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanSerialiser;

impl Serialiser for BooleanSerialiser {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Bool
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        match bytes {
            [] => self.deserialise_empty(),
            [0] => Ok(Value::Bool(false)),
            [1] => Ok(Value::Bool(true)),
            _ => Err(CoreError::Serialisation(format!(
                "invalid boolean encoding {:?}",
                bytes
            ))),
        }
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::Null)
    }

    fn preserves_ordering(&self) -> bool {
        true
    }
}

/// Big-endian with the sign bit flipped, so negative values sort first
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedLongSerialiser;

impl Serialiser for OrderedLongSerialiser {
    fn name(&self) -> &'static str {
        "ordered_long"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Long
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Long(v) => Ok(((*v as u64) ^ (1 << 63)).to_be_bytes().to_vec()),
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        let raw = u64::from_be_bytes(fixed::<8>(self.name(), bytes)?);
        Ok(Value::Long((raw ^ (1 << 63)) as i64))
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::Null)
    }

    fn preserves_ordering(&self) -> bool {
        true
    }
}

/// IEEE 754 bits rearranged to sort like `f64::total_cmp`
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedDoubleSerialiser;

impl Serialiser for OrderedDoubleSerialiser {
    fn name(&self) -> &'static str {
        "ordered_double"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Double
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Double(v) => {
                let bits = v.to_bits();
                // negatives: flip everything; positives: flip the sign bit
                let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                Ok(ordered.to_be_bytes().to_vec())
            }
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        let ordered = u64::from_be_bytes(fixed::<8>(self.name(), bytes)?);
        let bits = if ordered >> 63 == 1 { ordered ^ (1 << 63) } else { !ordered };
        Ok(Value::Double(f64::from_bits(bits)))
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::Null)
    }

    fn preserves_ordering(&self) -> bool {
        true
    }
}

/// UTF-8 bytes; byte order equals code point order
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerialiser;

impl Serialiser for StringSerialiser {
    fn name(&self) -> &'static str {
        "string"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::String
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        String::from_utf8(bytes.to_vec())
            .map(Value::String)
            .map_err(|e| CoreError::Serialisation(format!("invalid UTF-8: {}", e)))
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::String(String::new()))
    }

    fn preserves_ordering(&self) -> bool {
        true
    }
}

/// Raw bytes, unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerialiser;

impl Serialiser for BytesSerialiser {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Bytes
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        Ok(Value::Bytes(bytes.to_vec()))
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::Bytes(Vec::new()))
    }

    fn preserves_ordering(&self) -> bool {
        true
    }
}

/// Each member as a 4-byte big-endian length followed by its UTF-8 bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSetSerialiser;

impl Serialiser for StringSetSerialiser {
    fn name(&self) -> &'static str {
        "string_set"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::StringSet
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        let set = match value {
            Value::Null => return Ok(Vec::new()),
            Value::StringSet(set) => set,
            other => return Err(type_mismatch(self, other)),
        };
        let mut out = Vec::new();
        for item in set {
            let len = u32::try_from(item.len()).map_err(|_| {
                CoreError::Serialisation("string set member too long".to_string())
            })?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(item.as_bytes());
        }
        Ok(out)
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        let mut set = BTreeSet::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            if rest.len() < 4 {
                return Err(CoreError::Serialisation(
                    "truncated string set length".to_string(),
                ));
            }
            let (len, tail) = rest.split_at(4);
            let len = u32::from_be_bytes(fixed::<4>(self.name(), len)?) as usize;
            if tail.len() < len {
                return Err(CoreError::Serialisation(
                    "truncated string set member".to_string(),
                ));
            }
            let (item, tail) = tail.split_at(len);
            let item = std::str::from_utf8(item)
                .map_err(|e| CoreError::Serialisation(format!("invalid UTF-8: {}", e)))?;
            set.insert(item.to_string());
            rest = tail;
        }
        Ok(Value::StringSet(set))
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::StringSet(BTreeSet::new()))
    }

    fn preserves_ordering(&self) -> bool {
        false
    }
}

/// Precision byte followed by the registers
#[derive(Debug, Clone, Copy, Default)]
pub struct SketchSerialiser;

impl Serialiser for SketchSerialiser {
    fn name(&self) -> &'static str {
        "sketch"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Sketch
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Sketch(sketch) => {
                let mut out = Vec::with_capacity(1 + sketch.registers().len());
                out.push(sketch.precision());
                out.extend_from_slice(sketch.registers());
                Ok(out)
            }
            other => Err(type_mismatch(self, other)),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        match bytes.split_first() {
            None => self.deserialise_empty(),
            Some((precision, registers)) => {
                HyperLogLog::from_registers(*precision, registers.to_vec()).map(Value::Sketch)
            }
        }
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Err(CoreError::Serialisation(
            "a sketch has no empty representation".to_string(),
        ))
    }

    fn preserves_ordering(&self) -> bool {
        false
    }
}

/// Fallback for any value, as tagged JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerialiser;

impl Serialiser for JsonSerialiser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn handled_type(&self) -> ValueType {
        ValueType::Any
    }

    fn can_handle(&self, _value_type: ValueType) -> bool {
        true
    }

    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError> {
        match value {
            Value::Null => Ok(Vec::new()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError> {
        if bytes.is_empty() {
            return self.deserialise_empty();
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn deserialise_empty(&self) -> Result<Value, CoreError> {
        Ok(Value::Null)
    }

    fn preserves_ordering(&self) -> bool {
        false
    }
}
