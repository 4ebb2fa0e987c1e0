//! Field type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive types a UAVObject field can carry.
/// Codes match the numeric `type` used by the object definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 8-bit signed integer (code 0)
    Int8,
    /// 16-bit signed integer (code 1)
    Int16,
    /// 32-bit signed integer (code 2)
    Int32,
    /// 8-bit unsigned integer (code 3)
    UInt8,
    /// 16-bit unsigned integer (code 4)
    UInt16,
    /// 32-bit unsigned integer (code 5)
    UInt32,
    /// IEEE-754 single precision float (code 6)
    Float32,
    /// Enumeration stored as one unsigned byte (code 7)
    Enum8,
}

impl FieldType {
    /// All field types in code order.
    pub const ALL: [FieldType; 8] = [
        FieldType::Int8,
        FieldType::Int16,
        FieldType::Int32,
        FieldType::UInt8,
        FieldType::UInt16,
        FieldType::UInt32,
        FieldType::Float32,
        FieldType::Enum8,
    ];

    /// Returns the serialized width in bytes.
    pub const fn size(&self) -> usize {
        match self {
            FieldType::Int8 | FieldType::UInt8 | FieldType::Enum8 => 1,
            FieldType::Int16 | FieldType::UInt16 => 2,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => 4,
        }
    }

    /// Numeric code used in definition files.
    pub const fn code(&self) -> u8 {
        match self {
            FieldType::Int8 => 0,
            FieldType::Int16 => 1,
            FieldType::Int32 => 2,
            FieldType::UInt8 => 3,
            FieldType::UInt16 => 4,
            FieldType::UInt32 => 5,
            FieldType::Float32 => 6,
            FieldType::Enum8 => 7,
        }
    }

    /// Resolve a numeric definition-file code.
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code).ok().and_then(|index| Self::ALL.get(index).copied())
    }

    /// Resolve a textual type name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "int8" => Some(FieldType::Int8),
            "int16" => Some(FieldType::Int16),
            "int32" => Some(FieldType::Int32),
            "uint8" => Some(FieldType::UInt8),
            "uint16" => Some(FieldType::UInt16),
            "uint32" => Some(FieldType::UInt32),
            "float" | "float32" => Some(FieldType::Float32),
            "enum" | "enum8" => Some(FieldType::Enum8),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::Float32 => "float32",
            FieldType::Enum8 => "enum8",
        };
        f.write_str(name)
    }
}

/// Runtime value of a single field slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Float32(f32),
    Enum8(u8),
}

impl Value {
    /// The field type this value naturally occupies.
    pub const fn field_type(&self) -> FieldType {
        match self {
            Value::Int8(_) => FieldType::Int8,
            Value::Int16(_) => FieldType::Int16,
            Value::Int32(_) => FieldType::Int32,
            Value::UInt8(_) => FieldType::UInt8,
            Value::UInt16(_) => FieldType::UInt16,
            Value::UInt32(_) => FieldType::UInt32,
            Value::Float32(_) => FieldType::Float32,
            Value::Enum8(_) => FieldType::Enum8,
        }
    }

    /// Zero value of the given type.
    pub const fn zero(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Int8 => Value::Int8(0),
            FieldType::Int16 => Value::Int16(0),
            FieldType::Int32 => Value::Int32(0),
            FieldType::UInt8 => Value::UInt8(0),
            FieldType::UInt16 => Value::UInt16(0),
            FieldType::UInt32 => Value::UInt32(0),
            FieldType::Float32 => Value::Float32(0.0),
            FieldType::Enum8 => Value::Enum8(0),
        }
    }

    /// Integer view of the value; `None` for floats.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::UInt8(v) | Value::Enum8(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::Float32(_) => None,
        }
    }

    /// Floating point view of the value.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Float32(v) => v.into(),
            other => other.as_i64().unwrap_or_default() as f64,
        }
    }

    /// Convert the value into a slot of `target` type.
    ///
    /// Integers convert when they fit the target range and widen to floats
    /// when the float holds them exactly; floats never narrow to integers.
    /// Returns `None` when the value cannot be represented in the target width.
    pub fn coerce(&self, target: FieldType) -> Option<Value> {
        if self.field_type() == target {
            return Some(*self);
        }
        if target == FieldType::Float32 {
            let v = self.as_i64()?;
            let widened = v as f32;
            // Above 2^24 not every integer has an exact f32
            return (widened as i64 == v).then_some(Value::Float32(widened));
        }
        let v = self.as_i64()?;
        match target {
            FieldType::Int8 => i8::try_from(v).ok().map(Value::Int8),
            FieldType::Int16 => i16::try_from(v).ok().map(Value::Int16),
            FieldType::Int32 => i32::try_from(v).ok().map(Value::Int32),
            FieldType::UInt8 => u8::try_from(v).ok().map(Value::UInt8),
            FieldType::UInt16 => u16::try_from(v).ok().map(Value::UInt16),
            FieldType::UInt32 => u32::try_from(v).ok().map(Value::UInt32),
            FieldType::Enum8 => u8::try_from(v).ok().map(Value::Enum8),
            FieldType::Float32 => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float32(v) => write!(f, "{v}"),
            other => write!(f, "{}", other.as_i64().unwrap_or_default()),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_value_from! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    f32 => Float32,
}
