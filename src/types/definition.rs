//! Object definition types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::{FieldType, Instance, ObjectLayout, Value};
use crate::protocol::MAX_PAYLOAD_LENGTH;
use crate::{Result, UavTalkError};

/// Field type as it appears in a definition record: a numeric code or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawFieldType {
    Code(i64),
    Name(String),
}

impl RawFieldType {
    /// Resolve against the closed set of supported field types.
    pub fn resolve(&self) -> Option<FieldType> {
        match self {
            RawFieldType::Code(code) => FieldType::from_code(*code),
            RawFieldType::Name(name) => FieldType::from_name(name),
        }
    }
}

impl fmt::Display for RawFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFieldType::Code(code) => write!(f, "{code}"),
            RawFieldType::Name(name) => f.write_str(name),
        }
    }
}

impl From<FieldType> for RawFieldType {
    fn from(field_type: FieldType) -> Self {
        RawFieldType::Code(field_type.code().into())
    }
}

fn one() -> u32 {
    1
}

/// Unvalidated field record, as supplied by a definition source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: RawFieldType,
    #[serde(rename = "numElements", default = "one")]
    pub num_elements: u32,
}

impl RawFieldDefinition {
    /// Convenience constructor for a typed field.
    pub fn new(name: impl Into<String>, field_type: FieldType, num_elements: u32) -> Self {
        Self { name: name.into(), field_type: field_type.into(), num_elements }
    }
}

/// Unvalidated object record, as supplied by a definition source.
///
/// Unknown keys in the source document (descriptions, units, options) are
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObjectDefinition {
    pub name: String,
    pub object_id: u32,
    #[serde(default)]
    pub fields: Vec<RawFieldDefinition>,
}

/// Validated description of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// 1 for scalars, >1 for fixed-length arrays
    pub num_elements: usize,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType, num_elements: usize) -> Self {
        Self { name: name.into(), field_type, num_elements }
    }
}

/// Schema for one telemetry object, immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDefinition {
    object_id: u32,
    name: Arc<str>,
    fields: Vec<FieldDescriptor>,
    layout: Arc<ObjectLayout>,
    is_metadata: bool,
}

impl ObjectDefinition {
    /// Build a definition from validated fields, deriving its layout.
    pub fn new(object_id: u32, name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Result<Self> {
        Self::build(object_id, name.into(), fields, false)
    }

    pub(crate) fn build(
        object_id: u32,
        name: String,
        fields: Vec<FieldDescriptor>,
        is_metadata: bool,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.num_elements == 0 {
                return Err(UavTalkError::invalid_definition(
                    &name,
                    format!("field '{}' has zero elements", field.name),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(UavTalkError::invalid_definition(
                    &name,
                    format!("field '{}' is declared twice", field.name),
                ));
            }
        }

        let layout = ObjectLayout::from_fields(&fields);
        if layout.byte_len() > MAX_PAYLOAD_LENGTH {
            return Err(UavTalkError::invalid_definition(
                &name,
                format!(
                    "serialized size {} exceeds the {} byte frame payload",
                    layout.byte_len(),
                    MAX_PAYLOAD_LENGTH
                ),
            ));
        }

        Ok(Self { object_id, name: name.into(), fields, layout: Arc::new(layout), is_metadata })
    }

    /// Validate a raw record: every field type must be supported and every
    /// element count positive.
    pub fn from_raw(raw: &RawObjectDefinition) -> Result<Self> {
        let fields = raw
            .fields
            .iter()
            .map(|field| {
                let field_type = field.field_type.resolve().ok_or_else(|| {
                    UavTalkError::unknown_field_type(
                        &raw.name,
                        &field.name,
                        field.field_type.to_string(),
                    )
                })?;
                Ok(FieldDescriptor::new(&field.name, field_type, field.num_elements as usize))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(raw.object_id, raw.name.clone(), fields)
    }

    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn layout(&self) -> &Arc<ObjectLayout> {
        &self.layout
    }

    /// Whether this definition was synthesized as another object's metadata.
    pub fn is_metadata(&self) -> bool {
        self.is_metadata
    }

    /// Decode a payload into an instance of this object.
    pub fn decode(&self, instance_id: u16, payload: &[u8]) -> Result<Instance> {
        let values = crate::codec::deserialize(&self.layout, payload).map_err(|e| match e {
            UavTalkError::Serialization { details, .. } => {
                UavTalkError::serialization(format!("unpack {}", self.name), details)
            }
            other => other,
        })?;
        Ok(Instance::from_parts(self, instance_id, values))
    }

    /// An instance with every slot zeroed, convenient for building updates.
    pub fn default_instance(&self) -> Instance {
        let values = self.layout.slots().iter().map(|slot| Value::zero(slot.field_type)).collect();
        Instance::from_parts(self, 0, values)
    }
}
