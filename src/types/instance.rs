//! Decoded object instances with by-name field access.

use std::sync::Arc;

use super::{ObjectDefinition, ObjectLayout, Value};
use crate::{Result, UavTalkError};

/// One value of an object, shaped by its definition's layout.
///
/// Values are stored positionally; names resolve through the shared layout, so
/// an instance can never grow or lose fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    object_id: u32,
    instance_id: u16,
    name: Arc<str>,
    values: Vec<Value>,
    layout: Arc<ObjectLayout>,
}

impl Instance {
    pub(crate) fn from_parts(
        definition: &ObjectDefinition,
        instance_id: u16,
        values: Vec<Value>,
    ) -> Self {
        Self {
            object_id: definition.object_id(),
            instance_id,
            name: definition.shared_name(),
            values,
            layout: Arc::clone(definition.layout()),
        }
    }

    /// Build an instance from positional values, coercing each into its slot.
    pub fn new(definition: &ObjectDefinition, instance_id: u16, values: Vec<Value>) -> Result<Self> {
        let layout = definition.layout();
        if values.len() != layout.slot_count() {
            return Err(UavTalkError::serialization(
                format!("build {}", definition.name()),
                format!("expected {} values, got {}", layout.slot_count(), values.len()),
            ));
        }
        let values = values
            .iter()
            .zip(layout.slots())
            .map(|(value, slot)| {
                value.coerce(slot.field_type).ok_or_else(|| {
                    UavTalkError::serialization(
                        format!("build {}", definition.name()),
                        format!("{value} does not fit {} slot '{}'", slot.field_type, slot.name),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_parts(definition, instance_id, values))
    }

    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    pub fn set_instance_id(&mut self, instance_id: u16) {
        self.instance_id = instance_id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    /// Positional values in layout order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Look up a slot by name (`Roll`, `Gyro[1]`).
    pub fn get(&self, slot: &str) -> Option<Value> {
        let index = self.layout.index_of(slot)?;
        self.values.get(index).copied()
    }

    /// All elements of a field, scalar fields yielding a single element.
    pub fn field(&self, field: &str) -> Option<&[Value]> {
        let range = self.layout.field_range(field)?;
        self.values.get(range)
    }

    /// Overwrite a slot, converting the value into the slot's type.
    pub fn set(&mut self, slot: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let index = self.layout.index_of(slot).ok_or_else(|| {
            UavTalkError::serialization(format!("set {}.{}", self.name, slot), "no such slot")
        })?;
        let field_type = self.layout.slots()[index].field_type;
        let coerced = value.coerce(field_type).ok_or_else(|| {
            UavTalkError::serialization(
                format!("set {}.{}", self.name, slot),
                format!("{value} does not fit {field_type}"),
            )
        })?;
        self.values[index] = coerced;
        Ok(())
    }

    /// Serialize the instance to its payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        crate::codec::serialize(&self.layout, &self.values)
    }
}
