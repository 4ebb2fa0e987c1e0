//! Binary layout derived from an object's field list

use std::collections::HashMap;
use std::ops::Range;

use super::{FieldDescriptor, FieldType};

/// One positional, independently addressed slot of a serialized object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Slot name; array elements carry an index suffix (`Gyro[2]`)
    pub name: String,
    /// Primitive type stored in the slot
    pub field_type: FieldType,
    /// Byte offset within the serialized payload
    pub offset: usize,
}

/// Fixed binary layout of an object, computed once at load time.
///
/// Mirrors the field list in order, with every array field expanded into
/// `num_elements` slots of the same primitive type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLayout {
    slots: Vec<Slot>,
    byte_len: usize,
    /// Slot name to slot index
    slot_index: HashMap<String, usize>,
    /// Field name to the slot range holding its elements
    field_ranges: HashMap<String, Range<usize>>,
}

impl ObjectLayout {
    /// Derive the layout for an ordered field list.
    pub fn from_fields(fields: &[FieldDescriptor]) -> Self {
        let mut slots = Vec::new();
        let mut field_ranges = HashMap::with_capacity(fields.len());
        let mut offset = 0;

        for field in fields {
            let start = slots.len();
            for element in 0..field.num_elements {
                let name = if field.num_elements > 1 {
                    format!("{}[{}]", field.name, element)
                } else {
                    field.name.clone()
                };
                slots.push(Slot { name, field_type: field.field_type, offset });
                offset += field.field_type.size();
            }
            field_ranges.insert(field.name.clone(), start..slots.len());
        }

        let slot_index =
            slots.iter().enumerate().map(|(index, slot)| (slot.name.clone(), index)).collect();

        Self { slots, byte_len: offset, slot_index, field_ranges }
    }

    /// Ordered slots.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of positional slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Total serialized width in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Slot index for a slot name (`Roll`, `Gyro[1]`).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.slot_index.get(name).copied()
    }

    /// Slot range covering every element of a field.
    pub fn field_range(&self, field: &str) -> Option<Range<usize>> {
        self.field_ranges.get(field).cloned()
    }
}
