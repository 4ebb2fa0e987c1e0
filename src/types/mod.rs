//! Core types for UAVObject representation.
//!
//! This module provides the data model shared by the codec, the object table
//! and the manager:
//! - [`FieldType`] is the closed set of primitive field types with their widths
//! - [`RawObjectDefinition`] is an unvalidated record from a definition source
//! - [`ObjectDefinition`] is a validated, immutable schema with its derived
//!   [`ObjectLayout`]
//! - [`Instance`] is a fixed-shape decoded value with by-name slot access
//! - [`MetadataFlags`] and [`Metadata`] describe synthesized metadata objects
//!
//! ## Usage Example
//!
//! ```rust
//! use uavtalk::types::{FieldType, ObjectDefinition, RawFieldDefinition, RawObjectDefinition, Value};
//!
//! let raw = RawObjectDefinition {
//!     name: "AttitudeActual".into(),
//!     object_id: 0x33DAD5E6,
//!     fields: vec![
//!         RawFieldDefinition::new("Roll", FieldType::Float32, 1),
//!         RawFieldDefinition::new("Gyro", FieldType::Int16, 3),
//!     ],
//! };
//! let definition = ObjectDefinition::from_raw(&raw).unwrap();
//! assert_eq!(definition.layout().byte_len(), 10);
//!
//! let mut instance = definition.default_instance();
//! instance.set("Gyro[1]", -5i16).unwrap();
//! assert_eq!(instance.get("Gyro[1]"), Some(Value::Int16(-5)));
//! ```

mod definition;
mod field_type;
mod instance;
mod layout;
pub mod metadata;

// Re-export all public types
pub use definition::{
    FieldDescriptor, ObjectDefinition, RawFieldDefinition, RawFieldType, RawObjectDefinition,
};
pub use field_type::{FieldType, Value};
pub use instance::Instance;
pub use layout::{ObjectLayout, Slot};
pub use metadata::{AccessMode, METADATA_SUFFIX, Metadata, MetadataFlags, UpdateMode};
