//! Metadata shadow objects and their packed access/update flags.
//!
//! Every user-defined object gets a synthesized companion at `object_id + 1`
//! named `<name>.Metadata`, carrying how and how often the object is sent.

use serde::{Deserialize, Serialize};

use super::{FieldDescriptor, FieldType, Instance, ObjectDefinition, Value};
use crate::{Result, UavTalkError};

/// Suffix appended to the parent name.
pub const METADATA_SUFFIX: &str = ".Metadata";

pub const FLAGS_FIELD: &str = "flags";
pub const TELEMETRY_UPDATE_PERIOD_FIELD: &str = "telemetryUpdatePeriod";
pub const GCS_TELEMETRY_UPDATE_PERIOD_FIELD: &str = "gcsTelemetryUpdatePeriod";
pub const LOGGING_UPDATE_PERIOD_FIELD: &str = "loggingUpdatePeriod";

const ACCESS_SHIFT: u16 = 0;
const GCS_ACCESS_SHIFT: u16 = 1;
const TELEMETRY_ACKED_SHIFT: u16 = 2;
const GCS_TELEMETRY_ACKED_SHIFT: u16 = 3;
const TELEMETRY_UPDATE_MODE_SHIFT: u16 = 4;
const GCS_TELEMETRY_UPDATE_MODE_SHIFT: u16 = 6;
const LOGGING_UPDATE_MODE_SHIFT: u16 = 8;

const BIT_MASK: u16 = 0x1;
const UPDATE_MODE_MASK: u16 = 0x3;

/// Who may write an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// How an object is scheduled for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateMode {
    Manual,
    Periodic,
    OnChange,
    Throttled,
}

impl UpdateMode {
    fn from_bits(bits: u16) -> Self {
        match bits & UPDATE_MODE_MASK {
            0 => UpdateMode::Manual,
            1 => UpdateMode::Periodic,
            2 => UpdateMode::OnChange,
            _ => UpdateMode::Throttled,
        }
    }

    fn bits(self) -> u16 {
        match self {
            UpdateMode::Manual => 0,
            UpdateMode::Periodic => 1,
            UpdateMode::OnChange => 2,
            UpdateMode::Throttled => 3,
        }
    }
}

/// Packed metadata flags (bit 0 = LSB).
///
/// | bits | meaning |
/// |------|---------|
/// | 0    | flight access (1 = read-only) |
/// | 1    | GCS access (1 = read-only) |
/// | 2    | telemetry acked |
/// | 3    | GCS telemetry acked |
/// | 4-5  | telemetry update mode |
/// | 6-7  | GCS telemetry update mode |
/// | 8-9  | logging update mode |
///
/// Setters are read-modify-write and leave every other bit untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataFlags(pub u16);

impl MetadataFlags {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw u16 value.
    pub fn value(&self) -> u16 {
        self.0
    }

    fn get(&self, shift: u16, mask: u16) -> u16 {
        (self.0 >> shift) & mask
    }

    fn put(&mut self, shift: u16, mask: u16, value: u16) {
        self.0 = (self.0 & !(mask << shift)) | ((value & mask) << shift);
    }

    fn access(&self, shift: u16) -> AccessMode {
        if self.get(shift, BIT_MASK) == 0 { AccessMode::ReadWrite } else { AccessMode::ReadOnly }
    }

    fn put_access(&mut self, shift: u16, mode: AccessMode) {
        self.put(shift, BIT_MASK, u16::from(mode == AccessMode::ReadOnly));
    }

    pub fn flight_access(&self) -> AccessMode {
        self.access(ACCESS_SHIFT)
    }

    pub fn set_flight_access(&mut self, mode: AccessMode) {
        self.put_access(ACCESS_SHIFT, mode);
    }

    pub fn gcs_access(&self) -> AccessMode {
        self.access(GCS_ACCESS_SHIFT)
    }

    pub fn set_gcs_access(&mut self, mode: AccessMode) {
        self.put_access(GCS_ACCESS_SHIFT, mode);
    }

    pub fn telemetry_acked(&self) -> bool {
        self.get(TELEMETRY_ACKED_SHIFT, BIT_MASK) != 0
    }

    pub fn set_telemetry_acked(&mut self, acked: bool) {
        self.put(TELEMETRY_ACKED_SHIFT, BIT_MASK, u16::from(acked));
    }

    pub fn gcs_telemetry_acked(&self) -> bool {
        self.get(GCS_TELEMETRY_ACKED_SHIFT, BIT_MASK) != 0
    }

    pub fn set_gcs_telemetry_acked(&mut self, acked: bool) {
        self.put(GCS_TELEMETRY_ACKED_SHIFT, BIT_MASK, u16::from(acked));
    }

    pub fn telemetry_update_mode(&self) -> UpdateMode {
        UpdateMode::from_bits(self.get(TELEMETRY_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK))
    }

    pub fn set_telemetry_update_mode(&mut self, mode: UpdateMode) {
        self.put(TELEMETRY_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK, mode.bits());
    }

    pub fn gcs_telemetry_update_mode(&self) -> UpdateMode {
        UpdateMode::from_bits(self.get(GCS_TELEMETRY_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK))
    }

    pub fn set_gcs_telemetry_update_mode(&mut self, mode: UpdateMode) {
        self.put(GCS_TELEMETRY_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK, mode.bits());
    }

    pub fn logging_update_mode(&self) -> UpdateMode {
        UpdateMode::from_bits(self.get(LOGGING_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK))
    }

    pub fn set_logging_update_mode(&mut self, mode: UpdateMode) {
        self.put(LOGGING_UPDATE_MODE_SHIFT, UPDATE_MODE_MASK, mode.bits());
    }
}

impl ObjectDefinition {
    /// Synthesize the metadata companion of this definition.
    pub fn metadata_for(&self) -> Result<ObjectDefinition> {
        let object_id = self.object_id().checked_add(1).ok_or_else(|| {
            UavTalkError::invalid_definition(self.name(), "no object id left for its metadata")
        })?;
        let fields = [
            FLAGS_FIELD,
            TELEMETRY_UPDATE_PERIOD_FIELD,
            GCS_TELEMETRY_UPDATE_PERIOD_FIELD,
            LOGGING_UPDATE_PERIOD_FIELD,
        ]
        .into_iter()
        .map(|name| FieldDescriptor::new(name, FieldType::UInt16, 1))
        .collect();

        ObjectDefinition::build(object_id, format!("{}{}", self.name(), METADATA_SUFFIX), fields, true)
    }
}

/// Typed view of a metadata instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub flags: MetadataFlags,
    /// Milliseconds
    pub telemetry_update_period: u16,
    /// Milliseconds
    pub gcs_telemetry_update_period: u16,
    /// Milliseconds
    pub logging_update_period: u16,
}

impl Metadata {
    /// Read the four metadata fields from an instance.
    pub fn from_instance(instance: &Instance) -> Result<Self> {
        let read = |field: &str| -> Result<u16> {
            match instance.get(field) {
                Some(Value::UInt16(v)) => Ok(v),
                _ => Err(UavTalkError::serialization(
                    format!("metadata view of {}", instance.name()),
                    format!("missing uint16 field '{field}'"),
                )),
            }
        };
        Ok(Self {
            flags: MetadataFlags(read(FLAGS_FIELD)?),
            telemetry_update_period: read(TELEMETRY_UPDATE_PERIOD_FIELD)?,
            gcs_telemetry_update_period: read(GCS_TELEMETRY_UPDATE_PERIOD_FIELD)?,
            logging_update_period: read(LOGGING_UPDATE_PERIOD_FIELD)?,
        })
    }

    /// Build an instance of `definition` (a metadata definition) from this view.
    pub fn to_instance(&self, definition: &ObjectDefinition) -> Result<Instance> {
        let mut instance = definition.default_instance();
        instance.set(FLAGS_FIELD, self.flags.value())?;
        instance.set(TELEMETRY_UPDATE_PERIOD_FIELD, self.telemetry_update_period)?;
        instance.set(GCS_TELEMETRY_UPDATE_PERIOD_FIELD, self.gcs_telemetry_update_period)?;
        instance.set(LOGGING_UPDATE_PERIOD_FIELD, self.logging_update_period)?;
        Ok(instance)
    }
}
