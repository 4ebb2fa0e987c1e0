//! Frame types and encoding.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{CHECKSUM_LENGTH, MAX_PAYLOAD_LENGTH, MIN_HEADER_LENGTH, SYNC, TYPE_MASK, VERSION};
use crate::crc::Crc8;
use crate::{Result, UavTalkError};

/// Message type carried in the low bits of the type/version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    /// Object data, no acknowledgement requested
    Obj,
    /// Request for an object; empty payload
    ObjReq,
    /// Object data with acknowledgement requested
    ObjAck,
    /// Acknowledgement
    Ack,
    /// Negative acknowledgement (decode only)
    Nak,
}

impl FrameType {
    /// Resolve the type from a raw type/version byte, ignoring version bits.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte & TYPE_MASK {
            0 => Some(FrameType::Obj),
            1 => Some(FrameType::ObjReq),
            2 => Some(FrameType::ObjAck),
            3 => Some(FrameType::Ack),
            4 => Some(FrameType::Nak),
            _ => None,
        }
    }

    /// Type bits as written on the wire.
    pub const fn bits(&self) -> u8 {
        match self {
            FrameType::Obj => 0,
            FrameType::ObjReq => 1,
            FrameType::ObjAck => 2,
            FrameType::Ack => 3,
            FrameType::Nak => 4,
        }
    }
}

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub object_id: u32,
    /// Carried through untouched
    pub instance_id: u16,
    pub payload: Bytes,
    /// Trailer byte as received
    pub checksum: u8,
}

impl Frame {
    /// Build a frame, computing its checksum.
    pub fn new(frame_type: FrameType, object_id: u32, instance_id: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        check_payload_len(object_id, payload.len())?;
        let checksum = compute_checksum(&header_bytes(frame_type, object_id, instance_id, payload.len()), &payload);
        Ok(Self { frame_type, object_id, instance_id, payload, checksum })
    }

    /// Assemble a frame from received parts, keeping the received trailer.
    pub(crate) fn from_wire(
        frame_type: FrameType,
        object_id: u32,
        instance_id: u16,
        payload: Bytes,
        checksum: u8,
    ) -> Self {
        Self { frame_type, object_id, instance_id, payload, checksum }
    }

    /// Encode a frame straight to wire bytes.
    ///
    /// ```rust
    /// use uavtalk::protocol::{Frame, FrameType};
    ///
    /// let bytes = Frame::encode(FrameType::Obj, 0x12345678, 0, &[]).unwrap();
    /// assert_eq!(&bytes[..], &[0x3C, 0x20, 0x0A, 0x00, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x44]);
    /// ```
    pub fn encode(frame_type: FrameType, object_id: u32, instance_id: u16, payload: &[u8]) -> Result<Bytes> {
        check_payload_len(object_id, payload.len())?;

        let header = header_bytes(frame_type, object_id, instance_id, payload.len());
        let mut crc = Crc8::new();
        crc.add_slice(&header);
        crc.add_slice(payload);

        let mut out = BytesMut::with_capacity(MIN_HEADER_LENGTH + payload.len() + CHECKSUM_LENGTH);
        out.put_slice(&header);
        out.put_slice(payload);
        out.put_u8(crc.value());
        Ok(out.freeze())
    }

    /// Encode an object request: OBJ_REQ with an empty payload.
    pub fn request(object_id: u32) -> Bytes {
        let header = header_bytes(FrameType::ObjReq, object_id, 0, 0);
        let mut out = BytesMut::with_capacity(MIN_HEADER_LENGTH + CHECKSUM_LENGTH);
        out.put_slice(&header);
        out.put_u8(compute_checksum(&header, &[]));
        out.freeze()
    }

    /// Re-encode this frame, with the checksum recomputed.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Self::encode(self.frame_type, self.object_id, self.instance_id, &self.payload)
    }

    /// Checksum the canonical encoding of this frame should carry.
    pub fn expected_checksum(&self) -> u8 {
        let header = header_bytes(self.frame_type, self.object_id, self.instance_id, self.payload.len());
        compute_checksum(&header, &self.payload)
    }

    /// Whether the trailer matches the checksum of the canonical encoding.
    ///
    /// Frames with a non-standard version nibble or a length field that
    /// disagrees with the payload are validated by the decoder against the
    /// bytes actually received instead.
    pub fn checksum_valid(&self) -> bool {
        self.checksum == self.expected_checksum()
    }
}

fn check_payload_len(object_id: u32, len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_LENGTH {
        return Err(UavTalkError::serialization(
            format!("frame for object {object_id:#010x}"),
            format!("payload of {len} bytes exceeds {MAX_PAYLOAD_LENGTH}"),
        ));
    }
    Ok(())
}

fn header_bytes(frame_type: FrameType, object_id: u32, instance_id: u16, payload_len: usize) -> [u8; MIN_HEADER_LENGTH] {
    // Payload length is bounded by MAX_PAYLOAD_LENGTH on every path that reaches here
    let frame_length = (MIN_HEADER_LENGTH + payload_len) as u16;
    let mut header = [0u8; MIN_HEADER_LENGTH];
    header[0] = SYNC;
    header[1] = frame_type.bits() | VERSION;
    header[2..4].copy_from_slice(&frame_length.to_le_bytes());
    header[4..8].copy_from_slice(&object_id.to_le_bytes());
    header[8..10].copy_from_slice(&instance_id.to_le_bytes());
    header
}

fn compute_checksum(header: &[u8], payload: &[u8]) -> u8 {
    let mut crc = Crc8::new();
    crc.add_slice(header);
    crc.add_slice(payload);
    crc.value()
}
