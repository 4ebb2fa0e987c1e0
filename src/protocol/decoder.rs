//! Resumable stream decoder.
//!
//! Bytes arrive from the transport in arbitrary chunks. The decoder keeps its
//! position between calls in an explicit state machine:
//! - `SeekingSync`: discard bytes until the sync byte
//! - `ReadingHeader`: accumulate the 10-byte minimum header
//! - `ReadingPayload`: accumulate the payload announced by the header
//! - `ReadingChecksum`: take the trailer byte and emit the frame
//!
//! # Example
//!
//! ```rust
//! use uavtalk::protocol::{Frame, FrameDecoder, FrameType};
//!
//! let wire = Frame::encode(FrameType::Obj, 0x10, 0, &[1, 2, 3]).unwrap();
//! let mut decoder = FrameDecoder::new();
//!
//! // Split anywhere; the decoder picks up where it left off
//! assert!(decoder.push(&wire[..4]).is_empty());
//! let frames = decoder.push(&wire[4..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0].payload[..], &[1, 2, 3]);
//! ```

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{Frame, FrameType, MAX_HEADER_LENGTH, MAX_PAYLOAD_LENGTH, MIN_HEADER_LENGTH, SYNC};
use crate::UavTalkError;
use crate::crc::Crc8;

/// What to do with frames whose trailer does not match their contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// Recompute and drop mismatching frames
    #[default]
    Strict,
    /// Accept every frame; the received trailer is passed through
    Permissive,
}

/// Counters describing what the decoder has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    /// Bytes discarded while looking for a sync byte
    pub missed_sync: u64,
    pub checksum_errors: u64,
    /// Frames dropped for an unassigned type code
    pub unknown_types: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingSync,
    ReadingHeader,
    ReadingPayload,
    ReadingChecksum,
}

/// Header fields parsed once the minimum header is complete.
#[derive(Debug, Clone, Copy)]
struct Header {
    type_byte: u8,
    object_id: u32,
    instance_id: u16,
}

/// One decoder per physical stream; not meant to be shared between streams.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    header_buf: [u8; MAX_HEADER_LENGTH],
    header_len: usize,
    header: Option<Header>,
    payload: BytesMut,
    payload_remaining: usize,
    policy: ChecksumPolicy,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder that validates checksums.
    pub fn new() -> Self {
        Self::with_policy(ChecksumPolicy::default())
    }

    pub fn with_policy(policy: ChecksumPolicy) -> Self {
        Self {
            state: State::SeekingSync,
            header_buf: [0; MAX_HEADER_LENGTH],
            header_len: 0,
            header: None,
            payload: BytesMut::with_capacity(MAX_PAYLOAD_LENGTH),
            payload_remaining: 0,
            policy,
            stats: DecoderStats::default(),
        }
    }

    pub fn policy(&self) -> ChecksumPolicy {
        self.policy
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Whether the decoder sits between frames.
    pub fn is_idle(&self) -> bool {
        self.state == State::SeekingSync
    }

    /// Drop any partially assembled frame and resume sync scanning.
    pub fn reset(&mut self) {
        self.state = State::SeekingSync;
        self.header_len = 0;
        self.header = None;
        self.payload.clear();
        self.payload_remaining = 0;
    }

    /// Feed a chunk and collect every frame it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.decode(data, |frame| frames.push(frame));
        frames
    }

    /// Consume the whole chunk, calling `on_frame` for each completed frame.
    pub fn decode<F>(&mut self, data: &[u8], mut on_frame: F)
    where
        F: FnMut(Frame),
    {
        let len = data.len();
        let mut index = 0;

        while index < len {
            match self.state {
                State::SeekingSync => {
                    let byte = data[index];
                    index += 1;
                    if byte == SYNC {
                        self.header_buf[0] = SYNC;
                        self.header_len = 1;
                        self.state = State::ReadingHeader;
                    } else {
                        self.stats.missed_sync += 1;
                        debug!("Missed sync: discarded {:#04x}", byte);
                    }
                }
                State::ReadingHeader => {
                    let take = (len - index).min(MIN_HEADER_LENGTH - self.header_len);
                    self.header_buf[self.header_len..self.header_len + take]
                        .copy_from_slice(&data[index..index + take]);
                    self.header_len += take;
                    index += take;
                    if self.header_len == MIN_HEADER_LENGTH {
                        self.parse_header();
                    }
                }
                State::ReadingPayload => {
                    let take = (len - index).min(self.payload_remaining);
                    self.payload.extend_from_slice(&data[index..index + take]);
                    self.payload_remaining -= take;
                    index += take;
                    if self.payload_remaining == 0 {
                        self.state = State::ReadingChecksum;
                    }
                }
                State::ReadingChecksum => {
                    let checksum = data[index];
                    index += 1;
                    self.finish(checksum, &mut on_frame);
                }
            }
            assert!(index <= len, "decoder read past end of input ({index} > {len})");
        }
    }

    fn parse_header(&mut self) {
        let buf = &self.header_buf;
        let frame_length = u16::from_le_bytes([buf[2], buf[3]]);
        let header = Header {
            type_byte: buf[1],
            object_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            instance_id: u16::from_le_bytes([buf[8], buf[9]]),
        };

        let payload_len = usize::from(frame_length)
            .saturating_sub(MIN_HEADER_LENGTH)
            .min(MAX_PAYLOAD_LENGTH);
        trace!(
            "Header complete: object {:#010x}, frame length {}, payload {} bytes",
            header.object_id, frame_length, payload_len
        );

        self.header = Some(header);
        self.payload.clear();
        self.payload_remaining = payload_len;
        self.state = if payload_len == 0 { State::ReadingChecksum } else { State::ReadingPayload };
    }

    fn finish<F>(&mut self, checksum: u8, on_frame: &mut F)
    where
        F: FnMut(Frame),
    {
        let header = self.header.take();
        let payload = self.payload.split().freeze();
        let mut crc = Crc8::new();
        crc.add_slice(&self.header_buf[..MIN_HEADER_LENGTH]);
        crc.add_slice(&payload);

        self.header_len = 0;
        self.state = State::SeekingSync;

        let Some(header) = header else {
            return;
        };

        let Some(frame_type) = FrameType::from_byte(header.type_byte) else {
            self.stats.unknown_types += 1;
            let error = UavTalkError::malformed_frame(format!(
                "object {:#010x} has unknown type byte {:#04x}",
                header.object_id, header.type_byte
            ));
            warn!("Dropping frame: {}", error);
            return;
        };

        if crc.value() != checksum {
            match self.policy {
                ChecksumPolicy::Strict => {
                    self.stats.checksum_errors += 1;
                    let error = UavTalkError::ChecksumMismatch {
                        object_id: header.object_id,
                        expected: crc.value(),
                        actual: checksum,
                    };
                    warn!("Dropping frame: {}", error);
                    return;
                }
                ChecksumPolicy::Permissive => {
                    trace!("Accepting frame for object {:#010x} with bad checksum", header.object_id);
                }
            }
        }

        self.stats.frames_decoded += 1;
        on_frame(Frame::from_wire(frame_type, header.object_id, header.instance_id, payload, checksum));
    }
}
