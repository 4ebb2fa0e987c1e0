//! UAVTalk wire framing.
//!
//! ```text
//! [SYNC:1][type|version:1][frame_length:2][object_id:4][instance_id:2] payload:0..255 [crc:1]
//! ```
//!
//! Multi-byte fields are little-endian. `frame_length` counts from the sync
//! byte through the end of the payload; the checksum byte is not included.

mod decoder;
mod frame;

pub use decoder::{ChecksumPolicy, DecoderStats, FrameDecoder};
pub use frame::{Frame, FrameType};

/// Start-of-frame sentinel.
pub const SYNC: u8 = 0x3C;
/// Protocol version tag OR'd into the type byte on encode.
pub const VERSION: u8 = 0x20;
/// Type bits inspected on decode; wide enough for NAK.
pub const TYPE_MASK: u8 = 0x07;

/// sync(1), type(1), length(2), object id(4), instance id(2)
pub const MIN_HEADER_LENGTH: usize = 10;
/// Minimum header plus a 2-byte timestamp unused by single-instance objects.
pub const MAX_HEADER_LENGTH: usize = 12;
pub const MAX_PAYLOAD_LENGTH: usize = 255;
pub const CHECKSUM_LENGTH: usize = 1;
pub const MAX_FRAME_LENGTH: usize = MAX_HEADER_LENGTH + MAX_PAYLOAD_LENGTH + CHECKSUM_LENGTH;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_frames() -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(&Frame::encode(FrameType::Obj, 0xAABBCCDD, 0, &[1, 2, 3, 4]).unwrap());
        wire.extend_from_slice(&Frame::request(0x01020304));
        wire.extend_from_slice(&Frame::encode(FrameType::Ack, 7, 3, &[]).unwrap());
        wire
    }

    #[test]
    fn encode_builds_expected_header() {
        let bytes = Frame::encode(FrameType::Obj, 0x12345678, 0, &[0xAA, 0xBB]).unwrap();
        assert_eq!(&bytes[..10], &[0x3C, 0x20, 0x0C, 0x00, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00]);
        assert_eq!(&bytes[10..12], &[0xAA, 0xBB]);
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[12], crate::crc::checksum(&bytes[..12]));
    }

    #[test]
    fn request_frame_has_empty_payload() {
        let bytes = Frame::request(0x12345678);
        assert_eq!(&bytes[..], &[0x3C, 0x21, 0x0A, 0x00, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x3D]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LENGTH + 1];
        assert!(Frame::encode(FrameType::Obj, 1, 0, &payload).is_err());
        assert!(Frame::new(FrameType::Obj, 1, 0, payload).is_err());
        assert!(Frame::encode(FrameType::Obj, 1, 0, &[0u8; MAX_PAYLOAD_LENGTH]).is_ok());
    }

    #[test]
    fn frame_type_ignores_version_bits() {
        assert_eq!(FrameType::from_byte(0x20), Some(FrameType::Obj));
        assert_eq!(FrameType::from_byte(0x21), Some(FrameType::ObjReq));
        assert_eq!(FrameType::from_byte(0x22), Some(FrameType::ObjAck));
        assert_eq!(FrameType::from_byte(0x23), Some(FrameType::Ack));
        assert_eq!(FrameType::from_byte(0x24), Some(FrameType::Nak));
        assert_eq!(FrameType::from_byte(0x25), None);
        assert_eq!(FrameType::from_byte(0x27), None);
    }

    #[test]
    fn decodes_single_frame() {
        let wire = Frame::encode(FrameType::Obj, 0x1234, 9, &[5, 6, 7]).unwrap();
        let frames = FrameDecoder::new().push(&wire);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.frame_type, FrameType::Obj);
        assert_eq!(frame.object_id, 0x1234);
        assert_eq!(frame.instance_id, 9);
        assert_eq!(&frame.payload[..], &[5, 6, 7]);
        assert!(frame.checksum_valid());
        assert_eq!(frame.to_bytes().unwrap(), wire);
    }

    #[test]
    fn resyncs_after_garbage() {
        let wire = Frame::encode(FrameType::Obj, 0x55, 0, &[9, 9]).unwrap();
        let expected = FrameDecoder::new().push(&wire);

        let mut noisy = vec![0xFF, 0xFF];
        noisy.extend_from_slice(&wire);
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&noisy);
        assert_eq!(frames, expected);
        assert_eq!(decoder.stats().missed_sync, 2);
        assert!(decoder.is_idle());
    }

    #[test]
    fn many_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&sample_frames());
        let types: Vec<_> = frames.iter().map(|f| f.frame_type).collect();
        assert_eq!(types, [FrameType::Obj, FrameType::ObjReq, FrameType::Ack]);
        assert_eq!(frames[2].instance_id, 3);
        assert_eq!(decoder.stats().frames_decoded, 3);
    }

    #[test]
    fn strict_policy_drops_bad_checksum() {
        let mut wire = Frame::encode(FrameType::Obj, 0x10, 0, &[1]).unwrap().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut strict = FrameDecoder::new();
        assert!(strict.push(&wire).is_empty());
        assert_eq!(strict.stats().checksum_errors, 1);

        let mut permissive = FrameDecoder::with_policy(ChecksumPolicy::Permissive);
        let frames = permissive.push(&wire);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].checksum_valid());
    }

    #[test]
    fn short_length_field_reads_no_payload() {
        // Declared length below the minimum header clamps to an empty payload
        let mut header = vec![SYNC, 0x20, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let crc = crate::crc::checksum(&header);
        header.push(crc);
        let frames = FrameDecoder::new().push(&header);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn oversized_length_field_is_clamped() {
        let mut wire = vec![SYNC, 0x20, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        wire.extend(std::iter::repeat_n(0xAB, MAX_PAYLOAD_LENGTH));
        let crc = crate::crc::checksum(&wire);
        wire.push(crc);
        let frames = FrameDecoder::new().push(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.len(), MAX_PAYLOAD_LENGTH);
    }

    #[test]
    fn unknown_type_is_dropped_without_losing_sync() {
        let mut bad = vec![SYNC, 0x26, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let crc = crate::crc::checksum(&bad);
        bad.push(crc);
        bad.extend_from_slice(&Frame::request(2));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&bad);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].object_id, 2);
        assert_eq!(decoder.stats().unknown_types, 1);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let wire = Frame::encode(FrameType::Obj, 0x10, 0, &[1, 2, 3]).unwrap();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&wire[..6]).is_empty());
        assert!(!decoder.is_idle());
        decoder.reset();
        assert_eq!(decoder.push(&wire).len(), 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&[]).is_empty());
        assert!(decoder.is_idle());
    }

    proptest! {
        #[test]
        fn prop_chunking_is_idempotent(
            frames in prop::collection::vec(
                (any::<u32>(), any::<u16>(), prop::collection::vec(any::<u8>(), 0..40)),
                1..5,
            ),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let mut wire = Vec::new();
            for (object_id, instance_id, payload) in &frames {
                wire.extend_from_slice(&Frame::encode(FrameType::Obj, *object_id, *instance_id, payload).unwrap());
            }

            let whole = FrameDecoder::new().push(&wire);
            prop_assert_eq!(whole.len(), frames.len());

            let mut byte_at_a_time = FrameDecoder::new();
            let mut singles = Vec::new();
            for byte in &wire {
                singles.extend(byte_at_a_time.push(std::slice::from_ref(byte)));
            }
            prop_assert_eq!(&singles, &whole);

            let mut points: Vec<usize> = cuts.iter().map(|cut| cut.index(wire.len() + 1)).collect();
            points.sort_unstable();
            let mut chunked = FrameDecoder::new();
            let mut pieces = Vec::new();
            let mut start = 0;
            for point in points.into_iter().chain(std::iter::once(wire.len())) {
                pieces.extend(chunked.push(&wire[start..point]));
                start = point;
            }
            prop_assert_eq!(&pieces, &whole);
        }

        #[test]
        fn prop_garbage_prefix_without_sync_is_skipped(
            garbage in prop::collection::vec(any::<u8>().prop_filter("no sync", |b| *b != SYNC), 0..50),
            object_id in any::<u32>(),
            payload in prop::collection::vec(any::<u8>(), 0..20),
        ) {
            let wire = Frame::encode(FrameType::Obj, object_id, 0, &payload).unwrap();
            let mut noisy = garbage.clone();
            noisy.extend_from_slice(&wire);
            let mut decoder = FrameDecoder::new();
            let frames = decoder.push(&noisy);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0].payload[..], &payload[..]);
            prop_assert_eq!(decoder.stats().missed_sync, garbage.len() as u64);
        }
    }
}
