use proptest::prelude::*;

use peerlink_protocol::{encode_frame, read_frame, FrameError};
use peerlink_types::{EncryptMode, Priority};

fn encrypt_mode() -> impl Strategy<Value = EncryptMode> {
    prop_oneof![
        Just(EncryptMode::None),
        Just(EncryptMode::Symmetric),
        Just(EncryptMode::Asymmetric),
    ]
}

fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..512),
        // Highly compressible payloads exercise the compressed path.
        (any::<u8>(), 0usize..4096).prop_map(|(b, n)| vec![b; n]),
    ]
}

proptest! {
    /// Whatever went in comes back out, whether or not compression kicked in.
    #[test]
    fn frame_round_trip(
        data in payload(),
        type_name in "[A-Za-z]{1,24}",
        priority in 0u8..16,
        compress in any::<bool>(),
        encrypt in encrypt_mode(),
    ) {
        let priority = Priority::new(priority);
        let frame = encode_frame(&data, &type_name, priority, compress, encrypt).unwrap();
        let raw = read_frame(&frame).unwrap().unwrap();
        prop_assert_eq!(raw.consumed, frame.len());
        prop_assert_eq!(raw.priority, priority);
        prop_assert_eq!(&raw.envelope.type_name, &type_name);
        prop_assert_eq!(raw.envelope.encrypt, encrypt);
        prop_assert!(compress || !raw.envelope.compress);
        let payload = raw.payload().unwrap();
        prop_assert_eq!(payload.as_ref(), data.as_slice());
    }

    /// A single flipped bit anywhere in the envelope is caught and the skip
    /// covers the whole frame.
    #[test]
    fn envelope_bit_flip_rejected(
        data in prop::collection::vec(any::<u8>(), 0..256),
        bit in any::<prop::sample::Index>(),
    ) {
        let mut frame =
            encode_frame(&data, "Flip", Priority::LOW_0, false, EncryptMode::None).unwrap();
        let envelope_len = frame.len() - 16;
        let bit = bit.index(envelope_len * 8);
        frame[4 + bit / 8] ^= 1 << (bit % 8);
        let err = read_frame(&frame).unwrap_err();
        let is_checksum = matches!(err, FrameError::ChecksumMismatch { .. });
        prop_assert!(is_checksum);
        prop_assert!(err.skip_len().unwrap() >= frame.len());
    }

    /// Every strict prefix of a frame asks for more data.
    #[test]
    fn prefixes_never_decode(data in prop::collection::vec(any::<u8>(), 0..128)) {
        let frame =
            encode_frame(&data, "Prefix", Priority::HIGH_2, false, EncryptMode::None).unwrap();
        for cut in 0..frame.len() {
            prop_assert!(read_frame(&frame[..cut]).unwrap().is_none());
        }
        prop_assert!(read_frame(&frame).unwrap().is_some());
    }
}
