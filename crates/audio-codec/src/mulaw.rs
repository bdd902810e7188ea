//! G.711 μ-law <-> linear PCM16 conversion (spec §4.2, §6.1).
//!
//! Standard ITU-T G.711 μ-law companding, implemented directly rather than
//! via a lookup table crate. This is the one place in the bridge where a
//! hand-rolled numeric routine is the idiomatic choice: the tables are
//! small and fixed, with no ecosystem crate worth pulling in for them.

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;

/// Encode one linear PCM16 sample to μ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80u8 } else { 0x00u8 };
    let magnitude = if sample == i16::MIN {
        i16::MAX
    } else {
        sample.abs()
    };
    let clamped = magnitude.min(CLIP) + BIAS;

    let exponent = exponent_for(clamped);
    let mantissa = ((clamped >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

fn exponent_for(sample: i16) -> u8 {
    let mut mask = 0x4000u32;
    let mut exponent = 7u8;
    while exponent > 0 {
        if sample as u32 & mask != 0 {
            break;
        }
        mask >>= 1;
        exponent -= 1;
    }
    exponent
}

/// Decode one μ-law byte to linear PCM16.
pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let ulaw = !ulaw;
    let sign = ulaw & 0x80;
    let exponent = (ulaw >> 4) & 0x07;
    let mantissa = ulaw & 0x0F;
    let mut sample = ((mantissa as i16) << 3) + BIAS;
    sample <<= exponent;
    sample -= BIAS;
    if sign != 0 {
        -sample
    } else {
        sample
    }
}

pub fn encode_frame(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().copied().map(linear_to_ulaw).collect()
}

pub fn decode_frame(ulaw: &[u8]) -> Vec<i16> {
    ulaw.iter().copied().map(ulaw_to_linear).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_roundtrips() {
        let encoded = linear_to_ulaw(0);
        let decoded = ulaw_to_linear(encoded);
        assert!(decoded.abs() < 10);
    }

    #[test]
    fn roundtrip_is_within_quantization_error() {
        for sample in [-30000i16, -1000, -1, 0, 1, 1000, 30000] {
            let encoded = linear_to_ulaw(sample);
            let decoded = ulaw_to_linear(encoded);
            // mu-law is lossy; the standard guarantees small relative error,
            // not bit-exact recovery.
            let err = (sample as i32 - decoded as i32).abs();
            assert!(
                err < 1200,
                "sample {sample} decoded to {decoded}, err {err}"
            );
        }
    }

    #[test]
    fn frame_roundtrip_preserves_length() {
        let pcm: Vec<i16> = (0..160).map(|i| (i * 100) as i16).collect();
        let encoded = encode_frame(&pcm);
        assert_eq!(encoded.len(), 160);
        let decoded = decode_frame(&encoded);
        assert_eq!(decoded.len(), 160);
    }

    #[test]
    fn double_encode_is_idempotent_on_the_wire_bytes() {
        let pcm: Vec<i16> = (0..160).map(|i| (i * 37 - 2000) as i16).collect();
        let first = encode_frame(&pcm);
        let decoded = decode_frame(&first);
        let second = encode_frame(&decoded);
        assert_eq!(first, second);
    }

    proptest::proptest! {
        #[test]
        fn any_sample_roundtrips_within_quantization_error(sample: i16) {
            let encoded = linear_to_ulaw(sample);
            let decoded = ulaw_to_linear(encoded);
            let err = (sample as i32 - decoded as i32).abs();
            proptest::prop_assert!(err < 1200, "sample {} decoded to {}, err {}", sample, decoded, err);
        }

        #[test]
        fn encode_frame_is_idempotent_on_the_wire_bytes(pcm in proptest::collection::vec(proptest::num::i16::ANY, 1..200)) {
            let first = encode_frame(&pcm);
            let decoded = decode_frame(&first);
            let second = encode_frame(&decoded);
            proptest::prop_assert_eq!(first, second);
        }
    }
}
