//! G.711 mu-law companding: the narrowband telephony codec.
//!
//! Standard CCITT mu-law encode/decode, bias 0x84, 8 quantization segments.
//! `0xFF` decodes to zero amplitude and is the codec's silence byte.

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;
const SEGMENT_END: [i16; 8] = [0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF, 0x3FFF, 0x7FFF];

/// Codec-silence byte for a 1-byte-per-sample (narrowband) stream.
pub const SILENCE_BYTE: u8 = 0xFF;

fn segment_for(sample: i16) -> i16 {
    SEGMENT_END
        .iter()
        .position(|&end| sample <= end)
        .unwrap_or(SEGMENT_END.len() - 1) as i16
}

/// Encode one linear PCM16 sample to a mu-law byte.
pub fn encode_sample(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80u8 } else { 0x00u8 };
    let magnitude = (sample as i32).unsigned_abs().min(CLIP as u32) as i16;
    let biased = magnitude + BIAS;
    let exponent = segment_for(biased);
    let mantissa = ((biased >> (exponent + 3)) & 0x0F) as u8;
    !(sign | ((exponent as u8) << 4) | mantissa)
}

/// Decode one mu-law byte to a linear PCM16 sample.
pub fn decode_sample(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i16;
    let mantissa = (inverted & 0x0F) as i16;
    let magnitude = ((mantissa << 3) + BIAS) << exponent;
    let sample = magnitude - BIAS;
    if sign != 0 { -sample } else { sample }
}

/// Decode a mu-law byte stream to interleaved little-endian PCM16 bytes.
pub fn decode(mulaw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(mulaw.len() * 2);
    for &b in mulaw {
        out.extend_from_slice(&decode_sample(b).to_le_bytes());
    }
    out
}

/// Encode little-endian PCM16 bytes to a mu-law byte stream.
pub fn encode(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(2)
        .map(|c| encode_sample(i16::from_le_bytes([c[0], c[1]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_byte_decodes_to_zero() {
        assert_eq!(decode_sample(SILENCE_BYTE), 0);
    }

    #[test]
    fn zero_sample_encodes_to_silence_byte() {
        assert_eq!(encode_sample(0), SILENCE_BYTE);
    }

    #[test]
    fn round_trip_preserves_decoded_value() {
        for raw in [0u8, 1, 0x7F, 0x80, 0xAA, 0xFE, 0xFF] {
            let decoded = decode_sample(raw);
            let re_encoded = encode_sample(decoded);
            assert_eq!(
                decode_sample(re_encoded),
                decoded,
                "round-trip mismatch for byte {raw:#x}"
            );
        }
    }

    #[test]
    fn decode_buffer_doubles_length() {
        let mulaw = vec![SILENCE_BYTE; 160];
        assert_eq!(decode(&mulaw).len(), 320);
    }
}
