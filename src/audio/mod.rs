//! Audio transcoding: narrowband (8 kHz mu-law) ↔ wideband (16-bit PCM)
//! conversion, frame chunking, and codec-silence generation.

pub mod mulaw;
pub mod resample;

use thiserror::Error;

/// Frame duration the orchestrator chunks all outbound audio to.
pub const FRAME_MS: u32 = 20;
/// Narrowband sample rate (telephony).
pub const NARROWBAND_RATE: u32 = 8000;

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("PCM buffer length {0} is not a multiple of 2 bytes")]
    UnalignedPcmBuffer(usize),
}

/// Convert narrowband mu-law audio to 16-bit signed PCM at `target_rate`.
///
/// Output length is `input_samples * target_rate / 8000 * 2` bytes (±1
/// sample from resampling), per the transcoder's documented guarantee.
pub fn mulaw_to_pcm16(mulaw_data: &[u8], target_rate: u32) -> Vec<u8> {
    let pcm_8khz = mulaw::decode(mulaw_data);
    if target_rate == NARROWBAND_RATE {
        return pcm_8khz;
    }
    let floats: Vec<f64> = pcm_8khz
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
        .collect();
    let resampled = resample::resample(&floats, NARROWBAND_RATE, target_rate);
    let mut out = Vec::with_capacity(resampled.len() * 2);
    for sample in resampled {
        let clamped = sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        out.extend_from_slice(&clamped.to_le_bytes());
    }
    out
}

/// Convert 16-bit signed PCM at `input_rate` to narrowband mu-law (8 kHz).
///
/// Round-trip guarantee: narrowband → PCM → narrowband at matched rates
/// preserves every decoded sample value exactly (companding is the only
/// precision loss).
pub fn pcm16_to_mulaw(pcm_data: &[u8], input_rate: u32) -> Result<Vec<u8>, TranscoderError> {
    if pcm_data.len() % 2 != 0 {
        return Err(TranscoderError::UnalignedPcmBuffer(pcm_data.len()));
    }

    let pcm_8khz = if input_rate != NARROWBAND_RATE {
        let floats: Vec<f64> = pcm_data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
            .collect();
        let resampled = resample::resample(&floats, input_rate, NARROWBAND_RATE);
        let mut out = Vec::with_capacity(resampled.len() * 2);
        for sample in resampled {
            let clamped = sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            out.extend_from_slice(&clamped.to_le_bytes());
        }
        out
    } else {
        pcm_data.to_vec()
    };

    Ok(mulaw::encode(&pcm_8khz))
}

/// Split `audio` into fixed-duration chunks. The final short chunk is padded
/// with codec-silence to the chunk boundary.
pub fn chunk_audio(audio: &[u8], chunk_ms: u32, sample_rate: u32, sample_width: usize) -> Vec<Vec<u8>> {
    let bytes_per_chunk = (sample_rate as usize * sample_width * chunk_ms as usize) / 1000;
    if bytes_per_chunk == 0 || audio.is_empty() {
        return Vec::new();
    }

    let silence_byte = if sample_width == 1 { mulaw::SILENCE_BYTE } else { 0x00 };
    let mut chunks = Vec::with_capacity(audio.len().div_ceil(bytes_per_chunk));

    for start in (0..audio.len()).step_by(bytes_per_chunk) {
        let end = (start + bytes_per_chunk).min(audio.len());
        let mut chunk = audio[start..end].to_vec();
        if chunk.len() < bytes_per_chunk {
            chunk.resize(bytes_per_chunk, silence_byte);
        }
        chunks.push(chunk);
    }
    chunks
}

/// Produce `duration_ms` worth of mu-law codec-silence at `sample_rate`.
pub fn generate_silence_mulaw(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
    let num_samples = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    vec![mulaw::SILENCE_BYTE; num_samples]
}

/// Bytes in one narrowband frame of `FRAME_MS` duration.
pub fn narrowband_frame_len() -> usize {
    (NARROWBAND_RATE as usize * FRAME_MS as usize) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowband_frame_is_160_bytes() {
        assert_eq!(narrowband_frame_len(), 160);
    }

    #[test]
    fn mulaw_to_pcm16_passthrough_doubles_length() {
        let mulaw = vec![mulaw::SILENCE_BYTE; 160];
        let pcm = mulaw_to_pcm16(&mulaw, NARROWBAND_RATE);
        assert_eq!(pcm.len(), 320);
    }

    #[test]
    fn round_trip_matched_rate_preserves_samples() {
        let mulaw: Vec<u8> = (0u8..=255).collect();
        let pcm = mulaw_to_pcm16(&mulaw, NARROWBAND_RATE);
        let back = pcm16_to_mulaw(&pcm, NARROWBAND_RATE).unwrap();
        for (original, round_tripped) in mulaw.iter().zip(back.iter()) {
            assert_eq!(
                mulaw::decode_sample(*original),
                mulaw::decode_sample(*round_tripped)
            );
        }
    }

    #[test]
    fn chunker_pads_final_short_chunk_with_silence() {
        let audio = vec![0x01u8; 250];
        let chunks = chunk_audio(&audio, 20, NARROWBAND_RATE, 1);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 160);
        assert_eq!(chunks[1].len(), 160);
        assert_eq!(chunks[1][90], mulaw::SILENCE_BYTE);
    }

    #[test]
    fn chunker_on_empty_input_produces_no_chunks() {
        assert!(chunk_audio(&[], 20, NARROWBAND_RATE, 1).is_empty());
    }

    #[test]
    fn zero_duration_silence_is_empty() {
        assert!(generate_silence_mulaw(0, NARROWBAND_RATE).is_empty());
    }

    #[test]
    fn silence_generator_produces_expected_byte_count() {
        assert_eq!(generate_silence_mulaw(20, NARROWBAND_RATE).len(), 160);
    }
}
