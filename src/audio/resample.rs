//! Rational-factor polyphase resampling between rates that are all
//! multiples of 1 kHz (8 kHz narrowband, 16/24 kHz speech-API rates).

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

/// Resample a mono `f64` sample buffer from `from_rate` to `to_rate`.
/// Passthrough (a cheap clone) when the rates already match.
pub fn resample(samples: &[f64], from_rate: u32, to_rate: u32) -> Vec<f64> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, samples.len(), 1)
        .expect("valid resample ratio");

    let waves_in = vec![samples.to_vec()];
    let mut waves_out = resampler
        .process(&waves_in, None)
        .expect("resample input frame");
    waves_out.remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(resample(&samples, 8000, 8000), samples);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample(&[], 8000, 16000).is_empty());
    }

    #[test]
    fn upsampling_roughly_doubles_length() {
        let samples = vec![0.0f64; 800];
        let out = resample(&samples, 8000, 16000);
        assert!((out.len() as i64 - 1600).abs() <= 4);
    }
}
