//! Integer up/down resampling between the PBX's 8 kHz leg and the
//! providers' 16 kHz / 24 kHz PCM16 legs (spec §4.2).
//!
//! A simple polyphase-style linear-interpolation resampler: good enough
//! for voice-band audio and avoids pulling in a DSP crate the rest of the
//! workspace has no other use for.

/// Resample a mono PCM16 buffer from `from_hz` to `to_hz`. Ratios outside
/// the bridge's fixed set (8k<->16k, 8k<->24k) still work but are not the
/// path exercised by the bridge.
pub fn resample(samples: &[i16], from_hz: u32, to_hz: u32) -> Vec<i16> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_hz as f64 / from_hz as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;

        let s0 = samples[idx.min(samples.len() - 1)] as f64;
        let s1 = samples[(idx + 1).min(samples.len() - 1)] as f64;
        let interpolated = s0 + (s1 - s0) * frac;
        out.push(interpolated.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    out
}

pub fn upsample_8k_to_16k(samples: &[i16]) -> Vec<i16> {
    resample(samples, 8_000, 16_000)
}

pub fn downsample_16k_to_8k(samples: &[i16]) -> Vec<i16> {
    resample(samples, 16_000, 8_000)
}

pub fn upsample_8k_to_24k(samples: &[i16]) -> Vec<i16> {
    resample(samples, 8_000, 24_000)
}

pub fn downsample_24k_to_8k(samples: &[i16]) -> Vec<i16> {
    resample(samples, 24_000, 8_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsampling_doubles_length() {
        let samples = vec![0i16; 160];
        let up = upsample_8k_to_16k(&samples);
        assert_eq!(up.len(), 320);
    }

    #[test]
    fn downsampling_16k_halves_length() {
        let samples = vec![0i16; 320];
        let down = downsample_16k_to_8k(&samples);
        assert_eq!(down.len(), 160);
    }

    #[test]
    fn downsampling_24k_to_8k_thirds_length() {
        let samples = vec![0i16; 480];
        let down = downsample_24k_to_8k(&samples);
        assert_eq!(down.len(), 160);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(resample(&samples, 8_000, 8_000), samples);
    }

    #[test]
    fn constant_signal_resamples_to_constant() {
        let samples = vec![1000i16; 160];
        let up = upsample_8k_to_16k(&samples);
        assert!(up.iter().all(|&s| (s - 1000).abs() <= 1));
    }
}
