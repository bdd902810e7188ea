//! Slices a continuous PCM16 stream into the fixed 20 ms / 160-byte frames
//! the PBX leg requires (spec §4.2, and the framing invariant in §8).
//!
//! The bridge always talks 8 kHz mono on the PBX side, so 20 ms is exactly
//! 160 samples in and 160 μ-law bytes out. Providers hand back audio in
//! arbitrarily sized chunks; `Framer` buffers the remainder between calls
//! so every packet handed to the RTP transport is the same size.

use crate::mulaw::encode_frame;

pub const SAMPLES_PER_FRAME: usize = 160;

/// Accumulates PCM16 samples and emits complete 160-sample (20 ms) μ-law
/// frames as soon as enough audio has arrived. Carries a partial frame
/// across calls rather than padding or dropping it.
#[derive(Debug, Default)]
pub struct Framer {
    pending: Vec<i16>,
}

impl Framer {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Push newly decoded/resampled 8kHz PCM16 samples and drain as many
    /// complete 160-byte μ-law frames as are now available. Any leftover
    /// samples stay buffered for the next call.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::with_capacity(self.pending.len() / SAMPLES_PER_FRAME);
        let mut offset = 0;
        while self.pending.len() - offset >= SAMPLES_PER_FRAME {
            let chunk = &self.pending[offset..offset + SAMPLES_PER_FRAME];
            frames.push(encode_frame(chunk));
            offset += SAMPLES_PER_FRAME;
        }
        self.pending.drain(..offset);

        frames
    }

    /// Number of samples currently buffered but not yet forming a full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
