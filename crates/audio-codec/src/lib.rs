//! Audio codec: μ-law <-> PCM16 conversion, 8kHz <-> 16/24kHz resampling,
//! and 20ms/160-byte framing for the PBX leg (spec §4.2).

pub mod framer;
pub mod mulaw;
pub mod resample;

pub use framer::{Framer, SAMPLES_PER_FRAME};
pub use mulaw::{decode_frame, encode_frame, linear_to_ulaw, ulaw_to_linear};
pub use resample::{
    downsample_16k_to_8k, downsample_24k_to_8k, resample, upsample_8k_to_16k, upsample_8k_to_24k,
};
