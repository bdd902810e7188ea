//! Single UDP socket demultiplexed by source endpoint, with RTP framing
//! and client-appeared/audio/client-gone lifecycle events (spec §4.1).

pub mod rtp;
pub mod transport;

pub use transport::{RtpTransport, TransportEvent, DEFAULT_INACTIVITY};
