//! Polymorphic Provider Session contract (spec §4.3) and its three wire
//! implementations (spec §4.4): Realtime-WS, Deepgram voice-agent, and a
//! composite STT+LLM+TTS pipeline that presents the same interface.

pub mod composite;
pub mod deepgram;
pub mod error;
pub mod event;
pub mod openai_realtime;
pub mod session;
pub mod state;

pub use composite::{CompositeConfig, CompositeSession};
pub use deepgram::{DeepgramConfig, DeepgramSession};
pub use error::ProviderError;
pub use event::{CostMetricDelta, ProviderEvent, Speaker};
pub use openai_realtime::{RealtimeWsConfig, RealtimeWsSession};
pub use session::{AudioFormat, ProviderSession};
pub use state::SessionState;
