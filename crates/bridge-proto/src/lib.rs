//! Wire-level DTOs: Management API bodies, side-channel payloads, and the
//! three provider protocols. No I/O lives here, only the shapes clients
//! serialize and deserialize.

pub mod composite;
pub mod deepgram;
pub mod mgmt;
pub mod openai_realtime;
pub mod side_channel;
