//! Client for the external key-value + pub/sub store holding per-call
//! metadata. Talks to `redis::aio::ConnectionManager` with plain
//! `SET EX` / `EXPIRE` / `DEL` commands, plus `HGETALL` for the metadata
//! hash and `PUBLISH` for the two notification channels.

use std::collections::HashMap;

use bridge_proto::side_channel::{fields, metadata_key, transfer_channel, READY_CHANNEL};
use bridge_types::{CallMetadata, CustomData};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SideChannelError {
    #[error("side-channel connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("side-channel serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct SideChannelClient {
    conn: ConnectionManager,
}

impl SideChannelClient {
    pub async fn connect(url: &str) -> Result<Self, SideChannelError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_tokio_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Read the metadata hash for `port`. Returns `None` if the hash is
    /// absent or missing a required field; the caller treats this as
    /// "release the endpoint silently" (spec §3, Call Metadata invariant).
    pub async fn get_call_metadata(
        &self,
        port: u16,
    ) -> Result<Option<CallMetadata>, SideChannelError> {
        let key = metadata_key(port);
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&key).await?;
        if raw.is_empty() {
            return Ok(None);
        }

        let (Some(session_id), Some(agent_id), Some(caller_id)) = (
            raw.get(fields::SESSION_ID).cloned(),
            raw.get(fields::AGENT_ID).cloned(),
            raw.get(fields::CALLER_ID).cloned(),
        ) else {
            tracing::warn!(port, "call metadata hash missing a required field");
            return Ok(None);
        };

        let custom_data = raw
            .get(fields::CUSTOM_DATA)
            .and_then(|raw| serde_json::from_str::<HashMap<String, String>>(raw).ok())
            .map(CustomData);

        Ok(Some(CallMetadata {
            session_id,
            agent_id,
            caller_id,
            tenant_id: raw.get(fields::TENANT_ID).cloned(),
            caller_name: raw.get(fields::CALLER_NAME).cloned(),
            custom_data,
        }))
    }

    /// Whether the PBX has set the mutable `hangup` flag on this entry
    /// (spec §4.10, polled by the hangup monitor).
    pub async fn is_hangup(&self, port: u16) -> Result<bool, SideChannelError> {
        let key = metadata_key(port);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(&key, fields::HANGUP).await?;
        Ok(value.as_deref() == Some("true"))
    }

    /// Remove the entry on teardown (spec §6.2 lifecycle).
    pub async fn delete(&self, port: u16) -> Result<(), SideChannelError> {
        let key = metadata_key(port);
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(&key).await?;
        Ok(())
    }

    pub async fn publish_ready(&self, session_id: &str) -> Result<(), SideChannelError> {
        #[derive(Serialize)]
        struct ReadyPayload<'a> {
            session_id: &'a str,
        }
        self.publish(READY_CHANNEL, &ReadyPayload { session_id }).await
    }

    pub async fn publish_transfer(
        &self,
        port: u16,
        session_id: &str,
        queue_name: &str,
        reason: Option<&str>,
    ) -> Result<(), SideChannelError> {
        #[derive(Serialize)]
        struct TransferPayload<'a> {
            session_id: &'a str,
            queue_name: &'a str,
            reason: Option<&'a str>,
        }
        let channel = transfer_channel(port);
        self.publish(
            &channel,
            &TransferPayload {
                session_id,
                queue_name,
                reason,
            },
        )
        .await
    }

    async fn publish<T: Serialize>(&self, channel: &str, payload: &T) -> Result<(), SideChannelError> {
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_human_readable() {
        let err = SideChannelError::Serialization(
            serde_json::from_str::<HashMap<String, String>>("not json").unwrap_err(),
        );
        assert!(err.to_string().contains("serialization"));
    }
}
