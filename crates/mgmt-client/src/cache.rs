//! In-process TTL cache for Agent Config (spec §3: "Agent Config is
//! shared-immutable: once cached it is not mutated; cache eviction
//! replaces the whole entry.").

use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_types::AgentConfig;
use dashmap::DashMap;

struct CacheEntry {
    config: Arc<AgentConfig>,
    inserted_at: Instant,
}

pub struct AgentCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl AgentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentConfig>> {
        let entry = self.entries.get(agent_id)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.config.clone())
    }

    pub fn insert(&self, agent_id: String, config: AgentConfig) -> Arc<AgentConfig> {
        let config = Arc::new(config);
        self.entries.insert(
            agent_id,
            CacheEntry {
                config: config.clone(),
                inserted_at: Instant::now(),
            },
        );
        config
    }

    /// Drop every entry older than the TTL. Run periodically by the
    /// agent-cache sweeper monitor rather than on every lookup, so a burst
    /// of calls against the same stale agent doesn't all miss at once.
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{AgentConfig, OpenAiRealtimeConfig, ProviderConfig};

    fn sample_agent(agent_id: &str) -> AgentConfig {
        AgentConfig {
            agent_id: agent_id.to_string(),
            name: "Test Agent".into(),
            tenant_id: "tenant-1".into(),
            is_active: true,
            provider: ProviderConfig::OpenaiRealtime(OpenAiRealtimeConfig {
                realtime_url: "wss://example".into(),
                api_key_env: None,
            }),
            instructions: "be helpful".into(),
            greeting: "hi".into(),
            language: "en".into(),
            voice: "alloy".into(),
            model: "gpt-4o-realtime".into(),
            temperature: 0.8,
            max_tokens: 200,
            vad_threshold: 0.5,
            silence_duration_ms: 500,
            functions: Vec::new(),
            knowledge_base_id: None,
        }
    }

    #[test]
    fn fresh_entry_is_returned() {
        let cache = AgentCache::new(Duration::from_secs(60));
        cache.insert("g1".into(), sample_agent("g1"));
        assert!(cache.get("g1").is_some());
    }

    #[test]
    fn expired_entry_misses() {
        let cache = AgentCache::new(Duration::from_millis(1));
        cache.insert("g1".into(), sample_agent("g1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("g1").is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = AgentCache::new(Duration::from_millis(1));
        cache.insert("g1".into(), sample_agent("g1"));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("g2".into(), sample_agent("g2"));
        let removed = cache.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
