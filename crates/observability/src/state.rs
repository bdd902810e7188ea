//! In-memory projection of the event stream, used to answer the REST
//! snapshot endpoints without reaching back into `ConnectionManager`.
//! The monitor server only ever sees what it's told; it never queries the
//! PBX or connection map directly.

use std::collections::HashMap;
use std::sync::Mutex;

use bridge_types::CostBreakdown;
use bridge_core::ObservabilityEvent;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub connection_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub caller_id: String,
    pub cost: CostBreakdown,
    pub last_transcript: Option<String>,
}

#[derive(Default)]
pub struct Store {
    connections: Mutex<HashMap<String, ConnectionSnapshot>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &ObservabilityEvent) {
        let mut connections = self.connections.lock().unwrap();
        match event {
            ObservabilityEvent::ConnectionAdded { connection_id, session_id, agent_id, caller_id } => {
                connections.insert(
                    connection_id.clone(),
                    ConnectionSnapshot {
                        connection_id: connection_id.clone(),
                        session_id: session_id.clone(),
                        agent_id: agent_id.clone(),
                        caller_id: caller_id.clone(),
                        cost: CostBreakdown::default(),
                        last_transcript: None,
                    },
                );
            }
            ObservabilityEvent::ConnectionRemoved { connection_id } => {
                connections.remove(connection_id);
            }
            ObservabilityEvent::CostUpdate { connection_id, cost }
            | ObservabilityEvent::ConnectionUpdated { connection_id, cost } => {
                if let Some(snapshot) = connections.get_mut(connection_id) {
                    snapshot.cost = *cost;
                }
            }
            ObservabilityEvent::Transcript { connection_id, text, is_final, .. } => {
                if *is_final {
                    if let Some(snapshot) = connections.get_mut(connection_id) {
                        snapshot.last_transcript = Some(text.clone());
                    }
                }
            }
            ObservabilityEvent::FunctionCall { .. } | ObservabilityEvent::FunctionResponse { .. } => {}
        }
    }

    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.connections.lock().unwrap().values().cloned().collect()
    }

    pub fn stats(&self) -> Stats {
        let connections = self.connections.lock().unwrap();
        let active_calls = connections.len();
        let total_final_cost_usd: f64 = connections.values().map(|c| c.cost.final_cost_usd).sum();
        Stats { active_calls, total_final_cost_usd }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_calls: usize,
    pub total_final_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(connection_id: &str) -> ObservabilityEvent {
        ObservabilityEvent::ConnectionAdded {
            connection_id: connection_id.into(),
            session_id: "sess-1".into(),
            agent_id: "agent-1".into(),
            caller_id: "+15551234567".into(),
        }
    }

    #[test]
    fn removed_connection_drops_out_of_snapshot_and_stats() {
        let store = Store::new();
        store.apply(&added("conn-1"));
        store.apply(&ObservabilityEvent::CostUpdate {
            connection_id: "conn-1".into(),
            cost: CostBreakdown { base_cost_usd: 1.0, profit_amount_usd: 0.2, final_cost_usd: 1.2 },
        });
        assert_eq!(store.stats().active_calls, 1);
        assert!((store.stats().total_final_cost_usd - 1.2).abs() < f64::EPSILON);

        store.apply(&ObservabilityEvent::ConnectionRemoved { connection_id: "conn-1".into() });
        assert_eq!(store.snapshot().len(), 0);
        assert_eq!(store.stats().active_calls, 0);
    }

    #[test]
    fn only_final_transcripts_are_retained() {
        let store = Store::new();
        store.apply(&added("conn-2"));
        store.apply(&ObservabilityEvent::Transcript {
            connection_id: "conn-2".into(),
            speaker: provider_session::Speaker::Caller,
            text: "partial".into(),
            is_final: false,
        });
        assert_eq!(store.snapshot()[0].last_transcript, None);

        store.apply(&ObservabilityEvent::Transcript {
            connection_id: "conn-2".into(),
            speaker: provider_session::Speaker::Caller,
            text: "final text".into(),
            is_final: true,
        });
        assert_eq!(store.snapshot()[0].last_transcript.as_deref(), Some("final text"));
    }
}
