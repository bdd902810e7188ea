//! Per-invocation context passed to every handler (spec §3: "connection
//! id, session id, caller id, tenant id, asterisk port, kb id").

#[derive(Debug, Clone)]
pub struct CallContext {
    pub connection_id: String,
    pub session_id: String,
    pub caller_id: String,
    pub tenant_id: Option<String>,
    pub asterisk_port: u16,
    pub knowledge_base_id: Option<String>,
}
