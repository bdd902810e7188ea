use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form `custom_data` published by the PBX dialplan, serialized as a
/// flat string-keyed map (spec §3: "a string-keyed mapping serialized as
/// text").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData(pub HashMap<String, String>);

impl CustomData {
    /// Render as `k: v` lines for the system-prompt composition (spec
    /// §4.4, step 2).
    pub fn as_prompt_block(&self) -> String {
        let mut lines: Vec<_> = self.0.iter().collect();
        lines.sort_by(|a, b| a.0.cmp(b.0));
        lines
            .into_iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Call metadata read from the side-channel store, keyed by the endpoint's
/// port. Absence of this record means the call cannot start (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub session_id: String,
    pub agent_id: String,
    pub caller_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub custom_data: Option<CustomData>,
}
