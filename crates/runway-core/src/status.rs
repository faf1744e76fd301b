use crate::event::RunwayEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the scheduler's point-in-time `GET /status` response.
///
/// Only `logs` feeds the event buffer; the other sections belong to unrelated
/// dashboard widgets and are carried through untyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub inflight: Vec<Value>,
    #[serde(default)]
    pub last_runs: Vec<Value>,
    #[serde(default)]
    pub esi: Value,
    #[serde(default)]
    pub queue: Value,
    #[serde(default)]
    pub counts: Value,
    #[serde(default)]
    pub logs: Vec<PolledLog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolledLog {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, rename = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl PolledLog {
    pub fn into_event(self) -> RunwayEvent {
        RunwayEvent::JobLog {
            run_id: self.run_id,
            level: self
                .level
                .filter(|level| !level.is_empty())
                .unwrap_or_else(|| "info".to_string()),
            message: self.message.unwrap_or_default(),
            polled: true,
        }
    }
}

impl StatusSnapshot {
    /// The log rows as `job_log` events tagged `polled`, in response order.
    pub fn polled_events(self) -> Vec<RunwayEvent> {
        self.logs.into_iter().map(PolledLog::into_event).collect()
    }
}
