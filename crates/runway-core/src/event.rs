use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Every `type` tag the push source may emit for a [`RunwayEvent`].
pub const EVENT_KINDS: [&str; 10] = [
    "job_started",
    "job_progress",
    "job_finished",
    "job_log",
    "build_started",
    "build_progress",
    "build_finished",
    "esi",
    "queue",
    "jobs",
];

/// Keepalive frame broadcast by the push source. Not part of the event union.
pub const SERVER_HEARTBEAT_KIND: &str = "heartbeat";

/// One observed change in the scheduler, the build pipeline or the upstream API budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunwayEvent {
    JobStarted {
        run_id: String,
        job: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    JobProgress {
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        done: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    JobFinished {
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items_written: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    JobLog {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        level: String,
        message: String,
        #[serde(default, skip_serializing_if = "is_false")]
        polled: bool,
    },
    BuildStarted {
        build_id: String,
        job: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
    BuildProgress {
        build_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    BuildFinished {
        build_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ok: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Esi {
        #[serde(default)]
        remain: Option<i64>,
        #[serde(default)]
        reset: Option<i64>,
    },
    Queue {
        depth: BTreeMap<String, i64>,
    },
    Jobs {
        pending: Vec<PendingJob>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingJob {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub job: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_at: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("frame is not valid json: {0}")]
    Json(String),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown event type '{0}'")]
    UnknownType(String),
    #[error("malformed {kind} event: {reason}")]
    Malformed { kind: String, reason: String },
}

/// What an inbound text frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(RunwayEvent),
    ServerHeartbeat,
}

/// Classifies a push frame. Heartbeats are recognised here so they never reach the buffer.
pub fn classify_frame(text: &str) -> Result<Frame, EventError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| EventError::Json(err.to_string()))?;
    if type_tag(&value)? == SERVER_HEARTBEAT_KIND {
        return Ok(Frame::ServerHeartbeat);
    }
    RunwayEvent::from_value(value).map(Frame::Event)
}

fn type_tag(value: &Value) -> Result<&str, EventError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventError::MissingType)
}

impl RunwayEvent {
    /// Parses and validates one JSON text frame.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| EventError::Json(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let kind = type_tag(&value)?.to_string();
        if !EVENT_KINDS.contains(&kind.as_str()) {
            return Err(EventError::UnknownType(kind));
        }
        let event: RunwayEvent =
            serde_json::from_value(value).map_err(|err| EventError::Malformed {
                kind: kind.clone(),
                reason: err.to_string(),
            })?;
        event.validate()?;
        Ok(event)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunwayEvent::JobStarted { .. } => "job_started",
            RunwayEvent::JobProgress { .. } => "job_progress",
            RunwayEvent::JobFinished { .. } => "job_finished",
            RunwayEvent::JobLog { .. } => "job_log",
            RunwayEvent::BuildStarted { .. } => "build_started",
            RunwayEvent::BuildProgress { .. } => "build_progress",
            RunwayEvent::BuildFinished { .. } => "build_finished",
            RunwayEvent::Esi { .. } => "esi",
            RunwayEvent::Queue { .. } => "queue",
            RunwayEvent::Jobs { .. } => "jobs",
        }
    }

    /// Checks the invariants serde cannot express: non-empty ids and sane progress.
    pub fn validate(&self) -> Result<(), EventError> {
        let malformed = |reason: &str| EventError::Malformed {
            kind: self.kind().to_string(),
            reason: reason.to_string(),
        };
        match self {
            RunwayEvent::JobStarted { run_id, .. } | RunwayEvent::JobFinished { run_id, .. } => {
                require_id(run_id).map_err(|_| malformed("empty runId"))
            }
            RunwayEvent::JobProgress {
                run_id, progress, ..
            } => {
                require_id(run_id).map_err(|_| malformed("empty runId"))?;
                require_progress(*progress).map_err(|_| malformed("invalid progress"))
            }
            RunwayEvent::BuildStarted { build_id, .. }
            | RunwayEvent::BuildFinished { build_id, .. } => {
                require_id(build_id).map_err(|_| malformed("empty buildId"))
            }
            RunwayEvent::BuildProgress {
                build_id, progress, ..
            } => {
                require_id(build_id).map_err(|_| malformed("empty buildId"))?;
                require_progress(*progress).map_err(|_| malformed("invalid progress"))
            }
            RunwayEvent::Jobs { pending } => {
                if pending.iter().any(|job| job.run_id.trim().is_empty()) {
                    return Err(malformed("pending job with empty runId"));
                }
                Ok(())
            }
            RunwayEvent::JobLog { .. } | RunwayEvent::Esi { .. } | RunwayEvent::Queue { .. } => {
                Ok(())
            }
        }
    }
}

fn require_id(id: &str) -> Result<(), ()> {
    if id.trim().is_empty() {
        Err(())
    } else {
        Ok(())
    }
}

fn require_progress(progress: Option<f64>) -> Result<(), ()> {
    match progress {
        Some(value) if !value.is_finite() || value < 0.0 => Err(()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_camel_case_job_fields() {
        let event = RunwayEvent::parse(
            r#"{"type":"job_finished","runId":"run-1","ok":true,"itemsWritten":12,"ms":340,"error":null}"#,
        )
        .expect("parse");
        assert_eq!(
            event,
            RunwayEvent::JobFinished {
                run_id: "run-1".to_string(),
                ok: Some(true),
                items_written: Some(12),
                ms: Some(340),
                error: None,
            }
        );
    }

    #[test]
    fn pending_jobs_keep_snake_case_queued_at() {
        let event = RunwayEvent::parse(
            r#"{"type":"jobs","pending":[{"runId":"run-9","job":"market_sync","queued_at":"2026-10-19T08:00:00Z"}]}"#,
        )
        .expect("parse");
        let RunwayEvent::Jobs { pending } = event else {
            panic!("expected jobs event");
        };
        assert_eq!(pending[0].queued_at.as_deref(), Some("2026-10-19T08:00:00Z"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let event = RunwayEvent::parse(
            r#"{"type":"build_started","buildId":"run-b1","job":"valuation","meta":{"total":4},"host":"worker-2"}"#,
        )
        .expect("parse");
        assert_eq!(event.kind(), "build_started");
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            RunwayEvent::parse("{not json"),
            Err(EventError::Json(_))
        ));
    }

    #[test]
    fn rejects_unknown_and_missing_types() {
        assert_eq!(
            RunwayEvent::parse(r#"{"type":"pipeline_profit_updated"}"#),
            Err(EventError::UnknownType("pipeline_profit_updated".to_string()))
        );
        assert_eq!(
            RunwayEvent::parse(r#"{"runId":"run-1"}"#),
            Err(EventError::MissingType)
        );
        assert_eq!(RunwayEvent::parse(r#"{"type":7}"#), Err(EventError::MissingType));
    }

    #[test]
    fn rejects_missing_required_fields() {
        let err = RunwayEvent::parse(r#"{"type":"job_started","job":"market_sync"}"#)
            .expect_err("runId is required");
        assert!(matches!(err, EventError::Malformed { ref kind, .. } if kind == "job_started"));
        assert!(RunwayEvent::parse(r#"{"type":"queue"}"#).is_err());
    }

    #[test]
    fn rejects_empty_ids_and_negative_progress() {
        assert!(RunwayEvent::parse(r#"{"type":"job_started","runId":" ","job":"x"}"#).is_err());
        assert!(
            RunwayEvent::parse(r#"{"type":"build_progress","buildId":"b","progress":-5}"#)
                .is_err()
        );
        assert!(RunwayEvent::parse(r#"{"type":"job_progress","runId":"r","progress":"half"}"#)
            .is_err());
    }

    #[test]
    fn heartbeat_frames_are_control_frames() {
        assert_eq!(
            classify_frame(r#"{"type":"heartbeat","now":"2026-10-19T08:00:00Z"}"#),
            Ok(Frame::ServerHeartbeat)
        );
        assert!(matches!(
            classify_frame(r#"{"type":"esi","remain":88,"reset":41}"#),
            Ok(Frame::Event(RunwayEvent::Esi { .. }))
        ));
        assert!(classify_frame("ping").is_err());
    }

    #[test]
    fn polled_flag_is_omitted_when_false() {
        let event = RunwayEvent::JobLog {
            run_id: None,
            level: "info".to_string(),
            message: "synced".to_string(),
            polled: false,
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({"type": "job_log", "level": "info", "message": "synced"})
        );
    }
}
