use crate::monitor::MonitorView;
use runway_core::{BuildRun, InflightRun};

pub const SUMMARY_WIDTH: usize = 160;

/// One status line per published view, for plain-text output.
pub fn summary_line(view: &MonitorView, max: usize) -> String {
    let snapshot = &view.snapshot;
    let mut fields = vec![
        if view.live { "live" } else { "polling" }.to_string(),
        format!("buf={}", view.buffered),
        format!("jobs={}", snapshot.inflight_list.len()),
        format!("builds={}", snapshot.build_inflight.len()),
        format!("pending={}", snapshot.pending.len()),
    ];
    let queue = snapshot
        .queue
        .iter()
        .map(|(bucket, depth)| format!("{bucket}:{depth}"))
        .collect::<Vec<_>>()
        .join(",");
    fields.push(format!("queue={queue}"));
    if let Some(remain) = snapshot.esi.remain {
        fields.push(format!("esi={remain}"));
    }
    if let Some(run) = snapshot.inflight_list.first() {
        fields.push(job_field(run));
    }
    if let Some(build) = snapshot.build_inflight.first() {
        fields.push(build_field(build));
    }
    if let Some(log) = snapshot.logs.last() {
        fields.push(format!("{}: {}", log.level, log.message));
    }
    fit_fields(&fields, max)
}

fn job_field(run: &InflightRun) -> String {
    match (run.done, run.total()) {
        (Some(done), Some(total)) => {
            format!("{} {:.0}% {done}/{total}", run.job, run.progress)
        }
        _ => format!("{} {:.0}%", run.job, run.progress),
    }
}

fn build_field(build: &BuildRun) -> String {
    match build.stage.as_deref() {
        Some(stage) => format!("{} [{stage}] {:.0}%", build.job, build.progress),
        None => format!("{} {:.0}%", build.job, build.progress),
    }
}

fn fit_fields(fields: &[String], max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut output = String::new();
    for field in fields {
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() > max {
            if output.is_empty() {
                return ellipsize(field, max);
            }
            break;
        }
        output = candidate;
    }
    output
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::{reduce, RunwayEvent};
    use serde_json::json;

    fn view(live: bool, events: &[serde_json::Value]) -> MonitorView {
        let events: Vec<RunwayEvent> = events
            .iter()
            .map(|value| RunwayEvent::from_value(value.clone()).expect("event"))
            .collect();
        MonitorView {
            live,
            snapshot: reduce(&events),
            last_server_heartbeat: None,
            buffered: events.len(),
        }
    }

    #[test]
    fn summary_shows_mode_counts_and_current_job() {
        let view = view(
            true,
            &[
                json!({"type": "job_started", "runId": "r1", "job": "market_orders"}),
                json!({"type": "job_progress", "runId": "r1", "progress": 42.4, "done": 4, "total": 10}),
                json!({"type": "queue", "depth": {"P0": 3}}),
            ],
        );
        let line = summary_line(&view, SUMMARY_WIDTH);
        assert!(line.starts_with("live | buf=3 | jobs=1"), "{line}");
        assert!(line.contains("| queue=P0:3 |"), "{line}");
        assert!(line.contains("market_orders 42% 4/10"), "{line}");
    }

    #[test]
    fn summary_drops_trailing_fields_that_do_not_fit() {
        let view = view(false, &[]);
        let line = summary_line(&view, 24);
        assert_eq!(line, "polling | buf=0 | jobs=0");
    }

    #[test]
    fn queue_buckets_start_at_zero() {
        let line = summary_line(&view(false, &[]), SUMMARY_WIDTH);
        assert!(line.contains("queue=P0:0,P1:0,P2:0,P3:0"), "{line}");
    }

    #[test]
    fn ellipsize_keeps_width() {
        assert_eq!(ellipsize("abcdef", 5), "ab...");
        assert_eq!(ellipsize("abc", 5), "abc");
        assert_eq!(ellipsize("abcdef", 2), "..");
        assert_eq!(fit_fields(&["abcdefgh".to_string()], 6), "abc...");
    }
}
