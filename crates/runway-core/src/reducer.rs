use crate::event::{PendingJob, RunwayEvent};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const RECENT_JOBS_LIMIT: usize = 10;
pub const RECENT_BUILDS_LIMIT: usize = 5;
pub const DEFAULT_QUEUE_BUCKETS: [&str; 4] = ["P0", "P1", "P2", "P3"];

pub type QueueDepth = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InflightRun {
    pub run_id: String,
    pub job: String,
    pub progress: f64,
    pub detail: Option<String>,
    pub done: Option<u64>,
    pub total: Option<u64>,
    pub meta: Option<Value>,
    pub ok: Option<bool>,
    pub items_written: Option<u64>,
    pub ms: Option<u64>,
    pub error: Option<String>,
    pub finished: bool,
    #[serde(skip)]
    finish_seq: Option<u64>,
}

impl InflightRun {
    fn new(run_id: &str, job: &str, meta: Option<Value>) -> Self {
        Self {
            run_id: run_id.to_string(),
            job: job.to_string(),
            progress: 0.0,
            detail: None,
            done: None,
            total: None,
            meta,
            ok: None,
            items_written: None,
            ms: None,
            error: None,
            finished: false,
            finish_seq: None,
        }
    }

    /// Reported total, falling back to `meta.total` from the start event.
    pub fn total(&self) -> Option<u64> {
        self.total.or_else(|| {
            self.meta
                .as_ref()
                .and_then(|meta| meta.get("total"))
                .and_then(Value::as_u64)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRun {
    pub build_id: String,
    pub job: String,
    pub stage: Option<String>,
    pub progress: f64,
    pub detail: Option<String>,
    pub meta: Option<Value>,
    pub ok: Option<bool>,
    pub rows: Option<u64>,
    pub ms: Option<u64>,
    pub error: Option<String>,
    pub finished: bool,
    #[serde(skip)]
    finish_seq: Option<u64>,
}

impl BuildRun {
    fn new(build_id: &str, job: &str, meta: Option<Value>) -> Self {
        Self {
            build_id: build_id.to_string(),
            job: job.to_string(),
            stage: None,
            progress: 0.0,
            detail: None,
            meta,
            ok: None,
            rows: None,
            ms: None,
            error: None,
            finished: false,
            finish_seq: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EsiBudget {
    pub remain: Option<i64>,
    pub reset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub run_id: Option<String>,
    pub level: String,
    pub message: String,
    pub polled: bool,
}

/// Derived view of everything the event window says about the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub inflight_list: Vec<InflightRun>,
    pub build_inflight: Vec<BuildRun>,
    pub recent_jobs: Vec<InflightRun>,
    pub recent_builds: Vec<BuildRun>,
    pub pending: Vec<PendingJob>,
    pub esi: EsiBudget,
    pub queue: QueueDepth,
    pub logs: Vec<LogEntry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        RunwayState::default().into_snapshot()
    }
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.inflight_list.is_empty()
            && self.build_inflight.is_empty()
            && self.recent_jobs.is_empty()
            && self.recent_builds.is_empty()
            && self.pending.is_empty()
            && self.logs.is_empty()
            && self.esi == EsiBudget::default()
    }
}

/// Entities keyed by id, iterated in first-insertion order.
#[derive(Debug)]
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        let idx = *self.index.get(id)?;
        self.rows.get_mut(idx)
    }

    fn insert(&mut self, id: &str, row: T) {
        self.index.insert(id.to_string(), self.rows.len());
        self.rows.push(row);
    }
}

#[derive(Debug)]
struct RunwayState {
    jobs: Table<InflightRun>,
    builds: Table<BuildRun>,
    pending: Vec<PendingJob>,
    esi: EsiBudget,
    queue: QueueDepth,
    logs: Vec<LogEntry>,
    finish_counter: u64,
}

impl Default for RunwayState {
    fn default() -> Self {
        Self {
            jobs: Table::default(),
            builds: Table::default(),
            pending: Vec::new(),
            esi: EsiBudget::default(),
            queue: DEFAULT_QUEUE_BUCKETS
                .iter()
                .map(|bucket| (bucket.to_string(), 0))
                .collect(),
            logs: Vec::new(),
            finish_counter: 0,
        }
    }
}

fn clamp_progress(progress: Option<f64>) -> f64 {
    progress.unwrap_or(0.0).clamp(0.0, 100.0)
}

impl RunwayState {
    fn next_finish_seq(&mut self) -> u64 {
        self.finish_counter += 1;
        self.finish_counter
    }

    fn apply(&mut self, event: &RunwayEvent) {
        match event {
            RunwayEvent::JobStarted { run_id, job, meta } => match self.jobs.get_mut(run_id) {
                Some(run) => {
                    run.job = job.clone();
                    if meta.is_some() {
                        run.meta = meta.clone();
                    }
                }
                None => self
                    .jobs
                    .insert(run_id, InflightRun::new(run_id, job, meta.clone())),
            },
            RunwayEvent::JobProgress {
                run_id,
                progress,
                detail,
                done,
                total,
            } => {
                let Some(run) = self.jobs.get_mut(run_id) else {
                    return;
                };
                run.progress = clamp_progress(*progress);
                run.detail = detail.clone();
                if done.is_some() {
                    run.done = *done;
                }
                if total.is_some() {
                    run.total = *total;
                }
            }
            RunwayEvent::JobFinished {
                run_id,
                ok,
                items_written,
                ms,
                error,
            } => {
                if !self.jobs.contains(run_id) {
                    return;
                }
                let seq = self.next_finish_seq();
                let Some(run) = self.jobs.get_mut(run_id) else {
                    return;
                };
                merge(&mut run.ok, ok);
                merge(&mut run.items_written, items_written);
                merge(&mut run.ms, ms);
                merge(&mut run.error, error);
                run.finished = true;
                run.finish_seq = Some(seq);
            }
            RunwayEvent::JobLog {
                run_id,
                level,
                message,
                polled,
            } => self.logs.push(LogEntry {
                run_id: run_id.clone(),
                level: level.clone(),
                message: message.clone(),
                polled: *polled,
            }),
            RunwayEvent::BuildStarted {
                build_id,
                job,
                meta,
            } => match self.builds.get_mut(build_id) {
                Some(build) => {
                    build.job = job.clone();
                    if meta.is_some() {
                        build.meta = meta.clone();
                    }
                }
                None => self
                    .builds
                    .insert(build_id, BuildRun::new(build_id, job, meta.clone())),
            },
            RunwayEvent::BuildProgress {
                build_id,
                progress,
                stage,
                detail,
            } => {
                let Some(build) = self.builds.get_mut(build_id) else {
                    return;
                };
                build.progress = clamp_progress(*progress);
                build.stage = stage.clone();
                build.detail = detail.clone();
            }
            RunwayEvent::BuildFinished {
                build_id,
                ok,
                rows,
                ms,
                error,
            } => {
                if !self.builds.contains(build_id) {
                    return;
                }
                let seq = self.next_finish_seq();
                let Some(build) = self.builds.get_mut(build_id) else {
                    return;
                };
                merge(&mut build.ok, ok);
                merge(&mut build.rows, rows);
                merge(&mut build.ms, ms);
                merge(&mut build.error, error);
                build.finished = true;
                build.finish_seq = Some(seq);
            }
            RunwayEvent::Esi { remain, reset } => {
                self.esi = EsiBudget {
                    remain: *remain,
                    reset: *reset,
                };
            }
            RunwayEvent::Queue { depth } => self.queue = depth.clone(),
            RunwayEvent::Jobs { pending } => self.pending = pending.clone(),
        }
    }

    fn into_snapshot(self) -> Snapshot {
        let (inflight_list, recent_jobs) =
            split_finished(self.jobs.rows, RECENT_JOBS_LIMIT, |run| {
                (run.finished, run.finish_seq)
            });
        let (build_inflight, recent_builds) =
            split_finished(self.builds.rows, RECENT_BUILDS_LIMIT, |build| {
                (build.finished, build.finish_seq)
            });
        Snapshot {
            inflight_list,
            build_inflight,
            recent_jobs,
            recent_builds,
            pending: self.pending,
            esi: self.esi,
            queue: self.queue,
            logs: self.logs,
        }
    }
}

fn merge<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *slot = incoming.clone();
    }
}

/// Active rows keep insertion order; finished rows are newest-finished first.
fn split_finished<T>(
    rows: Vec<T>,
    limit: usize,
    status: impl Fn(&T) -> (bool, Option<u64>),
) -> (Vec<T>, Vec<T>) {
    let (mut finished, active): (Vec<T>, Vec<T>) =
        rows.into_iter().partition(|row| status(row).0);
    finished.sort_by_key(|row| std::cmp::Reverse(status(row).1));
    finished.truncate(limit);
    (active, finished)
}

/// Folds an ordered event window into a [`Snapshot`].
pub fn reduce<'a, I>(events: I) -> Snapshot
where
    I: IntoIterator<Item = &'a RunwayEvent>,
{
    events
        .into_iter()
        .fold(RunwayState::default(), |mut state, event| {
            state.apply(event);
            state
        })
        .into_snapshot()
}
