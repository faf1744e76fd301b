use crate::event::RunwayEvent;
use crate::reducer::{reduce, Snapshot};
use crate::store::SessionStore;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub const EVENT_BUFFER_CAPACITY: usize = 200;
pub const EVENTS_STORE_KEY: &str = "runway_events";

/// Bounded, ordered event window mirrored into a [`SessionStore`].
///
/// The in-memory window is authoritative; persistence is best effort.
pub struct EventBuffer {
    events: VecDeque<RunwayEvent>,
    capacity: usize,
    store: Arc<dyn SessionStore>,
}

impl EventBuffer {
    pub fn init(store: Arc<dyn SessionStore>) -> Self {
        Self::with_capacity(store, EVENT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn SessionStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let events = load_persisted(store.as_ref(), capacity);
        Self {
            events,
            capacity,
            store,
        }
    }

    pub fn append(&mut self, event: RunwayEvent) {
        self.events.push_back(event);
        self.trim();
        self.persist();
    }

    /// Appends a batch with a single persist. Returns how many events were added.
    pub fn extend<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = RunwayEvent>,
    {
        let before = self.events.len();
        self.events.extend(events);
        let added = self.events.len() - before;
        if added > 0 {
            self.trim();
            self.persist();
        }
        added
    }

    pub fn events(&self) -> impl Iterator<Item = &RunwayEvent> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Snapshot {
        reduce(self.events.iter())
    }

    fn trim(&mut self) {
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.events) {
            Ok(encoded) => encoded,
            Err(err) => {
                debug!("runway_buffer_encode_error: {err}");
                return;
            }
        };
        if let Err(err) = self.store.save(EVENTS_STORE_KEY, &encoded) {
            debug!("runway_buffer_persist_error: {err}");
        }
    }
}

fn load_persisted(store: &dyn SessionStore, capacity: usize) -> VecDeque<RunwayEvent> {
    let raw = match store.load(EVENTS_STORE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(err) => {
            warn!("runway_buffer_load_error: {err}");
            return VecDeque::new();
        }
    };
    let mut events: VecDeque<RunwayEvent> = match serde_json::from_str(&raw) {
        Ok(events) => events,
        Err(err) => {
            warn!("runway_buffer_corrupt: {err}");
            return VecDeque::new();
        }
    };
    if let Some(err) = events.iter().find_map(|event| event.validate().err()) {
        warn!("runway_buffer_corrupt: {err}");
        return VecDeque::new();
    }
    while events.len() > capacity {
        events.pop_front();
    }
    events
}
