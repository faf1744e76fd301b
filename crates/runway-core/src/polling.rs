/// What the driver should do with the poll timer after a liveness change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    FetchNowAndStartTicker,
    StopTicker,
    Nothing,
}

/// Status polling schedule, active exactly while the push transport is down.
#[derive(Debug, Clone, Default)]
pub struct PollingFallback {
    active: bool,
}

impl PollingFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_liveness(&mut self, live: bool) -> PollCommand {
        match (self.active, live) {
            (false, false) => {
                self.active = true;
                PollCommand::FetchNowAndStartTicker
            }
            (true, true) => {
                self.active = false;
                PollCommand::StopTicker
            }
            _ => PollCommand::Nothing,
        }
    }

    /// Whether a timer tick should issue a fetch.
    pub fn on_tick(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losing_liveness_fetches_immediately_once() {
        let mut polling = PollingFallback::new();
        assert_eq!(
            polling.on_liveness(false),
            PollCommand::FetchNowAndStartTicker
        );
        assert_eq!(polling.on_liveness(false), PollCommand::Nothing);
        assert!(polling.on_tick());
    }

    #[test]
    fn live_transport_issues_no_fetches() {
        let mut polling = PollingFallback::new();
        assert_eq!(polling.on_liveness(true), PollCommand::Nothing);
        assert!(!polling.on_tick());

        polling.on_liveness(false);
        assert_eq!(polling.on_liveness(true), PollCommand::StopTicker);
        assert!(!polling.on_tick());
        assert!(!polling.is_active());

        assert_eq!(
            polling.on_liveness(false),
            PollCommand::FetchNowAndStartTicker
        );
    }
}
