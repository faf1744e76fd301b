use std::time::Duration;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(10_000);

/// Exponential reconnect delay: `min(base * 2^retry, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { delay: Duration },
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportInput {
    Start,
    Opened,
    Closed,
    Errored,
    ReconnectDue,
    HeartbeatDue,
    Teardown,
}

/// Side effects the driver must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    OpenConnection,
    StartHeartbeat,
    SendPing,
    StopHeartbeat,
    ScheduleReconnect(Duration),
    CancelReconnect,
    CloseConnection,
}

/// Connection lifecycle without timers or sockets.
///
/// `handle` maps one input to the next state plus the actions to perform.
/// After `Teardown` the machine is `Disabled` and ignores every input, so a
/// late close can never schedule another attempt.
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    retry_count: u32,
    backoff: BackoffPolicy,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl Transport {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: TransportState::Idle,
            retry_count: 0,
            backoff,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_live(&self) -> bool {
        self.state == TransportState::Connected
    }

    pub fn is_disabled(&self) -> bool {
        self.state == TransportState::Disabled
    }

    pub fn handle(&mut self, input: TransportInput) -> Vec<TransportAction> {
        use TransportAction as A;
        use TransportInput as I;
        use TransportState as S;

        match (self.state, input) {
            (S::Disabled, _) => Vec::new(),
            (_, I::Teardown) => {
                self.state = S::Disabled;
                vec![A::CancelReconnect, A::StopHeartbeat, A::CloseConnection]
            }
            (S::Idle, I::Start) => {
                self.state = S::Connecting;
                vec![A::OpenConnection]
            }
            (S::Connecting, I::Opened) => {
                self.state = S::Connected;
                self.retry_count = 0;
                vec![A::StartHeartbeat]
            }
            (S::Connected, I::HeartbeatDue) => vec![A::SendPing],
            (S::Connecting, I::Closed | I::Errored) => self.schedule_reconnect(false),
            (S::Connected, I::Closed | I::Errored) => self.schedule_reconnect(true),
            (S::Reconnecting { .. }, I::ReconnectDue) => {
                self.state = S::Connecting;
                vec![A::OpenConnection]
            }
            _ => Vec::new(),
        }
    }

    fn schedule_reconnect(&mut self, was_connected: bool) -> Vec<TransportAction> {
        let delay = self.backoff.delay_for(self.retry_count);
        self.retry_count = self.retry_count.saturating_add(1);
        self.state = TransportState::Reconnecting { delay };
        let mut actions = Vec::with_capacity(3);
        if was_connected {
            actions.push(TransportAction::StopHeartbeat);
        }
        actions.push(TransportAction::CloseConnection);
        actions.push(TransportAction::ScheduleReconnect(delay));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(actions: &[TransportAction]) -> Option<Duration> {
        actions.iter().find_map(|action| match action {
            TransportAction::ScheduleReconnect(delay) => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u128> = (0..6).map(|retry| policy.delay_for(retry).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000, 10000]);
        assert_eq!(policy.delay_for(40), DEFAULT_BACKOFF_CAP);
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_BACKOFF_CAP);
    }

    #[test]
    fn five_consecutive_failures_follow_backoff_sequence() {
        let mut transport = Transport::default();
        assert_eq!(
            transport.handle(TransportInput::Start),
            vec![TransportAction::OpenConnection]
        );
        let mut delays = Vec::new();
        for _ in 0..5 {
            let actions = transport.handle(TransportInput::Errored);
            delays.push(scheduled(&actions).expect("reconnect scheduled").as_millis());
            assert!(!transport.is_live());
            assert_eq!(
                transport.handle(TransportInput::ReconnectDue),
                vec![TransportAction::OpenConnection]
            );
        }
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000]);
        assert_eq!(transport.retry_count(), 5);
    }

    #[test]
    fn successful_connect_resets_retry_counter() {
        let mut transport = Transport::default();
        transport.handle(TransportInput::Start);
        for _ in 0..3 {
            transport.handle(TransportInput::Closed);
            transport.handle(TransportInput::ReconnectDue);
        }
        assert_eq!(transport.retry_count(), 3);

        assert_eq!(
            transport.handle(TransportInput::Opened),
            vec![TransportAction::StartHeartbeat]
        );
        assert!(transport.is_live());
        assert_eq!(transport.retry_count(), 0);

        let actions = transport.handle(TransportInput::Closed);
        assert_eq!(
            actions,
            vec![
                TransportAction::StopHeartbeat,
                TransportAction::CloseConnection,
                TransportAction::ScheduleReconnect(Duration::from_millis(1000)),
            ]
        );
        assert!(!transport.is_live());
    }

    #[test]
    fn heartbeat_pings_only_while_connected() {
        let mut transport = Transport::default();
        assert!(transport.handle(TransportInput::HeartbeatDue).is_empty());
        transport.handle(TransportInput::Start);
        assert!(transport.handle(TransportInput::HeartbeatDue).is_empty());
        transport.handle(TransportInput::Opened);
        assert_eq!(
            transport.handle(TransportInput::HeartbeatDue),
            vec![TransportAction::SendPing]
        );
    }

    #[test]
    fn close_and_error_for_one_failure_schedule_once() {
        let mut transport = Transport::default();
        transport.handle(TransportInput::Start);
        transport.handle(TransportInput::Opened);
        let first = transport.handle(TransportInput::Errored);
        assert!(scheduled(&first).is_some());
        assert!(transport.handle(TransportInput::Closed).is_empty());
        assert_eq!(transport.retry_count(), 1);
    }

    #[test]
    fn teardown_suppresses_late_close() {
        let mut transport = Transport::default();
        transport.handle(TransportInput::Start);
        transport.handle(TransportInput::Opened);
        assert_eq!(
            transport.handle(TransportInput::Teardown),
            vec![
                TransportAction::CancelReconnect,
                TransportAction::StopHeartbeat,
                TransportAction::CloseConnection,
            ]
        );
        assert_eq!(transport.state(), TransportState::Disabled);
        assert!(!transport.is_live());
        for input in [
            TransportInput::Closed,
            TransportInput::Errored,
            TransportInput::ReconnectDue,
            TransportInput::HeartbeatDue,
            TransportInput::Start,
            TransportInput::Teardown,
        ] {
            assert!(transport.handle(input).is_empty());
        }
        assert!(transport.is_disabled());
    }

    #[test]
    fn teardown_while_reconnecting_cancels_timer() {
        let mut transport = Transport::default();
        transport.handle(TransportInput::Start);
        transport.handle(TransportInput::Errored);
        assert!(matches!(
            transport.state(),
            TransportState::Reconnecting { .. }
        ));
        let actions = transport.handle(TransportInput::Teardown);
        assert!(actions.contains(&TransportAction::CancelReconnect));
        assert!(transport.handle(TransportInput::ReconnectDue).is_empty());
    }

    #[test]
    fn custom_policy_is_respected() {
        let mut transport = Transport::new(BackoffPolicy {
            base: Duration::from_millis(20),
            cap: Duration::from_millis(50),
        });
        transport.handle(TransportInput::Start);
        let delays: Vec<Duration> = (0..3)
            .filter_map(|_| {
                let delay = scheduled(&transport.handle(TransportInput::Errored));
                transport.handle(TransportInput::ReconnectDue);
                delay
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(50),
            ]
        );
    }
}
