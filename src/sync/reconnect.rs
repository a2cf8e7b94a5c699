use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Idle,
    Connected,
    Attempting(u32),
    GivenUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Schedule { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
    Ignore,
}

/// Bounded flat-backoff retry schedule for the push subscription.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    state: ReconnectState,
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            state: ReconnectState::Idle,
            max_attempts,
            delay,
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn on_connected(&mut self) {
        self.state = ReconnectState::Connected;
    }

    pub fn on_failure(&mut self) -> ReconnectDecision {
        let next_attempt = match self.state {
            ReconnectState::Idle | ReconnectState::Connected => 1,
            ReconnectState::Attempting(attempt) => attempt.saturating_add(1),
            ReconnectState::GivenUp => return ReconnectDecision::Ignore,
        };

        if next_attempt > self.max_attempts {
            let attempts = next_attempt - 1;
            self.state = ReconnectState::GivenUp;
            return ReconnectDecision::GiveUp { attempts };
        }

        self.state = ReconnectState::Attempting(next_attempt);
        ReconnectDecision::Schedule {
            attempt: next_attempt,
            delay: self.delay,
        }
    }

    /// Manual retry after exhaustion. Returns false if the policy has not
    /// given up.
    pub fn reset(&mut self) -> bool {
        if self.state != ReconnectState::GivenUp {
            return false;
        }
        self.state = ReconnectState::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(5, Duration::from_secs(3))
    }

    #[test]
    fn schedules_first_attempt_after_disconnect() {
        let mut policy = policy();
        policy.on_connected();

        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Schedule {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
        );
        assert_eq!(policy.state(), ReconnectState::Attempting(1));
    }

    #[test]
    fn uses_flat_delay_for_every_attempt() {
        let mut policy = policy();
        policy.on_connected();

        for expected_attempt in 1..=5 {
            match policy.on_failure() {
                ReconnectDecision::Schedule { attempt, delay } => {
                    assert_eq!(attempt, expected_attempt);
                    assert_eq!(delay, Duration::from_secs(3));
                }
                other => panic!("expected schedule, got {other:?}"),
            }
        }
    }

    #[test]
    fn gives_up_after_max_failed_attempts() {
        let mut policy = policy();
        policy.on_connected();
        for _ in 0..5 {
            let _ = policy.on_failure();
        }

        assert_eq!(policy.on_failure(), ReconnectDecision::GiveUp { attempts: 5 });
        assert_eq!(policy.state(), ReconnectState::GivenUp);
        assert_eq!(policy.on_failure(), ReconnectDecision::Ignore);
    }

    #[test]
    fn success_resets_the_counter() {
        let mut policy = policy();
        policy.on_connected();
        let _ = policy.on_failure();
        let _ = policy.on_failure();
        policy.on_connected();

        assert_eq!(policy.state(), ReconnectState::Connected);
        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Schedule {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
        );
    }

    #[test]
    fn failed_initial_connect_starts_at_attempt_one() {
        let mut policy = policy();
        assert!(matches!(
            policy.on_failure(),
            ReconnectDecision::Schedule { attempt: 1, .. }
        ));
    }

    #[test]
    fn reset_only_applies_after_giving_up() {
        let mut policy = ReconnectPolicy::new(1, Duration::from_millis(100));
        assert!(!policy.reset());

        let _ = policy.on_failure();
        assert_eq!(policy.on_failure(), ReconnectDecision::GiveUp { attempts: 1 });
        assert!(policy.reset());
        assert_eq!(policy.state(), ReconnectState::Idle);
    }
}
