use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GameConfig;
use crate::types::{Phase, PlayerId};

/// What a timer is for. At most one timer is armed per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Deadline of the given phase.
    Phase(Phase),
    /// Closes the session once it has been empty or idle for too long.
    Teardown,
    /// Removes a disconnected player who did not come back.
    Reconnect(PlayerId),
}

/// Delivered to the session task when a timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

/// How long a phase may last before the clock advances it.
pub fn phase_deadline(phase: Phase, config: &GameConfig) -> Option<Duration> {
    match phase {
        Phase::RoundIntro => Some(config.intro_countdown()),
        Phase::Creation => Some(config.creation_time()),
        Phase::Voting => Some(config.voting_time()),
        Phase::Lobby | Phase::Results | Phase::Closed => None,
    }
}

/// Session-scoped timers.
///
/// Each armed timer is a sleeping task that reports back over a channel
/// owned by the session task, so firings are serialized with every other
/// command. Re-arming or cancelling a key bumps its generation; a firing
/// that was already queued under an older generation is then refused by
/// [`RoundClock::accept`].
pub struct RoundClock {
    tx: mpsc::UnboundedSender<TimerFired>,
    armed: HashMap<TimerKey, (u64, JoinHandle<()>)>,
    generation: u64,
}

impl RoundClock {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Self {
            tx,
            armed: HashMap::new(),
            generation: 0,
        };
        (clock, rx)
    }

    pub fn arm(&mut self, key: TimerKey, after: Duration) {
        self.cancel(key);
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(TimerFired { key, generation });
        });
        self.armed.insert(key, (generation, task));
    }

    pub fn cancel(&mut self, key: TimerKey) {
        if let Some((_, task)) = self.armed.remove(&key) {
            task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, task)) in self.armed.drain() {
            task.abort();
        }
    }

    /// Replaces any phase deadline with the one for `phase`, if it has one.
    pub fn arm_phase(&mut self, phase: Phase, config: &GameConfig) {
        self.armed.retain(|key, (_, task)| {
            if matches!(key, TimerKey::Phase(_)) {
                task.abort();
                false
            } else {
                true
            }
        });
        if let Some(after) = phase_deadline(phase, config) {
            self.arm(TimerKey::Phase(phase), after);
        }
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.contains_key(&key)
    }

    /// Returns true if `fired` is the live arming of its key, disarming it.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.key) {
            Some((generation, _)) if *generation == fired.generation => {
                self.armed.remove(&fired.key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
