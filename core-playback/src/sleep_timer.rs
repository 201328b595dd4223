//! Sleep timer countdown.

/// Outcome of one sleep timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTick {
    Running { remaining: u64 },
    Expired,
}

/// Countdown in whole seconds, ticked once per second by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepTimer {
    remaining: u64,
}

impl SleepTimer {
    /// `None` for a zero-length timer, which callers treat as a cancel.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes > 0).then(|| Self {
            remaining: u64::from(minutes) * 60,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn tick(&mut self) -> SleepTick {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            SleepTick::Expired
        } else {
            SleepTick::Running {
                remaining: self.remaining,
            }
        }
    }
}
