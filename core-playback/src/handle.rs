//! Public handle to the playback coordinator.
//!
//! The handle is cheap to clone and is the only way to reach the coordinator:
//! every command is sent over a channel and applied in order by the single
//! coordinator task, which answers through a oneshot.

use crate::error::{PlaybackError, Result};
use crate::state::PlaybackSnapshot;
use core_runtime::events::{EventBus, EventStream};
use tokio::sync::{mpsc, oneshot, watch};

pub(crate) type Ack = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(crate) enum Command {
    Load {
        item_id: String,
        start_time: Option<f64>,
        ack: Ack,
    },
    Play(Ack),
    Pause(Ack),
    TogglePlayPause(Ack),
    Seek { to: f64, ack: Ack },
    Skip { by: f64, ack: Ack },
    NextChapter(Ack),
    PreviousChapter(Ack),
    SetRate { rate: f32, ack: Ack },
    ToggleRate(Ack),
    SetSleep { minutes: u32, ack: Ack },
    CancelSleepTimer(Ack),
    Teardown(Ack),
}

/// Handle for sending commands to a running coordinator.
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    events: EventBus,
}

impl PlaybackHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        snapshot: watch::Receiver<PlaybackSnapshot>,
        events: EventBus,
    ) -> Self {
        Self {
            commands,
            snapshot,
            events,
        }
    }

    async fn request(&self, build: impl FnOnce(Ack) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| PlaybackError::CoordinatorStopped)?;
        rx.await.map_err(|_| PlaybackError::CoordinatorStopped)?
    }

    /// Loads an item, replacing whatever is loaded.
    ///
    /// Resolves once the engine reports the queue ready, or with the error
    /// that prevented it. Without `start_time` the saved server progress
    /// (rewound a few seconds) is applied on the first `play`.
    pub async fn load(&self, item_id: impl Into<String>, start_time: Option<f64>) -> Result<()> {
        let item_id = item_id.into();
        self.request(|ack| Command::Load {
            item_id,
            start_time,
            ack,
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.request(Command::TogglePlayPause).await
    }

    /// Seeks to an absolute position in seconds. Out-of-range targets clamp.
    pub async fn seek(&self, to: f64) -> Result<()> {
        self.request(|ack| Command::Seek { to, ack }).await
    }

    /// Seeks relative to the current position.
    pub async fn skip(&self, by: f64) -> Result<()> {
        self.request(|ack| Command::Skip { by, ack }).await
    }

    pub async fn next_chapter(&self) -> Result<()> {
        self.request(Command::NextChapter).await
    }

    pub async fn previous_chapter(&self) -> Result<()> {
        self.request(Command::PreviousChapter).await
    }

    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        self.request(|ack| Command::SetRate { rate, ack }).await
    }

    /// Cycles through the configured rate presets.
    pub async fn toggle_rate(&self) -> Result<()> {
        self.request(Command::ToggleRate).await
    }

    /// Pauses playback after `minutes`. Zero cancels the timer.
    pub async fn set_sleep(&self, minutes: u32) -> Result<()> {
        self.request(|ack| Command::SetSleep { minutes, ack }).await
    }

    pub async fn cancel_sleep_timer(&self) -> Result<()> {
        self.request(Command::CancelSleepTimer).await
    }

    /// Closes the session, releases the engine and stops the coordinator.
    /// Every later command fails with [`PlaybackError::CoordinatorStopped`].
    pub async fn teardown(&self) -> Result<()> {
        self.request(Command::Teardown).await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    /// Discrete playback and session events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
