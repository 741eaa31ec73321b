//! Per-sensor stream supervision.
//!
//! Each raw host stream gets its own supervisor task. Transient sensor
//! states are masked by a safe default value so downstream fusion always
//! has something to work with, and a stalled stream is retried with
//! exponential backoff instead of being torn down. The stream only ends
//! with the session.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::host::{SensorKind, StreamState};
use crate::session::Shutdown;

/// A stream with no update for this long counts as stalled.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(20);
/// Pause after an `Idle` state before reprocessing.
pub const WAIT_IDLE: Duration = Duration::from_secs(3);
/// Pause after a `NotAvailable` state.
pub const WAIT_NOT_AVAILABLE: Duration = Duration::from_secs(6);
/// Pause after a `Searching` state.
pub const WAIT_SEARCHING: Duration = Duration::from_millis(1500);
/// Long rest after the retry budget is exhausted.
pub const WAIT_LONG: Duration = Duration::from_secs(120);
/// Stall retries before the long rest.
pub const MAX_RETRIES: u32 = 4;
/// Ceiling for one stall-retry delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Substituted whenever the real sensor value is unusable.
const SAFE_DEFAULT: StreamState = StreamState::Streaming(0.0);

/// Stall-retry delay sequence: exponential from one second, capped, with a
/// long rest (and counter reset) after [`MAX_RETRIES`] attempts.
#[derive(Debug, Default)]
pub struct RetryBackoff {
    attempt: u32,
}

impl RetryBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        if self.attempt >= MAX_RETRIES {
            self.attempt = 0;
            return WAIT_LONG;
        }

        let delay = Duration::from_secs(1u64 << self.attempt);
        self.attempt += 1;
        delay.min(BACKOFF_CAP)
    }

    /// Called when the sensor produces a real value again.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Whether a stream gets dropout masking or is forwarded untouched.
///
/// Cadence runs in passthrough: a cadence sensor that is absent must stay
/// distinguishable from one reading zero, so no default substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionMode {
    Supervised,
    Passthrough,
}

/// Owns one raw host stream and publishes its supervised latest value.
pub struct StreamSupervisor {
    kind: SensorKind,
    mode: SupervisionMode,
    raw: mpsc::Receiver<StreamState>,
    out: watch::Sender<StreamState>,
}

impl StreamSupervisor {
    /// Create the supervisor and its output channel.
    ///
    /// A supervised channel starts at the safe default so downstream never
    /// waits on a missing sensor; a passthrough channel starts at
    /// `Searching`.
    pub fn new(
        kind: SensorKind,
        mode: SupervisionMode,
        raw: mpsc::Receiver<StreamState>,
    ) -> (Self, watch::Receiver<StreamState>) {
        let initial = match mode {
            SupervisionMode::Supervised => SAFE_DEFAULT,
            SupervisionMode::Passthrough => StreamState::Searching,
        };
        let (tx, rx) = watch::channel(initial);

        let supervisor = Self {
            kind,
            mode,
            raw,
            out: tx,
        };

        (supervisor, rx)
    }

    /// Start the supervisor as a session-scoped background task.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: Shutdown) {
        match self.mode {
            SupervisionMode::Passthrough => self.forward(&mut shutdown).await,
            SupervisionMode::Supervised => self.supervise(&mut shutdown).await,
        }
    }

    async fn forward(&mut self, shutdown: &mut Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                state = self.raw.recv() => match state {
                    Some(state) => {
                        let _ = self.out.send(state);
                    }
                    None => break,
                },
            }
        }
    }

    async fn supervise(&mut self, shutdown: &mut Shutdown) {
        let mut backoff = RetryBackoff::new();

        loop {
            let state = tokio::select! {
                _ = shutdown.triggered() => break,
                state = self.raw.recv() => match state {
                    Some(state) => state,
                    None => break,
                },
                _ = time::sleep(STREAM_TIMEOUT) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        "{} stream stalled, substituting default and retrying in {:?}",
                        self.kind,
                        delay
                    );
                    let _ = self.out.send(SAFE_DEFAULT);
                    if !shutdown.sleep(delay).await {
                        break;
                    }
                    continue;
                }
            };

            match state {
                StreamState::Idle => {
                    let _ = self.out.send(SAFE_DEFAULT);
                    if !shutdown.sleep(WAIT_IDLE).await {
                        break;
                    }
                }
                StreamState::NotAvailable => {
                    let _ = self.out.send(SAFE_DEFAULT);
                    if !shutdown.sleep(WAIT_NOT_AVAILABLE).await {
                        break;
                    }
                }
                StreamState::Searching => {
                    let _ = self.out.send(SAFE_DEFAULT);
                    if !shutdown.sleep(WAIT_SEARCHING).await {
                        break;
                    }
                }
                streaming => {
                    backoff.reset();
                    let _ = self.out.send(streaming);
                }
            }
        }

        tracing::debug!("{} supervisor stopped", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_and_reset() {
        let mut backoff = RetryBackoff::new();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));

        // Budget exhausted: one long rest, then the sequence restarts.
        assert_eq!(backoff.next_delay(), WAIT_LONG);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));

        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_delays_never_exceed_cap_before_long_rest() {
        let mut backoff = RetryBackoff::new();
        for _ in 0..MAX_RETRIES {
            assert!(backoff.next_delay() <= BACKOFF_CAP);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn supervised_stream_masks_transient_states() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (supervisor, mut out) =
            StreamSupervisor::new(SensorKind::Speed, SupervisionMode::Supervised, raw_rx);
        let (handle, shutdown) = Shutdown::new();
        let task = supervisor.spawn(shutdown);

        // Downstream has a value before the sensor says anything.
        assert_eq!(*out.borrow(), StreamState::Streaming(0.0));

        raw_tx.send(StreamState::Searching).await.unwrap();
        raw_tx.send(StreamState::Idle).await.unwrap();
        raw_tx.send(StreamState::Streaming(7.5)).await.unwrap();

        out.wait_for(|s| *s == StreamState::Streaming(7.5))
            .await
            .unwrap();

        handle.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn supervised_stream_survives_a_stall() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (supervisor, mut out) =
            StreamSupervisor::new(SensorKind::Slope, SupervisionMode::Supervised, raw_rx);
        let (handle, shutdown) = Shutdown::new();
        let task = supervisor.spawn(shutdown);

        raw_tx.send(StreamState::Streaming(4.0)).await.unwrap();
        out.wait_for(|s| *s == StreamState::Streaming(4.0))
            .await
            .unwrap();

        // Silence past the stall window: the default comes back and the
        // supervisor keeps running.
        tokio::time::sleep(STREAM_TIMEOUT + Duration::from_secs(2)).await;
        assert_eq!(*out.borrow(), StreamState::Streaming(0.0));
        assert!(!task.is_finished());

        // Recovery after the stall passes through again.
        raw_tx.send(StreamState::Streaming(5.5)).await.unwrap();
        out.wait_for(|s| *s == StreamState::Streaming(5.5))
            .await
            .unwrap();

        handle.trigger();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn passthrough_forwards_states_untouched() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (supervisor, mut out) =
            StreamSupervisor::new(SensorKind::Cadence, SupervisionMode::Passthrough, raw_rx);
        let (handle, shutdown) = Shutdown::new();
        let task = supervisor.spawn(shutdown);

        assert_eq!(*out.borrow(), StreamState::Searching);

        // Passthrough never substitutes the default for transient states.
        raw_tx.send(StreamState::NotAvailable).await.unwrap();
        out.wait_for(|s| *s == StreamState::NotAvailable)
            .await
            .unwrap();

        raw_tx.send(StreamState::Streaming(90.0)).await.unwrap();
        out.wait_for(|s| *s == StreamState::Streaming(90.0))
            .await
            .unwrap();

        handle.trigger();
        task.await.unwrap();
    }
}
