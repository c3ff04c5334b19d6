//! Install state machine and progress events

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Phase of a single install attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPhase {
    Resolving,   // Mapping platform + version to a release asset
    Downloading, // Streaming asset bytes and the published checksum
    Verifying,   // Comparing the streamed digest
    Extracting,  // Pulling the executable out of the archive
    Installing,  // Atomic promotion into the install directory
    Done,
    Failed(String),
}

impl InstallPhase {
    fn ordinal(&self) -> Option<u8> {
        match self {
            InstallPhase::Resolving => Some(0),
            InstallPhase::Downloading => Some(1),
            InstallPhase::Verifying => Some(2),
            InstallPhase::Extracting => Some(3),
            InstallPhase::Installing => Some(4),
            InstallPhase::Done => Some(5),
            InstallPhase::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallPhase::Done | InstallPhase::Failed(_))
    }

    /// Forward-only transitions; any live phase may fail.
    ///
    /// A download retry is not a transition: the attempt stays in
    /// `Downloading` and never goes back to `Resolving`.
    pub fn can_transition_to(&self, next: &InstallPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallPhase::Resolving => f.write_str("resolving"),
            InstallPhase::Downloading => f.write_str("downloading"),
            InstallPhase::Verifying => f.write_str("verifying"),
            InstallPhase::Extracting => f.write_str("extracting"),
            InstallPhase::Installing => f.write_str("installing"),
            InstallPhase::Done => f.write_str("done"),
            InstallPhase::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Progress event sent to the terminal front-end
#[derive(Debug, Clone, PartialEq)]
pub enum InstallProgress {
    Phase {
        phase: InstallPhase,
        message: String,
    },
    /// Byte-level download progress; `total_bytes` is 0 when unknown
    Bytes {
        asset: String,
        attempt: u32,
        downloaded: u64,
        total_bytes: u64,
    },
    Retry {
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        reason: String,
    },
}

/// Tracks the current phase and rejects illegal transitions
#[derive(Debug)]
pub struct PhaseTracker {
    current: InstallPhase,
    history: Vec<InstallPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: InstallPhase::Resolving,
            history: vec![InstallPhase::Resolving],
        }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> &InstallPhase {
        &self.current
    }

    pub fn history(&self) -> &[InstallPhase] {
        &self.history
    }

    /// Move to `next`, returning false (and staying put) if the move is illegal
    pub fn advance(&mut self, next: InstallPhase) -> bool {
        if !self.current.can_transition_to(&next) {
            log::warn!("Ignoring illegal install transition {} -> {}", self.current, next);
            return false;
        }
        log::debug!("Install phase {} -> {}", self.current, next);
        self.current = next.clone();
        self.history.push(next);
        true
    }
}

/// Best-effort progress channel.
///
/// Progress is advisory: a closed or full channel never fails the install, it
/// only stops further updates.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<InstallProgress>>,
    disabled: Arc<AtomicBool>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<InstallProgress>) -> Self {
        Self {
            tx: Some(tx),
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn send(&self, progress: InstallProgress) {
        let Some(tx) = &self.tx else {
            return;
        };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = tx.try_send(progress)
            && matches!(e, mpsc::error::TrySendError::Closed(_))
        {
            log::warn!("Progress channel closed, continuing install without updates");
            self.disabled.store(true, Ordering::Relaxed);
        }
    }

    pub fn phase(&self, phase: InstallPhase, message: impl Into<String>) {
        self.send(InstallProgress::Phase {
            phase,
            message: message.into(),
        });
    }
}
