//! # Command Dispatch Module
//!
//! Sends operator commands back to the payload.
//!
//! The UI layer exposes a monotonically increasing action counter (one
//! increment per button press, per console line, ...). The poll driver hands
//! the dispatcher the current counter on every tick; a command goes out only
//! when the counter has risen since the last call. Repeating the same value
//! is a no-op, so polling never resends the last command.

use tracing::{debug, info, warn};

use crate::error::{Result, StationError};
use crate::frame::encoder::encode_command;
use crate::frame::protocol::CommandRequest;
use crate::serial::CommandSink;

/// What a call to [`CommandDispatcher::submit`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Command written to the link
    Sent { bytes: usize },
    /// Trigger did not rise; nothing written
    Ignored,
}

/// Edge-triggered command writer
pub struct CommandDispatcher<S> {
    sink: S,
    terminator: String,
    last_trigger: u64,
}

impl<S> std::fmt::Debug for CommandDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("terminator", &self.terminator)
            .field("last_trigger", &self.last_trigger)
            .finish_non_exhaustive()
    }
}

impl<S: CommandSink> CommandDispatcher<S> {
    /// Create a dispatcher. The trigger starts at 0, so the first action
    /// must report 1 or more.
    pub fn new(sink: S, terminator: impl Into<String>) -> Self {
        Self {
            sink,
            terminator: terminator.into(),
            last_trigger: 0,
        }
    }

    /// Highest trigger value seen so far
    pub fn last_trigger(&self) -> u64 {
        self.last_trigger
    }

    /// Send `request` if `trigger` is a new operator action
    ///
    /// # Arguments
    ///
    /// * `trigger` - Current value of the operator action counter
    /// * `request` - Command to send on a rising edge
    ///
    /// # Returns
    ///
    /// * `Result<DispatchOutcome>` - `Sent` or `Ignored`
    ///
    /// # Errors
    ///
    /// - `StationError::InvalidCommand` if the request cannot be encoded
    /// - `StationError::Dispatch` if the link write or flush fails
    ///
    /// In both cases the trigger is still consumed; the command is not retried.
    pub async fn submit(&mut self, trigger: u64, request: &CommandRequest) -> Result<DispatchOutcome> {
        if trigger <= self.last_trigger {
            debug!("Trigger {} not above {}, ignoring", trigger, self.last_trigger);
            return Ok(DispatchOutcome::Ignored);
        }
        self.last_trigger = trigger;

        let bytes = encode_command(request, &self.terminator)?;

        if let Err(e) = self.send(&bytes).await {
            warn!("Command to {} not delivered: {}", request.target_sensor, e);
            return Err(e);
        }

        info!(
            "Sent command {:?} (trigger {})",
            String::from_utf8_lossy(&bytes).trim_end(),
            trigger
        );
        Ok(DispatchOutcome::Sent { bytes: bytes.len() })
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink
            .write_all(bytes)
            .await
            .map_err(|e| StationError::Dispatch(format!("Failed to write command: {}", e)))?;

        self.sink
            .flush()
            .await
            .map_err(|e| StationError::Dispatch(format!("Failed to flush command: {}", e)))
    }
}
