//! Run status and its lifecycle rules.
//!
//! ```text
//! Unknown -> Idle -> Starting -> Running -> { Ended, Stopped, Error }
//! ```
//!
//! `Error` is reachable from every state. `Stopped` only from `Starting` or
//! `Running`. `Ended` only follows an engine-reported match completion; step
//! failures do not end a match, so completion is also accepted from `Error`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Lifecycle code of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatusCode {
    /// No run has been configured yet.
    #[default]
    Unknown,
    /// Reset and ready to start.
    Idle,
    /// Match requested, waiting for the engine to begin.
    Starting,
    /// Match in progress.
    Running,
    /// Stop requested by a caller.
    Stopped,
    /// The engine reported match completion.
    Ended,
    /// The most recent operation failed.
    Error,
}

impl StatusCode {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Re-entering the current state is always allowed; it replaces the
    /// status fields without changing the code.
    #[must_use]
    pub fn can_transition_to(self, next: StatusCode) -> bool {
        use StatusCode::*;

        if self == next {
            return true;
        }
        match (self, next) {
            (_, Error) => true,
            (Unknown, Idle) => true,
            (Idle, Starting) => true,
            (Starting, Running) => true,
            (Starting | Running, Stopped) => true,
            (Starting | Running | Error, Ended) => true,
            _ => false,
        }
    }

    /// Whether per-frame exchanges should still run in this state.
    ///
    /// A failed exchange leaves the run in `Error` but the next frame
    /// still calls the agent.
    #[must_use]
    pub fn accepts_steps(self) -> bool {
        matches!(self, StatusCode::Running | StatusCode::Error)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Unknown => "Unknown",
            StatusCode::Idle => "Idle",
            StatusCode::Starting => "Starting",
            StatusCode::Running => "Running",
            StatusCode::Stopped => "Stopped",
            StatusCode::Ended => "Ended",
            StatusCode::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Snapshot of a run's status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    /// Run identifier (derived from the run-start timestamp).
    pub id: String,
    /// Current lifecycle code.
    pub code: StatusCode,
    /// Most recent error messages (empty unless `code` is `Error`).
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Partial status record merged over a freshly defaulted [`Status`].
///
/// Fields left as `None` fall back to their defaults, so an update that
/// omits `errors` clears the error list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New lifecycle code.
    pub code: Option<StatusCode>,
    /// Replacement error list.
    pub errors: Option<Vec<String>>,
}

impl StatusUpdate {
    /// Update that only sets the lifecycle code.
    #[must_use]
    pub fn code(code: StatusCode) -> Self {
        Self {
            code: Some(code),
            errors: None,
        }
    }

    /// Supply an explicit error list.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Holds the committed status of one run and enforces the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct StatusMachine {
    current: Status,
}

impl StatusMachine {
    /// Create a machine for a freshly reset run, already in `Idle`.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            current: Status {
                id: run_id.into(),
                code: StatusCode::Idle,
                errors: Vec::new(),
            },
        }
    }

    /// Last committed status.
    #[must_use]
    pub fn status(&self) -> &Status {
        &self.current
    }

    /// Last committed lifecycle code.
    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.current.code
    }

    /// Merge `update` over a defaulted status and commit it.
    ///
    /// The run identifier is owned by the machine and is kept across
    /// updates.
    ///
    /// # Errors
    /// Returns [`BridgeError::InvalidTransition`] if the lifecycle does not
    /// allow the requested code. The committed status is left unchanged.
    pub fn set_status(&mut self, update: StatusUpdate) -> Result<&Status> {
        let next = update.code.unwrap_or_default();
        let from = self.current.code;
        if !from.can_transition_to(next) {
            return Err(BridgeError::InvalidTransition { from, to: next });
        }
        self.current = Status {
            id: std::mem::take(&mut self.current.id),
            code: next,
            errors: update.errors.unwrap_or_default(),
        };
        Ok(&self.current)
    }

    /// Transition to `Error` with `message` as the only error.
    ///
    /// Earlier errors are discarded: the status is a snapshot, not a log.
    pub fn set_error(&mut self, message: impl Into<String>) -> &Status {
        self.current.code = StatusCode::Error;
        self.current.errors = vec![message.into()];
        &self.current
    }
}
