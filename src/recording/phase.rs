//! Recording session state machine.

use serde::Serialize;

/// Where a recording session is in its lifecycle.
///
/// `Idle` is both the initial state and the state reached once a
/// `Done`/`Failed` session has been acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    /// Waiting out the start delay; no process yet.
    Starting,
    /// Encoder process is running.
    Recording,
    /// Stop requested; waiting for the encoder to exit.
    Stopping,
    /// Converting the recorded video to the animated format.
    PostProcessing,
    Done,
    Failed,
}

impl Phase {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: Phase) -> bool {
        use Phase::*;

        matches!(
            (self, target),
            (Idle, Starting)
                | (Starting, Recording)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Recording, Stopping)
                | (Recording, PostProcessing)
                | (Recording, Done)
                | (Recording, Failed)
                // Stop during the start delay ends in Done without launching.
                | (Stopping, Done)
                | (Stopping, PostProcessing)
                | (Stopping, Failed)
                | (PostProcessing, Done)
                | (PostProcessing, Failed)
                | (Done, Idle)
                | (Failed, Idle)
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Starting => "Starting",
            Phase::Recording => "Recording",
            Phase::Stopping => "Stopping",
            Phase::PostProcessing => "PostProcessing",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        }
    }

    /// Done or Failed — waiting to be acknowledged.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// A stop request is meaningful only here.
    pub fn is_stoppable(&self) -> bool {
        matches!(self, Phase::Starting | Phase::Recording)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
