use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// Progress events emitted while a conversation runs.
///
/// Published on a broadcast channel; the CLI renders them live. Order per
/// turn: `TurnStarted` → (`TurnCompleted` | `TurnFailed`), and `Terminated`
/// is always last.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    TurnStarted {
        turn: u32,
        agent: String,
    },
    TurnCompleted {
        turn: u32,
        agent: String,
        run_id: RunId,
        text: String,
    },
    TurnFailed {
        turn: u32,
        agent: String,
        error: String,
    },
    Terminated {
        turns: u32,
        reason: String,
    },
}

impl ConversationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::TurnFailed { .. } => "turn_failed",
            Self::Terminated { .. } => "terminated",
        }
    }

    pub fn turn(&self) -> u32 {
        match self {
            Self::TurnStarted { turn, .. }
            | Self::TurnCompleted { turn, .. }
            | Self::TurnFailed { turn, .. } => *turn,
            Self::Terminated { turns, .. } => *turns,
        }
    }
}
