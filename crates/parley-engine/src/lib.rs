pub mod driver;
pub mod error;
pub mod group;
pub mod oneshot;
pub mod router;
pub mod session;
pub mod termination;
pub mod transcript;

pub use driver::{DriverConfig, Reply, RunDriver, TurnOutcome};
pub use error::{RouterError, SessionError, TurnError};
pub use group::{ConversationOutcome, Participant, RoundRobinChat, TurnErrorPolicy};
pub use oneshot::{ask_once, OneShotAnswer};
pub use router::{ModelUsage, RoutedChat, RoutedReply};
pub use session::{AgentSession, CloseReport, Resource};
pub use termination::{StopReason, Termination};
pub use transcript::{Speaker, TranscriptEntry};
