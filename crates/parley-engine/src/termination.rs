use std::fmt;
use std::ops::BitOr;

use regex::Regex;

use crate::transcript::{Speaker, TranscriptEntry};

/// Why a conversation stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Mention { agent: String, marker: String },
    Pattern { agent: String, pattern: String },
    MaxMessages(usize),
    MaxTurns(u32),
    /// A turn failed under the abort policy.
    Failed { agent: String, error: String },
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mention { agent, marker } => write!(f, "{agent} mentioned '{marker}'"),
            Self::Pattern { agent, pattern } => write!(f, "{agent} matched /{pattern}/"),
            Self::MaxMessages(n) => write!(f, "reached {n} messages"),
            Self::MaxTurns(n) => write!(f, "reached {n} turns"),
            Self::Failed { agent, error } => write!(f, "{agent} failed: {error}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Substring test used by [`Termination::TextMention`].
pub fn mentions(text: &str, marker: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.contains(marker)
    } else {
        text.to_lowercase().contains(&marker.to_lowercase())
    }
}

/// Stop condition for a round-robin conversation, evaluated after every turn.
///
/// Text conditions look only at the latest entry, and only when it is an
/// agent reply (error entries never match). Ceilings look at the whole
/// history. Conditions compose with `|`.
#[derive(Clone, Debug)]
pub enum Termination {
    TextMention {
        marker: String,
        case_sensitive: bool,
        /// Only replies from these agents are inspected. `None` means all.
        sources: Option<Vec<String>>,
    },
    Pattern(Regex),
    /// History length, counting the seed task entry.
    MaxMessages(usize),
    MaxTurns(u32),
    Any(Vec<Termination>),
}

impl Termination {
    pub fn mention(marker: impl Into<String>) -> Self {
        Self::TextMention {
            marker: marker.into(),
            case_sensitive: true,
            sources: None,
        }
    }

    pub fn mention_ignore_case(marker: impl Into<String>) -> Self {
        Self::TextMention {
            marker: marker.into(),
            case_sensitive: false,
            sources: None,
        }
    }

    /// Restrict a mention condition to replies from `agents`. Other
    /// conditions are returned unchanged.
    pub fn from_agents<I, S>(self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::TextMention { marker, case_sensitive, .. } => Self::TextMention {
                marker,
                case_sensitive,
                sources: Some(agents.into_iter().map(Into::into).collect()),
            },
            other => other,
        }
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    /// `Some(reason)` once the conversation must stop.
    pub fn check(&self, history: &[TranscriptEntry], turns: u32) -> Option<StopReason> {
        match self {
            Self::TextMention { marker, case_sensitive, sources } => {
                let (agent, text) = latest_reply(history)?;
                let listening = sources
                    .as_ref()
                    .map_or(true, |names| names.iter().any(|n| n == agent));
                (listening && mentions(text, marker, *case_sensitive)).then(|| StopReason::Mention {
                    agent: agent.to_string(),
                    marker: marker.clone(),
                })
            }
            Self::Pattern(re) => {
                let (agent, text) = latest_reply(history)?;
                re.is_match(text).then(|| StopReason::Pattern {
                    agent: agent.to_string(),
                    pattern: re.as_str().to_string(),
                })
            }
            Self::MaxMessages(max) => (history.len() >= *max).then_some(StopReason::MaxMessages(*max)),
            Self::MaxTurns(max) => (turns >= *max).then_some(StopReason::MaxTurns(*max)),
            Self::Any(conditions) => conditions.iter().find_map(|c| c.check(history, turns)),
        }
    }
}

fn latest_reply(history: &[TranscriptEntry]) -> Option<(&str, &str)> {
    let entry = history.last()?;
    match &entry.speaker {
        Speaker::Agent(name) if !entry.is_error => Some((name.as_str(), entry.text.as_str())),
        _ => None,
    }
}

impl BitOr for Termination {
    type Output = Termination;

    fn bitor(self, rhs: Termination) -> Termination {
        match (self, rhs) {
            (Self::Any(mut left), Self::Any(right)) => {
                left.extend(right);
                Self::Any(left)
            }
            (Self::Any(mut left), other) => {
                left.push(other);
                Self::Any(left)
            }
            (other, Self::Any(mut right)) => {
                right.insert(0, other);
                Self::Any(right)
            }
            (left, right) => Self::Any(vec![left, right]),
        }
    }
}
