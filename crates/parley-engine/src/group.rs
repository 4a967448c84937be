use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use parley_core::events::ConversationEvent;
use parley_core::ids::{AgentId, ThreadId};
use parley_core::messages::Role;

use crate::driver::RunDriver;
use crate::error::TurnError;
use crate::termination::{StopReason, Termination};
use crate::transcript::TranscriptEntry;

const EVENT_CAPACITY: usize = 256;

/// What the loop does when a turn fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnErrorPolicy {
    /// Record the error and hand the turn to the next agent.
    Continue,
    /// Record the error and stop the conversation.
    #[default]
    Abort,
}

/// A remote agent taking part in a conversation.
#[derive(Clone, Debug)]
pub struct Participant {
    pub name: String,
    pub agent: AgentId,
}

impl Participant {
    pub fn new(name: impl Into<String>, agent: AgentId) -> Self {
        Self { name: name.into(), agent }
    }
}

/// Final state of a conversation.
#[derive(Clone, Debug)]
pub struct ConversationOutcome {
    /// Seed task followed by one entry per turn.
    pub history: Vec<TranscriptEntry>,
    pub reason: StopReason,
    pub turns: u32,
    /// Last successful reply of the decision role (or of any agent when no
    /// decision role is set).
    pub final_artifact: Option<String>,
}

/// Fixed-order, round-robin conversation over one shared thread.
///
/// Turn `t` (1-based) goes to participant `(t - 1) mod N`. The task is
/// posted to the thread once before the first turn; every turn runs against
/// the thread as the previous agents left it.
pub struct RoundRobinChat {
    driver: RunDriver,
    participants: Vec<Participant>,
    termination: Termination,
    policy: TurnErrorPolicy,
    decision_role: Option<String>,
    event_tx: broadcast::Sender<ConversationEvent>,
}

impl RoundRobinChat {
    pub fn new(driver: RunDriver, participants: Vec<Participant>, termination: Termination) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            driver,
            participants,
            termination,
            policy: TurnErrorPolicy::default(),
            decision_role: None,
            event_tx,
        }
    }

    pub fn with_error_policy(mut self, policy: TurnErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_decision_role(mut self, name: impl Into<String>) -> Self {
        self.decision_role = Some(name.into());
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    fn send_event(&self, event: ConversationEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("no event receivers, event dropped");
        }
    }

    #[instrument(skip_all, fields(thread = %thread, agents = self.participants.len()))]
    pub async fn run(
        &self,
        thread: &ThreadId,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome, TurnError> {
        if self.participants.is_empty() {
            return Err(TurnError::NoParticipants);
        }
        if task.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        // A thread without the task is a setup failure, not a failed turn.
        self.driver
            .service()
            .create_message(thread, Role::User, task)
            .await?;

        let mut history = vec![TranscriptEntry::task(task)];
        let mut turns = 0u32;

        let reason = loop {
            let participant = &self.participants[turns as usize % self.participants.len()];
            turns += 1;

            self.send_event(ConversationEvent::TurnStarted {
                turn: turns,
                agent: participant.name.clone(),
            });

            match self.driver.resume_turn(&participant.agent, thread, cancel).await {
                Ok(outcome) => {
                    let text = outcome.reply.to_string();
                    info!(turn = turns, agent = %participant.name, chars = text.len(), "turn completed");
                    self.send_event(ConversationEvent::TurnCompleted {
                        turn: turns,
                        agent: participant.name.clone(),
                        run_id: outcome.run.id.clone(),
                        text: text.clone(),
                    });
                    history.push(if outcome.reply.is_no_response() {
                        TranscriptEntry::no_response(&participant.name, text, outcome.run.id)
                    } else {
                        TranscriptEntry::reply(&participant.name, text, outcome.run.id)
                    });
                }
                Err(TurnError::Cancelled) => {
                    self.send_event(ConversationEvent::TurnFailed {
                        turn: turns,
                        agent: participant.name.clone(),
                        error: TurnError::Cancelled.to_string(),
                    });
                    break StopReason::Cancelled;
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(turn = turns, agent = %participant.name, error = %error, "turn failed");
                    self.send_event(ConversationEvent::TurnFailed {
                        turn: turns,
                        agent: participant.name.clone(),
                        error: error.clone(),
                    });
                    history.push(TranscriptEntry::error(&participant.name, format!("Error: {error}")));
                    if self.policy == TurnErrorPolicy::Abort {
                        break StopReason::Failed {
                            agent: participant.name.clone(),
                            error,
                        };
                    }
                }
            }

            if let Some(reason) = self.termination.check(&history, turns) {
                break reason;
            }
        };

        info!(turns, reason = %reason, "conversation terminated");
        self.send_event(ConversationEvent::Terminated {
            turns,
            reason: reason.to_string(),
        });

        let final_artifact = self.final_artifact(&history);
        Ok(ConversationOutcome {
            history,
            reason,
            turns,
            final_artifact,
        })
    }

    fn final_artifact(&self, history: &[TranscriptEntry]) -> Option<String> {
        history
            .iter()
            .rev()
            .filter(|e| !e.is_error && !e.no_response && e.run_id.is_some())
            .find(|e| match &self.decision_role {
                Some(role) => e.speaker.is_agent(role),
                None => true,
            })
            .map(|e| e.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::driver::DriverConfig;
    use parley_client::mock::{MockAgentService, MockRun};
    use parley_core::agent::AgentRole;
    use parley_core::errors::ServiceError;
    use parley_core::service::AgentService;
    use crate::transcript::Speaker;

    const LESSON_ROLES: [&str; 4] = [
        "curriculum_content_curator",
        "activity_assessment_designer",
        "classroom_engagement_optimizer",
        "decision_agent",
    ];

    async fn setup(
        names: &[&str],
        script: Vec<MockRun>,
    ) -> (Arc<MockAgentService>, RunDriver, Vec<Participant>, ThreadId) {
        let svc = Arc::new(MockAgentService::new(script));
        let mut participants = Vec::new();
        for name in names {
            let agent = svc
                .create_agent(&AgentRole::new(*name, "instructions", "gpt-4o"))
                .await
                .unwrap();
            participants.push(Participant::new(*name, agent.id));
        }
        let thread = svc.create_thread().await.unwrap();
        let driver = RunDriver::new(svc.clone(), DriverConfig::default());
        (svc, driver, participants, thread)
    }

    fn lesson_termination() -> Termination {
        Termination::mention("Lesson Plan Finalized") | Termination::MaxMessages(10)
    }

    fn agent_names(history: &[TranscriptEntry]) -> Vec<&str> {
        history
            .iter()
            .filter_map(|e| match &e.speaker {
                Speaker::Agent(name) => Some(name.as_str()),
                Speaker::Task => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_exactly_at_marker_turn() {
        let script = vec![
            MockRun::reply("Content outline"),
            MockRun::reply("Quiz and activities"),
            MockRun::reply("Engagement ideas"),
            MockRun::reply("Full plan...\nLesson Plan Finalized"),
            MockRun::reply("should never run"),
        ];
        let (svc, driver, participants, thread) = setup(&LESSON_ROLES, script).await;
        let chat = RoundRobinChat::new(driver, participants, lesson_termination())
            .with_decision_role("decision_agent");

        let outcome = chat
            .run(&thread, "Plan a lesson on Photosynthesis", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.turns, 4);
        assert!(matches!(outcome.reason, StopReason::Mention { ref agent, .. } if agent == "decision_agent"));
        assert_eq!(outcome.history.len(), 5);
        assert_eq!(outcome.history[0].speaker, Speaker::Task);
        assert_eq!(agent_names(&outcome.history), LESSON_ROLES.to_vec());
        assert_eq!(outcome.final_artifact.as_deref(), Some("Full plan...\nLesson Plan Finalized"));
        assert_eq!(svc.remaining_script(), 1, "no turn after the marker");
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_guarantees_termination() {
        let script = (0..20).map(|i| MockRun::reply(format!("draft {i}"))).collect();
        let (_svc, driver, participants, thread) = setup(&LESSON_ROLES, script).await;
        let chat = RoundRobinChat::new(driver, participants, lesson_termination())
            .with_decision_role("decision_agent");

        let outcome = chat
            .run(&thread, "Plan a lesson on Photosynimagesis", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.reason, StopReason::MaxMessages(10));
        assert_eq!(outcome.history.len(), 10);
        assert_eq!(outcome.turns, 9);
        assert!(outcome.turns <= 10);
        // decision_agent spoke at turns 4 and 8
        assert_eq!(outcome.final_artifact.as_deref(), Some("draft 7"));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_thread_gets_task_once() {
        let script = vec![MockRun::reply("plan v1"), MockRun::reply("APPROVED")];
        let (svc, driver, participants, thread) = setup(&["LessonPlanner", "Educator"], script).await;
        let term = Termination::mention_ignore_case("approved").from_agents(["Educator"])
            | Termination::MaxMessages(10);
        let chat = RoundRobinChat::new(driver, participants, term);

        let outcome = chat.run(&thread, "Plan a lesson on fractions", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.turns, 2);

        let messages = svc.thread_messages(&thread);
        assert_eq!(messages.iter().filter(|m| m.role == Role::User).count(), 1);
        assert_eq!(messages.iter().filter(|m| m.role == Role::Assistant).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn planner_mention_is_ignored_for_review() {
        let script = vec![
            MockRun::reply("Please mark this approved"),
            MockRun::reply("Needs work"),
            MockRun::reply("Revised plan"),
            MockRun::reply("Approved!"),
        ];
        let (_svc, driver, participants, thread) = setup(&["LessonPlanner", "Educator"], script).await;
        let term = Termination::mention_ignore_case("approved").from_agents(["Educator"])
            | Termination::MaxMessages(10);
        let chat = RoundRobinChat::new(driver, participants, term);

        let outcome = chat.run(&thread, "Plan a lesson", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.turns, 4);
        assert!(matches!(outcome.reason, StopReason::Mention { ref agent, .. } if agent == "Educator"));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_stops_on_first_failure() {
        let script = vec![MockRun::reply("ok"), MockRun::fail("server_error", "boom"), MockRun::reply("unused")];
        let (svc, driver, participants, thread) = setup(&["a", "b", "c"], script).await;
        let chat = RoundRobinChat::new(driver, participants, Termination::MaxTurns(10));

        let outcome = chat.run(&thread, "task", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.turns, 2);
        assert!(matches!(outcome.reason, StopReason::Failed { ref agent, .. } if agent == "b"));
        let last = outcome.history.last().unwrap();
        assert!(last.is_error);
        assert!(last.text.contains("boom"));
        assert_eq!(svc.remaining_script(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_policy_records_error_and_cycles() {
        let script = vec![
            MockRun::reply("one"),
            MockRun::fail("server_error", "boom"),
            MockRun::reply("three"),
            MockRun::reply("four"),
        ];
        let (_svc, driver, participants, thread) = setup(&["a", "b"], script).await;
        let chat = RoundRobinChat::new(driver, participants, Termination::MaxTurns(4))
            .with_error_policy(TurnErrorPolicy::Continue);

        let outcome = chat.run(&thread, "task", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.turns, 4);
        assert_eq!(outcome.reason, StopReason::MaxTurns(4));
        assert_eq!(agent_names(&outcome.history), vec!["a", "b", "a", "b"]);
        assert!(outcome.history[2].is_error);
        assert_eq!(outcome.final_artifact.as_deref(), Some("four"));
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_turn_order() {
        let script = vec![MockRun::reply("x"), MockRun::reply("DONE")];
        let (_svc, driver, participants, thread) = setup(&["a", "b"], script).await;
        let chat = RoundRobinChat::new(driver, participants, Termination::mention("DONE"));
        let mut rx = chat.subscribe();

        chat.run(&thread, "task", &CancellationToken::new()).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec!["turn_started", "turn_completed", "turn_started", "turn_completed", "terminated"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_conversation() {
        let (_svc, driver, participants, thread) = setup(&["a", "b"], vec![MockRun::Hang]).await;
        let chat = RoundRobinChat::new(driver, participants, Termination::MaxTurns(10))
            .with_error_policy(TurnErrorPolicy::Continue);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = chat.run(&thread, "task", &cancel).await.unwrap();
        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(outcome.turns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unposted_task_fails_before_any_turn() {
        let script = vec![MockRun::reply("one"), MockRun::reply("two"), MockRun::reply("three")];
        let (svc, driver, participants, thread) = setup(&["a", "b", "c"], script).await;
        svc.fail_next_message(ServiceError::Network("connection reset".into()));
        let chat = RoundRobinChat::new(driver, participants, Termination::MaxTurns(3))
            .with_error_policy(TurnErrorPolicy::Continue);
        let mut rx = chat.subscribe();

        let err = chat.run(&thread, "task", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TurnError::Service(ServiceError::Network(_))));
        assert!(svc.thread_messages(&thread).is_empty());
        assert_eq!(svc.remaining_script(), 3, "no agent ran without the task");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_decision_reply_is_not_an_artifact() {
        let script = vec![
            MockRun::reply("Draft plan"),
            MockRun::reply("Final plan"),
            MockRun::reply("Feedback"),
            MockRun::Silent,
        ];
        let (_svc, driver, participants, thread) = setup(&["planner", "decider"], script).await;
        let chat = RoundRobinChat::new(driver, participants, Termination::MaxTurns(4))
            .with_decision_role("decider");

        let outcome = chat.run(&thread, "task", &CancellationToken::new()).await.unwrap();
        let last = outcome.history.last().unwrap();
        assert!(last.no_response);
        assert_eq!(last.text, "No response");
        assert_eq!(outcome.final_artifact.as_deref(), Some("Final plan"));
    }

    #[tokio::test]
    async fn rejects_empty_setup() {
        let svc = Arc::new(MockAgentService::default());
        let driver = RunDriver::new(svc, DriverConfig::default());
        let chat = RoundRobinChat::new(driver, Vec::new(), Termination::MaxTurns(1));
        let err = chat
            .run(&ThreadId::from_raw("thread_1"), "task", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::NoParticipants));
    }

    #[test]
    fn default_policy_is_abort() {
        assert_eq!(TurnErrorPolicy::default(), TurnErrorPolicy::Abort);
    }
}
