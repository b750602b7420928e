//! Teaching mode: the learner coaches a simulated student.
//!
//! Each round the model writes a short flawed exercise in the voice of a
//! struggling student. The learner answers with hints, and the model, still
//! in character, reacts and reports whether it now understands. Rounds get
//! harder until the student understands, the round ceiling is reached, or
//! the learner stops.
//!
//! The whole session is one conversation, so later exercises can build on
//! earlier ones.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ModelClient;
use crate::error::{Result, TutorError};
use crate::events::{
    Emitter, EvaluationPayload, EventSink, ExercisePayload, RoundCompletePayload,
    SessionEndPayload, SessionEvent, SessionStartPayload, Stage,
};
use crate::parser::{self, EvaluationResult, ExerciseSpec, ExerciseView};
use crate::prompts::{Difficulty, PromptBuilder};
use crate::state::{SessionMode, SessionOptions, SessionState, TeachingState};

const ENGINE: &str = "teaching";

/// Default round ceiling.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// How a teaching session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingOutcome {
    /// The student reported understanding.
    UnderstandingAchieved,
    /// The last allowed round ended without understanding.
    RoundCeilingReached,
    /// The learner closed the session.
    EndedEarly,
}

impl std::fmt::Display for TeachingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnderstandingAchieved => write!(f, "understanding_achieved"),
            Self::RoundCeilingReached => write!(f, "round_ceiling_reached"),
            Self::EndedEarly => write!(f, "ended_early"),
        }
    }
}

/// One decided round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number, starting at 1.
    pub round: u32,
    /// Difficulty of the round's exercise.
    pub difficulty: Difficulty,
    /// The learner's hints; `None` if the round was skipped.
    pub hints: Option<String>,
    /// Whether the student understood.
    pub understanding_achieved: bool,
}

impl RoundRecord {
    /// Returns `true` if the learner skipped this round.
    #[must_use]
    pub const fn skipped(&self) -> bool {
        self.hints.is_none()
    }
}

/// Result of a finished teaching session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingSummary {
    /// Session id.
    pub session_id: Uuid,
    /// The topic taught.
    pub topic: String,
    /// The exercise language.
    pub language: String,
    /// How it ended.
    pub outcome: TeachingOutcome,
    /// Every decided round, in order.
    pub rounds: Vec<RoundRecord>,
    /// The last in-character response, if any hints were evaluated.
    pub final_response: Option<String>,
}

impl TeachingSummary {
    /// Number of decided rounds.
    #[must_use]
    pub fn rounds_completed(&self) -> usize {
        self.rounds.len()
    }
}

/// What happens after a round is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Call [`TeachingEngine::next_exercise`] for this round.
    NextRound(u32),
    /// The session closed.
    Finished(TeachingSummary),
}

/// The result of [`TeachingEngine::submit_hints`] or [`TeachingEngine::skip_round`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// The round that was decided.
    pub round: u32,
    /// The student's reaction; `None` for a skipped round.
    pub evaluation: Option<EvaluationResult>,
    /// What comes next.
    pub next: NextStep,
}

/// Drives one teaching session.
#[derive(Debug)]
pub struct TeachingEngine {
    session: SessionState,
    state: TeachingState,
    max_rounds: u32,
    topic: String,
    language: String,
    exercise: Option<ExerciseSpec>,
    rounds: Vec<RoundRecord>,
    last_response: Option<String>,
    events: Emitter,
}

impl TeachingEngine {
    /// Creates an idle teaching session.
    #[must_use]
    pub fn new(
        client: Arc<dyn ModelClient>,
        sink: Arc<dyn EventSink>,
        options: &SessionOptions,
    ) -> Self {
        let session = SessionState::new(SessionMode::Teaching, client, options);
        let events = Emitter::new(sink, session.id());
        Self {
            session,
            state: TeachingState::Idle,
            max_rounds: options.max_rounds.max(1),
            topic: String::new(),
            language: String::new(),
            exercise: None,
            rounds: Vec::new(),
            last_response: None,
            events,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TeachingState {
        self.state
    }

    /// The session this engine drives.
    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// Current round; 0 before the first exercise.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.session.round()
    }

    /// Round ceiling.
    #[must_use]
    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Rounds decided so far.
    #[must_use]
    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// The current exercise as the learner may see it.
    #[must_use]
    pub fn exercise(&self) -> Option<ExerciseView> {
        self.exercise.as_ref().map(ExerciseSpec::learner_view)
    }

    /// Starts the session and returns the first exercise.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after the session closed
    /// - `TutorError::SequenceViolation` if already started
    /// - `TutorError::EmptyInput` for a blank topic or language
    /// - `TutorError::Transport` if generation fails; the engine returns to
    ///   `Idle` and `start` can be called again
    pub async fn start(&mut self, topic: &str, language: &str) -> Result<ExerciseView> {
        self.ensure_open()?;
        if self.state != TeachingState::Idle {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "start"));
        }
        let topic = topic.trim();
        let language = language.trim();
        if topic.is_empty() {
            return Err(TutorError::empty_input("topic"));
        }
        if language.is_empty() {
            return Err(TutorError::empty_input("language"));
        }

        if self.session.thread().is_empty() {
            self.events.emit(SessionEvent::SessionStart(SessionStartPayload {
                mode: SessionMode::Teaching,
                model: self.session.thread().model().to_string(),
                profile: self.session.profile().clone(),
                subject: topic.to_string(),
                language: language.to_string(),
            }));
        }

        self.topic = topic.to_string();
        self.language = language.to_lowercase();
        self.session.advance_round();
        self.transition(TeachingState::GeneratingExercise);

        match self.generate().await {
            Ok(view) => Ok(view),
            Err(e) => {
                self.session.reset_round();
                self.transition(TeachingState::Idle);
                Err(e)
            }
        }
    }

    /// Generates the exercise for the current round.
    ///
    /// Called after a round ended without understanding, or to retry a
    /// failed generation.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after the session closed
    /// - `TutorError::SequenceViolation` unless an exercise is due
    /// - `TutorError::Transport` if generation fails; the state is unchanged
    pub async fn next_exercise(&mut self) -> Result<ExerciseView> {
        self.ensure_open()?;
        if self.state != TeachingState::GeneratingExercise {
            return Err(TutorError::sequence_violation(
                ENGINE,
                self.state,
                "generate an exercise",
            ));
        }
        self.generate().await
    }

    /// Sends the learner's hints for evaluation and decides the round.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after the session closed
    /// - `TutorError::SequenceViolation` unless an exercise is awaiting hints
    /// - `TutorError::EmptyInput` for blank hints
    /// - `TutorError::Transport` if evaluation fails; the engine returns to
    ///   `AwaitingHints` and the same hints can be resubmitted
    pub async fn submit_hints(&mut self, hints: &str) -> Result<RoundResult> {
        self.ensure_open()?;
        // Evaluating is only left behind by a cancelled call
        if !matches!(
            self.state,
            TeachingState::AwaitingHints | TeachingState::Evaluating
        ) {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "accept hints"));
        }
        let hints = hints.trim();
        if hints.is_empty() {
            return Err(TutorError::empty_input("hint"));
        }
        let Some(exercise) = self.exercise.as_ref() else {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "accept hints"));
        };

        self.events.emit(SessionEvent::user_input(Stage::Evaluation, hints));
        let prompt =
            PromptBuilder::new(self.session.profile()).hint_evaluation(&self.topic, exercise, hints);
        self.transition(TeachingState::Evaluating);

        let reply = match self
            .session
            .exchange(&self.events, Stage::Evaluation, prompt)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.transition(TeachingState::AwaitingHints);
                return Err(e);
            }
        };

        let evaluation = parser::parse_evaluation(&reply);
        let round = self.session.round();
        self.events.emit(SessionEvent::EvaluationParsed(EvaluationPayload {
            round,
            understanding_achieved: evaluation.understanding_achieved,
            response: evaluation.response.clone(),
        }));
        self.last_response = Some(evaluation.response.clone());
        self.transition(TeachingState::RoundDecision);

        let next = self.decide(Some(hints.to_string()), evaluation.understanding_achieved);
        Ok(RoundResult {
            round,
            evaluation: Some(evaluation),
            next,
        })
    }

    /// Gives up on the current exercise without sending hints.
    ///
    /// The round counts as not understood. No model call is made.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after the session closed
    /// - `TutorError::SequenceViolation` unless an exercise is awaiting hints
    pub fn skip_round(&mut self) -> Result<RoundResult> {
        self.ensure_open()?;
        if self.state != TeachingState::AwaitingHints {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "skip a round"));
        }

        let round = self.session.round();
        tracing::info!(round, "Round skipped");
        self.transition(TeachingState::RoundDecision);
        let next = self.decide(None, false);
        Ok(RoundResult {
            round,
            evaluation: None,
            next,
        })
    }

    /// Ends the session early.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` if it was already closed.
    pub fn close(&mut self) -> Result<TeachingSummary> {
        self.ensure_open()?;
        Ok(self.finish(TeachingOutcome::EndedEarly))
    }

    async fn generate(&mut self) -> Result<ExerciseView> {
        let round = self.session.round();
        let prompt =
            PromptBuilder::new(self.session.profile()).exercise(&self.topic, &self.language, round);
        let reply = self
            .session
            .exchange(&self.events, Stage::Exercise, prompt)
            .await?;

        let exercise = parser::parse_exercise(&reply, round, &self.language);
        if exercise.code.is_empty() {
            tracing::warn!(round, "Exercise reply contained no code");
        }
        if exercise.hidden_issue_count() == 0 {
            tracing::warn!(round, "Exercise reply recorded no hidden issues");
        }
        self.events.emit(SessionEvent::ExerciseParsed(ExercisePayload {
            round,
            difficulty: exercise.difficulty,
            hidden_issues: exercise.hidden_issue_count(),
            code: exercise.code.clone(),
            student_question: exercise.student_question.clone(),
        }));
        tracing::info!(round, difficulty = %exercise.difficulty, "Exercise generated");

        let view = exercise.learner_view();
        self.exercise = Some(exercise);
        self.transition(TeachingState::AwaitingHints);
        Ok(view)
    }

    /// Records the round and either advances or closes the session.
    fn decide(&mut self, hints: Option<String>, achieved: bool) -> NextStep {
        let round = self.session.round();
        let skipped = hints.is_none();
        self.rounds.push(RoundRecord {
            round,
            difficulty: Difficulty::for_round(round),
            hints,
            understanding_achieved: achieved,
        });
        self.events.emit(SessionEvent::RoundComplete(RoundCompletePayload {
            round,
            achieved,
            skipped,
        }));

        // Understanding on the last round still counts as understanding
        if achieved {
            return NextStep::Finished(self.finish(TeachingOutcome::UnderstandingAchieved));
        }
        if round >= self.max_rounds {
            return NextStep::Finished(self.finish(TeachingOutcome::RoundCeilingReached));
        }

        let next = self.session.advance_round();
        self.transition(TeachingState::GeneratingExercise);
        NextStep::NextRound(next)
    }

    fn finish(&mut self, outcome: TeachingOutcome) -> TeachingSummary {
        self.transition(TeachingState::Closed);
        self.events.emit(SessionEvent::SessionEnd(SessionEndPayload {
            mode: SessionMode::Teaching,
            turns: self.session.thread().len(),
            outcome: outcome.to_string(),
        }));
        tracing::info!(
            session = %self.session.id(),
            %outcome,
            rounds = self.rounds.len(),
            "Teaching session finished"
        );

        TeachingSummary {
            session_id: self.session.id(),
            topic: self.topic.clone(),
            language: self.language.clone(),
            outcome,
            rounds: self.rounds.clone(),
            final_response: self.last_response.clone(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TutorError::session_closed(ENGINE));
        }
        Ok(())
    }

    fn transition(&mut self, next: TeachingState) {
        if self.state != next {
            tracing::info!(
                session = %self.session.id(),
                round = self.session.round(),
                from = %self.state,
                to = %next,
                "Teaching state changed"
            );
            self.state = next;
        }
    }
}
