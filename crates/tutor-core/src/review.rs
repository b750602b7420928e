//! Review mode: clarifying questions, contextual feedback, follow-ups.
//!
//! A review runs one conversation over one [`CodeUnit`]:
//!
//! 1. [`ReviewEngine::start`] sends the code and gets clarifying questions.
//! 2. [`ReviewEngine::submit_answers`] sends the learner's answers and gets
//!    feedback that refers back to them.
//! 3. [`ReviewEngine::follow_up`] continues the same thread any number of times.
//! 4. [`ReviewEngine::close`] ends the session.
//!
//! A failed model call leaves the engine where it was, so the same method
//! can simply be called again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ModelClient;
use crate::error::{Result, TutorError};
use crate::events::{
    AnalysisPayload, Emitter, EventSink, FeedbackPayload, SessionEndPayload, SessionEvent,
    SessionStartPayload, Stage,
};
use crate::parser::{self, AnalysisBounds, AnalysisResult, FeedbackResult};
use crate::prompts::PromptBuilder;
use crate::source::CodeUnit;
use crate::state::{ReviewState, SessionMode, SessionOptions, SessionState};

const ENGINE: &str = "review";

/// What the learner sees after [`ReviewEngine::start`].
#[derive(Debug)]
pub struct ReviewOpening {
    /// The clarifying questions and first observations.
    pub analysis: AnalysisResult,
    /// Feedback, present when the model asked no questions and the feedback
    /// call succeeded straight away.
    pub feedback: Option<FeedbackResult>,
    /// Why the immediate feedback call failed, if it did. The engine stays in
    /// `AwaitingAnswers`; retry with `submit_answers(&[])`.
    pub feedback_error: Option<TutorError>,
}

/// Totals for a finished review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// Session id.
    pub session_id: Uuid,
    /// Reviewed file, if a review was started.
    pub subject: Option<String>,
    /// Number of clarifying questions asked.
    pub questions_asked: usize,
    /// Whether feedback was delivered.
    pub feedback_delivered: bool,
    /// Number of answered follow-ups.
    pub follow_ups: usize,
    /// Turns in the thread.
    pub turns: usize,
}

/// Drives one review session.
#[derive(Debug)]
pub struct ReviewEngine {
    session: SessionState,
    state: ReviewState,
    bounds: AnalysisBounds,
    code: Option<CodeUnit>,
    analysis: Option<AnalysisResult>,
    feedback: Option<FeedbackResult>,
    follow_ups: usize,
    events: Emitter,
}

impl ReviewEngine {
    /// Creates an idle review session.
    #[must_use]
    pub fn new(
        client: Arc<dyn ModelClient>,
        sink: Arc<dyn EventSink>,
        options: &SessionOptions,
    ) -> Self {
        let session = SessionState::new(SessionMode::Review, client, options);
        let events = Emitter::new(sink, session.id());
        Self {
            session,
            state: ReviewState::Idle,
            bounds: AnalysisBounds::default(),
            code: None,
            analysis: None,
            feedback: None,
            follow_ups: 0,
            events,
        }
    }

    /// Replaces the expected question and observation counts.
    #[must_use]
    pub fn with_bounds(mut self, bounds: AnalysisBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReviewState {
        self.state
    }

    /// The session this engine drives.
    #[must_use]
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// The code under review.
    #[must_use]
    pub const fn code(&self) -> Option<&CodeUnit> {
        self.code.as_ref()
    }

    /// The parsed analysis, once received.
    #[must_use]
    pub const fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// The most recent feedback or follow-up reply.
    #[must_use]
    pub const fn feedback(&self) -> Option<&FeedbackResult> {
        self.feedback.as_ref()
    }

    /// Sends the code for analysis and returns the clarifying questions.
    ///
    /// If the model asks no questions, feedback is requested immediately.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after [`ReviewEngine::close`]
    /// - `TutorError::SequenceViolation` if a review was already started
    /// - `TutorError::Transport` if the analysis call fails; the engine
    ///   returns to `Idle`
    pub async fn start(&mut self, code: CodeUnit) -> Result<ReviewOpening> {
        self.ensure_open()?;
        // Analyzing is only left behind by a cancelled call
        if !matches!(self.state, ReviewState::Idle | ReviewState::Analyzing) {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "start a review"));
        }

        if self.session.thread().is_empty() {
            self.events.emit(SessionEvent::SessionStart(SessionStartPayload {
                mode: SessionMode::Review,
                model: self.session.thread().model().to_string(),
                profile: self.session.profile().clone(),
                subject: code.display_name(),
                language: code.language.clone(),
            }));
        }

        self.transition(ReviewState::Analyzing);
        let prompt = PromptBuilder::new(self.session.profile()).initial_analysis(&code);
        let reply = match self.session.exchange(&self.events, Stage::Analysis, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                self.transition(ReviewState::Idle);
                return Err(e);
            }
        };

        let analysis = parser::parse_analysis(&reply);
        let warnings = self.bounds.violations(&analysis);
        for warning in &warnings {
            tracing::warn!(file = %code.display_name(), "Analysis outside expected shape: {warning}");
        }
        self.events.emit(SessionEvent::AnalysisParsed(AnalysisPayload {
            questions: analysis.questions.clone(),
            observations: analysis.observations.clone(),
            warnings,
        }));

        tracing::info!(
            file = %code.display_name(),
            questions = analysis.questions.len(),
            observations = analysis.observations.len(),
            "Analysis received"
        );

        self.code = Some(code);
        self.analysis = Some(analysis.clone());
        self.transition(ReviewState::AwaitingAnswers);

        let mut opening = ReviewOpening {
            analysis,
            feedback: None,
            feedback_error: None,
        };

        if opening.analysis.questions.is_empty() {
            tracing::info!("No clarifying questions; requesting feedback directly");
            match self.request_feedback(&[]).await {
                Ok(feedback) => opening.feedback = Some(feedback),
                Err(e) => opening.feedback_error = Some(e),
            }
        }

        Ok(opening)
    }

    /// Sends the learner's answers and returns feedback.
    ///
    /// One answer per question, in question order. Blank answers are sent as
    /// "(no answer given)".
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after [`ReviewEngine::close`]
    /// - `TutorError::SequenceViolation` unless questions are awaiting answers
    /// - `TutorError::AnswerCountMismatch` if the counts differ
    /// - `TutorError::Transport` if the call fails; the engine stays in
    ///   `AwaitingAnswers` and the same answers can be resubmitted
    pub async fn submit_answers(&mut self, answers: &[String]) -> Result<FeedbackResult> {
        self.ensure_open()?;
        if self.state != ReviewState::AwaitingAnswers {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "accept answers"));
        }

        let expected = self.analysis.as_ref().map_or(0, |a| a.questions.len());
        if answers.len() != expected {
            return Err(TutorError::AnswerCountMismatch {
                expected,
                actual: answers.len(),
            });
        }

        if !answers.is_empty() {
            self.events
                .emit(SessionEvent::user_input(Stage::Feedback, answers.join("\n")));
        }
        self.request_feedback(answers).await
    }

    /// Sends a follow-up message and returns the reply.
    ///
    /// # Errors
    ///
    /// - `TutorError::SessionClosed` after [`ReviewEngine::close`]
    /// - `TutorError::SequenceViolation` before feedback was delivered
    /// - `TutorError::EmptyInput` for a blank message
    /// - `TutorError::Transport` if the call fails; the state is unchanged
    pub async fn follow_up(&mut self, text: &str) -> Result<FeedbackResult> {
        self.ensure_open()?;
        if !self.state.accepts_follow_up() {
            return Err(TutorError::sequence_violation(ENGINE, self.state, "send a follow-up"));
        }
        if text.trim().is_empty() {
            return Err(TutorError::empty_input("follow-up"));
        }

        self.events.emit(SessionEvent::user_input(Stage::FollowUp, text.trim()));
        let prompt = PromptBuilder::new(self.session.profile()).follow_up(text);
        let reply = self
            .session
            .exchange(&self.events, Stage::FollowUp, prompt)
            .await?;

        let result = parser::parse_feedback(&reply);
        self.record_feedback(Stage::FollowUp, &result);
        self.follow_ups += 1;
        self.transition(ReviewState::FollowUp);
        Ok(result)
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` if it was already closed.
    pub fn close(&mut self) -> Result<ReviewSummary> {
        self.ensure_open()?;

        let outcome = if self.feedback.is_some() {
            "completed"
        } else {
            "ended_early"
        };
        self.transition(ReviewState::Closed);
        self.events.emit(SessionEvent::SessionEnd(SessionEndPayload {
            mode: SessionMode::Review,
            turns: self.session.thread().len(),
            outcome: outcome.to_string(),
        }));

        Ok(ReviewSummary {
            session_id: self.session.id(),
            subject: self.code.as_ref().map(CodeUnit::display_name),
            questions_asked: self.analysis.as_ref().map_or(0, |a| a.questions.len()),
            feedback_delivered: self.feedback.is_some(),
            follow_ups: self.follow_ups,
            turns: self.session.thread().len(),
        })
    }

    async fn request_feedback(&mut self, answers: &[String]) -> Result<FeedbackResult> {
        let questions = self
            .analysis
            .as_ref()
            .map(|a| a.questions.clone())
            .unwrap_or_default();
        let prompt = PromptBuilder::new(self.session.profile()).feedback_request(&questions, answers);
        let reply = self
            .session
            .exchange(&self.events, Stage::Feedback, prompt)
            .await?;

        let result = parser::parse_feedback(&reply);
        self.record_feedback(Stage::Feedback, &result);
        self.transition(ReviewState::Feedback);
        Ok(result)
    }

    fn record_feedback(&mut self, stage: Stage, result: &FeedbackResult) {
        self.events.emit(SessionEvent::FeedbackParsed(FeedbackPayload {
            stage,
            sections: result.sections.len(),
            feedback: result.feedback.clone(),
        }));
        self.feedback = Some(result.clone());
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TutorError::session_closed(ENGINE));
        }
        Ok(())
    }

    fn transition(&mut self, next: ReviewState) {
        if self.state != next {
            tracing::info!(
                session = %self.session.id(),
                from = %self.state,
                to = %next,
                "Review state changed"
            );
            self.state = next;
        }
    }
}
