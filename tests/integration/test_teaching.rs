//! End-to-end tests for teaching mode
//!
//! A `ScriptedClient` plays the simulated student, so each test controls
//! exactly when understanding is reached.

use std::sync::Arc;

use tutor_core::{
    Difficulty, ModelClient, NextStep, NullSink, Role, ScriptedClient, SessionOptions,
    TeachingEngine, TeachingOutcome, TeachingState, TransportErrorKind, TutorError,
};

fn exercise_reply(round: u32) -> String {
    format!(
        "## Code\n\
         ```python\n\
         def factorial(n):\n    return n * factorial(n - {round})\n\
         ```\n\n\
         ## Student Question\n\
         My factorial never stops. What am I missing?\n\n\
         ## Hidden Issues\n\
         - No base case\n\
         - Negative input recurses forever"
    )
}

fn evaluation_reply(achieved: bool) -> String {
    let flag = if achieved { "YES" } else { "NO" };
    format!(
        "## Student Response\n\
         Oh, so it needs somewhere to stop?\n\n\
         ## Teaching Quality Assessment\n\
         The hint pointed at the missing base case without giving it away.\n\n\
         ## Understanding Achieved\n\
         {flag}"
    )
}

fn engine(client: &Arc<ScriptedClient>, max_rounds: u32) -> TeachingEngine {
    TeachingEngine::new(
        Arc::clone(client) as Arc<dyn ModelClient>,
        Arc::new(NullSink),
        &SessionOptions::default().with_max_rounds(max_rounds),
    )
}

/// Scripts `rounds` exercises, each followed by an evaluation. Only the last
/// one can report understanding.
fn script(client: &ScriptedClient, rounds: u32, achieved_on_last: bool) {
    for round in 1..=rounds {
        client.push_reply(exercise_reply(round));
        client.push_reply(evaluation_reply(achieved_on_last && round == rounds));
    }
}

/// Tests that a student who never understands stops at the round ceiling.
#[tokio::test]
async fn test_teaching_stops_at_ceiling() {
    let client = Arc::new(ScriptedClient::new());
    script(&client, 5, false);
    let mut engine = engine(&client, 5);

    let mut view = engine
        .start("recursion", "Python")
        .await
        .expect("first exercise failed");
    let mut seen_rounds = Vec::new();

    let summary = loop {
        seen_rounds.push(view.round);
        let result = engine
            .submit_hints("What happens when n reaches zero?")
            .await
            .expect("evaluation failed");
        assert!(!result.evaluation.expect("evaluation missing").understanding_achieved);

        match result.next {
            NextStep::NextRound(round) => {
                assert_eq!(round, view.round + 1);
                view = engine.next_exercise().await.expect("exercise failed");
            }
            NextStep::Finished(summary) => break summary,
        }
    };

    assert_eq!(seen_rounds, vec![1, 2, 3, 4, 5]);
    assert_eq!(summary.outcome, TeachingOutcome::RoundCeilingReached);
    assert_eq!(summary.rounds_completed(), 5);
    assert_eq!(summary.language, "python");
    assert_eq!(engine.state(), TeachingState::Closed);
    assert_eq!(client.call_count(), 10);
}

/// Tests that understanding on the last allowed round counts as success.
#[tokio::test]
async fn test_teaching_understanding_on_last_round() {
    let client = Arc::new(ScriptedClient::new());
    script(&client, 2, true);
    let mut engine = engine(&client, 2);

    engine.start("recursion", "python").await.expect("first exercise failed");
    let first = engine.submit_hints("Look at the stop condition").await.expect("evaluation failed");
    assert!(matches!(first.next, NextStep::NextRound(2)));

    engine.next_exercise().await.expect("exercise failed");
    let second = engine.submit_hints("When should it return 1?").await.expect("evaluation failed");

    let NextStep::Finished(summary) = second.next else {
        unreachable!("the session should end after round 2");
    };
    assert_eq!(summary.outcome, TeachingOutcome::UnderstandingAchieved);
    assert_eq!(
        summary.final_response.as_deref(),
        Some("Oh, so it needs somewhere to stop?")
    );
}

/// Tests the difficulty tier assigned to each round.
#[tokio::test]
async fn test_teaching_difficulty_rises() {
    let client = Arc::new(ScriptedClient::new());
    script(&client, 4, false);
    let mut engine = engine(&client, 4);

    let mut difficulties = vec![engine.start("loops", "rust").await.expect("start failed").difficulty];
    for _ in 0..3 {
        engine.submit_hints("Check the bounds").await.expect("evaluation failed");
        difficulties.push(engine.next_exercise().await.expect("exercise failed").difficulty);
    }

    assert_eq!(
        difficulties,
        vec![
            Difficulty::Obvious,
            Difficulty::Subtle,
            Difficulty::Subtle,
            Difficulty::Nuanced
        ]
    );
}

/// Tests that the learner never sees the hidden issues but the evaluator does.
#[tokio::test]
async fn test_teaching_hidden_issues_reach_evaluator_only() {
    let client = Arc::new(ScriptedClient::new());
    script(&client, 1, true);
    let mut engine = engine(&client, 3);

    let view = engine.start("recursion", "python").await.expect("start failed");
    let shown = serde_json::to_string(&view).expect("view should serialize");
    assert!(!shown.contains("No base case"));

    engine.submit_hints("What stops it?").await.expect("evaluation failed");
    let calls = client.calls();
    let evaluation_prompt = &calls[1].last().expect("prompt missing").content;
    assert!(evaluation_prompt.contains("No base case"));
    assert!(evaluation_prompt.contains("What stops it?"));
}

/// Tests that a failed evaluation can be retried with the same hints.
#[tokio::test]
async fn test_teaching_evaluation_retry() {
    let client = Arc::new(ScriptedClient::new());
    client.push_reply(exercise_reply(1));
    client.push_failure(TransportErrorKind::Timeout);
    client.push_reply(evaluation_reply(true));
    let mut engine = engine(&client, 3);

    engine.start("recursion", "python").await.expect("start failed");
    let err = engine.submit_hints("Base case?").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(engine.state(), TeachingState::AwaitingHints);
    assert_eq!(engine.round(), 1);

    let result = engine.submit_hints("Base case?").await.expect("retry failed");
    assert!(matches!(result.next, NextStep::Finished(_)));

    let turns = engine.session().thread().turns();
    assert_eq!(turns.len(), 4);
    assert!(turns
        .iter()
        .enumerate()
        .all(|(i, t)| t.role == if i % 2 == 0 { Role::User } else { Role::Assistant }));
}

/// Tests that skipping rounds makes no model calls and still ends at the ceiling.
#[tokio::test]
async fn test_teaching_skip_rounds() {
    let client = Arc::new(ScriptedClient::new());
    client.push_reply(exercise_reply(1));
    client.push_reply(exercise_reply(2));
    let mut engine = engine(&client, 2);

    engine.start("recursion", "python").await.expect("start failed");
    let first = engine.skip_round().expect("skip failed");
    assert!(first.evaluation.is_none());
    assert!(matches!(first.next, NextStep::NextRound(2)));

    engine.next_exercise().await.expect("exercise failed");
    let NextStep::Finished(summary) = engine.skip_round().expect("skip failed").next else {
        unreachable!("two skipped rounds should reach the ceiling");
    };

    assert_eq!(client.call_count(), 2);
    assert_eq!(summary.outcome, TeachingOutcome::RoundCeilingReached);
    assert!(summary.rounds.iter().all(|r| r.skipped()));
    assert!(summary.final_response.is_none());
}

/// Tests that operations out of order are rejected without touching the model.
#[tokio::test]
async fn test_teaching_rejects_out_of_order_calls() {
    let client = Arc::new(ScriptedClient::new());
    script(&client, 1, false);
    let mut engine = engine(&client, 3);

    let err = engine.submit_hints("too early").await.unwrap_err();
    assert!(matches!(err, TutorError::SequenceViolation { .. }));

    engine.start("recursion", "python").await.expect("start failed");
    let err = engine.next_exercise().await.unwrap_err();
    assert!(matches!(err, TutorError::SequenceViolation { .. }));

    let summary = engine.close().expect("close failed");
    assert_eq!(summary.outcome, TeachingOutcome::EndedEarly);
    assert!(matches!(
        engine.submit_hints("late").await.unwrap_err(),
        TutorError::SessionClosed { .. }
    ));
    assert_eq!(client.call_count(), 1);
}
