//! End-to-end tests for review mode
//!
//! Every test drives a `ReviewEngine` through a `ScriptedClient`, so no
//! network access or API key is needed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tutor_core::{
    CodeUnit, Config, EventBroadcaster, FeedbackHeading, ModelClient, NullSink, ReviewEngine,
    ReviewState, Role, ScriptedClient, SessionOptions, TransportErrorKind, Turn, TutorError,
};

const ANALYSIS: &str = "## Questions\n\
    1. Why recursion rather than a loop?\n\
    2. Should the function accept unsorted input?\n\
    \n\
    ## Initial Observations\n\
    - Clear parameter names\n\
    - Default arguments hide the recursion bounds\n";

const FEEDBACK: &str = "## Positive Feedback\n\
    The base case is handled first, which matches your goal of readability.\n\
    \n\
    ## Suggestions for Improvement\n\
    - Document that `items` must be sorted.\n\
    \n\
    ## Learning Opportunities\n\
    Tail calls and Python's recursion limit.\n\
    \n\
    ## Trade-offs\n\
    Recursion reads well but costs stack depth.";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn load_code() -> CodeUnit {
    CodeUnit::load(fixture("binary_search.py")).expect("Failed to load fixture")
}

fn engine(client: &Arc<ScriptedClient>) -> ReviewEngine {
    ReviewEngine::new(
        Arc::clone(client) as Arc<dyn ModelClient>,
        Arc::new(NullSink),
        &SessionOptions::default(),
    )
}

fn answers(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn assert_alternates(turns: &[Turn]) {
    for (i, turn) in turns.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(turn.role, expected, "turn {i} has the wrong role");
    }
}

/// Tests a full review: analysis, answers, feedback and two follow-ups.
#[tokio::test]
async fn test_review_full_session() {
    let client = Arc::new(ScriptedClient::with_replies([
        ANALYSIS,
        FEEDBACK,
        "A loop avoids the recursion limit.",
        "Yes, `bisect` does exactly this.",
    ]));
    let mut engine = engine(&client);

    let code = load_code();
    assert_eq!(code.language, "Python");

    let opening = engine.start(code).await.expect("analysis failed");
    assert_eq!(
        opening.analysis.questions,
        vec![
            "Why recursion rather than a loop?",
            "Should the function accept unsorted input?"
        ]
    );
    assert_eq!(opening.analysis.observations.len(), 2);

    let feedback = engine
        .submit_answers(&answers(&["It mirrors the textbook definition", "No"]))
        .await
        .expect("feedback failed");
    assert_eq!(feedback.sections.len(), 4);
    assert!(feedback
        .section(FeedbackHeading::TradeOffs)
        .is_some_and(|body| body.contains("stack depth")));

    engine.follow_up("Would a loop be better?").await.expect("follow-up failed");
    engine.follow_up("Is there a stdlib helper?").await.expect("follow-up failed");
    assert_eq!(engine.state(), ReviewState::FollowUp);

    let summary = engine.close().expect("close failed");
    assert_eq!(summary.follow_ups, 2);
    assert_eq!(summary.turns, 8);
    assert_alternates(engine.session().thread().turns());
}

/// Tests that the analysis prompt carries the file and the learner profile.
#[tokio::test]
async fn test_review_prompt_uses_profile() {
    let config = Config::load_from_file(&fixture("config.json")).expect("Failed to load config");
    let client = Arc::new(ScriptedClient::with_replies([ANALYSIS]));
    let mut engine = ReviewEngine::new(
        Arc::clone(&client) as Arc<dyn ModelClient>,
        Arc::new(NullSink),
        &SessionOptions::from_config(&config),
    );

    engine.start(load_code()).await.expect("analysis failed");

    let calls = client.calls();
    let prompt = &calls[0][0].content;
    assert!(prompt.contains("binary_search.py"));
    assert!(prompt.contains("def binary_search"));
    assert!(prompt.contains("beginner"));
    assert!(prompt.contains("readability"));
}

/// Tests that an analysis with no questions still yields feedback from an empty answer list.
#[tokio::test]
async fn test_review_zero_questions() {
    let client = Arc::new(ScriptedClient::with_replies([
        "## Initial Observations\n- Nothing to ask, the intent is clear",
        FEEDBACK,
    ]));
    let mut engine = engine(&client);

    let opening = engine.start(load_code()).await.expect("analysis failed");
    assert!(opening.analysis.questions.is_empty());

    let feedback = opening.feedback.expect("feedback should follow immediately");
    assert!(feedback.feedback.contains("base case"));
    assert_eq!(engine.state(), ReviewState::Feedback);

    // An empty answer list is also accepted through the explicit call path
    let client = Arc::new(ScriptedClient::with_replies(["no structure here"]));
    client.push_failure(TransportErrorKind::Network);
    client.push_reply(FEEDBACK);
    let mut engine = self::engine(&client);

    let opening = engine.start(load_code()).await.expect("analysis failed");
    assert!(opening.feedback.is_none());
    let feedback = engine.submit_answers(&[]).await.expect("feedback failed");
    assert!(!feedback.feedback.is_empty());
}

/// Tests that a failed feedback call can be retried without duplicating turns.
#[tokio::test]
async fn test_review_feedback_retry() {
    let client = Arc::new(ScriptedClient::with_replies([ANALYSIS]));
    client.push_failure(TransportErrorKind::RateLimit);
    client.push_reply(FEEDBACK);
    let mut engine = engine(&client);

    engine.start(load_code()).await.expect("analysis failed");
    let given = answers(&["Readability", "No"]);

    let err = engine.submit_answers(&given).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(engine.state(), ReviewState::AwaitingAnswers);
    assert_eq!(engine.session().thread().len(), 3);

    engine.submit_answers(&given).await.expect("retry failed");
    let turns = engine.session().thread().turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(
        turns.iter().filter(|t| t.role == Role::Assistant).count(),
        2
    );
    assert_alternates(turns);
}

/// Tests that every call sees the history so far, unchanged.
#[tokio::test]
async fn test_review_history_is_append_only() {
    let client = Arc::new(ScriptedClient::with_replies([ANALYSIS, FEEDBACK, "ok"]));
    let mut engine = engine(&client);

    engine.start(load_code()).await.expect("analysis failed");
    engine
        .submit_answers(&answers(&["a", "b"]))
        .await
        .expect("feedback failed");
    engine.follow_up("more?").await.expect("follow-up failed");

    let calls = client.calls();
    for pair in calls.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(later.len() > earlier.len());
        assert_eq!(&later[..earlier.len()], earlier.as_slice());
    }
}

/// Tests that a closed review refuses every operation and makes no calls.
#[tokio::test]
async fn test_review_closed_session() {
    let client = Arc::new(ScriptedClient::with_replies([ANALYSIS]));
    let mut engine = engine(&client);
    engine.start(load_code()).await.expect("analysis failed");
    engine.close().expect("close failed");

    let err = engine.submit_answers(&answers(&["a", "b"])).await.unwrap_err();
    assert!(matches!(err, TutorError::SessionClosed { .. }));
    assert!(err.is_usage_error());
    assert_eq!(client.call_count(), 1);
}

/// Tests that review events reach a broadcaster subscriber.
#[tokio::test]
async fn test_review_events_broadcast() {
    let client = Arc::new(ScriptedClient::with_replies([ANALYSIS, FEEDBACK]));
    let broadcaster = Arc::new(EventBroadcaster::new(64));
    let mut receiver = broadcaster.subscribe();
    let mut engine = ReviewEngine::new(
        Arc::clone(&client) as Arc<dyn ModelClient>,
        broadcaster,
        &SessionOptions::default(),
    );

    engine.start(load_code()).await.expect("analysis failed");
    engine
        .submit_answers(&answers(&["a", ""]))
        .await
        .expect("feedback failed");
    engine.close().expect("close failed");

    let mut names = Vec::new();
    while let Ok(record) = receiver.try_recv() {
        names.push(record.event.event_name());
    }
    assert_eq!(names.first(), Some(&"session_start"));
    assert_eq!(names.last(), Some(&"session_end"));
    assert!(names.contains(&"user_input"));
    assert!(names.contains(&"feedback_parsed"));
    assert_eq!(names.iter().filter(|n| **n == "turn_received").count(), 2);
}

fn assert_send<T: Send>() {}

/// Tests that independent reviews run side by side without sharing history.
#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn test_review_sessions_run_concurrently() {
    assert_send::<ReviewEngine>();

    let tasks: Vec<_> = (0..3u64)
        .map(|i| {
            tokio::spawn(async move {
                let client = Arc::new(
                    ScriptedClient::with_replies([
                        format!("## Questions\n1. Question for session {i}?"),
                        format!("Feedback for session {i}"),
                    ])
                    .with_delay(Duration::from_millis(30 - i * 10)),
                );
                let mut engine = engine(&client);

                engine.start(load_code()).await.expect("analysis failed");
                engine
                    .submit_answers(&[format!("Answer from session {i}")])
                    .await
                    .expect("feedback failed");
                engine.close().expect("close failed");

                (i, engine.session().thread().turns().to_vec())
            })
        })
        .collect();

    for task in tasks {
        let (i, turns) = task.await.expect("review task panicked");
        assert_eq!(turns.len(), 4);
        assert_alternates(&turns);
        assert!(turns[1].content.contains(&format!("Question for session {i}?")));
        assert!(turns[2].content.contains(&format!("Answer from session {i}")));
        assert!(turns[3].content.contains(&format!("Feedback for session {i}")));

        for other in (0..3).filter(|j| *j != i) {
            let marker = format!("session {other}");
            assert!(
                turns.iter().all(|t| !t.content.contains(&marker)),
                "session {i} saw content from session {other}"
            );
        }
    }
}
