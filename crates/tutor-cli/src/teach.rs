//! The `teach-me` command.

use std::io::BufRead;

use tutor_core::{
    ExerciseView, NextStep, RoundResult, TeachingEngine, TeachingOutcome, TeachingSummary,
};

use crate::console::{offer_retry, Console};

const HINT_PROMPT: &str =
    "\nYour hints (blank line to send; type 'skip' to move on or 'quit' to stop):";

/// Runs a full teaching session.
pub async fn run<R: BufRead>(
    console: &mut Console<R>,
    engine: &mut TeachingEngine,
    topic: Option<String>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let topic = match topic {
        Some(topic) => topic,
        None => console.ask("What topic would you like to practise teaching?", "recursion")?,
    };
    let language = match language {
        Some(language) => language,
        None => console.ask("Which language?", "python")?,
    };

    println!("\nA student is writing some {language} code about {topic}...");
    let mut view = loop {
        match engine.start(&topic, &language).await {
            Ok(view) => break view,
            Err(e) if offer_retry(console, &e)? => {}
            Err(e) => {
                engine.close()?;
                return Err(e.into());
            }
        }
    };

    loop {
        print_exercise(&view, engine.max_rounds());

        let Some(result) = play_round(console, engine).await? else {
            let summary = engine.close()?;
            print_summary(&summary);
            return Ok(());
        };

        if let Some(evaluation) = &result.evaluation {
            println!("\nStudent: {}\n", evaluation.response.trim());
        }

        match result.next {
            NextStep::Finished(summary) => {
                print_summary(&summary);
                return Ok(());
            }
            NextStep::NextRound(round) => {
                println!("Round {round}: the student has another problem...");
                view = loop {
                    match engine.next_exercise().await {
                        Ok(view) => break view,
                        Err(e) if offer_retry(console, &e)? => {}
                        Err(e) => {
                            let summary = engine.close()?;
                            print_summary(&summary);
                            return Err(e.into());
                        }
                    }
                };
            }
        }
    }
}

/// Collects hints for the current exercise and decides the round.
///
/// Returns `None` when the learner wants to stop.
async fn play_round<R: BufRead>(
    console: &mut Console<R>,
    engine: &mut TeachingEngine,
) -> anyhow::Result<Option<RoundResult>> {
    loop {
        let Some(hints) = console.read_block(HINT_PROMPT)? else {
            return Ok(None);
        };

        match hints.trim().to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => return Ok(None),
            "skip" => return Ok(Some(engine.skip_round()?)),
            _ => {}
        }

        println!("\nThe student is reading your hints...");
        loop {
            match engine.submit_hints(&hints).await {
                Ok(result) => return Ok(Some(result)),
                Err(e) if offer_retry(console, &e)? => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => break,
            }
        }
    }
}

fn print_exercise(view: &ExerciseView, max_rounds: u32) {
    println!(
        "\n=== Round {}/{max_rounds} ({}) ===\n",
        view.round, view.difficulty
    );
    println!("Student: {}\n", view.student_question);
    println!("```{}\n{}\n```", view.language, view.code.trim_end());
}

fn print_summary(summary: &TeachingSummary) {
    let message = match summary.outcome {
        TeachingOutcome::UnderstandingAchieved => "The student understands now. Nicely taught!",
        TeachingOutcome::RoundCeilingReached => {
            "That was the last round. Review the hints that worked and try again."
        }
        TeachingOutcome::EndedEarly => "Session ended.",
    };
    println!("\n{message}");

    let skipped = summary.rounds.iter().filter(|r| r.skipped()).count();
    println!(
        "Topic: {} ({}) | rounds played: {} | skipped: {skipped}",
        summary.topic,
        summary.language,
        summary.rounds_completed()
    );
}
