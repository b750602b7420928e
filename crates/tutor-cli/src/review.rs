//! The `review` command.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tutor_core::{
    find_sources, AnalysisResult, CodeUnit, EventSink, FeedbackResult, ModelClient, ReviewEngine,
    SessionOptions,
};

use crate::console::{offer_retry, Console};

/// Shared pieces every review session needs.
pub struct ReviewContext {
    pub client: Arc<dyn ModelClient>,
    pub sink: Arc<dyn EventSink>,
    pub options: SessionOptions,
}

/// Reviews a file, or every supported file under a directory.
pub async fn run<R: BufRead>(
    console: &mut Console<R>,
    ctx: &ReviewContext,
    path: &Path,
    recursive: bool,
) -> anyhow::Result<()> {
    if !path.is_dir() {
        return review_file(console, ctx, path).await;
    }

    let files = find_sources(path, recursive)?;
    if files.is_empty() {
        println!("No supported source files found in {}", path.display());
        return Ok(());
    }

    println!("Found {} source file(s) in {}", files.len(), path.display());
    for (i, file) in files.iter().enumerate() {
        if i > 0 && !console.confirm(&format!("\nReview {}?", file.display()), true)? {
            println!("Stopping.");
            break;
        }
        if let Err(e) = review_file(console, ctx, file).await {
            eprintln!("Skipping {}: {e}", file.display());
        }
    }
    Ok(())
}

/// Runs one complete review session over a single file.
async fn review_file<R: BufRead>(
    console: &mut Console<R>,
    ctx: &ReviewContext,
    path: &Path,
) -> anyhow::Result<()> {
    let code = CodeUnit::load(path)?;
    println!(
        "\n=== Reviewing {} ({}, {} lines) ===\n",
        code.display_name(),
        code.language,
        code.line_count
    );

    let mut engine = ReviewEngine::new(Arc::clone(&ctx.client), Arc::clone(&ctx.sink), &ctx.options);

    println!("Analyzing your code...");
    let opening = loop {
        match engine.start(code.clone()).await {
            Ok(opening) => break opening,
            Err(e) if offer_retry(console, &e)? => {}
            Err(e) => {
                engine.close()?;
                return Err(e.into());
            }
        }
    };

    let analysis = &opening.analysis;
    if let Some(raw) = unstructured_reply(analysis) {
        println!("\n{raw}");
    }
    if !analysis.observations.is_empty() {
        println!("\nInitial observations:");
        for observation in &analysis.observations {
            println!("  - {observation}");
        }
    }

    let feedback = if let Some(feedback) = opening.feedback {
        Some(feedback)
    } else {
        if let Some(e) = &opening.feedback_error {
            eprintln!("\n{e}\n");
        }
        let mut answers = Vec::with_capacity(analysis.questions.len());
        if !analysis.questions.is_empty() {
            println!("\nBefore I give feedback, a few questions about your intentions:\n");
        }
        for (i, question) in analysis.questions.iter().enumerate() {
            println!("{}. {question}", i + 1);
            answers.push(console.read_line("   Your answer: ")?.unwrap_or_default());
        }

        println!("\nPreparing feedback...");
        loop {
            match engine.submit_answers(&answers).await {
                Ok(feedback) => break Some(feedback),
                Err(e) if offer_retry(console, &e)? => {}
                Err(e) => {
                    eprintln!("Feedback unavailable: {e}");
                    break None;
                }
            }
        }
    };

    if let Some(feedback) = feedback {
        print_feedback(&feedback);
        follow_up_loop(console, &mut engine).await?;
    }

    let summary = engine.close()?;
    println!(
        "\nReview finished: {} question(s), {} follow-up(s).",
        summary.questions_asked, summary.follow_ups
    );
    Ok(())
}

async fn follow_up_loop<R: BufRead>(
    console: &mut Console<R>,
    engine: &mut ReviewEngine,
) -> anyhow::Result<()> {
    loop {
        let Some(text) = console.read_line("\nFollow-up question (Enter to finish): ")? else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Ok(());
        }

        loop {
            match engine.follow_up(&text).await {
                Ok(reply) => {
                    print_feedback(&reply);
                    break;
                }
                Err(e) if offer_retry(console, &e)? => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => break,
            }
        }
    }
}

fn print_feedback(feedback: &FeedbackResult) {
    println!("\n{}\n", feedback.feedback.trim());
}

/// The raw analysis text, when nothing structured could be pulled out of it.
fn unstructured_reply(analysis: &AnalysisResult) -> Option<&str> {
    let raw = analysis.raw_response.trim();
    (analysis.questions.is_empty() && analysis.observations.is_empty() && !raw.is_empty())
        .then_some(raw)
}
