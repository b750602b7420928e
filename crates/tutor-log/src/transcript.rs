//! Markdown transcripts of logged sessions.
//!
//! Renders the interaction events of one session as a readable document.
//! Raw turn events are left out; they carry prompt text, not dialogue.

use std::fmt::Write;

use serde_json::Value;

use crate::LogEntry;

/// Renders a session's log entries as Markdown.
pub struct TranscriptRenderer<'a> {
    entries: &'a [LogEntry],
}

impl<'a> TranscriptRenderer<'a> {
    /// Creates a renderer over one session's entries, in log order.
    #[must_use]
    pub const fn new(entries: &'a [LogEntry]) -> Self {
        Self { entries }
    }

    /// Renders the transcript.
    #[must_use]
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.write_title(&mut output);

        for entry in self.entries {
            match entry.event.as_str() {
                "user_input" => write_user_input(&mut output, entry),
                "analysis_parsed" => write_analysis(&mut output, &entry.payload),
                "feedback_parsed" => write_feedback(&mut output, &entry.payload),
                "exercise_parsed" => write_exercise(&mut output, &entry.payload),
                "evaluation_parsed" => write_evaluation(&mut output, &entry.payload),
                "round_complete" => write_round(&mut output, &entry.payload),
                "turn_failed" => {
                    let _ = writeln!(
                        output,
                        "_Model call failed: {}_\n",
                        entry.payload_str("message").unwrap_or("unknown error")
                    );
                }
                "session_end" => {
                    let _ = writeln!(
                        output,
                        "---\n\nSession ended ({}) at {}.",
                        entry.payload_str("outcome").unwrap_or("unknown"),
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                _ => {}
            }
        }

        output
    }

    fn write_title(&self, output: &mut String) {
        let start = self.entries.iter().find(|e| e.event == "session_start");

        let Some(start) = start else {
            let _ = writeln!(output, "# Code Tutor Session\n");
            return;
        };

        let mode = start.payload_str("mode").unwrap_or("session");
        let subject = start.payload_str("subject").unwrap_or("untitled");
        let _ = writeln!(output, "# Code Tutor {}: {subject}\n", capitalize(mode));
        let _ = writeln!(output, "| Field | Value |");
        let _ = writeln!(output, "|-------|-------|");
        let _ = writeln!(output, "| Session | {} |", start.session_id);
        let _ = writeln!(
            output,
            "| Started | {} |",
            start.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(model) = start.payload_str("model") {
            let _ = writeln!(output, "| Model | {model} |");
        }
        if let Some(language) = start.payload_str("language") {
            let _ = writeln!(output, "| Language | {language} |");
        }
        output.push('\n');
    }
}

fn write_user_input(output: &mut String, entry: &LogEntry) {
    let text = entry.payload_str("text").unwrap_or_default();
    let _ = writeln!(output, "**You:**\n");
    for line in text.lines() {
        let _ = writeln!(output, "> {line}");
    }
    output.push('\n');
}

fn write_analysis(output: &mut String, payload: &Value) {
    let observations = string_list(payload, "observations");
    if !observations.is_empty() {
        let _ = writeln!(output, "## Initial Observations\n");
        for item in &observations {
            let _ = writeln!(output, "- {item}");
        }
        output.push('\n');
    }

    let questions = string_list(payload, "questions");
    let _ = writeln!(output, "## Questions\n");
    if questions.is_empty() {
        let _ = writeln!(output, "_No clarifying questions._");
    }
    for (i, question) in questions.iter().enumerate() {
        let _ = writeln!(output, "{}. {question}", i + 1);
    }
    output.push('\n');
}

fn write_feedback(output: &mut String, payload: &Value) {
    let heading = match payload.get("stage").and_then(Value::as_str) {
        Some("follow_up") => "Follow-up",
        _ => "Feedback",
    };
    let text = payload.get("feedback").and_then(Value::as_str).unwrap_or_default();
    let _ = writeln!(output, "## {heading}\n\n{}\n", text.trim());
}

fn write_exercise(output: &mut String, payload: &Value) {
    let round = payload.get("round").and_then(Value::as_u64).unwrap_or(0);
    let difficulty = payload
        .get("difficulty")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let code = payload.get("code").and_then(Value::as_str).unwrap_or_default();
    let question = payload
        .get("student_question")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let _ = writeln!(output, "## Round {round} ({difficulty})\n");
    let _ = writeln!(output, "```\n{}\n```\n", code.trim_end());
    if !question.is_empty() {
        let _ = writeln!(output, "**Student:** {question}\n");
    }
}

fn write_evaluation(output: &mut String, payload: &Value) {
    let response = payload
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let _ = writeln!(output, "**Student:** {}\n", response.trim());
}

fn write_round(output: &mut String, payload: &Value) {
    let round = payload.get("round").and_then(Value::as_u64).unwrap_or(0);
    let achieved = payload.get("achieved").and_then(Value::as_bool).unwrap_or(false);
    let skipped = payload.get("skipped").and_then(Value::as_bool).unwrap_or(false);

    let verdict = if skipped {
        "skipped"
    } else if achieved {
        "understood"
    } else {
        "not yet understood"
    };
    let _ = writeln!(output, "_Round {round}: {verdict}._\n");
}

fn string_list(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
